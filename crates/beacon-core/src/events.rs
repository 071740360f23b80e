use serde::{Deserialize, Serialize};

use crate::types::{Coordinates, Locale, Message};

/// Everything the presentation layer needs to re-render a conversation.
///
/// Published by the session engine on a broadcast channel after each state
/// change. Subscribers that fall behind lose events, never the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// A message was appended to the session.
    MessageAppended { message: Message },
    /// The "assistant is typing" indicator changed.
    TypingChanged { typing: bool },
    /// The pending input buffer changed (cleared on submit, filled by speech).
    InputChanged { text: String },
    /// Voice recording started or stopped.
    RecordingChanged { recording: bool },
    /// A location fix was recorded and can be pinned on a map.
    LocationUpdated { coordinates: Coordinates },
    /// The active locale changed.
    LocaleChanged { locale: Locale },
    /// A transient, dismissible notice for the user.
    Notify { notification: Notification },
}

/// Severity of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// What a notification is about, so the presentation layer can localize it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BackendFailed,
    InputRejected,
    SpeechUnsupported,
    SpeechFailed,
    LocationShared,
    LocationFailed,
    StorageFailed,
}

/// A transient user-visible notice. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub kind: NotificationKind,
    pub text: String,
}

impl Notification {
    pub fn error(kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            kind,
            text: text.into(),
        }
    }

    pub fn success(kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            kind,
            text: text.into(),
        }
    }

    pub fn info(kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            kind,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_constructors() {
        let n = Notification::error(NotificationKind::BackendFailed, "offline");
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.kind, NotificationKind::BackendFailed);
        assert_eq!(n.text, "offline");

        let n = Notification::success(NotificationKind::LocationShared, "shared");
        assert_eq!(n.level, NotificationLevel::Success);

        let n = Notification::info(NotificationKind::SpeechUnsupported, "no mic");
        assert_eq!(n.level, NotificationLevel::Info);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::TypingChanged { typing: true };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing_changed");
        assert_eq!(json["typing"], true);
    }

    #[test]
    fn test_notify_event_serialization() {
        let event = SessionEvent::Notify {
            notification: Notification::error(NotificationKind::LocationFailed, "denied"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notify");
        assert_eq!(json["notification"]["kind"], "location_failed");
        assert_eq!(json["notification"]["level"], "error");
    }
}
