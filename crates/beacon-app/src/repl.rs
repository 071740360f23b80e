//! Line commands and terminal rendering of session events.

use chrono::Local;

use beacon_core::events::{NotificationLevel, SessionEvent};
use beacon_core::types::{Message, Role};

pub const HELP: &str = "\
Type a message and press Enter to send it.
  /voice           start or stop voice input
  /send            send the text captured by voice input
  /location        share your current location
  /locale <code>   switch language (e.g. /locale es)
  /history         show the conversation so far
  /help            show this help
  /quit            leave";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Say(String),
    Send,
    Voice,
    Location,
    Locale(String),
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next().map(str::trim).unwrap_or_default();
        match name.as_str() {
            "voice" | "mic" => Command::Voice,
            "send" => Command::Send,
            "location" | "loc" => Command::Location,
            "locale" | "lang" if !arg.is_empty() => Command::Locale(arg.to_string()),
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

pub fn render_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    format!(
        "[{}] {}: {}",
        message.created_at.with_timezone(&Local).format("%H:%M"),
        who,
        message.content
    )
}

/// Terminal line for an event, or `None` if it has no visible effect.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::MessageAppended { message } => Some(render_message(message)),
        SessionEvent::TypingChanged { typing: true } => Some("  assistant is typing...".to_string()),
        SessionEvent::RecordingChanged { recording: true } => {
            Some("  listening... (/voice to stop)".to_string())
        }
        SessionEvent::RecordingChanged { recording: false } => {
            Some("  stopped listening".to_string())
        }
        SessionEvent::InputChanged { text } if !text.is_empty() => {
            Some(format!("  heard: \"{}\" (/send to send it)", text))
        }
        SessionEvent::LocaleChanged { locale } => Some(format!("  language set to {}", locale)),
        SessionEvent::Notify { notification } => {
            let tag = match notification.level {
                NotificationLevel::Error => "!",
                NotificationLevel::Success => "+",
                NotificationLevel::Info => "i",
            };
            Some(format!("  [{}] {}", tag, notification.text))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::events::{Notification, NotificationKind};
    use beacon_core::types::Locale;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            Command::parse("  help, fire nearby "),
            Command::Say("help, fire nearby".to_string())
        );
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/voice"), Command::Voice);
        assert_eq!(Command::parse("/SEND"), Command::Send);
        assert_eq!(Command::parse("/location"), Command::Location);
        assert_eq!(Command::parse("/locale es"), Command::Locale("es".to_string()));
        assert_eq!(Command::parse("/history"), Command::History);
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("/help"), Command::Help);
    }

    #[test]
    fn test_parse_unknown_and_missing_argument() {
        assert_eq!(
            Command::parse("/dance"),
            Command::Unknown("/dance".to_string())
        );
        assert_eq!(
            Command::parse("/locale"),
            Command::Unknown("/locale".to_string())
        );
    }

    #[test]
    fn test_render_message_labels_role() {
        let msg = Message::user("need help", chrono::Utc::now());
        let line = render_message(&msg);
        assert!(line.ends_with("you: need help"));

        let msg = Message::assistant("Stay calm.", chrono::Utc::now());
        assert!(render_message(&msg).ends_with("assistant: Stay calm."));
    }

    #[test]
    fn test_render_events() {
        assert_eq!(
            render_event(&SessionEvent::TypingChanged { typing: false }),
            None
        );
        assert_eq!(
            render_event(&SessionEvent::InputChanged {
                text: String::new()
            }),
            None
        );
        assert!(render_event(&SessionEvent::InputChanged {
            text: "gas leak".to_string()
        })
        .unwrap()
        .contains("gas leak"));
        assert_eq!(
            render_event(&SessionEvent::LocaleChanged {
                locale: Locale::new("fr").unwrap()
            })
            .unwrap(),
            "  language set to fr"
        );
        assert_eq!(
            render_event(&SessionEvent::Notify {
                notification: Notification::error(NotificationKind::BackendFailed, "offline")
            })
            .unwrap(),
            "  [!] offline"
        );
    }
}
