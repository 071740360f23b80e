//! Session engine: the central coordinator for one conversation.
//!
//! Owns the ordered message list, the pending indicator, the input buffer,
//! the active locale and the last shared location. Every user action enters
//! here, is persisted through the message store, and is published to
//! subscribers as a [`SessionEvent`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;

use beacon_core::config::AssistantConfig;
use beacon_core::events::{Notification, NotificationKind, SessionEvent};
use beacon_core::types::{Coordinates, Locale, Message, Role};
use beacon_location::{LocationBridge, LocationError};
use beacon_storage::MessageStore;
use beacon_voice::{
    RecognitionEvent, RecognitionOutcome, VoiceError, VoiceInputBridge, VoiceOutputBridge,
};

use crate::backend::DialogueBackend;
use crate::error::{BackendError, ChatError};
use crate::request::{DialogueRequest, RequestBuilder};

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Construction inputs
// =============================================================================

/// Collaborators the engine drives.
pub struct EngineParts {
    pub store: Arc<dyn MessageStore>,
    pub backend: Arc<dyn DialogueBackend>,
    pub voice_input: VoiceInputBridge,
    pub voice_output: VoiceOutputBridge,
    pub location: LocationBridge,
}

/// Assistant behaviour resolved from the `[assistant]` config section.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    config: AssistantConfig,
    default_locale: Locale,
}

impl AssistantSettings {
    pub fn new(config: AssistantConfig) -> Self {
        let default_locale = Locale::new(config.default_locale.as_str()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid default locale, using en");
            Locale::default()
        });
        Self {
            config,
            default_locale,
        }
    }

    /// Replace the system instruction sent ahead of every request.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn with_serialized_submissions(mut self, serialize: bool) -> Self {
        self.config.serialize_submissions = serialize;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.config.system_prompt
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }

    pub fn greeting_for(&self, locale: &Locale) -> String {
        self.config.greeting_for(locale)
    }

    pub fn supports(&self, locale: &Locale) -> bool {
        self.config.supports(locale)
    }

    pub fn serialize_submissions(&self) -> bool {
        self.config.serialize_submissions
    }

    /// Longest accepted message in characters. Zero disables the limit.
    pub fn max_message_chars(&self) -> usize {
        self.config.max_message_chars
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::new(AssistantConfig::default())
    }
}

impl From<AssistantConfig> for AssistantSettings {
    fn from(config: AssistantConfig) -> Self {
        Self::new(config)
    }
}

/// Result of [`SessionEngine::toggle_voice_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceToggle {
    Started,
    Stopped,
    Unsupported,
    Failed,
    Inactive,
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<Message>,
    input: String,
    locale: Locale,
    location: Option<Coordinates>,
}

/// A user message that has been appended and persisted, waiting for its
/// reply. Pass it to [`SessionEngine::complete`].
///
/// With serialized submissions it holds the submission gate until the
/// reply settles.
#[derive(Debug)]
#[must_use = "an accepted submission gets no reply until it is completed"]
pub struct Submission {
    message: Message,
    request: DialogueRequest,
    gate: Option<OwnedMutexGuard<()>>,
}

impl Submission {
    /// The user message as appended.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn request(&self) -> &DialogueRequest {
        &self.request
    }
}

/// Clears the pending indicator when the last outstanding request settles,
/// on every exit path.
struct PendingGuard<'a> {
    engine: &'a SessionEngine,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.engine.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.engine.emit(SessionEvent::TypingChanged { typing: false });
        }
    }
}

/// Conversation session engine.
///
/// Methods take `&self`; share the engine behind an `Arc` so a reply can be
/// awaited while other input keeps arriving.
pub struct SessionEngine {
    store: Arc<dyn MessageStore>,
    backend: Arc<dyn DialogueBackend>,
    voice_input: VoiceInputBridge,
    voice_output: VoiceOutputBridge,
    location: LocationBridge,
    requests: RequestBuilder,
    settings: AssistantSettings,
    state: Mutex<SessionState>,
    in_flight: AtomicUsize,
    active: AtomicBool,
    submit_gate: Arc<tokio::sync::Mutex<()>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    pub fn new(parts: EngineParts, settings: impl Into<AssistantSettings>) -> Self {
        let settings = settings.into();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = SessionState {
            locale: settings.default_locale().clone(),
            ..SessionState::default()
        };

        Self {
            store: parts.store,
            backend: parts.backend,
            voice_input: parts.voice_input,
            voice_output: parts.voice_output,
            location: parts.location,
            requests: RequestBuilder::new(settings.system_prompt()),
            settings,
            state: Mutex::new(state),
            in_flight: AtomicUsize::new(0),
            active: AtomicBool::new(true),
            submit_gate: Arc::new(tokio::sync::Mutex::new(())),
            events,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Set the locale and load the session.
    ///
    /// An empty store is seeded with a localized greeting, which is
    /// persisted. If the history cannot be read the greeting is shown but
    /// not written, so it never lands after messages that are still on
    /// disk. Calling again while messages exist only switches the locale.
    pub fn initialize(&self, locale: Locale) {
        if !self.is_active() {
            return;
        }
        let locale = if self.settings.supports(&locale) {
            locale
        } else {
            tracing::warn!(locale = %locale, "Unsupported locale, using default");
            self.settings.default_locale().clone()
        };
        self.apply_locale(locale);

        let mut state = self.state();
        if !state.messages.is_empty() {
            tracing::debug!(messages = state.messages.len(), "Session already initialized");
            return;
        }

        let (restored, readable) = match self.store.load() {
            Ok(messages) => (messages, true),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load session history");
                self.notify(Notification::error(
                    NotificationKind::StorageFailed,
                    "Previous conversation could not be loaded.",
                ));
                (Vec::new(), false)
            }
        };

        if restored.is_empty() {
            let at = next_timestamp(&state.messages);
            let greeting = Message::assistant(self.settings.greeting_for(&state.locale), at);
            if readable {
                self.append_locked(&mut state, greeting);
                tracing::info!(locale = %state.locale, "Session seeded with greeting");
            } else {
                self.push_locked(&mut state, greeting);
                tracing::info!(locale = %state.locale, "Greeting shown without persisting");
            }
        } else {
            tracing::info!(messages = restored.len(), "Session restored");
            state.messages = restored;
        }
    }

    /// Detach the engine. Replies that land afterwards are discarded and
    /// nothing more is appended or persisted.
    pub fn close(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.voice_input.is_recording() {
            if let Err(e) = self.voice_input.stop() {
                tracing::debug!(error = %e, "Recognition already stopped");
            }
            self.emit(SessionEvent::RecordingChanged { recording: false });
        }
        tracing::info!("Session closed");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Text submission
    // -------------------------------------------------------------------------

    /// Submit typed or transcribed text and wait for the assistant's reply.
    ///
    /// The user message is appended and persisted before the backend is
    /// called. Failures are surfaced as notifications and also returned.
    pub async fn submit_text(&self, text: &str) -> Result<Message, ChatError> {
        let submission = self.accept_text(text).await?;
        self.complete(submission).await
    }

    /// Submit whatever is in the input buffer.
    pub async fn submit_input(&self) -> Result<Message, ChatError> {
        let text = self.input();
        self.submit_text(&text).await
    }

    /// Validate `text`, append it as a user message and clear the input
    /// buffer, without calling the backend.
    ///
    /// Messages are appended in the order this is called. Only waits when
    /// submissions are serialized and an earlier one is still in flight.
    pub async fn accept_text(&self, text: &str) -> Result<Submission, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let limit = self.settings.max_message_chars();
        if limit > 0 && text.chars().count() > limit {
            self.notify(Notification::error(
                NotificationKind::InputRejected,
                format!("Message is too long (limit {} characters).", limit),
            ));
            return Err(ChatError::MessageTooLong(limit));
        }
        if !self.is_active() {
            return Err(ChatError::Inactive);
        }

        let gate = if self.settings.serialize_submissions() {
            Some(Arc::clone(&self.submit_gate).lock_owned().await)
        } else {
            None
        };
        if !self.is_active() {
            return Err(ChatError::Inactive);
        }

        let (message, request) = {
            let mut state = self.state();
            let at = next_timestamp(&state.messages);
            let message = self.append_locked(&mut state, Message::user(text, at));
            state.input.clear();
            (message, self.requests.build(&state.messages))
        };
        self.emit(SessionEvent::InputChanged {
            text: String::new(),
        });

        Ok(Submission {
            message,
            request,
            gate,
        })
    }

    /// Send an accepted submission to the backend and apply the reply.
    pub async fn complete(&self, submission: Submission) -> Result<Message, ChatError> {
        let Submission {
            message,
            request,
            gate,
        } = submission;
        tracing::debug!(message_id = %message.id, "Requesting reply");

        let _pending = self.begin_request();
        let outcome = self.backend.complete(&request).await;
        let reply = self.apply_reply(outcome);
        drop(gate);
        reply
    }

    /// Accept lines from `lines` one at a time, in the order they were
    /// sent, and complete each in the background so replies arrive as
    /// events while later lines are still being accepted.
    pub fn spawn_submission_queue(
        engine: &Arc<Self>,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(engine);
        tokio::spawn(async move {
            while let Some(text) = lines.recv().await {
                let submission = match engine.accept_text(&text).await {
                    Ok(submission) => submission,
                    Err(ChatError::Inactive) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "Line not submitted");
                        continue;
                    }
                };
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = engine.complete(submission).await {
                        tracing::debug!(error = %e, "Submission did not produce a reply");
                    }
                });
            }
        })
    }

    fn begin_request(&self) -> PendingGuard<'_> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.emit(SessionEvent::TypingChanged { typing: true });
        }
        PendingGuard { engine: self }
    }

    fn apply_reply(&self, outcome: Result<String, BackendError>) -> Result<Message, ChatError> {
        // Blank replies fail; anything else is kept exactly as sent.
        let reply = outcome.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(BackendError::EmptyReply)
            } else {
                Ok(reply)
            }
        });

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Dialogue request failed");
                if self.is_active() {
                    self.notify(Notification::error(
                        NotificationKind::BackendFailed,
                        "The assistant could not be reached. Please try again.",
                    ));
                }
                return Err(e.into());
            }
        };

        if !self.is_active() {
            tracing::info!(chars = reply.len(), "Discarding reply for closed session");
            return Err(ChatError::Discarded);
        }

        let (message, locale) = {
            let mut state = self.state();
            let at = next_timestamp(&state.messages);
            let message = self.append_locked(&mut state, Message::assistant(reply, at));
            (message, state.locale.clone())
        };
        self.voice_output.speak(&message.content, &locale);
        Ok(message)
    }

    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------

    /// Share the current position as a user message.
    pub async fn submit_location(&self) -> Result<Message, ChatError> {
        if !self.is_active() {
            return Err(ChatError::Inactive);
        }

        let coordinates = match self.location.get_current_position().await {
            Ok(coordinates) => coordinates,
            Err(e) => {
                tracing::warn!(error = %e, "Location lookup failed");
                if self.is_active() {
                    self.notify(Notification::error(
                        NotificationKind::LocationFailed,
                        location_failure_text(&e),
                    ));
                }
                return Err(e.into());
            }
        };

        if !self.is_active() {
            return Err(ChatError::Discarded);
        }

        let message = {
            let mut state = self.state();
            state.location = Some(coordinates);
            let at = next_timestamp(&state.messages);
            self.append_locked(&mut state, Message::user(coordinates.announcement(), at))
        };
        self.emit(SessionEvent::LocationUpdated { coordinates });
        self.notify(Notification::success(
            NotificationKind::LocationShared,
            "Location shared.",
        ));
        tracing::info!(
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            "Location shared"
        );
        Ok(message)
    }

    pub fn location(&self) -> Option<Coordinates> {
        self.state().location
    }

    // -------------------------------------------------------------------------
    // Voice input
    // -------------------------------------------------------------------------

    /// Start recording if idle, stop if recording.
    pub fn toggle_voice_input(&self) -> VoiceToggle {
        if !self.is_active() {
            return VoiceToggle::Inactive;
        }
        if !self.voice_input.is_supported() {
            self.notify_speech_unsupported();
            return VoiceToggle::Unsupported;
        }

        if self.voice_input.is_recording() {
            if let Err(e) = self.voice_input.stop() {
                tracing::debug!(error = %e, "Recognition already stopped");
            }
            self.emit(SessionEvent::RecordingChanged { recording: false });
            return VoiceToggle::Stopped;
        }

        let locale = self.locale();
        match self.voice_input.start(&locale) {
            Ok(_) => {
                self.emit(SessionEvent::RecordingChanged { recording: true });
                VoiceToggle::Started
            }
            Err(VoiceError::Unsupported) => {
                self.notify_speech_unsupported();
                VoiceToggle::Unsupported
            }
            Err(e) => {
                self.notify(Notification::error(
                    NotificationKind::SpeechFailed,
                    format!("Voice input could not start: {}", e),
                ));
                VoiceToggle::Failed
            }
        }
    }

    /// Apply one event from the voice input channel. A transcript replaces
    /// the input buffer and is never submitted automatically.
    pub fn handle_recognition_event(&self, event: &RecognitionEvent) {
        if !self.is_active() {
            return;
        }
        match self.voice_input.accept(event) {
            None => {}
            Some(RecognitionOutcome::Transcript(text)) => {
                self.state().input = text.clone();
                self.emit(SessionEvent::InputChanged { text });
            }
            Some(RecognitionOutcome::Error(reason)) => {
                self.emit(SessionEvent::RecordingChanged { recording: false });
                self.notify(Notification::error(
                    NotificationKind::SpeechFailed,
                    format!("Voice input failed: {}", reason),
                ));
            }
            Some(RecognitionOutcome::End) => {
                self.emit(SessionEvent::RecordingChanged { recording: false });
            }
        }
    }

    /// Feed recognition events into `engine` until the channel closes or
    /// the engine is closed.
    pub fn spawn_recognition_pump(
        engine: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(engine);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !engine.is_active() {
                    break;
                }
                engine.handle_recognition_event(&event);
            }
        })
    }

    pub fn is_recording(&self) -> bool {
        self.voice_input.is_recording()
    }

    fn notify_speech_unsupported(&self) {
        self.notify(Notification::info(
            NotificationKind::SpeechUnsupported,
            "Voice input is not supported on this device.",
        ));
    }

    // -------------------------------------------------------------------------
    // Input buffer and locale
    // -------------------------------------------------------------------------

    pub fn input(&self) -> String {
        self.state().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state().input = text.clone();
        self.emit(SessionEvent::InputChanged { text });
    }

    pub fn locale(&self) -> Locale {
        self.state().locale.clone()
    }

    /// Switch the active locale. Speech calls already dispatched keep the
    /// language they were started with.
    pub fn set_locale(&self, locale: Locale) -> Result<(), ChatError> {
        if !self.settings.supports(&locale) {
            return Err(ChatError::UnsupportedLocale(locale.to_string()));
        }
        self.apply_locale(locale);
        Ok(())
    }

    fn apply_locale(&self, locale: Locale) {
        let changed = {
            let mut state = self.state();
            if state.locale == locale {
                false
            } else {
                state.locale = locale.clone();
                true
            }
        };
        if changed {
            tracing::debug!(locale = %locale, "Locale changed");
            self.emit(SessionEvent::LocaleChanged { locale });
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of the session messages in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    /// True exactly while at least one backend request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        tracing::debug!(kind = ?notification.kind, text = %notification.text, "Notification");
        self.emit(SessionEvent::Notify { notification });
    }

    /// Append under the state lock so persisted order matches memory order.
    /// A persistence failure keeps the message in memory and notifies.
    fn append_locked(&self, state: &mut SessionState, message: Message) -> Message {
        debug_assert!(message.role != Role::System);
        if let Err(e) = self.store.append(&message) {
            tracing::warn!(error = %e, message_id = %message.id, "Failed to persist message");
            self.notify(Notification::error(
                NotificationKind::StorageFailed,
                "This message could not be saved.",
            ));
        }
        self.push_locked(state, message)
    }

    /// Add to the in-memory session only.
    fn push_locked(&self, state: &mut SessionState, message: Message) -> Message {
        state.messages.push(message.clone());
        self.emit(SessionEvent::MessageAppended {
            message: message.clone(),
        });
        message
    }
}

/// Current time at millisecond precision, never earlier than the last
/// message so append order and timestamp order agree.
fn next_timestamp(messages: &[Message]) -> DateTime<Utc> {
    let now = Utc::now();
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    match messages.last() {
        Some(last) if last.created_at > now => last.created_at,
        _ => now,
    }
}

fn location_failure_text(err: &LocationError) -> String {
    match err {
        LocationError::PermissionDenied => "Location access was denied.".to_string(),
        LocationError::Unavailable(_) => "Your location is unavailable right now.".to_string(),
        LocationError::Timeout(_) => "Locating you took too long. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_next_timestamp_never_goes_backwards() {
        let future = Utc::now() + Duration::hours(1);
        let messages = vec![Message::user("later", future)];
        assert_eq!(next_timestamp(&messages), future);
    }

    #[test]
    fn test_next_timestamp_millisecond_precision() {
        let ts = next_timestamp(&[]);
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_settings_from_config() {
        let config = AssistantConfig {
            default_locale: "es".to_string(),
            max_message_chars: 10,
            ..AssistantConfig::default()
        };
        let settings = AssistantSettings::from(config)
            .with_system_prompt("Test prompt")
            .with_serialized_submissions(true);

        assert_eq!(settings.default_locale().as_str(), "es");
        assert_eq!(settings.system_prompt(), "Test prompt");
        assert_eq!(settings.max_message_chars(), 10);
        assert!(settings.serialize_submissions());
    }

    #[test]
    fn test_settings_invalid_default_locale_falls_back() {
        let config = AssistantConfig {
            default_locale: "not a locale".to_string(),
            ..AssistantConfig::default()
        };
        assert_eq!(AssistantSettings::new(config).default_locale().as_str(), "en");
    }

    #[test]
    fn test_location_failure_text() {
        assert!(location_failure_text(&LocationError::PermissionDenied).contains("denied"));
        assert!(location_failure_text(&LocationError::Timeout(10)).contains("too long"));
    }
}
