//! Voice input bridge.
//!
//! A recognizer is started for one utterance at a time. Whatever it hears is
//! reported through a [`RecognitionSink`] as a [`RecognitionEvent`] on an
//! unbounded channel; the host drains that channel and hands each event back
//! to the bridge (via the session engine), which decides whether the event
//! still belongs to the current attempt.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use beacon_core::types::Locale;

use crate::error::VoiceError;
use crate::state::{StateMachine, VoiceInputState};

/// What a recognition attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Best-guess transcript of the utterance.
    Transcript(String),
    /// The platform aborted recognition; carries its reason code.
    Error(String),
    /// Recognition finished (after a transcript, or in silence).
    End,
}

/// An outcome tagged with the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub attempt: Uuid,
    pub outcome: RecognitionOutcome,
}

/// Handle a recognizer uses to report outcomes for one attempt.
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    attempt: Uuid,
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionSink {
    pub fn attempt(&self) -> Uuid {
        self.attempt
    }

    pub fn transcript(&self, text: impl Into<String>) {
        self.send(RecognitionOutcome::Transcript(text.into()));
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.send(RecognitionOutcome::Error(reason.into()));
    }

    pub fn end(&self) {
        self.send(RecognitionOutcome::End);
    }

    fn send(&self, outcome: RecognitionOutcome) {
        // A closed receiver means the host is gone; nothing left to notify.
        let _ = self.tx.send(RecognitionEvent {
            attempt: self.attempt,
            outcome,
        });
    }
}

/// Platform speech-to-text capability.
pub trait SpeechRecognizer: Send + Sync {
    /// Whether the platform can recognize speech at all. This is distinct
    /// from a runtime failure of a started attempt.
    fn is_supported(&self) -> bool;

    /// Begin a single-utterance, non-continuous recognition in `language`.
    /// Exactly one of transcript-then-end, error, or end must be reported
    /// through `sink` unless the attempt is stopped.
    fn start(&self, language: &Locale, sink: RecognitionSink) -> Result<(), VoiceError>;

    /// Ask the current attempt to finish early. Outcomes already on their
    /// way may still be reported.
    fn stop(&self);
}

/// Recording state plus the attempt it belongs to.
pub struct VoiceInputBridge {
    recognizer: Arc<dyn SpeechRecognizer>,
    state: StateMachine,
    attempt: Mutex<Option<Uuid>>,
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl std::fmt::Debug for VoiceInputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInputBridge")
            .field("state", &self.state.current())
            .field("attempt", &self.current_attempt())
            .field("supported", &self.recognizer.is_supported())
            .finish()
    }
}

impl VoiceInputBridge {
    /// Create the bridge and the receiver on which recognition events arrive.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> (Self, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Self {
            recognizer,
            state: StateMachine::new(),
            attempt: Mutex::new(None),
            tx,
        };
        (bridge, rx)
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    pub fn is_recording(&self) -> bool {
        self.state.current() == VoiceInputState::Recording
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        *self.attempt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a recognition attempt tagged with `language`.
    pub fn start(&self, language: &Locale) -> Result<Uuid, VoiceError> {
        if !self.recognizer.is_supported() {
            return Err(VoiceError::Unsupported);
        }
        self.state.transition(VoiceInputState::Recording)?;

        let attempt = Uuid::new_v4();
        *self.attempt.lock().unwrap_or_else(|e| e.into_inner()) = Some(attempt);

        let sink = RecognitionSink {
            attempt,
            tx: self.tx.clone(),
        };
        if let Err(e) = self.recognizer.start(language, sink) {
            tracing::warn!(error = %e, "Speech recognition failed to start");
            self.finish();
            return Err(e);
        }

        tracing::info!(attempt = %attempt, language = %language, "Speech recognition started");
        Ok(attempt)
    }

    /// Stop the current attempt. Anything it reports afterwards is ignored.
    pub fn stop(&self) -> Result<(), VoiceError> {
        self.state.transition(VoiceInputState::Idle)?;
        let attempt = self
            .attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.recognizer.stop();
        if let Some(attempt) = attempt {
            tracing::info!(attempt = %attempt, "Speech recognition stopped");
        }
        Ok(())
    }

    /// Apply an event from the channel.
    ///
    /// Returns the outcome if the event belongs to the current attempt, or
    /// `None` for stale events. Errors and natural ends return the bridge to
    /// Idle.
    pub fn accept(&self, event: &RecognitionEvent) -> Option<RecognitionOutcome> {
        if self.current_attempt() != Some(event.attempt) {
            tracing::debug!(attempt = %event.attempt, "Ignoring stale recognition event");
            return None;
        }
        match &event.outcome {
            RecognitionOutcome::Transcript(_) => {}
            RecognitionOutcome::Error(reason) => {
                tracing::warn!(attempt = %event.attempt, reason = %reason, "Speech recognition error");
                self.finish();
            }
            RecognitionOutcome::End => {
                tracing::debug!(attempt = %event.attempt, "Speech recognition ended");
                self.finish();
            }
        }
        Some(event.outcome.clone())
    }

    fn finish(&self) {
        self.attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.state.reset();
    }
}

// =============================================================================
// Tests
// =============================================================================
