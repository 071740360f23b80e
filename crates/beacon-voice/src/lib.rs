//! Beacon Voice crate - speech input and output bridges.
//!
//! Wraps platform speech-to-text behind a start/stop protocol whose outcomes
//! arrive as messages on a channel, and text-to-speech behind a
//! fire-and-forget `speak` call. Recording follows a strict state machine:
//! Idle -> Recording -> Idle.

pub mod command;
pub mod error;
pub mod input;
pub mod output;
pub mod state;

pub use command::{CommandRecognizer, CommandSynthesizer, SilentSynthesizer, UnsupportedRecognizer};
pub use error::VoiceError;
pub use input::{
    RecognitionEvent, RecognitionOutcome, RecognitionSink, SpeechRecognizer, VoiceInputBridge,
};
pub use output::{SpeechSynthesizer, VoiceOutputBridge};
pub use state::VoiceInputState;
