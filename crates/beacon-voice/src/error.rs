//! Error types for the speech bridges.

use crate::state::VoiceInputState;

/// Errors from speech recognition or synthesis.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("speech capability is not available on this platform")]
    Unsupported,
    #[error("invalid voice state transition: {from} -> {to}")]
    InvalidTransition {
        from: VoiceInputState,
        to: VoiceInputState,
    },
    #[error("speech platform error: {0}")]
    Platform(String),
}
