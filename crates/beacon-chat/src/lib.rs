//! Conversational session engine for Beacon.
//!
//! Owns the message history of one profile, mediates between local input
//! sources (typed text, speech, location) and the remote dialogue backend,
//! persists every message, and speaks assistant replies back.

pub mod backend;
pub mod engine;
pub mod error;
pub mod request;

pub use backend::{DialogueBackend, HttpDialogueBackend};
pub use engine::{AssistantSettings, EngineParts, SessionEngine, Submission, VoiceToggle};
pub use error::{BackendError, ChatError};
pub use request::{DialogueRequest, RequestBuilder};
