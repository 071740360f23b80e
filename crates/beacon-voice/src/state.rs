//! Voice input state machine with thread-safe transitions.
//!
//! - Idle -> Recording (recognition started)
//! - Recording -> Idle (stopped, failed, or ended naturally)

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::VoiceError;

/// Recording state of the voice input bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceInputState {
    /// No recognition in progress.
    Idle,
    /// A recognition attempt is listening.
    Recording,
}

impl fmt::Display for VoiceInputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceInputState::Idle => write!(f, "Idle"),
            VoiceInputState::Recording => write!(f, "Recording"),
        }
    }
}

impl VoiceInputState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &VoiceInputState) -> bool {
        matches!(
            (self, target),
            (VoiceInputState::Idle, VoiceInputState::Recording)
                | (VoiceInputState::Recording, VoiceInputState::Idle)
        )
    }
}

/// Shared, validated holder of a `VoiceInputState`.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<VoiceInputState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(VoiceInputState::Idle)),
        }
    }

    pub fn current(&self) -> VoiceInputState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: VoiceInputState) -> Result<(), VoiceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_transition_to(&target) {
            tracing::debug!("Voice input state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(VoiceError::InvalidTransition {
                from: *state,
                to: target,
            })
        }
    }

    /// Force the state machine back to Idle.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != VoiceInputState::Idle {
            tracing::debug!("Voice input state reset to Idle from {}", *state);
        }
        *state = VoiceInputState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(VoiceInputState::Idle.to_string(), "Idle");
        assert_eq!(VoiceInputState::Recording.to_string(), "Recording");
    }

    #[test]
    fn test_valid_and_invalid_transitions() {
        assert!(VoiceInputState::Idle.can_transition_to(&VoiceInputState::Recording));
        assert!(VoiceInputState::Recording.can_transition_to(&VoiceInputState::Idle));
        assert!(!VoiceInputState::Idle.can_transition_to(&VoiceInputState::Idle));
        assert!(!VoiceInputState::Recording.can_transition_to(&VoiceInputState::Recording));
    }

    #[test]
    fn test_state_machine_round_trip() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), VoiceInputState::Idle);
        sm.transition(VoiceInputState::Recording).unwrap();
        assert_eq!(sm.current(), VoiceInputState::Recording);
        sm.transition(VoiceInputState::Idle).unwrap();
        assert_eq!(sm.current(), VoiceInputState::Idle);
    }

    #[test]
    fn test_double_start_rejected() {
        let sm = StateMachine::new();
        sm.transition(VoiceInputState::Recording).unwrap();
        match sm.transition(VoiceInputState::Recording) {
            Err(VoiceError::InvalidTransition { from, to }) => {
                assert_eq!(from, VoiceInputState::Recording);
                assert_eq!(to, VoiceInputState::Recording);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_and_shared_clone() {
        let sm1 = StateMachine::new();
        let sm2 = sm1.clone();
        sm1.transition(VoiceInputState::Recording).unwrap();
        assert_eq!(sm2.current(), VoiceInputState::Recording);
        sm2.reset();
        assert_eq!(sm1.current(), VoiceInputState::Idle);
    }
}
