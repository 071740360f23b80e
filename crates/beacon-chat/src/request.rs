//! Outbound request construction.

use serde::Serialize;

use beacon_core::types::{Message, Role, WireMessage};

/// Ordered, role-tagged messages for one dialogue backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueRequest {
    pub messages: Vec<WireMessage>,
}

impl DialogueRequest {
    /// The newest message, i.e. what the user just said.
    pub fn latest(&self) -> Option<&WireMessage> {
        self.messages.last()
    }
}

/// Prefixes the conversation with the configured system instruction.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    system_prompt: String,
}

impl RequestBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// System instruction, then `history` in order with timestamps stripped.
    /// `history` already ends with the message being submitted.
    pub fn build(&self, history: &[Message]) -> DialogueRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage::system(self.system_prompt.clone()));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != Role::System)
                .map(Message::to_wire),
        );
        DialogueRequest { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_build_orders_system_history_then_latest() {
        let now = Utc::now();
        let history = vec![
            Message::assistant("Hello, how can I help?", now),
            Message::user("help, fire nearby", now),
        ];
        let request = RequestBuilder::new("Be calm.").build(&history);

        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0], WireMessage::system("Be calm."));
        assert_eq!(request.messages[1].role, Role::Assistant);
        assert_eq!(request.messages[2].content, "help, fire nearby");
        assert_eq!(request.latest().unwrap().role, Role::User);
    }

    #[test]
    fn test_build_drops_stray_system_messages() {
        let now = Utc::now();
        let history = vec![
            Message::new(Role::System, "old instruction", now),
            Message::user("hi", now),
        ];
        let request = RequestBuilder::new("New instruction").build(&history);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "New instruction");
    }

    #[test]
    fn test_build_empty_history() {
        let request = RequestBuilder::new("Only system").build(&[]);
        assert_eq!(request.messages, vec![WireMessage::system("Only system")]);
    }
}
