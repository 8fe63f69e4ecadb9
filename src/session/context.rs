//! Context Reconciliation
//!
//! A request can land on an instance that never held its session. When the
//! session had to be started fresh but the caller sent prior turns, those turns
//! are replayed as a scripted preamble in front of the latest message.

use tracing::warn;

use super::SessionOrigin;
use crate::constants::context::{CONTINUE_INSTRUCTION, PREAMBLE_HEADER};
use crate::relay::ChatMessage;

/// Text and attachments to forward upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub text: String,
    pub attachments: Vec<String>,
    /// Whether a history preamble was prepended
    pub reconstructed: bool,
}

pub struct ContextReconciler {
    max_history_turns: usize,
}

impl Default for ContextReconciler {
    fn default() -> Self {
        Self::new(crate::constants::context::MAX_HISTORY_TURNS)
    }
}

impl ContextReconciler {
    pub fn new(max_history_turns: usize) -> Self {
        Self { max_history_turns }
    }

    pub fn reconcile(
        &self,
        origin: SessionOrigin,
        messages: &[ChatMessage],
        attachments: &[String],
    ) -> OutboundPayload {
        let latest = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

        let continuity_break = origin == SessionOrigin::Fresh && messages.len() > 1;
        if !continuity_break || !attachments.is_empty() {
            return OutboundPayload {
                text: latest.to_string(),
                attachments: attachments.to_vec(),
                reconstructed: false,
            };
        }

        let prior = &messages[..messages.len() - 1];
        let recent = &prior[prior.len().saturating_sub(self.max_history_turns)..];
        warn!(
            turns = recent.len(),
            "Session not recovered; replaying recent history as context"
        );

        let mut text = String::from(PREAMBLE_HEADER);
        for message in recent {
            let label = if message.role == "user" { "User" } else { "Model" };
            text.push_str(&format!("[{}]: {}\n", label, message.content));
        }
        text.push_str(CONTINUE_INSTRUCTION);
        text.push_str(&format!("\n[User]: {}", latest));

        OutboundPayload {
            text,
            attachments: Vec::new(),
            reconstructed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    fn history() -> Vec<ChatMessage> {
        vec![
            msg("user", "hi"),
            msg("assistant", "hello"),
            msg("user", "what is rust"),
            msg("assistant", "a language"),
            msg("user", "tell me more"),
        ]
    }

    #[test]
    fn test_fresh_session_replays_history() {
        let payload = ContextReconciler::default().reconcile(SessionOrigin::Fresh, &history(), &[]);

        assert!(payload.reconstructed);
        assert_eq!(
            payload.text,
            "Here is the conversation history so far for context:\n\n\
             [User]: hi\n\
             [Model]: hello\n\
             [User]: what is rust\n\
             [Model]: a language\n\
             \n[System]: Please continue the conversation based on the history above.\n\
             \n[User]: tell me more"
        );
    }

    #[test]
    fn test_recovered_session_forwards_latest_only() {
        let reconciler = ContextReconciler::default();
        for origin in [SessionOrigin::Memory, SessionOrigin::Persisted] {
            let payload = reconciler.reconcile(origin, &history(), &[]);
            assert_eq!(payload.text, "tell me more");
            assert!(!payload.reconstructed);
        }
    }

    #[test]
    fn test_single_message_is_not_reconstructed() {
        let payload = ContextReconciler::default().reconcile(
            SessionOrigin::Fresh,
            &[msg("user", "first")],
            &[],
        );
        assert_eq!(payload.text, "first");
    }

    #[test]
    fn test_attachments_bypass_preamble() {
        let files = vec!["uploads/a.png".to_string()];
        let payload = ContextReconciler::default().reconcile(SessionOrigin::Fresh, &history(), &files);
        assert_eq!(payload.text, "tell me more");
        assert_eq!(payload.attachments, files);
        assert!(!payload.reconstructed);
    }

    #[test]
    fn test_history_window_is_bounded() {
        let messages: Vec<ChatMessage> = (0..30).map(|i| msg("user", &format!("m{}", i))).collect();
        let payload = ContextReconciler::new(10).reconcile(SessionOrigin::Fresh, &messages, &[]);

        assert!(!payload.text.contains("[User]: m18\n"));
        assert!(payload.text.contains("[User]: m19\n"));
        assert!(payload.text.contains("[User]: m28\n"));
        assert!(payload.text.ends_with("\n[User]: m29"));
        assert_eq!(payload.text.matches("[User]: m").count(), 11);
    }
}
