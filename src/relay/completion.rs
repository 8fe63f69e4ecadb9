//! Chat Completion Wire Types
//!
//! OpenAI-shaped request and response bodies for `/v1/chat/completions`.

use serde::{Deserialize, Serialize};

use crate::constants::storage::IMAGES_ROUTE;
use crate::types::{ConversationId, RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Upload paths forwarded as attachments
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(RelayError::BadRequest("messages must not be empty".into()));
        }
        Ok(())
    }

    /// Caller-supplied id; blank counts as absent
    pub fn conversation_id(&self) -> Result<Option<ConversationId>> {
        match self.conversation_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(id) => ConversationId::parse(id).map(Some),
        }
    }

    pub fn attachments(&self) -> &[String] {
        self.files.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub conversation_id: ConversationId,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: &'static str,
}

impl ChatCompletion {
    pub fn new(model: impl Into<String>, conversation_id: ConversationId, content: String) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            conversation_id,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop",
            }],
        }
    }

    /// Assistant text of the single choice
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

/// Markdown block linking stored media, appended to the assistant text.
///
/// Each entry pairs the 1-based upstream image number with its stored path.
pub fn media_links(base_url: &str, stored: &[(usize, String)]) -> String {
    if stored.is_empty() {
        return String::new();
    }
    let base = base_url.trim_end_matches('/');
    let mut block = String::from("\n\n**Generated images:**\n");
    for (number, relative) in stored {
        block.push_str(&format!(
            "\n![Image {}]({}/{}/{})",
            number,
            base,
            IMAGES_ROUTE,
            relative
        ));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_minimal_body() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"model": "gemini-pro", "messages": [{"role": "user", "content": "hi"}]}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert!(request.conversation_id().unwrap().is_none());
        assert!(request.attachments().is_empty());
    }

    #[test]
    fn test_request_validation() {
        let mut request = ChatRequest {
            model: "default".into(),
            messages: vec![],
            conversation_id: Some("  ".into()),
            files: None,
        };
        assert!(matches!(request.validate(), Err(RelayError::BadRequest(_))));
        assert!(request.conversation_id().unwrap().is_none());

        request.conversation_id = Some("../etc/passwd".into());
        assert!(request.conversation_id().is_err());
    }

    #[test]
    fn test_completion_shape() {
        let completion = ChatCompletion::new(
            "gemini-pro",
            ConversationId::parse("conv-1").unwrap(),
            "hello".into(),
        );
        let json = serde_json::to_value(&completion).unwrap();

        assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["conversation_id"], "conv-1");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["message"]["content"], "hello");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_media_links() {
        assert_eq!(media_links("http://h", &[]), "");
        let block = media_links(
            "http://relay:8000/",
            &[
                (1, "202601/20260102/a.png".into()),
                (2, "202601/20260102/b.png".into()),
            ],
        );
        assert_eq!(
            block,
            "\n\n**Generated images:**\n\
             \n![Image 1](http://relay:8000/images/202601/20260102/a.png)\
             \n![Image 2](http://relay:8000/images/202601/20260102/b.png)"
        );
    }

    #[test]
    fn test_media_links_keep_upstream_numbers_across_gaps() {
        let block = media_links("http://h", &[(2, "202601/20260102/b.png".into())]);
        assert!(block.contains("![Image 2](http://h/images/202601/20260102/b.png)"));
        assert!(!block.contains("Image 1"));
    }
}
