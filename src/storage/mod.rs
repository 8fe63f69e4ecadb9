//! Conversation and Media Storage
//!
//! File-backed collaborators for the relay:
//! - `conversation_store`: conversation id → last-known session metadata
//! - `media`: generated images served back under `/images/...`

mod conversation_store;
mod media;

pub use conversation_store::{ConversationStore, ConversationSummary, FileConversationStore};
pub use media::MediaStore;
