//! Chat Relay
//!
//! - `completion`: OpenAI-shaped request/response types
//! - `orchestrator`: admission, acquisition, send and recovery per request

mod completion;
mod orchestrator;

pub use completion::{ChatCompletion, ChatMessage, ChatRequest, Choice, media_links};
pub use orchestrator::RequestOrchestrator;
