//! Session Continuity
//!
//! - `manager`: the shared upstream client and the in-memory session map
//! - `context`: synthetic history preamble for sessions that were not recovered

mod context;
mod manager;

pub use context::{ContextReconciler, OutboundPayload};
pub use manager::{AcquiredSession, SessionManager, SessionOrigin};
