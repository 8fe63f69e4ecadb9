//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/chatrelay/config.toml)
//! 3. Project config (.chatrelay/config.toml)
//! 4. Environment variables (CHATRELAY_*, plus legacy deployment names)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
