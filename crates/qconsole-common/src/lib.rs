//! qconsole-common — Shared types, errors and configuration used across all Query Console crates.

pub mod error;
pub mod record;
pub mod config;

// Re-export commonly used types
pub use config::{ConsoleConfig, QueryIdPolicy};
pub use error::{ConsoleError, Result};
pub use record::Record;
