//! qconsole-web — Query Console served over HTTP.
//! Provides:
//!   - the console component (draft, message log, upstream stream lifecycle)
//!   - HTML rendering of records
//!   - page, JSON API and a live SSE feed for the browser

pub mod console;
pub mod log;
pub mod render;
pub mod router;
pub mod handlers;
pub mod state;
pub mod sse;

pub use console::{QueryConsole, SubmitOutcome};
pub use log::LogEntry;
