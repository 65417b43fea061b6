//! qconsole-client — HTTP plumbing towards the agent backend.
//!   - `/interact` query submission
//!   - `/stream` server-sent-event decoding and a reconnecting subscription

pub mod interact;
pub mod sse;
pub mod stream;

pub use interact::{InteractRequest, UpstreamClient};
pub use sse::{SseDecoder, SseEvent};
pub use stream::EventStream;
