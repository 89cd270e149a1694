//! Context event stream
//!
//! The core emits a single append-only stream of typed records; nothing
//! in the core invents a private pub/sub. Consumers tail the per-session
//! JSONL files.

mod log;
mod types;

pub use log::{ContextLog, read_session_events};
pub use types::{Actor, ContextEvent, ContextRecord};
