//! Session loop
//!
//! The iteration scheduler: reflect, plan, evaluate, execute,
//! meta-reflect, persist, until the session reaches a terminal outcome.
//! One engine owns one session; many engines may run in parallel in the
//! same process over a shared memory bundle.

mod engine;

pub use engine::{SessionEngine, SessionError, SessionReport};
