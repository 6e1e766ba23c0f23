//! Engine state-change notifications.

mod emitter;
mod envelope;

pub use emitter::{BroadcastEmitter, EventEmitter, FanoutEmitter, JsonlEmitter, NoopEmitter};
pub use envelope::{EventEnvelope, EventType};
