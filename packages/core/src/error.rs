//! Error kinds for the backend engine.
//!
//! Faults never unwind into the transport: anything recoverable becomes a
//! `messages[]` entry in the reply, and the typed kinds here exist for
//! embedders that drive the root directly.

use std::any::Any;

/// Backend fault classification.
#[derive(Debug, thiserror::Error)]
pub enum VDomError {
    /// Malformed update, unknown update type, missing parent id, or an
    /// out-of-range index. Reported and skipped, never fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A render function, event callback, or effect closure panicked.
    #[error("component fault in <{tag}>: {message}")]
    ComponentFault { tag: String, message: String },

    /// The root was asked to work after disposal.
    #[error("root is disposed")]
    Disposed,
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
