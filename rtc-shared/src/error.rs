#![allow(dead_code)]

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the per-session media engine.
///
/// Each variant maps to one of the error classes the engine distinguishes:
/// transient I/O that is retried, malformed input that is dropped and
/// counted, signaling-facing rejections, and fatal conditions that move a
/// handle to `ALERT`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// TRANSIENT_IO: a socket or queue operation should be retried.
    #[error("transient i/o: {0}")]
    TransientIo(#[source] io::Error),

    /// MALFORMED_PACKET: the packet is dropped and a counter is bumped.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// AUTH_FAILED: signaling request rejected with a code.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// PROTOCOL_VIOLATION: the handle is moved to ALERT and hung up.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// RESOURCE_EXHAUSTED: a create/attach request is rejected.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// PLUGIN_ERROR: returned verbatim from a plugin's handle_message.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// FATAL_INTERNAL: an invariant was violated; the handle is alerted.
    #[error("fatal internal error: {0}")]
    FatalInternal(String),

    #[error("handle {0} not found")]
    HandleNotFound(u64),

    #[error("session {0} not found")]
    SessionNotFound(u64),

    #[error("handle already attached to a plugin")]
    AlreadyAttached,

    #[error("handle is cleaning up")]
    Cleaning,

    #[error("lock poisoned: {0}")]
    PoisonError(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}
