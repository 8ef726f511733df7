//! Error types for netsdr.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, framing and
//! parameter errors are all captured here.

/// The error type for all netsdr operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect, UDP bind, socket write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (truncated or malformed frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the receiver.
    ///
    /// The pending request has been withdrawn; a late response will be
    /// discarded rather than matched to a later request.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command encoder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A value falls outside the range the codec can represent.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// No connection to the receiver has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the receiver was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
