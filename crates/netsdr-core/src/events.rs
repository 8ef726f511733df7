//! Asynchronous session event types.
//!
//! Events are emitted by the session through a [`tokio::sync::broadcast`]
//! channel when its state changes. Recorders and displays subscribe to them
//! instead of polling the session state.

/// An event emitted by the session when its state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connect handshake completed.
    Connected,

    /// The session was disconnected by the caller.
    Disconnected,

    /// The control channel closed underneath a live session.
    ConnectionLost,

    /// The receiver acknowledged a start command and the data channel is live.
    StreamingStarted,

    /// The receiver acknowledged a stop command and the data channel is idle.
    StreamingStopped,

    /// The receiver acknowledged a frequency change.
    FrequencyChanged {
        /// Receiver channel that was tuned.
        channel: u8,
        /// New frequency in hertz.
        frequency_hz: u64,
    },
}
