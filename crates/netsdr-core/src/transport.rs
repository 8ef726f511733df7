//! Transport traits for the receiver's two channels.
//!
//! A NetSDR-style receiver is reached over two independent links:
//!
//! - a reliable byte stream (TCP) carrying control frames, abstracted by
//!   [`ControlTransport`];
//! - an unreliable datagram socket (UDP) carrying sample data, abstracted by
//!   [`DatagramListener`].
//!
//! Inbound traffic is delivered over tokio channels rather than callbacks so
//! the session can process it on a task of its own. Concrete socket
//! implementations live in `netsdr-transport`; deterministic mocks live in
//! `netsdr-test-harness`.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Receiving end of a control connection's inbound byte stream.
///
/// Each item is one readable chunk as delivered by the socket. Chunk
/// boundaries carry no meaning: a chunk may hold part of a frame, exactly
/// one frame, or several. The channel closes when the connection does.
pub type InboundReceiver = mpsc::Receiver<Bytes>;

/// Reliable byte-stream transport for the control channel.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Open the connection.
    ///
    /// Returns the receiver on which inbound chunks will arrive for the
    /// lifetime of this connection.
    async fn connect(&mut self) -> Result<InboundReceiver>;

    /// Close the connection. Closing an already-closed transport is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Send raw bytes, completing once they have been flushed.
    ///
    /// Returns [`Error::NotConnected`](crate::error::Error::NotConnected)
    /// when no connection is open.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}

/// Unreliable datagram transport for the data channel.
#[async_trait]
pub trait DatagramListener: Send + Sync {
    /// Receive datagrams and forward each payload into `sink` until `cancel`
    /// fires or the sink is closed.
    ///
    /// This is a long-running call. It must return promptly once `cancel`
    /// is cancelled, including when it was cancelled before the call began.
    async fn start_listening(
        &self,
        sink: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
