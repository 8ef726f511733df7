//! UDP listener for the receiver's IQ data channel.
//!
//! [`UdpListener`] implements [`DatagramListener`]. The socket is bound once
//! up front so the local port is known before streaming starts (the receiver
//! is told where to send, or sends to a well-known port); each
//! [`start_listening`](DatagramListener::start_listening) call then runs a
//! receive loop on that socket until its cancellation token fires.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::DatagramListener;

/// Receive buffer size.
///
/// The largest data item a receiver sends is 8194 bytes; anything larger is
/// truncated by the socket, which the frame decoder then rejects.
const RECV_BUF_SIZE: usize = 8200;

/// UDP datagram listener for IQ sample streams.
#[derive(Debug, Clone)]
pub struct UdpListener {
    /// The bound socket, shared between successive listening runs.
    socket: Arc<UdpSocket>,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
}

impl UdpListener {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` to bind to any available port on all interfaces,
    /// or a fixed port such as `"0.0.0.0:60000"` for the receiver default.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Transport(format!("failed to bind UDP socket on {}: {}", addr, e))
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// Bind to a specific port on all interfaces.
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// Get the local address this socket is bound to.
    ///
    /// This is useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl DatagramListener for UdpListener {
    async fn start_listening(
        &self,
        sink: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            tracing::debug!(local = %self.local_addr, "Listener cancelled before start");
            return Ok(());
        }

        tracing::debug!(local = %self.local_addr, "UDP listener started");
        let mut buf = vec![0u8; RECV_BUF_SIZE];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(local = %self.local_addr, "UDP listener stopped");
                    break;
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, src)) => {
                            tracing::trace!(
                                local = %self.local_addr,
                                remote = %src,
                                bytes = n,
                                "Received datagram"
                            );
                            if sink.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                tracing::debug!(
                                    local = %self.local_addr,
                                    "Datagram sink closed, stopping listener"
                                );
                                break;
                            }
                        }
                        Err(e) => {
                            // Non-fatal for UDP (e.g. ICMP port unreachable on some
                            // platforms); keep listening.
                            tracing::warn!(
                                local = %self.local_addr,
                                error = %e,
                                "UDP receive error"
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
