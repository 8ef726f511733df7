//! TCP transport for the receiver control channel.
//!
//! [`TcpTransport`] implements [`ControlTransport`]. The connection is opened
//! lazily by [`connect`](ControlTransport::connect); the read half is then
//! owned by a background task that forwards every readable chunk into the
//! inbound channel, while the write half stays with the transport for
//! [`send`](ControlTransport::send).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{ControlTransport, InboundReceiver};

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read buffer size for the inbound task.
///
/// Large enough for the biggest control frame (8191 bytes) in one read.
const READ_BUF_SIZE: usize = 8192;

/// Inbound chunk channel capacity.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// TCP transport for the receiver control channel.
#[derive(Debug)]
pub struct TcpTransport {
    /// The `host:port` string to connect to.
    addr: String,
    /// Maximum time to wait for the TCP handshake.
    connect_timeout: Duration,
    /// Write half of the stream, `None` while disconnected.
    writer: Option<OwnedWriteHalf>,
    /// Background task reading the other half.
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a disconnected transport for `addr` using the default timeout.
    ///
    /// The `addr` parameter should be a `host:port` string, e.g.
    /// `"192.168.1.50:50000"`.
    pub fn new(addr: &str) -> Self {
        Self::with_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a disconnected transport with a specific connect timeout.
    pub fn with_timeout(addr: &str, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.to_string(),
            connect_timeout,
            writer: None,
            reader: None,
        }
    }

    /// Get the address string this transport connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ControlTransport for TcpTransport {
    async fn connect(&mut self) -> Result<InboundReceiver> {
        if self.writer.is_some() {
            // Drop the previous connection before opening a new one.
            self.disconnect().await?;
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        // Control frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let addr = self.addr.clone();

        self.reader = Some(tokio::spawn(read_loop(read_half, tx, addr)));
        self.writer = Some(write_half);

        tracing::info!(addr = %self.addr, "TCP connection established");
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        if let Some(mut writer) = self.writer.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");

            if let Err(e) = writer.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        writer.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        writer.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped, closing connection");
            reader.abort();
        }
    }
}

/// Forward every readable chunk until the peer closes or the receiver is dropped.
async fn read_loop(mut read_half: OwnedReadHalf, tx: mpsc::Sender<Bytes>, addr: String) {
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::warn!(addr = %addr, "Peer closed connection (0 bytes read)");
                break;
            }
            Ok(n) => {
                tracing::trace!(addr = %addr, bytes = n, data = ?&buf[..n], "Received data");
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    tracing::debug!(addr = %addr, "Inbound receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to receive data");
                break;
            }
        }
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Bind a listener on a random port and return it with its address.
    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn connect_send_receive() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
            stream.flush().await.unwrap();
        });

        let mut transport = TcpTransport::new(&addr);
        assert!(!transport.is_connected());

        let mut inbound = transport.connect().await.unwrap();
        assert!(transport.is_connected());

        let data = [0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00, 0x01];
        transport.send(&data).await.unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&chunk[..], &data);

        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut transport = TcpTransport::new(&addr);
        let err = transport.connect().await.unwrap_err();
        match &err {
            Error::Transport(msg) => assert!(
                msg.contains("connection refused"),
                "expected 'connection refused' in message, got: {}",
                msg
            ),
            other => panic!("expected Transport error, got: {:?}", other),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn inbound_channel_closes_when_peer_disconnects() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::new(&addr);
        let mut inbound = transport.connect().await.unwrap();
        server.await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .unwrap();
        assert!(next.is_none(), "expected closed channel, got {:?}", next);
    }

    #[tokio::test]
    async fn send_after_disconnect_returns_not_connected() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(&addr);
        let _inbound = transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();

        let result = transport.send(&[0x04, 0x20, 0x18, 0x00]).await;
        assert!(matches!(result, Err(Error::NotConnected)));

        server.abort();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut transport = TcpTransport::new("127.0.0.1:9");
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn chunks_arrive_in_order() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for chunk in [&[0x05u8, 0x00][..], &[0x18, 0x00, 0x01][..]] {
                stream.write_all(chunk).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let mut transport = TcpTransport::new(&addr);
        let mut inbound = transport.connect().await.unwrap();

        let mut collected = Vec::new();
        while collected.len() < 5 {
            let chunk = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
                .await
                .unwrap()
                .unwrap();
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, vec![0x05, 0x00, 0x18, 0x00, 0x01]);

        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }

    #[test]
    fn addr_accessor() {
        let transport = TcpTransport::new("10.0.0.2:50000");
        assert_eq!(transport.addr(), "10.0.0.2:50000");
    }
}
