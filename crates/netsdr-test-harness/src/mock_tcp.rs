//! Mock TCP receiver for transport-level testing.
//!
//! [`MockTcpServer`] listens on a random localhost port and plays a script
//! of binary request/response exchanges against one client connection. It
//! lets the real TCP transport and the full session be exercised end to end
//! without a receiver on the network.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockTcpServer;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // Acknowledge a receiver-state "run" command by echoing it.
//! let start = [0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00, 0x01];
//! server.expect(&start, &start);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and drive it ...
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};

/// Pause between the chunks of a split response, so the client sees
/// separate reads.
const CHUNK_GAP: Duration = Duration::from_millis(15);

/// One scripted exchange.
#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact bytes the client must send.
    request: Vec<u8>,
    /// Response chunks written back, each flushed separately.
    response: Vec<Vec<u8>>,
}

/// A scripted mock receiver for tests over a real TCP socket.
///
/// Once [`start`](MockTcpServer::start) is called the server accepts a single
/// connection and processes expectations in order. A request that does not
/// match ends the script with an error reported by
/// [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    /// The address the server is listening on (e.g. "127.0.0.1:54321").
    addr: String,
    /// Listener, moved into the server task on start.
    listener: Option<TcpListener>,
    /// Ordered script of exchanges.
    expectations: Vec<TcpExpectation>,
    /// Keep the connection open after the script ends, until the client closes.
    hold_open: bool,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on a random localhost port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: Vec::new(),
            hold_open: true,
            server_handle: None,
        })
    }

    /// Add an exchange: when the client sends `request`, reply with `response`.
    ///
    /// An empty `response` means the request is consumed without a reply.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        let response = if response.is_empty() {
            Vec::new()
        } else {
            vec![response.to_vec()]
        };
        self.expectations.push(TcpExpectation {
            request: request.to_vec(),
            response,
        });
    }

    /// Add an exchange whose reply is written as several separate chunks.
    pub fn expect_chunked(&mut self, request: &[u8], chunks: &[&[u8]]) {
        self.expectations.push(TcpExpectation {
            request: request.to_vec(),
            response: chunks.iter().map(|c| c.to_vec()).collect(),
        });
    }

    /// Close the connection as soon as the script ends instead of holding it open.
    pub fn close_after_script(&mut self) {
        self.hold_open = false;
    }

    /// Get the address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving the script in a background task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "mock TCP server already started");
            return;
        };
        let expectations = std::mem::take(&mut self.expectations);
        let hold_open = self.hold_open;

        self.server_handle = Some(tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, expectation) in expectations.iter().enumerate() {
                read_expected(&mut stream, i, &expectation.request).await?;

                for (n, chunk) in expectation.response.iter().enumerate() {
                    if n > 0 {
                        tokio::time::sleep(CHUNK_GAP).await;
                    }
                    stream
                        .write_all(chunk)
                        .await
                        .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                    stream
                        .flush()
                        .await
                        .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
                }
            }

            if hold_open {
                // Wait for the client to hang up.
                let mut sink = [0u8; 256];
                while let Ok(n) = stream.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            }
            Ok(())
        }));
    }

    /// Wait for the script to finish and return any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

/// Read exactly `expected.len()` bytes and compare them.
async fn read_expected(
    stream: &mut TcpStream,
    index: usize,
    expected: &[u8],
) -> std::result::Result<(), String> {
    let mut buf = vec![0u8; expected.len()];
    let mut total_read = 0;

    while total_read < expected.len() {
        let n = stream
            .read(&mut buf[total_read..])
            .await
            .map_err(|e| format!("expectation {}: read error: {}", index, e))?;
        if n == 0 {
            return Err(format!(
                "expectation {}: client disconnected after {} bytes (expected {})",
                index,
                total_read,
                expected.len()
            ));
        }
        total_read += n;
    }

    if buf != expected {
        return Err(format!(
            "expectation {}: request mismatch: expected {:02X?}, got {:02X?}",
            index, expected, buf
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_script_in_order() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x01, 0x02], &[0x03]);
        server.expect_chunked(&[0x04], &[&[0x05], &[0x06, 0x07]]);
        server.close_after_script();
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(&[0x01, 0x02]).await.unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x03]);

        client.write_all(&[0x04]).await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x06, 0x07]);

        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_mismatch() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x01], &[0x02]);
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(&[0xFF]).await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "got: {}", err);
    }
}
