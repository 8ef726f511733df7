//! NetSdrBuilder -- fluent builder for constructing [`NetSdrClient`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! network parameters and session options before the data channel socket is
//! bound. The returned client is disconnected; call
//! [`connect()`](NetSdrClient::connect) to run the handshake.
//!
//! # Example
//!
//! ```no_run
//! use netsdr::NetSdrBuilder;
//! use netsdr::protocol::SampleFormat;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let client = NetSdrBuilder::new()
//!     .host("192.168.1.50")
//!     .sample_rate(250_000)
//!     .sample_format(SampleFormat::Bits24)
//!     .build()
//!     .await?;
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{ControlTransport, DatagramListener};
use netsdr_transport::{TcpTransport, UdpListener};

use crate::client::{ClientOptions, NetSdrClient};
use crate::protocol::SampleFormat;

/// Default TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 50000;

/// Default UDP data port.
pub const DEFAULT_UDP_PORT: u16 = 60000;

/// Fluent builder for [`NetSdrClient`].
#[derive(Debug, Clone)]
pub struct NetSdrBuilder {
    host: Option<String>,
    tcp_port: u16,
    udp_port: u16,
    options: ClientOptions,
}

impl NetSdrBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        NetSdrBuilder {
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            options: ClientOptions::default(),
        }
    }

    /// Set the receiver's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the TCP control port (default: 50000).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the local UDP port IQ data arrives on (default: 60000).
    ///
    /// Port 0 binds an ephemeral port.
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    /// Set the control request timeout (default: 2s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Set how long stopping the data channel may take before it is
    /// aborted (default: 1s).
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.options.stop_grace = grace;
        self
    }

    /// Set the IQ output sample rate sent during the handshake
    /// (default: 100000).
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.options.sample_rate = rate;
        self
    }

    /// Set the sample width requested when streaming starts
    /// (default: 16-bit).
    pub fn sample_format(mut self, format: SampleFormat) -> Self {
        self.options.sample_format = format;
        self
    }

    /// Set the capacity of the decoded IQ packet channel (default: 1024).
    pub fn iq_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.iq_channel_capacity = capacity;
        self
    }

    /// Bind the data channel socket and build a disconnected client.
    ///
    /// Requires that [`host()`](Self::host) has been called.
    pub async fn build(self) -> Result<NetSdrClient> {
        let host = self.host.as_ref().ok_or_else(|| {
            Error::InvalidParameter("host is required: call .host() before .build()".into())
        })?;

        let control = TcpTransport::new(&format!("{}:{}", host, self.tcp_port));
        let listener = UdpListener::bind_port(self.udp_port).await?;
        tracing::debug!(
            control = %control.addr(),
            data = %listener.local_addr(),
            "Building NetSDR client"
        );

        Ok(NetSdrClient::new(
            Box::new(control),
            Arc::new(listener),
            self.options,
        ))
    }

    /// Build a client over caller-supplied transports.
    ///
    /// This is the entry point for testing: pass mocks from
    /// `netsdr-test-harness`. Host and port settings are ignored.
    pub fn build_with_transports(
        self,
        control: Box<dyn ControlTransport>,
        listener: Arc<dyn DatagramListener>,
    ) -> NetSdrClient {
        NetSdrClient::new(control, listener, self.options)
    }

    /// The session options accumulated so far.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }
}

impl Default for NetSdrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
