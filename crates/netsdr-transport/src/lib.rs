//! Transport implementations for netsdr.
//!
//! This crate provides the tokio socket implementations of the netsdr-core
//! transport traits:
//!
//! - [`TcpTransport`]: the receiver's TCP control channel
//!   ([`ControlTransport`](netsdr_core::ControlTransport))
//! - [`UdpListener`]: the receiver's UDP IQ data channel
//!   ([`DatagramListener`](netsdr_core::DatagramListener))
//!
//! # Example
//!
//! ```no_run
//! use netsdr_transport::TcpTransport;
//! use netsdr_core::ControlTransport;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut transport = TcpTransport::new("192.168.1.50:50000");
//! let mut inbound = transport.connect().await?;
//!
//! // Request the receiver state item.
//! transport.send(&[0x04, 0x20, 0x18, 0x00]).await?;
//! let chunk = inbound.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpListener;
