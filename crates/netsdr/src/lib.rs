//! netsdr: async client for NetSDR-protocol software-defined receivers.
//!
//! A receiver is driven over two links: a TCP control channel carrying
//! binary control item messages, and a UDP data channel carrying IQ samples.
//! This crate provides:
//!
//! - **Protocol model** ([`protocol`]) -- message types, control item codes
//!   and the decoded [`Frame`].
//! - **Codec** ([`codec`]) -- encode control messages, decode frames, and
//!   reassemble frames split across TCP reads.
//! - **Samples** ([`samples`]) -- lazy decoding of fixed-width IQ samples.
//! - **Commands** ([`commands`]) -- the control frames the session sends.
//! - **Session** ([`client`]) -- connect handshake, single-flight
//!   request/response correlation, and IQ streaming lifecycle.
//! - **IQ stream** ([`stream`]) -- datagram decoding, sequence gap
//!   detection and delivery to the caller.
//! - **Builder** ([`builder`]) -- fluent construction over the TCP/UDP
//!   transports from `netsdr-transport`.
//!
//! # Example
//!
//! ```no_run
//! use netsdr::NetSdrBuilder;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let client = NetSdrBuilder::new().host("192.168.1.50").build().await?;
//! let mut packets = client.iq_stream().expect("first call");
//!
//! client.connect().await?;
//! client.change_frequency(7_100_000, 0).await?;
//! client.start_iq().await?;
//! if let Some(packet) = packets.recv().await {
//!     println!("seq {} carried {} samples", packet.sequence, packet.samples.len());
//! }
//! client.stop_iq().await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod commands;
pub mod protocol;
pub mod samples;
pub mod stream;

pub use builder::NetSdrBuilder;
pub use client::{ClientOptions, ConnectionState, NetSdrClient};
pub use codec::{FrameBuffer, decode_frame, encode_control_item_message};
pub use netsdr_core::{Error, Result, SessionEvent};
pub use protocol::{ControlItemCode, Frame, ItemField, MessageType, SampleFormat};
pub use samples::decode_samples;
pub use stream::{IqPacket, StreamStats};
