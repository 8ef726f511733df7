//! netsdr-core: Core traits, error definitions and events for netsdr.
//!
//! This crate defines the protocol-agnostic abstractions the netsdr session
//! is built on. Applications that only want to plug in their own transports
//! (or mocks) depend on these types without pulling in the tokio socket
//! implementations.
//!
//! # Key types
//!
//! - [`ControlTransport`] -- reliable byte-stream control channel
//! - [`DatagramListener`] -- unreliable datagram data channel
//! - [`SessionEvent`] -- asynchronous session state notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;

pub use error::{Error, Result};
pub use events::SessionEvent;
pub use transport::{ControlTransport, DatagramListener, InboundReceiver};
