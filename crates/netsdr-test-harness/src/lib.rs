//! netsdr-test-harness: Test utilities and mock transports for netsdr.
//!
//! This crate provides [`MockControlTransport`] and [`MockDatagramListener`]
//! for deterministic unit testing of the session without a receiver on the
//! network, and [`MockTcpServer`] for testing the real TCP transport against
//! a scripted device.

pub mod mock_control;
pub mod mock_datagram;
pub mod mock_tcp;

pub use mock_control::{MockControlHandle, MockControlTransport, ReplyMode};
pub use mock_datagram::{MockDatagramHandle, MockDatagramListener};
pub use mock_tcp::MockTcpServer;
