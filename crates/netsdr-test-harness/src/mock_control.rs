//! Mock control-channel transport for deterministic session tests.
//!
//! [`MockControlTransport`] implements [`ControlTransport`] without a socket.
//! Every sent frame is recorded. By default the mock behaves like a receiver
//! acknowledging a set command: it echoes each sent frame back on the inbound
//! channel. Tests can instead script explicit replies, go silent to provoke
//! timeouts, inject unsolicited bytes, or fail the connect.
//!
//! The transport is moved into the session, so inspection and control go
//! through a cloneable [`MockControlHandle`].
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockControlTransport;
//!
//! let (transport, handle) = MockControlTransport::new();
//! // The first send is answered with this frame, later sends are echoed.
//! handle.reply_with(&[0x05, 0x00, 0x18, 0x00, 0x02]);
//! assert_eq!(handle.sent_count(), 0);
//! # drop(transport);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{ControlTransport, InboundReceiver};

/// Inbound channel capacity for the mock connection.
const INBOUND_CAPACITY: usize = 64;

/// How the mock answers a send that has no scripted reply queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Echo the sent bytes back, as a receiver does when acknowledging a
    /// set control item.
    Echo,
    /// Send nothing back.
    Silent,
}

/// A scripted reply to one send.
#[derive(Debug, Clone)]
enum Reply {
    /// Deliver these chunks, in order, on the inbound channel.
    Chunks(Vec<Vec<u8>>),
    /// Deliver nothing.
    Nothing,
}

#[derive(Debug)]
struct MockState {
    connected: bool,
    fail_connect: bool,
    fail_send: bool,
    mode: ReplyMode,
    replies: VecDeque<Reply>,
    sent: Vec<Vec<u8>>,
    connects: usize,
    disconnects: usize,
    inbound_tx: Option<mpsc::Sender<Bytes>>,
}

/// Mock [`ControlTransport`] for session tests.
#[derive(Debug)]
pub struct MockControlTransport {
    state: Arc<Mutex<MockState>>,
}

/// Cloneable control and inspection handle for a [`MockControlTransport`].
#[derive(Debug, Clone)]
pub struct MockControlHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockControlTransport {
    /// Create a disconnected mock in [`ReplyMode::Echo`] and its handle.
    pub fn new() -> (Self, MockControlHandle) {
        let state = Arc::new(Mutex::new(MockState {
            connected: false,
            fail_connect: false,
            fail_send: false,
            mode: ReplyMode::Echo,
            replies: VecDeque::new(),
            sent: Vec::new(),
            connects: 0,
            disconnects: 0,
            inbound_tx: None,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockControlHandle { state },
        )
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    // A panicking test thread must not cascade into every other assertion.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockControlHandle {
    /// Queue a reply for the next unanswered send.
    pub fn reply_with(&self, frame: &[u8]) {
        lock(&self.state)
            .replies
            .push_back(Reply::Chunks(vec![frame.to_vec()]));
    }

    /// Queue a reply delivered as several inbound chunks.
    pub fn reply_in_chunks(&self, chunks: &[&[u8]]) {
        lock(&self.state)
            .replies
            .push_back(Reply::Chunks(chunks.iter().map(|c| c.to_vec()).collect()));
    }

    /// Queue "no reply" for the next unanswered send.
    pub fn reply_nothing(&self) {
        lock(&self.state).replies.push_back(Reply::Nothing);
    }

    /// Set how sends without a scripted reply are answered.
    pub fn set_mode(&self, mode: ReplyMode) {
        lock(&self.state).mode = mode;
    }

    /// Make the next `connect()` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        lock(&self.state).fail_connect = fail;
    }

    /// Make subsequent `send()` calls fail with a transport error.
    pub fn fail_send(&self, fail: bool) {
        lock(&self.state).fail_send = fail;
    }

    /// Push bytes onto the inbound channel as if the receiver sent them.
    ///
    /// Returns `false` when no connection is open.
    pub async fn push_inbound(&self, bytes: &[u8]) -> bool {
        let tx = lock(&self.state).inbound_tx.clone();
        match tx {
            Some(tx) => tx.send(Bytes::copy_from_slice(bytes)).await.is_ok(),
            None => false,
        }
    }

    /// Close the inbound channel as if the receiver dropped the connection.
    pub fn drop_connection(&self) {
        let mut state = lock(&self.state);
        state.inbound_tx = None;
        state.connected = false;
    }

    /// All frames sent so far, one element per `send()` call.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent.clone()
    }

    /// Number of `send()` calls recorded.
    pub fn sent_count(&self) -> usize {
        lock(&self.state).sent.len()
    }

    /// Number of successful `connect()` calls.
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    /// Number of `disconnect()` calls.
    pub fn disconnect_count(&self) -> usize {
        lock(&self.state).disconnects
    }

    /// Whether the mock connection is open.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

#[async_trait]
impl ControlTransport for MockControlTransport {
    async fn connect(&mut self) -> Result<InboundReceiver> {
        let mut state = lock(&self.state);
        if state.fail_connect {
            return Err(Error::Transport("mock connect failure".into()));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        state.inbound_tx = Some(tx);
        state.connected = true;
        state.connects += 1;
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.inbound_tx = None;
        state.disconnects += 1;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let (tx, reply) = {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if state.fail_send {
                return Err(Error::Transport("mock send failure".into()));
            }
            state.sent.push(data.to_vec());

            let reply = state.replies.pop_front().unwrap_or(match state.mode {
                ReplyMode::Echo => Reply::Chunks(vec![data.to_vec()]),
                ReplyMode::Silent => Reply::Nothing,
            });
            (state.inbound_tx.clone(), reply)
        };

        if let (Some(tx), Reply::Chunks(chunks)) = (tx, reply) {
            for chunk in chunks {
                if tx.send(Bytes::from(chunk)).await.is_err() {
                    tracing::debug!("mock inbound receiver dropped");
                    break;
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}
