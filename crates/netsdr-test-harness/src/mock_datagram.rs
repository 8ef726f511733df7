//! Mock data-channel listener.
//!
//! [`MockDatagramListener`] implements [`DatagramListener`] without a socket.
//! It counts how often listening was started and stopped, and lets a test
//! inject datagrams into the running listener through its
//! [`MockDatagramHandle`].

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsdr_core::error::Result;
use netsdr_core::transport::DatagramListener;

#[derive(Debug, Default)]
struct ListenerState {
    starts: usize,
    stops: usize,
    sink: Option<mpsc::Sender<Bytes>>,
}

/// Mock [`DatagramListener`].
#[derive(Debug)]
pub struct MockDatagramListener {
    state: Arc<Mutex<ListenerState>>,
}

/// Cloneable inspection handle for a [`MockDatagramListener`].
#[derive(Debug, Clone)]
pub struct MockDatagramHandle {
    state: Arc<Mutex<ListenerState>>,
}

fn lock(state: &Mutex<ListenerState>) -> MutexGuard<'_, ListenerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockDatagramListener {
    /// Create an idle mock listener and its handle.
    pub fn new() -> (Self, MockDatagramHandle) {
        let state = Arc::new(Mutex::new(ListenerState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockDatagramHandle { state },
        )
    }
}

impl MockDatagramHandle {
    /// Number of listening runs that actually began.
    pub fn start_count(&self) -> usize {
        lock(&self.state).starts
    }

    /// Number of listening runs that ended because they were cancelled.
    pub fn stop_count(&self) -> usize {
        lock(&self.state).stops
    }

    /// Whether a listening run is in progress.
    pub fn is_listening(&self) -> bool {
        lock(&self.state).sink.is_some()
    }

    /// Deliver a datagram to the running listener's sink.
    ///
    /// Returns `false` when no listener is running or its sink is closed.
    pub async fn inject(&self, datagram: &[u8]) -> bool {
        let sink = lock(&self.state).sink.clone();
        match sink {
            Some(sink) => sink.send(Bytes::copy_from_slice(datagram)).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DatagramListener for MockDatagramListener {
    async fn start_listening(
        &self,
        sink: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        {
            let mut state = lock(&self.state);
            state.starts += 1;
            state.sink = Some(sink);
        }

        cancel.cancelled().await;

        let mut state = lock(&self.state);
        state.stops += 1;
        state.sink = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn counts_start_and_stop() {
        let (listener, handle) = MockDatagramListener::new();
        let listener = Arc::new(listener);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let run = {
            let listener = Arc::clone(&listener);
            let cancel = cancel.clone();
            tokio::spawn(async move { listener.start_listening(tx, cancel).await })
        };

        while !handle.is_listening() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(handle.start_count(), 1);
        assert!(handle.inject(&[0x01, 0x02]).await);
        assert_eq!(&rx.recv().await.unwrap()[..], &[0x01, 0x02]);

        cancel.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(handle.stop_count(), 1);
        assert!(!handle.is_listening());
        assert!(!handle.inject(&[0x03]).await);
    }

    #[tokio::test]
    async fn pre_cancelled_run_is_not_counted() {
        let (listener, handle) = MockDatagramListener::new();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        listener.start_listening(tx, cancel).await.unwrap();
        assert_eq!(handle.start_count(), 0);
        assert_eq!(handle.stop_count(), 0);
    }
}
