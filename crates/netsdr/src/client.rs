//! NetSDR session client.
//!
//! [`NetSdrClient`] owns one session with a receiver: the control channel
//! (a [`ControlTransport`], TCP in production) and the data channel (a
//! [`DatagramListener`], UDP in production). It runs the connect handshake,
//! correlates each control request with the next inbound control message,
//! and ties the data channel's lifetime to the receiver's run state.
//!
//! Requests are single-flight. A request installs the pending-response slot,
//! sends its frame and waits for the slot to be fulfilled; a second request
//! waits on the exchange lock until the first has finished. Responses carry
//! no correlation identifier, so arrival order is the only thing matching a
//! response to its request.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use netsdr_core::{
    ControlTransport, DatagramListener, Error, InboundReceiver, Result, SessionEvent,
};

use crate::codec::FrameBuffer;
use crate::commands;
use crate::protocol::{ControlItemCode, Frame, SampleFormat};
use crate::stream::{self, IqPacket, StreamCounters, StreamStats};

/// Default command timeout (2 seconds).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time the IQ task gets to wind down before it is aborted.
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

/// Default IQ output sample rate set during the handshake.
pub const DEFAULT_SAMPLE_RATE: u32 = 100_000;

/// Default capacity of the channel handed out by [`NetSdrClient::iq_stream`].
const DEFAULT_IQ_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast channel capacity for SessionEvent subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Options for configuring a session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for each control request.
    pub command_timeout: Duration,
    /// How long stopping the IQ stream waits for the listener to return.
    pub stop_grace: Duration,
    /// IQ output sample rate requested during the handshake.
    pub sample_rate: u32,
    /// Sample width requested when streaming starts.
    pub sample_format: SampleFormat,
    /// Capacity of the decoded IQ packet channel.
    pub iq_channel_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_format: SampleFormat::default(),
            iq_channel_capacity: DEFAULT_IQ_CHANNEL_CAPACITY,
        }
    }
}

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No control connection, or the handshake has not completed.
    #[default]
    Disconnected,
    /// Handshake complete, receiver idle.
    Connected,
    /// Receiver running and the data channel open.
    Streaming,
}

impl ConnectionState {
    /// Whether control requests may be issued in this state.
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// The one in-flight request waiting for a response.
struct PendingSlot {
    id: u64,
    tx: oneshot::Sender<Frame>,
}

/// A running IQ stream task.
struct IqRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State shared between caller flows and the control read task.
#[derive(Default)]
struct SessionState {
    connection: ConnectionState,
    pending: Option<PendingSlot>,
    next_slot_id: u64,
    /// Bumped whenever a control connection is opened or torn down, so a
    /// stale read task cannot act on a newer connection.
    epoch: u64,
    read_task: Option<JoinHandle<()>>,
    iq_run: Option<IqRun>,
}

struct Shared {
    state: StdMutex<SessionState>,
    counters: Arc<StreamCounters>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn lock(&self) -> StdMutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Hand an inbound control message to the waiting request, if any.
    fn deliver(&self, frame: Frame) {
        let slot = self.lock().pending.take();
        match slot {
            Some(slot) => {
                tracing::trace!(
                    slot = slot.id,
                    message_type = ?frame.message_type,
                    item = frame.item.raw(),
                    "Response received"
                );
                if slot.tx.send(frame).is_err() {
                    tracing::debug!(slot = slot.id, "Requester gone, response discarded");
                }
            }
            None => {
                tracing::debug!(
                    message_type = ?frame.message_type,
                    item = frame.item.raw(),
                    bytes = frame.body.len(),
                    "Dropping unsolicited control message"
                );
            }
        }
    }

    /// The control connection of `epoch` closed underneath the session.
    fn connection_closed(&self, epoch: u64) {
        let (was_live, iq_run) = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return;
            }
            state.epoch += 1;
            state.pending = None;
            state.read_task = None;
            let was_live = state.connection.is_connected();
            state.connection = ConnectionState::Disconnected;
            (was_live, state.iq_run.take())
        };

        if let Some(run) = iq_run {
            run.cancel.cancel();
        }
        if was_live {
            tracing::info!("Control connection lost");
            self.emit(SessionEvent::ConnectionLost);
        }
    }
}

/// Clears the pending slot when a request stops waiting, unless the slot has
/// already been fulfilled or replaced.
struct SlotGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.pending.as_ref().is_some_and(|slot| slot.id == self.id) {
            state.pending = None;
        }
    }
}

/// Client for one NetSDR receiver session.
///
/// Every method takes `&self`; share the client between tasks with an `Arc`.
pub struct NetSdrClient {
    control: Mutex<Box<dyn ControlTransport>>,
    listener: Arc<dyn DatagramListener>,
    /// Held across slot installation, send and wait.
    exchange_lock: Mutex<()>,
    shared: Arc<Shared>,
    options: ClientOptions,
    iq_tx: mpsc::Sender<IqPacket>,
    iq_rx: StdMutex<Option<mpsc::Receiver<IqPacket>>>,
}

impl NetSdrClient {
    /// Create a disconnected client over the given transports.
    pub fn new(
        control: Box<dyn ControlTransport>,
        listener: Arc<dyn DatagramListener>,
        options: ClientOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (iq_tx, iq_rx) = mpsc::channel(options.iq_channel_capacity.max(1));

        Self {
            control: Mutex::new(control),
            listener,
            exchange_lock: Mutex::new(()),
            shared: Arc::new(Shared {
                state: StdMutex::new(SessionState::default()),
                counters: Arc::new(StreamCounters::default()),
                event_tx,
            }),
            options,
            iq_tx,
            iq_rx: StdMutex::new(Some(iq_rx)),
        }
    }

    /// Open the control connection and run the configuration handshake.
    ///
    /// Sends the sample rate, RF filter and A/D mode commands one at a time,
    /// each waiting for its acknowledgement. Connecting a session that is
    /// already connected does nothing.
    ///
    /// # Errors
    ///
    /// Transport errors from opening the connection, and any error from a
    /// handshake step. The session is left disconnected in either case.
    pub async fn connect(&self) -> Result<()> {
        let single_flight = self.exchange_lock.lock().await;
        if self.state().is_connected() {
            tracing::debug!("connect() on a connected session ignored");
            return Ok(());
        }

        let inbound = self.control.lock().await.connect().await?;
        let epoch = self.spawn_read_task(inbound);

        if let Err(e) = self.handshake(&single_flight).await {
            tracing::warn!(error = %e, "Handshake failed, closing control connection");
            self.abandon_connection(epoch).await;
            return Err(e);
        }

        let live = {
            let mut state = self.shared.lock();
            let live = state.epoch == epoch;
            if live {
                state.connection = ConnectionState::Connected;
            }
            live
        };
        if !live {
            // The connection closed right after the last acknowledgement.
            self.abandon_connection(epoch).await;
            return Err(Error::ConnectionLost);
        }
        tracing::info!(sample_rate = self.options.sample_rate, "Session connected");
        self.shared.emit(SessionEvent::Connected);
        Ok(())
    }

    /// Send a raw control frame and wait for the next control message.
    ///
    /// Returns `Ok(None)` without any I/O when the session is not connected.
    pub async fn send_request(&self, payload: &[u8]) -> Result<Option<Frame>> {
        self.send_request_with_timeout(payload, self.options.command_timeout)
            .await
    }

    /// [`send_request`](Self::send_request) with an explicit timeout.
    ///
    /// When the timeout fires, or the returned future is dropped, the pending
    /// slot is cleared so a late response is discarded instead of answering
    /// a later request.
    pub async fn send_request_with_timeout(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Option<Frame>> {
        if !self.is_connected() {
            tracing::debug!(bytes = payload.len(), "Request skipped: not connected");
            return Ok(None);
        }
        let single_flight = self.exchange_lock.lock().await;
        if !self.is_connected() {
            tracing::debug!(bytes = payload.len(), "Request skipped: not connected");
            return Ok(None);
        }
        self.exchange(&single_flight, payload, timeout)
            .await
            .map(Some)
    }

    /// Ask the receiver for the current value of a control item.
    pub async fn request_control_item(
        &self,
        item: ControlItemCode,
        params: &[u8],
    ) -> Result<Option<Frame>> {
        let command = commands::cmd_request_item(item, params)?;
        self.send_request(&command).await
    }

    /// Start the receiver and open the data channel.
    ///
    /// Does nothing when disconnected or already streaming. On a failed or
    /// missing acknowledgement the session stays connected and idle.
    pub async fn start_iq(&self) -> Result<()> {
        let single_flight = self.exchange_lock.lock().await;
        match self.state() {
            ConnectionState::Disconnected => {
                tracing::debug!("start_iq() ignored: not connected");
                return Ok(());
            }
            ConnectionState::Streaming => {
                tracing::debug!("start_iq() ignored: already streaming");
                return Ok(());
            }
            ConnectionState::Connected => {}
        }

        let format = self.options.sample_format;
        let command = commands::cmd_start_iq(format)?;
        self.exchange(&single_flight, &command, self.options.command_timeout)
            .await?;

        {
            let mut state = self.shared.lock();
            if !state.connection.is_connected() {
                return Err(Error::ConnectionLost);
            }
            self.shared.counters.reset();
            let cancel = CancellationToken::new();
            let task = tokio::spawn(stream::run_iq_stream(
                Arc::clone(&self.listener),
                format,
                self.iq_tx.clone(),
                Arc::clone(&self.shared.counters),
                cancel.clone(),
            ));
            state.iq_run = Some(IqRun { cancel, task });
            state.connection = ConnectionState::Streaming;
        }

        tracing::info!(bits = format.bit_depth(), "IQ streaming started");
        self.shared.emit(SessionEvent::StreamingStarted);
        Ok(())
    }

    /// Stop the receiver and close the data channel.
    ///
    /// While connected, the stop command is sent and acknowledged first. If a
    /// stream is active, a failed acknowledgement returns the error and leaves
    /// streaming running. Without an active stream the failure is only logged,
    /// so stopping an idle session always succeeds.
    pub async fn stop_iq(&self) -> Result<()> {
        let single_flight = self.exchange_lock.lock().await;
        if self.state().is_connected() {
            let stream_active = {
                let state = self.shared.lock();
                state.connection == ConnectionState::Streaming || state.iq_run.is_some()
            };
            let command = commands::cmd_stop_iq()?;
            if let Err(e) = self
                .exchange(&single_flight, &command, self.options.command_timeout)
                .await
            {
                if stream_active {
                    return Err(e);
                }
                tracing::debug!(error = %e, "No acknowledgement for stop on an idle receiver");
            }
        }

        let (run, was_streaming) = {
            let mut state = self.shared.lock();
            let was_streaming = state.connection == ConnectionState::Streaming;
            if was_streaming {
                state.connection = ConnectionState::Connected;
            }
            (state.iq_run.take(), was_streaming)
        };

        if let Some(run) = run {
            self.stop_iq_run(run).await;
        }
        if was_streaming {
            tracing::info!("IQ streaming stopped");
            self.shared.emit(SessionEvent::StreamingStopped);
        }
        Ok(())
    }

    /// Tune `channel` to `frequency_hz`.
    ///
    /// Does nothing when disconnected.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] when the frequency does not fit the 40-bit
    /// wire field; this is checked before any I/O.
    pub async fn change_frequency(&self, frequency_hz: u64, channel: u8) -> Result<()> {
        let command = commands::cmd_set_frequency(channel, frequency_hz)?;
        if self.send_request(&command).await?.is_none() {
            return Ok(());
        }

        tracing::debug!(channel, frequency_hz, "Frequency changed");
        self.shared.emit(SessionEvent::FrequencyChanged {
            channel,
            frequency_hz,
        });
        Ok(())
    }

    /// Close the session.
    ///
    /// Stops the data channel, fails any waiting request with
    /// [`Error::ConnectionLost`] and closes the control connection. Always
    /// succeeds, including on a session that was never connected.
    pub async fn disconnect(&self) -> Result<()> {
        let (was_live, iq_run, read_task) = {
            let mut state = self.shared.lock();
            let was_live = state.connection.is_connected();
            state.connection = ConnectionState::Disconnected;
            state.pending = None;
            state.epoch += 1;
            (was_live, state.iq_run.take(), state.read_task.take())
        };

        if let Some(run) = iq_run {
            self.stop_iq_run(run).await;
        }
        if let Some(task) = read_task {
            task.abort();
        }

        {
            let mut control = self.control.lock().await;
            if control.is_connected() {
                if let Err(e) = control.disconnect().await {
                    tracing::warn!(error = %e, "Error closing control connection (continuing anyway)");
                }
            }
        }

        if was_live {
            tracing::info!("Session disconnected");
            self.shared.emit(SessionEvent::Disconnected);
        }
        Ok(())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    /// Whether the handshake has completed and the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether IQ streaming is enabled.
    pub fn is_streaming(&self) -> bool {
        self.state() == ConnectionState::Streaming
    }

    /// Counters for the current (or most recent) streaming run.
    pub fn stream_stats(&self) -> StreamStats {
        self.shared.counters.snapshot()
    }

    /// Subscribe to session events.
    ///
    /// Multiple subscribers can be created; each gets an independent copy
    /// of every event.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Take the receiver of decoded IQ packets.
    ///
    /// There is one receiver per client; later calls return `None`. Packets
    /// arriving while the receiver is full are dropped.
    pub fn iq_stream(&self) -> Option<mpsc::Receiver<IqPacket>> {
        self.iq_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Spawn the read task for a fresh connection and return its epoch.
    fn spawn_read_task(&self, inbound: InboundReceiver) -> u64 {
        let mut state = self.shared.lock();
        state.epoch += 1;
        let epoch = state.epoch;
        state.read_task = Some(tokio::spawn(control_read_loop(
            inbound,
            Arc::clone(&self.shared),
            epoch,
        )));
        epoch
    }

    async fn handshake(&self, single_flight: &MutexGuard<'_, ()>) -> Result<()> {
        let steps = commands::handshake_commands(self.options.sample_rate)?;
        for (step, command) in steps.iter().enumerate() {
            let response = self
                .exchange(single_flight, command, self.options.command_timeout)
                .await?;
            tracing::debug!(
                step = step + 1,
                message_type = ?response.message_type,
                item = response.item.raw(),
                "Handshake step acknowledged"
            );
        }
        Ok(())
    }

    /// Undo a connect whose handshake did not complete.
    async fn abandon_connection(&self, epoch: u64) {
        let read_task = {
            let mut state = self.shared.lock();
            if state.epoch == epoch {
                state.epoch += 1;
            }
            state.pending = None;
            state.read_task.take()
        };
        if let Some(task) = read_task {
            task.abort();
        }
        if let Err(e) = self.control.lock().await.disconnect().await {
            tracing::warn!(error = %e, "Error closing control connection (continuing anyway)");
        }
    }

    /// Install the pending slot, send `frame` and wait for the response.
    ///
    /// The caller proves it holds the exchange lock by passing its guard.
    async fn exchange(
        &self,
        _single_flight: &MutexGuard<'_, ()>,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Frame> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = self.shared.lock();
            let id = state.next_slot_id;
            state.next_slot_id = state.next_slot_id.wrapping_add(1);
            state.pending = Some(PendingSlot { id, tx });
            id
        };
        let _slot = SlotGuard {
            shared: self.shared.as_ref(),
            id,
        };

        tracing::trace!(slot = id, bytes = frame.len(), "Sending request");
        self.control.lock().await.send(frame).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Slot dropped: the connection closed or the session disconnected.
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                tracing::debug!(
                    slot = id,
                    timeout_ms = timeout.as_millis(),
                    "Request timed out"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn stop_iq_run(&self, run: IqRun) {
        let IqRun { cancel, mut task } = run;
        cancel.cancel();
        match tokio::time::timeout(self.options.stop_grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "IQ stream task failed"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.options.stop_grace.as_millis(),
                    "IQ stream task did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}

impl Drop for NetSdrClient {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if let Some(run) = state.iq_run.take() {
            run.cancel.cancel();
            run.task.abort();
        }
        if let Some(task) = state.read_task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Control read loop
// ---------------------------------------------------------------------------

/// Background task that reassembles inbound control frames and resolves the
/// pending slot.
async fn control_read_loop(mut inbound: InboundReceiver, shared: Arc<Shared>, epoch: u64) {
    let mut frames = FrameBuffer::new();

    while let Some(chunk) = inbound.recv().await {
        tracing::trace!(bytes = chunk.len(), "Control chunk received");
        frames.push(&chunk);
        while let Some(decoded) = frames.next_frame() {
            match decoded {
                Ok(frame) => shared.deliver(frame),
                Err(e) => tracing::warn!(error = %e, "Discarding malformed control frame"),
            }
        }
    }

    tracing::debug!(epoch, "Control inbound channel closed");
    shared.connection_closed(epoch);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
