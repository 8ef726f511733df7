//! IQ data path.
//!
//! While a session is streaming, one background task owns the data channel.
//! The [`DatagramListener`] forwards raw datagrams into an internal channel;
//! this module decodes each one as a data item frame, unpacks its samples at
//! the configured bit depth, and hands an [`IqPacket`] to the caller's sink.
//!
//! Sequence numbers count 1..=65535 and wrap back to 1. A datagram carrying
//! sequence 0 marks a restart of the device's counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use netsdr_core::transport::DatagramListener;
use netsdr_core::{Error, Result};

use crate::codec::decode_frame;
use crate::protocol::SampleFormat;
use crate::samples::decode_samples;

/// Capacity of the channel between the datagram listener and the decoder.
const DATAGRAM_CHANNEL_CAPACITY: usize = 256;

/// Sequence numbers this far behind the expected one are treated as late
/// arrivals rather than a wrap-around gap.
const REORDER_WINDOW: u32 = 1024;

/// Number of distinct non-zero sequence numbers.
const SEQUENCE_SPAN: u32 = u16::MAX as u32;

/// One decoded data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqPacket {
    /// Sequence number from the data item header.
    pub sequence: u16,
    /// Decoded samples, interleaved I/Q as sent by the device.
    pub samples: Vec<i32>,
}

/// Counters for the current streaming run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Packets decoded successfully.
    pub packets: u64,
    /// Packets the sequence numbers show as missing.
    pub lost: u64,
    /// Datagrams that failed to decode.
    pub decode_errors: u64,
}

/// Lock-free counters shared between the IQ task and the session.
#[derive(Debug, Default)]
pub(crate) struct StreamCounters {
    packets: AtomicU64,
    lost: AtomicU64,
    decode_errors: AtomicU64,
}

impl StreamCounters {
    pub(crate) fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.lost.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StreamStats {
        StreamStats {
            packets: self.packets.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Detects gaps in the data item sequence.
#[derive(Debug, Default)]
pub(crate) struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    /// Record `seq` and return how many packets were skipped before it.
    ///
    /// Late or duplicated packets return 0 and leave the tracker unchanged.
    pub(crate) fn observe(&mut self, seq: u16) -> u64 {
        let Some(last) = self.last else {
            self.last = Some(seq);
            return 0;
        };
        if seq == 0 {
            // Counter restarted.
            self.last = Some(0);
            return 0;
        }

        let expected = successor(last);
        let distance =
            (u32::from(seq - 1) + SEQUENCE_SPAN - u32::from(expected - 1)) % SEQUENCE_SPAN;
        if distance >= SEQUENCE_SPAN - REORDER_WINDOW {
            return 0;
        }
        self.last = Some(seq);
        u64::from(distance)
    }
}

/// Next sequence number after `seq`; 0 is never reused after a wrap.
fn successor(seq: u16) -> u16 {
    if seq == u16::MAX { 1 } else { seq + 1 }
}

/// Decode one datagram into an [`IqPacket`].
pub fn decode_iq_datagram(format: SampleFormat, datagram: &[u8]) -> Result<IqPacket> {
    let frame = decode_frame(datagram)?;
    let sequence = frame.sequence().ok_or_else(|| {
        Error::Protocol(format!(
            "expected a data item on the data channel, got {:?}",
            frame.message_type
        ))
    })?;
    let samples = decode_samples(format.bit_depth(), &frame.body)?.collect();
    Ok(IqPacket { sequence, samples })
}

/// Run the data channel until `cancel` fires.
///
/// The listener and the decoding loop run side by side; when the listener
/// returns, its sender is dropped and the decoder drains whatever is left.
pub(crate) async fn run_iq_stream(
    listener: Arc<dyn DatagramListener>,
    format: SampleFormat,
    sink: mpsc::Sender<IqPacket>,
    counters: Arc<StreamCounters>,
    cancel: CancellationToken,
) {
    let (datagram_tx, datagram_rx) = mpsc::channel(DATAGRAM_CHANNEL_CAPACITY);

    let listen = async move {
        if let Err(e) = listener.start_listening(datagram_tx, cancel).await {
            tracing::error!(error = %e, "data channel listener failed");
        }
    };
    let forward = forward_datagrams(datagram_rx, format, sink, &counters);

    tokio::join!(listen, forward);
    tracing::debug!("IQ stream task finished");
}

async fn forward_datagrams(
    mut datagrams: mpsc::Receiver<Bytes>,
    format: SampleFormat,
    sink: mpsc::Sender<IqPacket>,
    counters: &StreamCounters,
) {
    let mut tracker = SequenceTracker::default();

    while let Some(datagram) = datagrams.recv().await {
        let packet = match decode_iq_datagram(format, &datagram) {
            Ok(packet) => packet,
            Err(e) => {
                counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, bytes = datagram.len(), "dropping undecodable datagram");
                continue;
            }
        };

        let lost = tracker.observe(packet.sequence);
        if lost > 0 {
            counters.lost.fetch_add(lost, Ordering::Relaxed);
            tracing::warn!(seq = packet.sequence, lost, "IQ sequence gap");
        }
        counters.packets.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            seq = packet.sequence,
            samples = packet.samples.len(),
            "IQ packet"
        );
        match sink.try_send(packet) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(p)) => {
                tracing::trace!(seq = p.sequence, "IQ packet dropped (consumer too slow)");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("IQ consumer gone, discarding packet");
            }
        }
    }
}
