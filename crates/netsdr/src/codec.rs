//! Frame encoder/decoder.
//!
//! Pure byte-level encoding and decoding of protocol frames, plus a
//! reassembly buffer for the control channel's byte stream. No I/O is
//! performed here.
//!
//! The stream transport delivers chunks whose boundaries have nothing to do
//! with frame boundaries. [`FrameBuffer`] accumulates chunks and yields whole
//! frames using the header's length field, so a frame split across reads, or
//! several frames in one read, are decoded the same as a frame delivered in
//! a single chunk.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use netsdr_core::{Error, Result};

use crate::protocol::{
    ControlItemCode, FRAME_OVERHEAD, Frame, HEADER_LEN, ItemField, LENGTH_MASK,
    MAX_DATA_ITEM_LEN, MAX_PARAMETERS_LEN, MessageType, TYPE_SHIFT,
};

/// Encode a control item message.
///
/// # Example
///
/// ```
/// use netsdr::codec::encode_control_item_message;
/// use netsdr::protocol::{ControlItemCode, MessageType};
///
/// let frame = encode_control_item_message(
///     MessageType::SetControlItem,
///     ControlItemCode::ReceiverState,
///     &[0x80, 0x02, 0x00, 0x01],
/// )
/// .unwrap();
/// assert_eq!(frame, vec![0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00, 0x01]);
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when `parameters` is longer than
/// [`MAX_PARAMETERS_LEN`], since the length would not fit the 13-bit field.
pub fn encode_control_item_message(
    message_type: MessageType,
    item: ControlItemCode,
    parameters: &[u8],
) -> Result<Vec<u8>> {
    if parameters.len() > MAX_PARAMETERS_LEN {
        return Err(Error::InvalidParameter(format!(
            "{} parameter bytes exceed the {} byte maximum",
            parameters.len(),
            MAX_PARAMETERS_LEN
        )));
    }

    let length = (FRAME_OVERHEAD + parameters.len()) as u16;
    let header = (length & LENGTH_MASK) | ((message_type.bits() as u16) << TYPE_SHIFT);

    let mut buf = BytesMut::with_capacity(length as usize);
    buf.put_u16_le(header);
    buf.put_u16_le(item.code());
    buf.put_slice(parameters);
    Ok(buf.to_vec())
}

/// Total frame length declared by the header at the start of `buf`.
///
/// Returns `None` when fewer than two bytes are available. A data item
/// declaring length 0 is reported as [`MAX_DATA_ITEM_LEN`].
pub fn declared_length(buf: &[u8]) -> Option<(MessageType, usize)> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let header = u16::from_le_bytes([buf[0], buf[1]]);
    let bits = (header >> TYPE_SHIFT) as u8;
    // Three bits always map to a message type.
    let message_type = MessageType::from_bits(bits)?;
    let length = (header & LENGTH_MASK) as usize;

    if length == 0 && message_type.is_data_item() {
        Some((message_type, MAX_DATA_ITEM_LEN))
    } else {
        Some((message_type, length))
    }
}

/// Decode one frame from the start of `buf`.
///
/// Bytes beyond the declared length are left alone; they belong to the
/// next frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when the buffer is shorter than the header or
/// than the declared length, or when the declared length cannot hold the
/// header and item field.
pub fn decode_frame(buf: &[u8]) -> Result<Frame> {
    let (message_type, length) = declared_length(buf).ok_or_else(|| {
        Error::Protocol(format!(
            "frame truncated: {} bytes, header needs {}",
            buf.len(),
            HEADER_LEN
        ))
    })?;

    if length < FRAME_OVERHEAD {
        return Err(Error::Protocol(format!(
            "declared length {} is shorter than the {} byte frame overhead",
            length, FRAME_OVERHEAD
        )));
    }
    if buf.len() < length {
        return Err(Error::Protocol(format!(
            "frame truncated: {} bytes, header declares {}",
            buf.len(),
            length
        )));
    }

    let mut frame = &buf[HEADER_LEN..length];
    let item = ItemField::for_message(message_type, frame.get_u16_le());

    Ok(Frame {
        message_type,
        item,
        body: Bytes::copy_from_slice(frame),
    })
}

/// Reassembly buffer for the control channel byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pop the next complete frame.
    ///
    /// Returns `None` when more bytes are needed. A header declaring an
    /// impossible length discards the whole buffer and returns the error,
    /// since the stream position of the next frame is unknown.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        let (_, length) = declared_length(&self.buf)?;

        if length < FRAME_OVERHEAD {
            let discarded = self.buf.len();
            self.buf.clear();
            tracing::warn!(
                declared = length,
                discarded,
                "Invalid frame length on control stream, buffer reset"
            );
            return Some(Err(Error::Protocol(format!(
                "declared length {} is shorter than the {} byte frame overhead",
                length, FRAME_OVERHEAD
            ))));
        }
        if self.buf.len() < length {
            return None;
        }

        let raw = self.buf.split_to(length).freeze();
        Some(decode_frame(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_message_type() -> impl Strategy<Value = MessageType> {
        (0u8..8).prop_map(|bits| MessageType::from_bits(bits).unwrap())
    }

    proptest! {
        #[test]
        fn prop_encode_decode_round_trip(
            message_type in arb_message_type(),
            code in any::<u16>(),
            parameters in prop::collection::vec(any::<u8>(), 0..=MAX_PARAMETERS_LEN),
        ) {
            let item = ControlItemCode::from_code(code);
            let encoded = encode_control_item_message(message_type, item, &parameters).unwrap();
            prop_assert_eq!(encoded.len(), FRAME_OVERHEAD + parameters.len());

            let frame = decode_frame(&encoded).unwrap();
            prop_assert_eq!(frame.message_type, message_type);
            prop_assert_eq!(frame.item.raw(), code);
            prop_assert_eq!(&frame.body[..], &parameters[..]);
        }
    }

    #[test]
    fn encode_packs_length_and_type() {
        let frame = encode_control_item_message(
            MessageType::CurrentControlItem,
            ControlItemCode::ReceiverFrequency,
            &[0x00],
        )
        .unwrap();
        // length 5, type 1 -> 0x2005
        assert_eq!(frame, vec![0x05, 0x20, 0x20, 0x00, 0x00]);
    }

    #[test]
    fn encode_rejects_oversized_parameters() {
        let parameters = vec![0u8; MAX_PARAMETERS_LEN + 1];
        let err = encode_control_item_message(
            MessageType::SetControlItem,
            ControlItemCode::ReceiverState,
            &parameters,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn encode_accepts_maximum_parameters() {
        let parameters = vec![0xAB; MAX_PARAMETERS_LEN];
        let frame = encode_control_item_message(
            MessageType::SetControlItem,
            ControlItemCode::ReceiverState,
            &parameters,
        )
        .unwrap();
        assert_eq!(frame.len(), 8191);
        assert_eq!(u16::from_le_bytes([frame[0], frame[1]]), 0x1FFF);
    }

    #[test]
    fn decode_control_frame() {
        let frame = decode_frame(&[0x05, 0x00, 0xB8, 0x00, 0x42]).unwrap();
        assert_eq!(frame.message_type, MessageType::SetControlItem);
        assert_eq!(frame.control_item(), Some(ControlItemCode::IqOutputSampleRate));
        assert_eq!(&frame.body[..], &[0x42]);
    }

    #[test]
    fn decode_data_item_uses_sequence() {
        // length 8, type 4 -> 0x8008, sequence 7
        let frame = decode_frame(&[0x08, 0x80, 0x07, 0x00, 0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(frame.message_type, MessageType::DataItem0);
        assert_eq!(frame.sequence(), Some(7));
        assert_eq!(frame.control_item(), None);
        assert_eq!(frame.body.len(), 4);
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let frame = decode_frame(&[0x04, 0x00, 0x18, 0x00, 0xFF, 0xFF]).unwrap();
        assert!(frame.body.is_empty());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(matches!(decode_frame(&[]), Err(Error::Protocol(_))));
        assert!(matches!(decode_frame(&[0x04]), Err(Error::Protocol(_))));
        assert!(matches!(
            decode_frame(&[0x08, 0x00, 0x18, 0x00, 0x80]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn decode_rejects_length_below_overhead() {
        assert!(matches!(
            decode_frame(&[0x03, 0x00, 0x18, 0x00]),
            Err(Error::Protocol(_))
        ));
        // Zero length is only meaningful for data items.
        assert!(matches!(
            decode_frame(&[0x00, 0x00, 0x18, 0x00]),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn zero_length_data_item_is_maximum_size() {
        let mut raw = vec![0x00, 0x80, 0x01, 0x00];
        raw.resize(MAX_DATA_ITEM_LEN, 0x11);
        let frame = decode_frame(&raw).unwrap();
        assert_eq!(frame.sequence(), Some(1));
        assert_eq!(frame.body.len(), 8190);
    }

    #[test]
    fn frame_buffer_reassembles_split_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&[0x08, 0x00, 0x18]);
        assert!(buffer.next_frame().is_none());
        buffer.push(&[0x00, 0x80, 0x02]);
        assert!(buffer.next_frame().is_none());
        buffer.push(&[0x00, 0x01]);

        let frame = buffer.next_frame().unwrap().unwrap();
        assert_eq!(frame.control_item(), Some(ControlItemCode::ReceiverState));
        assert_eq!(&frame.body[..], &[0x80, 0x02, 0x00, 0x01]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn frame_buffer_splits_coalesced_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&[0x05, 0x00, 0x20, 0x00, 0x01, 0x04, 0x00, 0x18, 0x00, 0x06]);

        let first = buffer.next_frame().unwrap().unwrap();
        assert_eq!(first.control_item(), Some(ControlItemCode::ReceiverFrequency));
        let second = buffer.next_frame().unwrap().unwrap();
        assert_eq!(second.control_item(), Some(ControlItemCode::ReceiverState));
        assert!(buffer.next_frame().is_none());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn frame_buffer_resets_on_invalid_length() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&[0x02, 0x00, 0xAA, 0xBB]);
        assert!(matches!(buffer.next_frame(), Some(Err(Error::Protocol(_)))));
        assert!(buffer.is_empty());

        buffer.push(&[0x04, 0x00, 0x18, 0x00]);
        assert!(buffer.next_frame().unwrap().is_ok());
    }
}
