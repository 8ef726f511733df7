//! Protocol enumerations and frame types.
//!
//! Every control-channel and data-channel message shares one layout:
//!
//! ```text
//! bytes 0-1:  header = (length & 0x1FFF) | (message_type << 13)   (u16 LE)
//! bytes 2-3:  item field: control item code, or sequence number for data items (u16 LE)
//! bytes 4..:  body: parameters, or sample payload
//! ```
//!
//! `length` counts the whole frame including the header.

use bytes::Bytes;

/// Size of the 16-bit header.
pub const HEADER_LEN: usize = 2;

/// Size of the header plus the 16-bit item field.
pub const FRAME_OVERHEAD: usize = 4;

/// Largest length the 13-bit length field can express.
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Largest parameter block an encoded control message can carry.
pub const MAX_PARAMETERS_LEN: usize = MAX_FRAME_LEN - FRAME_OVERHEAD;

/// Length of a data item whose header declares length 0.
///
/// Receivers use the zero length for their largest data packets: the 2-byte
/// header, the 2-byte sequence number and 8190 sample bytes.
pub const MAX_DATA_ITEM_LEN: usize = 8194;

/// Mask selecting the length bits of the header.
pub(crate) const LENGTH_MASK: u16 = 0x1FFF;

/// Shift of the message type bits within the header.
pub(crate) const TYPE_SHIFT: u16 = 13;

/// Message type carried in the top three header bits.
///
/// The same value means different things in each direction (for example a
/// `SetControlItem` frame from the receiver is its acknowledgement of a set
/// from the host); the wire value is what this type models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Host sets a control item; the receiver echoes it as acknowledgement.
    SetControlItem,
    /// Host requests an item's current value; the receiver reports it, also unsolicited.
    CurrentControlItem,
    /// Host requests an item's valid range; the receiver answers with it.
    ControlItemRange,
    /// Data item acknowledgement.
    Ack,
    /// Data item channel 0 (IQ samples on most receivers).
    DataItem0,
    /// Data item channel 1.
    DataItem1,
    /// Data item channel 2.
    DataItem2,
    /// Data item channel 3.
    DataItem3,
}

impl MessageType {
    /// Decode the 3-bit wire value. Returns `None` above 7.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(MessageType::SetControlItem),
            1 => Some(MessageType::CurrentControlItem),
            2 => Some(MessageType::ControlItemRange),
            3 => Some(MessageType::Ack),
            4 => Some(MessageType::DataItem0),
            5 => Some(MessageType::DataItem1),
            6 => Some(MessageType::DataItem2),
            7 => Some(MessageType::DataItem3),
            _ => None,
        }
    }

    /// The 3-bit wire value.
    pub fn bits(self) -> u8 {
        match self {
            MessageType::SetControlItem => 0,
            MessageType::CurrentControlItem => 1,
            MessageType::ControlItemRange => 2,
            MessageType::Ack => 3,
            MessageType::DataItem0 => 4,
            MessageType::DataItem1 => 5,
            MessageType::DataItem2 => 6,
            MessageType::DataItem3 => 7,
        }
    }

    /// Whether the item field of this message type is a sequence number.
    pub fn is_data_item(self) -> bool {
        matches!(
            self,
            MessageType::DataItem0
                | MessageType::DataItem1
                | MessageType::DataItem2
                | MessageType::DataItem3
        )
    }
}

/// Control item codes.
///
/// Only the items this client drives are named; everything else a receiver
/// may report decodes as [`ControlItemCode::Other`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlItemCode {
    /// Receiver run/idle state and capture mode (0x0018).
    ReceiverState,
    /// Receiver NCO frequency per channel (0x0020).
    ReceiverFrequency,
    /// RF input filter selection (0x0044).
    RfFilter,
    /// A/D converter modes: dither and gain (0x008A).
    AdModes,
    /// IQ output data sample rate (0x00B8).
    IqOutputSampleRate,
    /// Any other, device-specific item.
    Other(u16),
}

impl ControlItemCode {
    /// Map a wire code to a control item.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0018 => ControlItemCode::ReceiverState,
            0x0020 => ControlItemCode::ReceiverFrequency,
            0x0044 => ControlItemCode::RfFilter,
            0x008A => ControlItemCode::AdModes,
            0x00B8 => ControlItemCode::IqOutputSampleRate,
            other => ControlItemCode::Other(other),
        }
    }

    /// The 16-bit wire code.
    pub fn code(self) -> u16 {
        match self {
            ControlItemCode::ReceiverState => 0x0018,
            ControlItemCode::ReceiverFrequency => 0x0020,
            ControlItemCode::RfFilter => 0x0044,
            ControlItemCode::AdModes => 0x008A,
            ControlItemCode::IqOutputSampleRate => 0x00B8,
            ControlItemCode::Other(code) => code,
        }
    }
}

/// The 16-bit field following the header, interpreted per message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemField {
    /// Control messages: the item being set, requested or reported.
    ControlItem(ControlItemCode),
    /// Data items: the datagram sequence number.
    Sequence(u16),
}

impl ItemField {
    /// Interpret a raw item field for `message_type`.
    pub fn for_message(message_type: MessageType, raw: u16) -> Self {
        if message_type.is_data_item() {
            ItemField::Sequence(raw)
        } else {
            ItemField::ControlItem(ControlItemCode::from_code(raw))
        }
    }

    /// The raw 16-bit value.
    pub fn raw(self) -> u16 {
        match self {
            ItemField::ControlItem(code) => code.code(),
            ItemField::Sequence(seq) => seq,
        }
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type from the header.
    pub message_type: MessageType,
    /// Control item code or sequence number.
    pub item: ItemField,
    /// Parameters or sample payload.
    pub body: Bytes,
}

impl Frame {
    /// The control item this frame addresses, if it is a control message.
    pub fn control_item(&self) -> Option<ControlItemCode> {
        match self.item {
            ItemField::ControlItem(code) => Some(code),
            ItemField::Sequence(_) => None,
        }
    }

    /// The sequence number, if this frame is a data item.
    pub fn sequence(&self) -> Option<u16> {
        match self.item {
            ItemField::Sequence(seq) => Some(seq),
            ItemField::ControlItem(_) => None,
        }
    }
}

/// Bit depth of streamed IQ samples, selected when streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 16-bit samples, contiguous capture.
    #[default]
    Bits16,
    /// 24-bit samples, contiguous capture.
    Bits24,
}

impl SampleFormat {
    /// Sample bit depth for the decoder.
    pub fn bit_depth(self) -> u8 {
        match self {
            SampleFormat::Bits16 => 16,
            SampleFormat::Bits24 => 24,
        }
    }

    /// Capture mode byte of the receiver state "run" command.
    pub fn capture_mode(self) -> u8 {
        match self {
            SampleFormat::Bits16 => 0x00,
            SampleFormat::Bits24 => 0x80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_bits_round_trip() {
        for bits in 0u8..8 {
            let mt = MessageType::from_bits(bits).unwrap();
            assert_eq!(mt.bits(), bits);
        }
        assert_eq!(MessageType::from_bits(8), None);
    }

    #[test]
    fn only_upper_types_are_data_items() {
        assert!(!MessageType::SetControlItem.is_data_item());
        assert!(!MessageType::Ack.is_data_item());
        assert!(MessageType::DataItem0.is_data_item());
        assert!(MessageType::DataItem3.is_data_item());
    }

    #[test]
    fn known_control_items_map_to_named_variants() {
        assert_eq!(ControlItemCode::from_code(0x00B8), ControlItemCode::IqOutputSampleRate);
        assert_eq!(ControlItemCode::from_code(0x0018), ControlItemCode::ReceiverState);
        assert_eq!(ControlItemCode::ReceiverFrequency.code(), 0x0020);
    }

    #[test]
    fn unknown_control_item_is_preserved() {
        let code = ControlItemCode::from_code(0x0001);
        assert_eq!(code, ControlItemCode::Other(0x0001));
        assert_eq!(code.code(), 0x0001);
    }

    #[test]
    fn item_field_depends_on_message_type() {
        assert_eq!(
            ItemField::for_message(MessageType::DataItem0, 0x0018),
            ItemField::Sequence(0x0018)
        );
        assert_eq!(
            ItemField::for_message(MessageType::SetControlItem, 0x0018),
            ItemField::ControlItem(ControlItemCode::ReceiverState)
        );
    }

    #[test]
    fn sample_format_parameters() {
        assert_eq!(SampleFormat::Bits16.bit_depth(), 16);
        assert_eq!(SampleFormat::Bits24.bit_depth(), 24);
        assert_eq!(SampleFormat::Bits24.capture_mode(), 0x80);
        assert_eq!(SampleFormat::default(), SampleFormat::Bits16);
    }
}
