//! Control command builders.
//!
//! Each builder returns a fully encoded frame ready for the control channel.
//! The session sends these through its single-flight request path; they are
//! public so tools and tests can build or match the same bytes.

use netsdr_core::{Error, Result};

use crate::codec::encode_control_item_message;
use crate::protocol::{ControlItemCode, MessageType, SampleFormat};

/// Receiver channel addressed by the connect handshake.
pub const DEFAULT_CHANNEL: u8 = 0x00;

/// Highest frequency the 40-bit frequency field can carry.
pub const MAX_FREQUENCY_HZ: u64 = 0xFF_FFFF_FFFF;

/// Receiver state data type byte: complex IQ output.
const DATA_TYPE_COMPLEX: u8 = 0x80;

/// Receiver state run/idle bytes.
const RUN: u8 = 0x02;
const IDLE: u8 = 0x01;

/// RF filter selection: automatic.
const RF_FILTER_AUTO: u8 = 0x00;

/// A/D modes: dither on, 1.5x gain.
const AD_MODES_DEFAULT: u8 = 0x03;

/// Build a set command for the IQ output sample rate.
///
/// Parameters: `[channel] ++ rate (u32 LE)`.
pub fn cmd_set_sample_rate(rate: u32) -> Result<Vec<u8>> {
    let mut params = Vec::with_capacity(5);
    params.push(DEFAULT_CHANNEL);
    params.extend_from_slice(&rate.to_le_bytes());
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::IqOutputSampleRate,
        &params,
    )
}

/// Build a set command selecting automatic RF filtering.
pub fn cmd_set_rf_filter_auto() -> Result<Vec<u8>> {
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::RfFilter,
        &[DEFAULT_CHANNEL, RF_FILTER_AUTO],
    )
}

/// Build a set command for the default A/D converter modes.
pub fn cmd_set_ad_modes() -> Result<Vec<u8>> {
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::AdModes,
        &[DEFAULT_CHANNEL, AD_MODES_DEFAULT],
    )
}

/// The three set commands sent, in order, when a session connects.
pub fn handshake_commands(sample_rate: u32) -> Result<[Vec<u8>; 3]> {
    Ok([
        cmd_set_sample_rate(sample_rate)?,
        cmd_set_rf_filter_auto()?,
        cmd_set_ad_modes()?,
    ])
}

/// Build the receiver state command that starts IQ streaming.
///
/// Parameters: `[complex IQ, run, capture mode, 1]`.
pub fn cmd_start_iq(format: SampleFormat) -> Result<Vec<u8>> {
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[DATA_TYPE_COMPLEX, RUN, format.capture_mode(), 0x01],
    )
}

/// Build the receiver state command that stops IQ streaming.
pub fn cmd_stop_iq() -> Result<Vec<u8>> {
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[0x00, IDLE, 0x00, 0x00],
    )
}

/// Build a receiver frequency command.
///
/// Parameters: `[channel] ++ frequency (40-bit LE)`.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when `frequency_hz` exceeds
/// [`MAX_FREQUENCY_HZ`].
pub fn cmd_set_frequency(channel: u8, frequency_hz: u64) -> Result<Vec<u8>> {
    if frequency_hz > MAX_FREQUENCY_HZ {
        return Err(Error::InvalidParameter(format!(
            "frequency {} Hz does not fit the 40-bit frequency field",
            frequency_hz
        )));
    }
    let mut params = Vec::with_capacity(6);
    params.push(channel);
    params.extend_from_slice(&frequency_hz.to_le_bytes()[..5]);
    encode_control_item_message(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverFrequency,
        &params,
    )
}

/// Build a request for an item's current value.
pub fn cmd_request_item(item: ControlItemCode, params: &[u8]) -> Result<Vec<u8>> {
    encode_control_item_message(MessageType::CurrentControlItem, item, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_command() {
        let cmd = cmd_set_sample_rate(100_000).unwrap();
        assert_eq!(cmd, vec![0x09, 0x00, 0xB8, 0x00, 0x00, 0xA0, 0x86, 0x01, 0x00]);
    }

    #[test]
    fn handshake_order() {
        let [rate, filter, ad] = handshake_commands(100_000).unwrap();
        assert_eq!(&rate[2..4], &[0xB8, 0x00]);
        assert_eq!(filter, vec![0x06, 0x00, 0x44, 0x00, 0x00, 0x00]);
        assert_eq!(ad, vec![0x06, 0x00, 0x8A, 0x00, 0x00, 0x03]);
    }

    #[test]
    fn start_and_stop_commands() {
        assert_eq!(
            cmd_start_iq(SampleFormat::Bits16).unwrap(),
            vec![0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x00, 0x01]
        );
        assert_eq!(
            cmd_start_iq(SampleFormat::Bits24).unwrap(),
            vec![0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x80, 0x01]
        );
        assert_eq!(
            cmd_stop_iq().unwrap(),
            vec![0x08, 0x00, 0x18, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn frequency_command_encodes_channel_and_40_bits() {
        let cmd = cmd_set_frequency(1, 1_000_000).unwrap();
        assert_eq!(
            cmd,
            vec![0x0A, 0x00, 0x20, 0x00, 0x01, 0x40, 0x42, 0x0F, 0x00, 0x00]
        );
    }

    #[test]
    fn frequency_command_accepts_40_bit_maximum() {
        let cmd = cmd_set_frequency(0, MAX_FREQUENCY_HZ).unwrap();
        assert_eq!(&cmd[5..], &[0xFF; 5]);
    }

    #[test]
    fn frequency_command_rejects_overflow() {
        let err = cmd_set_frequency(0, MAX_FREQUENCY_HZ + 1).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn request_item_uses_current_control_item_type() {
        let cmd = cmd_request_item(ControlItemCode::ReceiverState, &[0x00]).unwrap();
        assert_eq!(cmd, vec![0x05, 0x20, 0x18, 0x00, 0x00]);
    }
}
