//! IQ sample decoding.
//!
//! A data item body is a run of fixed-width little-endian integers. Each
//! sample occupies `ceil(bit_depth / 8)` bytes and is sign-extended from
//! `bit_depth` bits to `i32`. Bytes left over after the last complete sample
//! are ignored.

use std::slice::ChunksExact;

use netsdr_core::{Error, Result};

/// Widest sample the `i32` container holds without loss.
pub const MAX_BIT_DEPTH: u8 = 32;

/// Lazy iterator over the samples of one body.
///
/// Decoding keeps no state outside the iterator; a clone yields the
/// remaining samples without affecting the iterator it was cloned from.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    chunks: ChunksExact<'a, u8>,
    shift: u32,
}

impl Iterator for Samples<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        let chunk = self.chunks.next()?;
        let raw = chunk
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (8 * i)));
        // Move the sample's top bit to bit 31, then shift back arithmetically.
        Some(((raw << self.shift) as i32) >> self.shift)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Samples<'_> {}

/// Number of bytes one sample of `bit_depth` bits occupies.
pub fn bytes_per_sample(bit_depth: u8) -> usize {
    usize::from(bit_depth).div_ceil(8)
}

/// Decode `body` into samples of `bit_depth` bits.
///
/// # Example
///
/// ```
/// use netsdr::samples::decode_samples;
///
/// let samples: Vec<i32> = decode_samples(16, &[0x01, 0x02, 0xFF, 0xFF]).unwrap().collect();
/// assert_eq!(samples, vec![0x0201, -1]);
/// ```
///
/// # Errors
///
/// Returns [`Error::OutOfRange`] when `bit_depth` is 0 or above
/// [`MAX_BIT_DEPTH`]. The check happens before any sample is produced.
pub fn decode_samples(bit_depth: u8, body: &[u8]) -> Result<Samples<'_>> {
    if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH {
        return Err(Error::OutOfRange(format!(
            "sample bit depth {} outside 1..={}",
            bit_depth, MAX_BIT_DEPTH
        )));
    }

    Ok(Samples {
        chunks: body.chunks_exact(bytes_per_sample(bit_depth)),
        shift: u32::from(MAX_BIT_DEPTH - bit_depth),
    })
}
