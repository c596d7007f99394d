//! # I/Q Sample Stream Module
//!
//! Decodes the raw capture format into [`Signal`]s. Each record is 4 bytes:
//! a little-endian `i16` in-phase value followed by a little-endian `i16`
//! quadrature value. Reading the bytes from storage is left to the caller.

use rustfft::num_complex::Complex32;

use crate::error::{Result, XcorrError};
use crate::signal::Signal;

/// Size of one I/Q record in bytes.
pub const BYTES_PER_SAMPLE: usize = 4;

/// Number of samples in a stream of `byte_len` bytes.
///
/// # Errors
/// * `MalformedStream` if `byte_len` is not a whole number of records
pub fn sample_count(byte_len: usize) -> Result<usize> {
    if byte_len % BYTES_PER_SAMPLE != 0 {
        return Err(XcorrError::MalformedStream(format!(
            "length {byte_len} bytes needs to be a multiple of {BYTES_PER_SAMPLE} bytes"
        )));
    }
    Ok(byte_len / BYTES_PER_SAMPLE)
}

/// Decodes a byte stream into complex samples.
pub fn decode(bytes: &[u8]) -> Result<Signal> {
    let mut signal = Signal::new(sample_count(bytes.len())?);
    for (sample, record) in signal.iter_mut().zip(bytes.chunks_exact(BYTES_PER_SAMPLE)) {
        let i = i16::from_le_bytes([record[0], record[1]]);
        let q = i16::from_le_bytes([record[2], record[3]]);
        *sample = Complex32::new(i as f32, q as f32);
    }
    Ok(signal)
}

/// Encodes samples in the capture format, rounding and saturating each component to `i16`.
pub fn encode(samples: &[Complex32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&to_i16(sample.re).to_le_bytes());
        bytes.extend_from_slice(&to_i16(sample.im).to_le_bytes());
    }
    bytes
}

// `as` saturates out-of-range floats and maps NaN to 0.
fn to_i16(value: f32) -> i16 {
    value.round() as i16
}
