// xcorr-core/src/lib.rs

//! The core logic for locating a known reference waveform inside a long I/Q capture.
//! This crate is responsible for the aligned sample buffers, the transform engine,
//! the brute-force oracle and the overlap-save cross-correlator. It is completely
//! headless and performs no file I/O.

pub mod brute_force;
pub mod config;
pub mod cross_correlation;
pub mod error;
pub mod fft;
pub mod iq;
pub mod power;
pub mod signal;

pub use brute_force::{brute_force_correlate, brute_force_correlate_into};
pub use config::{CorrelatorConfig, Strategy};
pub use cross_correlation::CrossCorrelator;
pub use error::{ErrorKind, Result, XcorrError};
pub use fft::FftEngine;
pub use rustfft::num_complex::Complex32;
pub use signal::Signal;

/// The lag with the largest correlation magnitude, if any.
///
/// NaN values are skipped, so a zero-energy reference yields `None`.
pub fn peak(output: &[f32]) -> Option<(usize, f32)> {
    output
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, value)| !value.is_nan())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak() {
        assert_eq!(peak(&[0.1, 0.9, 0.3]), Some((1, 0.9)));
        assert_eq!(peak(&[]), None);
        assert_eq!(peak(&[f32::NAN, f32::NAN]), None);
    }
}
