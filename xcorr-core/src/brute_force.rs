//! # Brute-Force Correlation Module
//!
//! Direct O(R·(D−R)) cross-correlation. Far too slow for production-sized
//! captures, but simple enough to serve as the ground truth the FFT
//! correlator is validated against.

use rustfft::num_complex::Complex32;

use crate::error::{Result, XcorrError};

/// Correlates `reference` against every lag of `data`.
///
/// Returns `data.len() - reference.len()` magnitudes.
///
/// # Errors
/// * `InvalidInput` if the reference is longer than the data
pub fn brute_force_correlate(reference: &[Complex32], data: &[Complex32]) -> Result<Vec<f32>> {
    if reference.len() > data.len() {
        return Err(reference_too_long(reference.len(), data.len()));
    }
    let mut output = vec![0.0; data.len() - reference.len()];
    brute_force_correlate_into(reference, data, &mut output)?;
    Ok(output)
}

/// Writes the normalized correlation magnitude at each lag into a caller-allocated `output`.
///
/// For every lag, `output[lag] = |Σ data[lag + i] · conj(reference[i])| / Σ |reference[i]|²`.
/// A zero-energy reference divides by zero and produces non-finite values.
///
/// # Errors
/// * `InvalidInput` if the reference is longer than the data, or
///   `output.len() != data.len() - reference.len()`
pub fn brute_force_correlate_into(
    reference: &[Complex32],
    data: &[Complex32],
    output: &mut [f32],
) -> Result<()> {
    if reference.len() > data.len() {
        return Err(reference_too_long(reference.len(), data.len()));
    }
    if output.len() != data.len() - reference.len() {
        return Err(XcorrError::invalid_input(format!(
            "output length {} must be data length - reference length ({})",
            output.len(),
            data.len() - reference.len()
        )));
    }

    let reference_power: f32 = reference.iter().map(|x| x.norm_sqr()).sum();

    for (lag, slot) in output.iter_mut().enumerate() {
        let window = &data[lag..lag + reference.len()];
        let correlation: Complex32 = window
            .iter()
            .zip(reference)
            .map(|(d, r)| d * r.conj())
            .sum();
        *slot = correlation.norm() / reference_power;
    }

    Ok(())
}

fn reference_too_long(reference_len: usize, data_len: usize) -> XcorrError {
    XcorrError::invalid_input(format!(
        "reference length {reference_len} is longer than data length {data_len}"
    ))
}
