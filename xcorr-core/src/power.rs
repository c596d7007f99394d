//! Mean signal power over consecutive fixed-length intervals of a capture.

use rustfft::num_complex::Complex32;
use serde::Serialize;

use crate::error::{Result, XcorrError};

/// Power statistics for one interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalPower {
    /// Sample index halfway between the interval's start and end.
    pub center: u64,
    /// Mean of I² + Q².
    pub power: f64,
    pub i_power: f64,
    pub q_power: f64,
}

/// Splits `signal` into intervals of `interval` samples and measures each one.
///
/// The last interval may be short; it is still divided by the nominal
/// `interval`, so a partial tail reads as proportionally weaker.
///
/// # Errors
/// * `InvalidInput` if `interval` is zero
pub fn power_profile(signal: &[Complex32], interval: usize) -> Result<Vec<IntervalPower>> {
    if interval == 0 {
        return Err(XcorrError::invalid_input("power interval must be at least 1 sample"));
    }

    let profile = signal
        .chunks(interval)
        .enumerate()
        .map(|(index, chunk)| {
            let start = (index * interval) as u64;
            let end = start + chunk.len() as u64;

            let (i_energy, q_energy) = chunk.iter().fold((0.0f64, 0.0f64), |(i, q), sample| {
                let re = sample.re as f64;
                let im = sample.im as f64;
                (i + re * re, q + im * im)
            });

            let scale = interval as f64;
            IntervalPower {
                center: (start + end) / 2,
                power: (i_energy + q_energy) / scale,
                i_power: i_energy / scale,
                q_power: q_energy / scale,
            }
        })
        .collect();

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_signal_profile() {
        let signal = vec![Complex32::new(3.0, 4.0); 10];
        let profile = power_profile(&signal, 4).unwrap();
        assert_eq!(profile.len(), 3);

        assert_eq!(profile[0].center, 2);
        assert!((profile[0].power - 25.0).abs() < 1e-9);
        assert!((profile[0].i_power - 9.0).abs() < 1e-9);
        assert!((profile[0].q_power - 16.0).abs() < 1e-9);

        // Tail of 2 samples divided by the nominal 4.
        assert_eq!(profile[2].center, 9);
        assert!((profile[2].power - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(power_profile(&[Complex32::new(1.0, 0.0)], 0).is_err());
    }

    #[test]
    fn test_empty_signal_has_empty_profile() {
        assert!(power_profile(&[], 16).unwrap().is_empty());
    }
}
