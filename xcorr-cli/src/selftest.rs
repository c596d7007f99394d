//! Randomized comparison of the fast correlator against the brute-force oracle.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use xcorr_core::config::{ALIGNMENT_QUANTUM, DEFAULT_MAX_CHUNK_SIZE};
use xcorr_core::{
    brute_force_correlate, Complex32, CorrelatorConfig, CrossCorrelator, Signal, Strategy,
};

const MIN_REFERENCE: usize = 32;
const MAX_REFERENCE: usize = 1000;
const MAX_DATA_MINUS_REFERENCE: usize = 20_000;
const TOLERANCE: f32 = 1e-4;
const MAX_WORKERS: usize = 7;

/// Runs `trials` random comparisons; every odd trial embeds the reference in the data.
///
/// Each trial checks a whole-signal correlator and one cut into aligned
/// overlap-save windows with a randomly chosen schedule.
pub fn run(trials: usize, seed: Option<u64>) -> Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    info!(trials, seed, "starting self-test");
    let mut rng = StdRng::seed_from_u64(seed);

    for trial in 0..trials {
        check_trial(&mut rng, trial % 2 == 1)?;
    }

    info!(trials, "self-test passed");
    Ok(())
}

fn random_signal(rng: &mut StdRng, len: usize) -> Signal {
    (0..len)
        .map(|_| {
            Complex32::new(rng.gen_range(-32768.0..32768.0), rng.gen_range(-32768.0..32768.0))
        })
        .collect()
}

fn random_config(rng: &mut StdRng, reference_size: usize) -> CorrelatorConfig {
    let min_quanta = reference_size.div_ceil(ALIGNMENT_QUANTUM);
    let max_chunk = reference_size + ALIGNMENT_QUANTUM * rng.gen_range(min_quanta..=min_quanta + 8);
    let strategy = match rng.gen_range(0..3) {
        0 => Strategy::Sequential,
        1 => Strategy::PairedTransform,
        _ => Strategy::WorkerPartitioned { workers: Some(rng.gen_range(1..=MAX_WORKERS)) },
    };
    CorrelatorConfig::default()
        .with_max_chunk_size(max_chunk)
        .with_strategy(strategy)
}

fn check_trial(rng: &mut StdRng, inject: bool) -> Result<()> {
    let reference_size = rng.gen_range(MIN_REFERENCE..=MAX_REFERENCE);
    let data_size = reference_size + rng.gen_range(1..=MAX_DATA_MINUS_REFERENCE);
    let reference = random_signal(rng, reference_size);
    let mut data = random_signal(rng, data_size);

    if inject {
        let offset = rng.gen_range(MIN_REFERENCE..=MAX_REFERENCE)
            + rng.gen_range(1..=MAX_DATA_MINUS_REFERENCE);
        for (index, sample) in reference.iter().enumerate() {
            if let Some(slot) = data.get_mut(offset + index) {
                *slot += *sample;
            }
        }
    }

    let slow = brute_force_correlate(&reference, &data)?;
    let whole = CorrelatorConfig::default().with_max_chunk_size(DEFAULT_MAX_CHUNK_SIZE);
    for config in [whole, random_config(rng, reference_size)] {
        let mut correlator = CrossCorrelator::with_config(reference_size, data_size, &config)?;
        debug!(
            reference_size,
            data_size,
            chunk_size = correlator.chunk_size(),
            strategy = ?correlator.strategy(),
            "trial"
        );
        let fast = correlator.correlate_to_vec(&reference, &data)?;

        if let Some((lag, (f, s))) = fast
            .iter()
            .zip(&slow)
            .enumerate()
            .find(|(_, (f, s))| (*f - *s).abs() > TOLERANCE)
        {
            bail!(
                "test failure at reference_size={reference_size} data_size={data_size} \
                 chunk_size={} lag={lag} slow={s} vs. fast={f}",
                correlator.chunk_size()
            );
        }
    }
    Ok(())
}
