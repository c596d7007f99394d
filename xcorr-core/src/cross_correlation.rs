//! # Overlap-Save Cross-Correlation Module
//!
//! Correlates a short reference against every lag of a long data signal in
//! near-linear time. The data is cut into windows of `C` samples (the chunk
//! size); each window is transformed, multiplied by the conjugate of the
//! reference spectrum and transformed back. Only the first `C − R` lags of
//! each window are free of circular wrap-around, so windows advance by that
//! interval and the remaining `R` lags are discarded.
//!
//! ## Features
//! - Plans and buffers allocated once per (R, D, chunk size) and reused across calls
//! - Sequential, worker-partitioned and paired-transform scheduling
//! - Output identical to [`crate::brute_force`] up to floating-point error
//!
//! ## Concurrency
//! The reference spectrum and its power are computed once, before any worker
//! starts, and are only read afterwards. Every worker owns its data buffers and
//! scratch space and writes a disjoint set of output windows, so the result
//! does not depend on scheduling.

use std::fmt;
use std::panic::resume_unwind;
use std::thread;

use rustfft::num_complex::Complex32;
use tracing::{debug, trace, warn};

use crate::config::{chunk_size, CorrelatorConfig, Strategy, ALIGNMENT_QUANTUM};
use crate::error::{Result, XcorrError};
use crate::fft::{Direction, FftEngine, FftPlan};
use crate::signal::Signal;

/// FFT-based overlap-save cross-correlator for fixed reference and data lengths.
pub struct CrossCorrelator {
    reference_length: usize,
    data_length: usize,
    chunk_size: usize,
    strategy: Strategy,
    reference: ReferenceStage,
    data_plan: FftPlan,
    inverse_plan: FftPlan,
    workers: Vec<WindowWorker>,
}

/// Reference buffers and the plan that turns them into a spectrum.
struct ReferenceStage {
    samples: Signal,
    spectrum: Signal,
    scratch: Vec<Complex32>,
    plan: FftPlan,
}

impl ReferenceStage {
    /// Zero-pads and transforms `reference`, returning the spectrum's power.
    fn transform(&mut self, reference: &[Complex32]) -> Result<f32> {
        self.samples.load_zero_padded(reference);
        self.plan
            .execute(&mut self.samples, &mut self.spectrum, &mut self.scratch)?;
        Ok(self.spectrum.energy())
    }
}

/// Read-only state every window needs, shared by all workers during a call.
#[derive(Clone, Copy)]
struct WindowContext<'a> {
    data_plan: &'a FftPlan,
    inverse_plan: &'a FftPlan,
    reference_spectrum: &'a [Complex32],
    reference_power: f32,
    data: &'a [Complex32],
}

/// Buffers owned by one worker: time-domain window, its spectrum, and scratch.
struct WindowWorker {
    window: Signal,
    spectrum: Signal,
    scratch: Vec<Complex32>,
}

impl WindowWorker {
    fn new(chunk_size: usize, scratch_len: usize) -> Self {
        Self {
            window: Signal::new(chunk_size),
            spectrum: Signal::new(chunk_size),
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }

    /// Loads the window starting at `offset` (zero-padding past the end) and transforms it.
    fn forward(&mut self, data_plan: &FftPlan, data: &[Complex32], offset: usize) -> Result<()> {
        self.window.load_zero_padded(&data[offset..]);
        data_plan.execute(&mut self.window, &mut self.spectrum, &mut self.scratch)
    }

    /// Forms the cross-power spectrum, inverts it, and writes the valid lags to `output`.
    fn finish(
        &mut self,
        inverse_plan: &FftPlan,
        reference_spectrum: &[Complex32],
        reference_power: f32,
        output: &mut [f32],
    ) -> Result<()> {
        for (bin, reference) in self.spectrum.iter_mut().zip(reference_spectrum) {
            *bin *= reference.conj();
        }
        inverse_plan.execute(&mut self.spectrum, &mut self.window, &mut self.scratch)?;

        // output is at most `interval` long; later lags are wrap-around.
        for (slot, sample) in output.iter_mut().zip(self.window.iter()) {
            *slot = sample.norm() / reference_power;
        }
        Ok(())
    }

    fn process(
        &mut self,
        context: &WindowContext<'_>,
        offset: usize,
        output: &mut [f32],
    ) -> Result<()> {
        self.forward(context.data_plan, context.data, offset)?;
        self.finish(
            context.inverse_plan,
            context.reference_spectrum,
            context.reference_power,
            output,
        )?;
        trace!(offset, lags = output.len(), "window correlated");
        Ok(())
    }
}

impl CrossCorrelator {
    /// Builds a correlator with the default configuration and the given chunk cap.
    ///
    /// # Errors
    /// * `InvalidInput` unless `1 <= reference_length <= data_length`
    /// * `Configuration` if the chunk size leaves an unaligned wrap-around region
    pub fn new(reference_length: usize, data_length: usize, max_chunk_size: usize) -> Result<Self> {
        Self::with_config(
            reference_length,
            data_length,
            &CorrelatorConfig::default().with_max_chunk_size(max_chunk_size),
        )
    }

    /// Builds a correlator on the process-wide transform engine.
    pub fn with_config(
        reference_length: usize,
        data_length: usize,
        config: &CorrelatorConfig,
    ) -> Result<Self> {
        Self::with_engine(FftEngine::initialize(), reference_length, data_length, config)
    }

    /// Builds a correlator whose plans come from `engine`.
    pub fn with_engine(
        engine: &FftEngine,
        reference_length: usize,
        data_length: usize,
        config: &CorrelatorConfig,
    ) -> Result<Self> {
        if reference_length < 1 {
            return Err(XcorrError::invalid_input("reference length must be at least 1"));
        }
        if data_length < 1 {
            return Err(XcorrError::invalid_input("data length must be at least 1"));
        }
        if reference_length > data_length {
            return Err(XcorrError::invalid_input(format!(
                "reference length {reference_length} cannot be longer than \
                 data length {data_length}"
            )));
        }

        let chunk_size = chunk_size(reference_length, data_length, config.max_chunk_size);
        let interval = chunk_size - reference_length;
        let unaligned = interval % ALIGNMENT_QUANTUM != 0;
        if config.alignment_strict && chunk_size < data_length && unaligned {
            return Err(XcorrError::Configuration(format!(
                "max_chunk_size {} leads to unaligned access: \
                 chunk {} minus reference {} is not a multiple of {}",
                config.max_chunk_size, chunk_size, reference_length, ALIGNMENT_QUANTUM
            )));
        }

        let plan = |direction| {
            engine
                .plan(chunk_size, direction)
                .map(|plan| plan.with_alignment_strict(config.alignment_strict))
        };
        let reference_plan = plan(Direction::Forward)?;
        let data_plan = plan(Direction::Forward)?;
        let inverse_plan = plan(Direction::Inverse)?;

        let window_count = (data_length - reference_length).div_ceil(interval);
        let worker_count = resolve_worker_count(config.strategy, engine, window_count);
        let scratch_len = data_plan.scratch_len().max(inverse_plan.scratch_len());
        let workers = (0..worker_count)
            .map(|_| WindowWorker::new(chunk_size, scratch_len))
            .collect();

        let reference = ReferenceStage {
            samples: Signal::new(chunk_size),
            spectrum: Signal::new(chunk_size),
            scratch: reference_plan.make_scratch(),
            plan: reference_plan,
        };

        debug!(
            reference_length,
            data_length,
            chunk_size,
            interval,
            window_count,
            workers = worker_count,
            strategy = ?config.strategy,
            "cross-correlator constructed"
        );

        Ok(Self {
            reference_length,
            data_length,
            chunk_size,
            strategy: config.strategy,
            reference,
            data_plan,
            inverse_plan,
            workers,
        })
    }

    pub fn reference_length(&self) -> usize {
        self.reference_length
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Length of each transform window.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Artifact-free lags produced per window (`chunk_size - reference_length`).
    pub fn interval(&self) -> usize {
        self.chunk_size - self.reference_length
    }

    /// Windows that produce output in each call.
    pub fn window_count(&self) -> usize {
        self.output_length().div_ceil(self.interval())
    }

    /// Exact length `correlate` expects for its output buffer.
    pub fn output_length(&self) -> usize {
        self.data_length - self.reference_length
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Writes the normalized correlation magnitude for every lag into `output`.
    ///
    /// `output[lag] = |Σ data[lag + i] · conj(reference[i])| / Σ |reference[i]|²`,
    /// the same quantity [`crate::brute_force::brute_force_correlate`] computes.
    /// A zero-energy reference yields non-finite values; callers that need
    /// robustness must check the reference energy first.
    ///
    /// # Errors
    /// * `InvalidInput` if any length differs from the one the correlator was built for
    pub fn correlate(
        &mut self,
        reference: &[Complex32],
        data: &[Complex32],
        output: &mut [f32],
    ) -> Result<()> {
        self.check_lengths(reference, data, output)?;

        let interval = self.interval();
        let Self {
            strategy,
            reference: reference_stage,
            data_plan,
            inverse_plan,
            workers,
            ..
        } = self;

        match strategy {
            Strategy::PairedTransform => correlate_paired(
                reference_stage,
                data_plan,
                inverse_plan,
                &mut workers[0],
                reference,
                data,
                output,
                interval,
            ),
            Strategy::Sequential | Strategy::WorkerPartitioned { .. } => {
                let reference_power = reference_stage.transform(reference)?;
                let context = WindowContext {
                    data_plan,
                    inverse_plan,
                    reference_spectrum: &reference_stage.spectrum,
                    reference_power,
                    data,
                };
                if workers.len() == 1 {
                    correlate_sequential(&mut workers[0], &context, output, interval)
                } else {
                    correlate_partitioned(workers, &context, output, interval)
                }
            }
        }
    }

    /// Allocating form of [`CrossCorrelator::correlate`].
    pub fn correlate_to_vec(
        &mut self,
        reference: &[Complex32],
        data: &[Complex32],
    ) -> Result<Vec<f32>> {
        let mut output = vec![0.0; self.output_length()];
        self.correlate(reference, data, &mut output)?;
        Ok(output)
    }

    fn check_lengths(
        &self,
        reference: &[Complex32],
        data: &[Complex32],
        output: &[f32],
    ) -> Result<()> {
        if reference.len() != self.reference_length {
            return Err(XcorrError::invalid_input(format!(
                "invalid reference length {} (expected {})",
                reference.len(),
                self.reference_length
            )));
        }
        if data.len() != self.data_length {
            return Err(XcorrError::invalid_input(format!(
                "invalid data length {} (expected {})",
                data.len(),
                self.data_length
            )));
        }
        if output.len() != self.output_length() {
            return Err(XcorrError::invalid_input(format!(
                "invalid output length {} (must be data_length - reference_length = {})",
                output.len(),
                self.output_length()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CrossCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossCorrelator")
            .field("reference_length", &self.reference_length)
            .field("data_length", &self.data_length)
            .field("chunk_size", &self.chunk_size)
            .field("strategy", &self.strategy)
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn resolve_worker_count(strategy: Strategy, engine: &FftEngine, window_count: usize) -> usize {
    match strategy {
        Strategy::Sequential | Strategy::PairedTransform => 1,
        Strategy::WorkerPartitioned { workers } => {
            let requested = workers.unwrap_or_else(|| engine.threads());
            if requested == 0 {
                warn!("worker-partitioned strategy asked for 0 workers, using 1");
            }
            // Workers beyond the window count would never receive work.
            requested.clamp(1, window_count.max(1))
        }
    }
}

fn correlate_sequential(
    worker: &mut WindowWorker,
    context: &WindowContext<'_>,
    output: &mut [f32],
    interval: usize,
) -> Result<()> {
    for (index, window) in output.chunks_mut(interval).enumerate() {
        worker.process(context, index * interval, window)?;
    }
    Ok(())
}

/// Deals windows round-robin: worker `k` handles windows `k, k + N, k + 2N, ...`.
fn correlate_partitioned(
    workers: &mut [WindowWorker],
    context: &WindowContext<'_>,
    output: &mut [f32],
    interval: usize,
) -> Result<()> {
    let worker_count = workers.len();
    let mut assignments: Vec<Vec<(usize, &mut [f32])>> =
        (0..worker_count).map(|_| Vec::new()).collect();
    for (index, window) in output.chunks_mut(interval).enumerate() {
        assignments[index % worker_count].push((index * interval, window));
    }

    thread::scope(|scope| {
        let handles: Vec<_> = workers
            .iter_mut()
            .zip(assignments)
            .filter(|(_, windows)| !windows.is_empty())
            .map(|(worker, windows)| {
                scope.spawn(move || -> Result<()> {
                    for (offset, window) in windows {
                        worker.process(context, offset, window)?;
                    }
                    Ok(())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| resume_unwind(panic)))
            .collect::<Result<()>>()
    })
}

/// Overlaps the reference transform with the first data transform, then runs serially.
#[allow(clippy::too_many_arguments)]
fn correlate_paired(
    reference_stage: &mut ReferenceStage,
    data_plan: &FftPlan,
    inverse_plan: &FftPlan,
    worker: &mut WindowWorker,
    reference: &[Complex32],
    data: &[Complex32],
    output: &mut [f32],
    interval: usize,
) -> Result<()> {
    let mut windows = output.chunks_mut(interval);
    let Some(first) = windows.next() else {
        return Ok(());
    };

    let (reference_power, first_forward) = thread::scope(|scope| {
        let reference_job = scope.spawn(|| reference_stage.transform(reference));
        let first_forward = worker.forward(data_plan, data, 0);
        let reference_power = reference_job.join().unwrap_or_else(|panic| resume_unwind(panic));
        (reference_power, first_forward)
    });
    let reference_power = reference_power?;
    first_forward?;

    worker.finish(inverse_plan, &reference_stage.spectrum, reference_power, first)?;

    let context = WindowContext {
        data_plan,
        inverse_plan,
        reference_spectrum: &reference_stage.spectrum,
        reference_power,
        data,
    };
    for (index, window) in windows.enumerate() {
        worker.process(&context, (index + 1) * interval, window)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute_force::brute_force_correlate;

    fn ramp(len: usize, seed: f32) -> Vec<Complex32> {
        (0..len)
            .map(|i| {
                let t = i as f32 + seed;
                Complex32::new((t * 0.37).sin() * 1000.0, (t * 0.11).cos() * 700.0)
            })
            .collect()
    }

    fn assert_close(fast: &[f32], slow: &[f32]) {
        assert_eq!(fast.len(), slow.len());
        for (lag, (f, s)) in fast.iter().zip(slow).enumerate() {
            assert!((f - s).abs() < 1e-4, "lag {lag}: fast {f} vs slow {s}");
        }
    }

    #[test]
    fn test_impulse_scenario() {
        let reference = [
            Complex32::new(1.0, 0.0),
            Complex32::new(0.0, 0.0),
            Complex32::new(0.0, 0.0),
            Complex32::new(0.0, 0.0),
        ];
        let mut data = Signal::new(10);
        data[3] = Complex32::new(1.0, 0.0);

        let mut correlator = CrossCorrelator::new(4, 10, 1 << 20).unwrap();
        let output = correlator.correlate_to_vec(&reference, &data).unwrap();
        assert_eq!(output.len(), 6);
        for (lag, value) in output.iter().enumerate() {
            let expected = if lag == 3 { 1.0 } else { 0.0 };
            assert!((value - expected).abs() < 1e-5, "lag {lag}: {value}");
        }
    }

    #[test]
    fn test_multi_window_matches_oracle_for_every_strategy() {
        let reference = ramp(64, 0.0);
        let data = ramp(5000, 3.0);
        let slow = brute_force_correlate(&reference, &data).unwrap();

        for strategy in [
            Strategy::Sequential,
            Strategy::PairedTransform,
            Strategy::WorkerPartitioned { workers: Some(3) },
        ] {
            // chunk 256 gives an interval of 192 = 3 * 64
            let config = CorrelatorConfig::default()
                .with_max_chunk_size(256)
                .with_strategy(strategy);
            let mut correlator = CrossCorrelator::with_config(64, 5000, &config).unwrap();
            assert_eq!(correlator.chunk_size(), 256);
            assert_eq!(correlator.interval(), 192);
            assert!(correlator.window_count() > 1);

            let fast = correlator.correlate_to_vec(&reference, &data).unwrap();
            assert_close(&fast, &slow);
        }
    }

    #[test]
    fn test_equal_lengths_produce_no_output() {
        let reference = ramp(32, 1.0);
        for strategy in [Strategy::Sequential, Strategy::PairedTransform, Strategy::default()] {
            let config = CorrelatorConfig::default().with_strategy(strategy);
            let mut correlator = CrossCorrelator::with_config(32, 32, &config).unwrap();
            assert_eq!(correlator.window_count(), 0);
            let mut output: Vec<f32> = Vec::new();
            correlator.correlate(&reference, &reference, &mut output).unwrap();
        }
    }

    #[test]
    fn test_construction_validation() {
        assert!(matches!(CrossCorrelator::new(0, 10, 64), Err(XcorrError::InvalidInput(_))));
        assert!(matches!(CrossCorrelator::new(1, 0, 64), Err(XcorrError::InvalidInput(_))));
        assert!(matches!(CrossCorrelator::new(11, 10, 64), Err(XcorrError::InvalidInput(_))));
    }

    #[test]
    fn test_unaligned_chunk_rejected_only_when_strict() {
        // chunk 1000 - reference 100 = 900, not a multiple of 64
        let err = CrossCorrelator::new(100, 10_000, 1000).unwrap_err();
        assert!(matches!(err, XcorrError::Configuration(_)));

        let relaxed = CorrelatorConfig::default()
            .with_max_chunk_size(1000)
            .with_alignment_strict(false);
        let correlator = CrossCorrelator::with_config(100, 10_000, &relaxed).unwrap();
        assert_eq!(correlator.interval(), 900);

        // A single window covering all the data is never checked.
        CrossCorrelator::new(100, 950, 1000).unwrap();
    }

    #[test]
    fn test_call_lengths_validated() {
        let mut correlator = CrossCorrelator::new(8, 100, 1 << 20).unwrap();
        let reference = ramp(8, 0.0);
        let data = ramp(100, 0.0);
        let mut output = vec![0.0; 92];

        assert!(correlator.correlate(&ramp(7, 0.0), &data, &mut output).is_err());
        assert!(correlator.correlate(&reference, &ramp(101, 0.0), &mut output).is_err());
        assert!(correlator.correlate(&reference, &data, &mut [0.0; 91]).is_err());
        correlator.correlate(&reference, &data, &mut output).unwrap();
    }

    #[test]
    fn test_worker_count_resolution() {
        let engine = FftEngine::new(4);
        let config = CorrelatorConfig::default().with_max_chunk_size(128);
        // interval 64, 1000 lags -> 16 windows
        let correlator = CrossCorrelator::with_engine(&engine, 64, 1064, &config).unwrap();
        assert_eq!(correlator.window_count(), 16);
        assert_eq!(correlator.worker_count(), 4);

        let eight = Strategy::WorkerPartitioned { workers: Some(8) };
        let few = CorrelatorConfig::default().with_strategy(eight);
        let correlator = CrossCorrelator::with_engine(&engine, 64, 1064, &few).unwrap();
        assert_eq!(correlator.window_count(), 1);
        assert_eq!(correlator.worker_count(), 1);

        let zero = config.with_strategy(Strategy::WorkerPartitioned { workers: Some(0) });
        let correlator = CrossCorrelator::with_engine(&engine, 64, 1064, &zero).unwrap();
        assert_eq!(correlator.worker_count(), 1);
    }

    #[test]
    fn test_shut_down_engine_refuses_construction() {
        let engine = FftEngine::new(1);
        engine.shutdown();
        let err = CrossCorrelator::with_engine(&engine, 4, 10, &CorrelatorConfig::default())
            .unwrap_err();
        assert_eq!(err, XcorrError::EngineShutdown);
    }
}
