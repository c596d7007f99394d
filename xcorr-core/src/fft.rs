//! # Fast Fourier Transform (FFT) Module
//!
//! This module wraps RustFFT behind a small transform engine used by the
//! cross-correlator. It provides reusable fixed-length plans and the
//! process-wide engine lifecycle.
//!
//! ## Features
//! - Forward and inverse complex single-precision plans of a fixed length
//! - Plans execute against any matching buffer pair, so one plan serves many workers
//! - Explicit engine lifecycle: `initialize` once at start-up, `shutdown` at exit
//! - Optional strict 64-byte alignment checking for raw slices
//!
//! ## Engine requirement
//! A plan may be executed concurrently from several threads as long as each
//! execution gets its own input, output and scratch buffers. RustFFT plans are
//! `Arc<dyn Fft<f32>>` and keep no mutable state of their own, which is what
//! makes this sound.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use rustfft::{num_complex::Complex32, Fft, FftDirection, FftPlanner};
use tracing::debug;

use crate::error::{Result, XcorrError};
use crate::signal::{is_aligned, Signal, SIGNAL_ALIGNMENT};

/// The process-wide engine, created by [`FftEngine::initialize`].
static GLOBAL_ENGINE: OnceCell<FftEngine> = OnceCell::new();

/// Direction of a transform plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    /// Unnormalized: forward followed by inverse scales by the length.
    Inverse,
}

impl From<Direction> for FftDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => FftDirection::Forward,
            Direction::Inverse => FftDirection::Inverse,
        }
    }
}

/// Number of worker threads the engine uses by default.
///
/// Roughly half of the available hardware concurrency, and never less than one.
pub fn default_thread_count() -> usize {
    let hardware = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if hardware > 1 { hardware / 2 } else { 1 }
}

/// Owns the planner cache and the worker-thread configuration.
///
/// Most callers use the single process-wide instance via [`FftEngine::initialize`].
/// Standalone engines can be built with [`FftEngine::new`] for scoped use.
pub struct FftEngine {
    threads: usize,
    planner: Mutex<FftPlanner<f32>>,
    active: AtomicBool,
}

impl FftEngine {
    /// Creates a standalone engine using `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            planner: Mutex::new(FftPlanner::new()),
            active: AtomicBool::new(true),
        }
    }

    /// Returns the process-wide engine, creating it on first use.
    ///
    /// Idempotent: every call after the first returns the same instance with
    /// the thread count chosen the first time.
    pub fn initialize() -> &'static FftEngine {
        GLOBAL_ENGINE.get_or_init(|| {
            let engine = FftEngine::new(default_thread_count());
            debug!(threads = engine.threads, "transform engine initialized");
            engine
        })
    }

    /// Worker threads this engine hands out to multi-worker strategies.
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Builds a plan of `len` points in the given direction.
    ///
    /// # Errors
    /// * `EngineShutdown` after [`FftEngine::shutdown`]
    /// * `InvalidInput` for a zero-length plan
    pub fn plan(&self, len: usize, direction: Direction) -> Result<FftPlan> {
        if !self.is_active() {
            return Err(XcorrError::EngineShutdown);
        }
        if len == 0 {
            return Err(XcorrError::invalid_input("transform length must be at least 1"));
        }

        let mut planner = self.planner.lock().unwrap_or_else(|e| e.into_inner());
        let fft = planner.plan_fft(len, direction.into());
        Ok(FftPlan {
            fft,
            direction,
            alignment_strict: true,
        })
    }

    /// Releases the cached planner state and refuses any further plans.
    ///
    /// Plans created before shutdown keep working until they are dropped.
    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let mut planner = self.planner.lock().unwrap_or_else(|e| e.into_inner());
            *planner = FftPlanner::new();
            debug!("transform engine shut down");
        }
    }
}

impl fmt::Debug for FftEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftEngine")
            .field("threads", &self.threads)
            .field("active", &self.is_active())
            .finish()
    }
}

/// An immutable transform plan of fixed length and direction.
///
/// Cloning is cheap and shares the underlying RustFFT plan.
#[derive(Clone)]
pub struct FftPlan {
    fft: Arc<dyn Fft<f32>>,
    direction: Direction,
    alignment_strict: bool,
}

impl FftPlan {
    pub fn len(&self) -> usize {
        self.fft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enables or disables the alignment check in [`FftPlan::execute_slices`].
    pub fn with_alignment_strict(mut self, strict: bool) -> Self {
        self.alignment_strict = strict;
        self
    }

    /// Scratch samples each execution needs.
    pub fn scratch_len(&self) -> usize {
        self.fft.get_outofplace_scratch_len()
    }

    /// Allocates a scratch buffer sized for this plan.
    pub fn make_scratch(&self) -> Vec<Complex32> {
        vec![Complex32::new(0.0, 0.0); self.scratch_len()]
    }

    /// Transforms `input` into `output`.
    ///
    /// `input` is used as working space and its contents are unspecified afterwards.
    /// Signals are aligned by construction, so only lengths are checked.
    pub fn execute(
        &self,
        input: &mut Signal,
        output: &mut Signal,
        scratch: &mut [Complex32],
    ) -> Result<()> {
        self.check_lengths(input, output, scratch)?;
        self.run(input, output, scratch);
        Ok(())
    }

    /// Like [`FftPlan::execute`] for arbitrary slices.
    ///
    /// # Errors
    /// * `InvalidInput` if either buffer is not exactly `len()` samples or scratch is too short
    /// * `Alignment` if the plan is alignment-strict and a buffer is not 64-byte aligned
    pub fn execute_slices(
        &self,
        input: &mut [Complex32],
        output: &mut [Complex32],
        scratch: &mut [Complex32],
    ) -> Result<()> {
        self.check_lengths(input, output, scratch)?;
        if self.alignment_strict {
            for buffer in [&*input, &*output] {
                if !is_aligned(buffer) {
                    return Err(XcorrError::Alignment {
                        address: buffer.as_ptr() as usize,
                        required: SIGNAL_ALIGNMENT,
                    });
                }
            }
        }
        self.run(input, output, scratch);
        Ok(())
    }

    fn check_lengths(
        &self,
        input: &[Complex32],
        output: &[Complex32],
        scratch: &[Complex32],
    ) -> Result<()> {
        let len = self.len();
        if input.len() != len || output.len() != len {
            return Err(XcorrError::invalid_input(format!(
                "transform of {} points given buffers of {} and {} samples",
                len,
                input.len(),
                output.len()
            )));
        }
        if scratch.len() < self.scratch_len() {
            return Err(XcorrError::invalid_input(format!(
                "transform scratch needs {} samples, got {}",
                self.scratch_len(),
                scratch.len()
            )));
        }
        Ok(())
    }

    fn run(&self, input: &mut [Complex32], output: &mut [Complex32], scratch: &mut [Complex32]) {
        let needed = self.scratch_len();
        self.fft
            .process_outofplace_with_scratch(input, output, &mut scratch[..needed]);
    }
}

impl fmt::Debug for FftPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftPlan")
            .field("len", &self.len())
            .field("direction", &self.direction)
            .field("alignment_strict", &self.alignment_strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize, at: usize) -> Signal {
        let mut signal = Signal::new(len);
        signal[at] = Complex32::new(1.0, 0.0);
        signal
    }

    #[test]
    fn test_forward_of_impulse_is_flat() {
        let engine = FftEngine::new(1);
        let plan = engine.plan(16, Direction::Forward).unwrap();
        let mut input = impulse(16, 0);
        let mut output = Signal::new(16);
        let mut scratch = plan.make_scratch();
        plan.execute(&mut input, &mut output, &mut scratch).unwrap();
        for bin in output.iter() {
            assert!((*bin - Complex32::new(1.0, 0.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn test_inverse_is_unnormalized() {
        let engine = FftEngine::new(1);
        let forward = engine.plan(8, Direction::Forward).unwrap();
        let inverse = engine.plan(8, Direction::Inverse).unwrap();
        let original = impulse(8, 3);
        let mut input = original.clone();
        let mut spectrum = Signal::new(8);
        let mut restored = Signal::new(8);
        let mut scratch = forward.make_scratch();
        scratch.resize(forward.scratch_len().max(inverse.scratch_len()), Complex32::new(0.0, 0.0));

        forward.execute(&mut input, &mut spectrum, &mut scratch).unwrap();
        inverse.execute(&mut spectrum, &mut restored, &mut scratch).unwrap();

        for (got, want) in restored.iter().zip(original.iter()) {
            assert!((*got - *want * 8.0).norm() < 1e-5);
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let engine = FftEngine::new(1);
        let plan = engine.plan(8, Direction::Forward).unwrap();
        let mut input = Signal::new(8);
        let mut output = Signal::new(4);
        let mut scratch = plan.make_scratch();
        let err = plan.execute(&mut input, &mut output, &mut scratch).unwrap_err();
        assert!(matches!(err, XcorrError::InvalidInput(_)));
    }

    #[test]
    fn test_unaligned_slice_rejected_when_strict() {
        let engine = FftEngine::new(1);
        let plan = engine.plan(8, Direction::Forward).unwrap();
        let mut input = Signal::new(9);
        let mut output = Signal::new(8);
        let mut scratch = plan.make_scratch();

        let err = plan
            .execute_slices(&mut input[1..], &mut output, &mut scratch)
            .unwrap_err();
        assert!(matches!(err, XcorrError::Alignment { required: 64, .. }));

        let relaxed = plan.with_alignment_strict(false);
        relaxed
            .execute_slices(&mut input[1..], &mut output, &mut scratch)
            .unwrap();
    }

    #[test]
    fn test_shutdown_refuses_new_plans() {
        let engine = FftEngine::new(2);
        let plan = engine.plan(4, Direction::Forward).unwrap();
        engine.shutdown();
        assert!(!engine.is_active());
        assert_eq!(engine.plan(4, Direction::Forward).unwrap_err(), XcorrError::EngineShutdown);

        // Existing plans stay usable.
        let mut input = impulse(4, 0);
        let mut output = Signal::new(4);
        let mut scratch = plan.make_scratch();
        plan.execute(&mut input, &mut output, &mut scratch).unwrap();

        // A second shutdown is a no-op.
        engine.shutdown();
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let first = FftEngine::initialize();
        let second = FftEngine::initialize();
        assert!(std::ptr::eq(first, second));
        assert!(first.threads() >= 1);
    }

    #[test]
    fn test_zero_length_plan_rejected() {
        let engine = FftEngine::new(1);
        assert!(matches!(
            engine.plan(0, Direction::Inverse),
            Err(XcorrError::InvalidInput(_))
        ));
    }
}
