//! # Signal Buffer Module
//!
//! Fixed-length, 64-byte aligned buffers of complex single-precision samples.
//! Every other component of the crate exchanges data through [`Signal`].
//!
//! ## Features
//! - Alignment guaranteed by construction (no runtime checks at use sites)
//! - Zero-initialized on allocation
//! - Derefs to `[Complex32]`, so slicing and indexing work as usual

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use rustfft::num_complex::Complex32;

/// Alignment, in bytes, of every [`Signal`] allocation.
pub const SIGNAL_ALIGNMENT: usize = 64;

/// Returns true if `samples` starts on a [`SIGNAL_ALIGNMENT`] boundary.
#[inline]
pub fn is_aligned(samples: &[Complex32]) -> bool {
    samples.as_ptr() as usize % SIGNAL_ALIGNMENT == 0
}

/// An ordered, fixed-length sequence of complex samples.
///
/// The length is fixed at allocation; the contents are freely mutable.
pub struct Signal {
    ptr: NonNull<Complex32>,
    len: usize,
}

impl Signal {
    /// Allocates a zero-filled signal of `len` samples.
    ///
    /// # Panics
    /// * If `len` samples do not fit in the address space, like `Vec::with_capacity`
    pub fn new(len: usize) -> Self {
        if len == 0 {
            // Empty slices only need a non-null, aligned address.
            let ptr = std::ptr::without_provenance_mut::<Complex32>(SIGNAL_ALIGNMENT);
            return Self {
                // SAFETY: SIGNAL_ALIGNMENT is non-zero.
                ptr: unsafe { NonNull::new_unchecked(ptr) },
                len: 0,
            };
        }

        let layout = Self::layout(len);
        // SAFETY: layout has non-zero size. An all-zero bit pattern is a valid Complex32.
        let raw = unsafe { alloc_zeroed(layout) as *mut Complex32 };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        Self { ptr, len }
    }

    /// Allocates a signal holding a copy of `samples`.
    pub fn from_slice(samples: &[Complex32]) -> Self {
        let mut signal = Self::new(samples.len());
        signal.copy_from_slice(samples);
        signal
    }

    fn layout(len: usize) -> Layout {
        match Layout::array::<Complex32>(len).and_then(|layout| layout.align_to(SIGNAL_ALIGNMENT)) {
            Ok(layout) => layout,
            Err(_) => panic!("signal of {len} samples overflows the address space"),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[Complex32] {
        // SAFETY: ptr is valid for len initialized samples for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Complex32] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Zero-fills the buffer, then copies as much of `samples` as fits at the front.
    ///
    /// Returns the number of samples copied.
    pub fn load_zero_padded(&mut self, samples: &[Complex32]) -> usize {
        let count = samples.len().min(self.len);
        let buffer = self.as_mut_slice();
        buffer[..count].copy_from_slice(&samples[..count]);
        buffer[count..].fill(Complex32::new(0.0, 0.0));
        count
    }

    /// Sum of squared magnitudes of every sample.
    pub fn energy(&self) -> f32 {
        self.iter().map(|x| x.norm_sqr()).sum()
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated in `new` with exactly this layout.
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, Self::layout(self.len)) };
        }
    }
}

// Signal owns its allocation exclusively, like a Vec<Complex32>.
unsafe impl Send for Signal {}
unsafe impl Sync for Signal {}

impl Deref for Signal {
    type Target = [Complex32];

    fn deref(&self) -> &[Complex32] {
        self.as_slice()
    }
}

impl DerefMut for Signal {
    fn deref_mut(&mut self) -> &mut [Complex32] {
        self.as_mut_slice()
    }
}

impl Clone for Signal {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_slice())
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("len", &self.len).finish()
    }
}

impl From<&[Complex32]> for Signal {
    fn from(samples: &[Complex32]) -> Self {
        Self::from_slice(samples)
    }
}

impl From<Vec<Complex32>> for Signal {
    fn from(samples: Vec<Complex32>) -> Self {
        Self::from_slice(&samples)
    }
}

impl FromIterator<Complex32> for Signal {
    fn from_iter<I: IntoIterator<Item = Complex32>>(iter: I) -> Self {
        let samples: Vec<Complex32> = iter.into_iter().collect();
        Self::from_slice(&samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed_and_aligned() {
        for len in [1, 3, 64, 1000] {
            let signal = Signal::new(len);
            assert_eq!(signal.len(), len);
            assert!(is_aligned(&signal));
            assert!(signal.iter().all(|x| *x == Complex32::new(0.0, 0.0)));
        }
    }

    #[test]
    fn test_empty_signal() {
        let signal = Signal::new(0);
        assert!(signal.is_empty());
        assert!(is_aligned(&signal));
        assert_eq!(signal.as_slice(), &[] as &[Complex32]);
        let cloned = signal.clone();
        assert!(cloned.is_empty());
    }

    #[test]
    fn test_load_zero_padded_truncates_and_pads() {
        let mut signal = Signal::from_slice(&[Complex32::new(9.0, 9.0); 4]);
        let copied = signal.load_zero_padded(&[Complex32::new(1.0, 2.0), Complex32::new(3.0, 4.0)]);
        assert_eq!(copied, 2);
        assert_eq!(signal[1], Complex32::new(3.0, 4.0));
        assert_eq!(signal[2], Complex32::new(0.0, 0.0));
        assert_eq!(signal[3], Complex32::new(0.0, 0.0));

        let long: Vec<Complex32> = (0..10).map(|i| Complex32::new(i as f32, 0.0)).collect();
        assert_eq!(signal.load_zero_padded(&long), 4);
        assert_eq!(signal[3], Complex32::new(3.0, 0.0));
    }

    #[test]
    fn test_energy() {
        let signal: Signal = [Complex32::new(3.0, 4.0), Complex32::new(1.0, 0.0)]
            .into_iter()
            .collect();
        assert!((signal.energy() - 26.0).abs() < 1e-6);
    }

    #[test]
    fn test_unaligned_subslice_detected() {
        let signal = Signal::new(16);
        assert!(!is_aligned(&signal[1..]));
        assert!(is_aligned(&signal[8..]));
    }
}
