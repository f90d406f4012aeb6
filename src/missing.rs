//! Missing-value marshaling between the NaN and sentinel conventions.
//!
//! Callers mark missing data with NaN; the kernel recognizes missing data by
//! comparing against a concrete numeric sentinel carried in the array
//! handle, because it cannot test NaN uniformly across element types. This
//! module performs the translation in both directions:
//!
//! - [`condition_input`] before the call: find the missing positions,
//!   substitute a synthetic sentinel for NaN where necessary, and record
//!   what was done
//! - [`condition_output`] after the call: rewrite the kernel's output
//!   sentinel back to NaN, the only point where the caller-facing convention
//!   is restored
//! - [`restore_input`] when a conditioned input buffer must come back to the
//!   caller NaN-bearing

use crate::elem::KernelElem;
use crate::handle::Descriptor;

/// Record of what input conditioning did to one buffer.
///
/// Transient: lives for a single kernel call.
#[derive(Debug, Clone)]
pub struct InputConditioning<T> {
    sentinel: T,
    has_missing: bool,
    mask: Vec<usize>,
    synthetic: bool,
}

impl<T: KernelElem> InputConditioning<T> {
    /// The sentinel the kernel will be told about.
    pub fn sentinel(&self) -> T {
        self.sentinel
    }

    /// Whether any element was missing.
    pub fn has_missing(&self) -> bool {
        self.has_missing
    }

    /// Positions (row-major) of the missing elements.
    pub fn mask(&self) -> &[usize] {
        &self.mask
    }

    /// True when NaNs were substituted with a synthetic sentinel and the
    /// buffer therefore differs from what the caller supplied.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Write sentinel and flag into a descriptor. Always called, even for an
    /// empty mask, so the kernel sees a consistent contract.
    pub fn apply(&self, desc: &mut Descriptor<'_>) {
        desc.set_sentinel(self.sentinel);
        desc.mark_has_missing(self.has_missing);
    }
}

/// Condition an input buffer for the kernel.
///
/// With no sentinel (or a NaN one), missing positions are the NaNs; they are
/// overwritten in place with the type-default fill value, which becomes the
/// synthetic sentinel. With a concrete sentinel, missing positions are the
/// exact matches and the buffer is left untouched.
pub fn condition_input<T: KernelElem>(data: &mut [T], sentinel: Option<T>) -> InputConditioning<T> {
    match sentinel {
        Some(s) if !s.is_nan() => {
            let mask: Vec<usize> = data
                .iter()
                .enumerate()
                .filter(|(_, &v)| v == s)
                .map(|(i, _)| i)
                .collect();
            InputConditioning {
                sentinel: s,
                has_missing: !mask.is_empty(),
                mask,
                synthetic: false,
            }
        }
        _ => {
            let mask: Vec<usize> = data
                .iter()
                .enumerate()
                .filter(|(_, &v)| v.is_nan())
                .map(|(i, _)| i)
                .collect();
            let sentinel = T::FILL;
            for &i in &mask {
                data[i] = sentinel;
            }
            InputConditioning {
                sentinel,
                has_missing: !mask.is_empty(),
                mask,
                synthetic: true,
            }
        }
    }
}

/// Put NaN back at the substituted positions of a conditioned input buffer.
///
/// Needed when the caller expects the buffer to remain NaN-bearing after the
/// call: the kernel may have left the synthetic sentinel in place or mutated
/// it. No-op for explicit-sentinel conditioning.
pub fn restore_input<T: KernelElem>(data: &mut [T], cond: &InputConditioning<T>) {
    if !cond.synthetic {
        return;
    }
    if let Some(nan) = T::nan() {
        for &i in &cond.mask {
            data[i] = nan;
        }
    }
}

/// Condition a kernel output buffer for the caller.
///
/// Every element equal to the type-default output sentinel becomes NaN; no
/// other element is altered.
pub fn condition_output<T: KernelElem>(data: &mut [T]) {
    if let Some(nan) = T::nan() {
        for v in data.iter_mut() {
            if *v == T::FILL {
                *v = nan;
            }
        }
    }
}
