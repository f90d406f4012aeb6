//! The foreign call adapter: positional binding and status handling.
//!
//! Every kernel routine shares one fixed C signature: an ordered list of
//! input handles, an ordered list of output handles, routine-specific scalar
//! flags, and an integer status return where zero means success. The adapter
//! binds descriptors to that shape and interprets the status.
//!
//! Two policies live here deliberately:
//!
//! - the invocation itself holds no lock of any kind, so adapter calls made
//!   from independent chunks execute concurrently on separate cores
//! - a nonzero status is reported through `log::warn!` and returned as a
//!   [`KernelDiagnostic`] value, never as an `Err`; the output buffer is
//!   handed back with whatever the kernel wrote

use crate::buffer::{AnyBuf, ArrayBuf};
use crate::elem::KernelElem;
use crate::handle::{Descriptor, KernelArray};
use crate::missing::{condition_input, condition_output};
use crate::view::{ensure_contiguous, ArrayView};
use crate::{BridgeError, Result};
use std::borrow::Cow;
use std::fmt;
use std::os::raw::{c_double, c_int};

/// The fixed calling convention every kernel routine honors.
pub type KernelFn = unsafe extern "C" fn(
    inputs: *const *const KernelArray,
    n_inputs: c_int,
    outputs: *const *mut KernelArray,
    n_outputs: c_int,
    flags: *const KernelFlag,
    n_flags: c_int,
) -> c_int;

/// A routine-specific scalar option (cyclic-boundary switch, search radius,
/// method selector, ...), passed alongside the array handles.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelFlag {
    pub tag: c_int,
    pub int_val: c_int,
    pub dbl_val: c_double,
}

impl KernelFlag {
    const TAG_INT: c_int = 0;
    const TAG_DOUBLE: c_int = 1;

    /// An integer-valued flag.
    pub const fn int(value: i32) -> Self {
        Self {
            tag: Self::TAG_INT,
            int_val: value,
            dbl_val: 0.0,
        }
    }

    /// A double-valued flag.
    pub const fn double(value: f64) -> Self {
        Self {
            tag: Self::TAG_DOUBLE,
            int_val: 0,
            dbl_val: value,
        }
    }

    /// A boolean flag, encoded as 0/1.
    pub const fn boolean(value: bool) -> Self {
        Self::int(value as i32)
    }
}

/// One kernel routine: its name (for diagnostics), entry point, and the
/// number of trailing dimensions it processes jointly.
#[derive(Debug, Clone, Copy)]
pub struct KernelRoutine {
    name: &'static str,
    func: KernelFn,
    core_rank: usize,
}

impl KernelRoutine {
    /// Bind a kernel entry point.
    ///
    /// `core_rank` is the number of trailing dimensions the routine operates
    /// on jointly (2 for grid-to-grid interpolators, 1 for point
    /// interpolators); those dimensions must never be split across chunks.
    ///
    /// # Safety
    /// `func` must honor the calling convention of [`KernelFn`]: read only
    /// through the input handles, write only within the extents declared by
    /// the output handles, and return a status code.
    pub const unsafe fn new(name: &'static str, func: KernelFn, core_rank: usize) -> Self {
        Self {
            name,
            func,
            core_rank,
        }
    }

    /// Routine name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of trailing kernel-processed dimensions.
    pub fn core_rank(&self) -> usize {
        self.core_rank
    }
}

/// Nonzero status from a kernel call.
///
/// Never fatal: the call still returns its (possibly partially valid)
/// output. Callers that care must inspect the diagnostic channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDiagnostic {
    pub routine: &'static str,
    pub code: i32,
}

impl fmt::Display for KernelDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kernel routine {} returned nonzero status {}",
            self.routine, self.code
        )
    }
}

/// Invoke a routine over already-constructed descriptors, inputs first,
/// outputs last, in the order given.
///
/// No lock is held across the call; invocations from independent chunks run
/// concurrently. A nonzero status is logged as a warning and returned; the
/// output descriptors keep whatever the kernel wrote.
pub fn invoke(
    routine: &KernelRoutine,
    inputs: &[&Descriptor<'_>],
    outputs: &mut [&mut Descriptor<'_>],
    flags: &[KernelFlag],
) -> Option<KernelDiagnostic> {
    let input_ptrs: Vec<*const KernelArray> = inputs.iter().map(|d| d.handle_ptr()).collect();
    let output_ptrs: Vec<*mut KernelArray> = outputs
        .iter_mut()
        .map(|d| d.handle_mut_ptr())
        .collect();

    let status = unsafe {
        (routine.func)(
            input_ptrs.as_ptr(),
            input_ptrs.len() as c_int,
            output_ptrs.as_ptr(),
            output_ptrs.len() as c_int,
            flags.as_ptr(),
            flags.len() as c_int,
        )
    };

    if status == 0 {
        None
    } else {
        let diag = KernelDiagnostic {
            routine: routine.name,
            code: status,
        };
        log::warn!("{diag}");
        Some(diag)
    }
}

/// Output of one kernel call.
#[derive(Debug)]
pub struct CallResult<O: KernelElem> {
    /// The output buffer, valid even when `diagnostic` is set.
    pub output: ArrayBuf<O>,
    /// Nonzero-status report, if any.
    pub diagnostic: Option<KernelDiagnostic>,
}

/// Output of one runtime-typed kernel call.
#[derive(Debug)]
pub struct AnyCallResult {
    pub output: AnyBuf,
    pub diagnostic: Option<KernelDiagnostic>,
}

/// One configured invocation of a routine: flags plus an optional explicit
/// missing-value marker for the data argument.
///
/// [`KernelCall::invoke`] runs the whole single-block path: contiguity
/// enforcement, descriptor construction, missing-value conditioning, the
/// foreign call, and output conditioning.
pub struct KernelCall<'r> {
    routine: &'r KernelRoutine,
    flags: Vec<KernelFlag>,
    missing: Option<f64>,
}

impl<'r> KernelCall<'r> {
    /// Start configuring a call to `routine`.
    pub fn new(routine: &'r KernelRoutine) -> Self {
        Self {
            routine,
            flags: Vec::new(),
            missing: None,
        }
    }

    /// Append a scalar flag (flags are positional, like the handles).
    pub fn with_flag(mut self, flag: KernelFlag) -> Self {
        self.flags.push(flag);
        self
    }

    /// Declare the caller's explicit missing-value marker for the data
    /// argument. Without this, NaN marks missing data.
    pub fn with_missing_value(mut self, sentinel: f64) -> Self {
        self.missing = Some(sentinel);
        self
    }

    /// The routine this call is bound to.
    pub fn routine(&self) -> &KernelRoutine {
        self.routine
    }

    /// Run one full single-block call.
    ///
    /// `coords` are auxiliary inputs (coordinate arrays) bound before the
    /// data argument; they get contiguity enforcement but no missing-value
    /// conditioning. `data` is conditioned through a private working copy,
    /// so the caller's buffer stays externally stable. `out_shape` must
    /// repeat the data's leading dimensions and may replace the trailing
    /// `core_rank` dimensions freely.
    pub fn invoke<T: KernelElem>(
        &self,
        coords: &[ArrayView<'_, T>],
        data: &ArrayView<'_, T>,
        out_shape: &[usize],
    ) -> Result<CallResult<T::Output>> {
        let leading = data
            .ndim()
            .checked_sub(self.routine.core_rank)
            .ok_or(BridgeError::RankMismatch(data.ndim(), self.routine.core_rank))?;
        if out_shape.len() < leading || out_shape[..leading] != data.shape()[..leading] {
            return Err(BridgeError::ShapeMismatch(
                out_shape.to_vec(),
                data.shape().to_vec(),
            ));
        }

        let coord_bufs: Vec<Cow<'_, [T]>> = coords.iter().map(ensure_contiguous).collect();
        let mut work: Vec<T> = ensure_contiguous(data).into_owned();
        let cond = condition_input(&mut work, self.missing.map(T::from_f64));

        let mut output = ArrayBuf::<T::Output>::zeros(out_shape.to_vec());
        let diagnostic = {
            let mut input_descs: Vec<Descriptor<'_>> = Vec::with_capacity(coords.len() + 1);
            for (buf, view) in coord_bufs.iter().zip(coords) {
                input_descs.push(Descriptor::from_slice(buf, view.shape())?);
            }
            let mut data_desc = Descriptor::from_slice(&work, data.shape())?;
            cond.apply(&mut data_desc);
            input_descs.push(data_desc);

            let mut out_desc = Descriptor::from_slice_mut(output.as_mut_slice(), out_shape)?;

            let input_refs: Vec<&Descriptor<'_>> = input_descs.iter().collect();
            invoke(
                self.routine,
                &input_refs,
                &mut [&mut out_desc],
                &self.flags,
            )
        };
        condition_output(output.as_mut_slice());

        Ok(CallResult { output, diagnostic })
    }

    /// Runtime-typed variant of [`invoke`](Self::invoke): the element type
    /// is taken from the data buffer's tag and dispatched once.
    ///
    /// # Errors
    /// Fails with [`BridgeError::ElemTypeMismatch`] when a coordinate buffer
    /// disagrees with the data's element type.
    pub fn invoke_any(
        &self,
        coords: &[&AnyBuf],
        data: &AnyBuf,
        out_shape: &[usize],
    ) -> Result<AnyCallResult> {
        match data {
            AnyBuf::F32(buf) => self.invoke_typed(coords, buf, out_shape),
            AnyBuf::F64(buf) => self.invoke_typed(coords, buf, out_shape),
            AnyBuf::I32(buf) => self.invoke_typed(coords, buf, out_shape),
        }
    }

    fn invoke_typed<T>(
        &self,
        coords: &[&AnyBuf],
        data: &ArrayBuf<T>,
        out_shape: &[usize],
    ) -> Result<AnyCallResult>
    where
        T: KernelElem,
        AnyBuf: From<ArrayBuf<T::Output>>,
    {
        let views: Vec<ArrayView<'_, T>> = coords
            .iter()
            .map(|c| {
                T::unwrap_any(c)
                    .map(|b| b.view())
                    .ok_or(BridgeError::ElemTypeMismatch(c.elem_type(), T::TYPE))
            })
            .collect::<Result<_>>()?;
        let result = self.invoke(&views, &data.view(), out_shape)?;
        Ok(AnyCallResult {
            output: result.output.into(),
            diagnostic: result.diagnostic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::slice;

    // Stand-in that copies the data argument (the last input) to the
    // output, propagating elements equal to the advertised sentinel.
    unsafe extern "C" fn copy_f64(
        inputs: *const *const KernelArray,
        n_inputs: c_int,
        outputs: *const *mut KernelArray,
        _n_outputs: c_int,
        _flags: *const KernelFlag,
        _n_flags: c_int,
    ) -> c_int {
        let input = &**inputs.add(n_inputs as usize - 1);
        let output = &mut **outputs;
        let shape = slice::from_raw_parts(input.shape, input.ndim as usize);
        let len: usize = shape.iter().product();
        let src = slice::from_raw_parts(input.addr as *const f64, len);
        let dst = slice::from_raw_parts_mut(output.addr as *mut f64, len);
        dst.copy_from_slice(src);
        0
    }

    // Stand-in that records the missing-value contract it was handed:
    // out[0] = has_missing, out[1] = 1.0 iff the sentinel is the default fill.
    unsafe extern "C" fn probe_f64(
        inputs: *const *const KernelArray,
        n_inputs: c_int,
        outputs: *const *mut KernelArray,
        _n_outputs: c_int,
        _flags: *const KernelFlag,
        _n_flags: c_int,
    ) -> c_int {
        let input = &**inputs.add(n_inputs as usize - 1);
        let output = &mut **outputs;
        let dst = slice::from_raw_parts_mut(output.addr as *mut f64, 2);
        dst[0] = input.has_missing as f64;
        dst[1] = (input.missing.f64_val == crate::elem::FILL_F64) as i32 as f64;
        0
    }

    unsafe extern "C" fn always_fails(
        _inputs: *const *const KernelArray,
        _n_inputs: c_int,
        outputs: *const *mut KernelArray,
        _n_outputs: c_int,
        _flags: *const KernelFlag,
        _n_flags: c_int,
    ) -> c_int {
        let output = &mut **outputs;
        *(output.addr as *mut f64) = 42.0;
        7
    }

    #[test]
    fn test_invoke_binds_positionally() {
        let data = vec![1.0_f64, 2.0, 3.0];
        let desc = Descriptor::from_slice(&data, &[3]).unwrap();
        let mut out = vec![0.0_f64; 3];
        let mut out_desc = Descriptor::from_slice_mut(&mut out, &[3]).unwrap();

        let routine = unsafe { KernelRoutine::new("copy", copy_f64, 1) };
        let diag = invoke(&routine, &[&desc], &mut [&mut out_desc], &[]);
        assert!(diag.is_none());
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nonzero_status_is_diagnostic_not_error() {
        let data = vec![1.0_f64];
        let desc = Descriptor::from_slice(&data, &[1]).unwrap();
        let mut out = vec![0.0_f64];
        let mut out_desc = Descriptor::from_slice_mut(&mut out, &[1]).unwrap();

        let routine = unsafe { KernelRoutine::new("broken", always_fails, 1) };
        let diag = invoke(&routine, &[&desc], &mut [&mut out_desc], &[]).unwrap();
        assert_eq!(diag, KernelDiagnostic { routine: "broken", code: 7 });
        // partial output still comes back
        assert_eq!(out, vec![42.0]);
    }

    #[test]
    fn test_kernel_sees_missing_contract() {
        let routine = unsafe { KernelRoutine::new("probe", probe_f64, 1) };
        let data = ArrayBuf::from_vec(vec![1.0_f64, f64::NAN, 3.0], vec![3]).unwrap();

        let result = KernelCall::new(&routine)
            .invoke(&[], &data.view(), &[2])
            .unwrap();
        // has_missing was set and the synthetic sentinel is the default fill
        assert_eq!(result.output.as_slice()[0], 1.0);
        assert_eq!(result.output.as_slice()[1], 1.0);

        // caller buffer untouched: conditioning ran on a working copy
        assert!(data.as_slice()[1].is_nan());
    }

    #[test]
    fn test_out_shape_must_repeat_leading_dims() {
        let routine = unsafe { KernelRoutine::new("copy", copy_f64, 1) };
        let data = ArrayBuf::from_vec(vec![0.0_f64; 6], vec![2, 3]).unwrap();

        let err = KernelCall::new(&routine)
            .invoke(&[], &data.view(), &[3, 3])
            .unwrap_err();
        assert!(matches!(err, BridgeError::ShapeMismatch(..)));
    }

    #[test]
    fn test_invoke_any_rejects_mixed_types() {
        let routine = unsafe { KernelRoutine::new("copy", copy_f64, 1) };
        let coord = AnyBuf::F32(ArrayBuf::from_vec(vec![0.0_f32; 3], vec![3]).unwrap());
        let data = AnyBuf::F64(ArrayBuf::from_vec(vec![0.0_f64; 3], vec![3]).unwrap());

        let err = KernelCall::new(&routine)
            .invoke_any(&[&coord], &data, &[3])
            .unwrap_err();
        assert!(matches!(err, BridgeError::ElemTypeMismatch(..)));
    }

    #[test]
    fn test_flag_constructors() {
        assert_eq!(KernelFlag::boolean(true), KernelFlag::int(1));
        assert_eq!(KernelFlag::double(2.5).dbl_val, 2.5);
    }
}
