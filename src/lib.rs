//! Marshaling layer between host-owned numeric buffers and a compiled
//! grid-interpolation kernel library.
//!
//! The numeric kernels themselves (bilinear regridding, point interpolation,
//! and the like) live in a pre-compiled library reached through a fixed C
//! calling convention. This crate owns everything on the near side of that
//! boundary:
//!
//! - [`ArrayView`] / [`ArrayBuf`]: borrowed strided views and owned
//!   contiguous buffers over the supported element types, with
//!   [`ensure_contiguous`] guaranteeing the kernel never sees a strided
//!   argument
//! - [`Descriptor`]: pairs a caller-owned buffer with an exclusively owned
//!   [`KernelArray`] handle describing shape, element type and missing-value
//!   metadata to the kernel, zero-copy and freed exactly once on drop
//! - [`condition_input`] / [`condition_output`]: translate between the
//!   caller-facing NaN convention and the kernel's numeric sentinel
//!   convention on the way in and out
//! - [`KernelRoutine`] / [`KernelCall`]: bind descriptors positionally,
//!   invoke the routine with no lock held, and surface a nonzero status as a
//!   [`KernelDiagnostic`] warning rather than an error
//! - [`ChunkPlan`] / [`dispatch_chunked`]: fan one logical call out across
//!   independent blocks of the leading dimensions and reassemble the result
//!
//! # Example
//!
//! A stand-in kernel that doubles every element, invoked through the full
//! marshaling path:
//!
//! ```
//! use regrid_bridge::{ArrayBuf, KernelArray, KernelCall, KernelFlag, KernelRoutine};
//! use std::os::raw::c_int;
//!
//! unsafe extern "C" fn double_f64(
//!     inputs: *const *const KernelArray,
//!     n_inputs: c_int,
//!     outputs: *const *mut KernelArray,
//!     _n_outputs: c_int,
//!     _flags: *const KernelFlag,
//!     _n_flags: c_int,
//! ) -> c_int {
//!     let input = &**inputs.add(n_inputs as usize - 1);
//!     let output = &mut **outputs;
//!     let shape = std::slice::from_raw_parts(input.shape, input.ndim as usize);
//!     let len: usize = shape.iter().product();
//!     let src = std::slice::from_raw_parts(input.addr as *const f64, len);
//!     let dst = std::slice::from_raw_parts_mut(output.addr as *mut f64, len);
//!     for (d, s) in dst.iter_mut().zip(src) {
//!         *d = 2.0 * s;
//!     }
//!     0
//! }
//!
//! # fn main() -> regrid_bridge::Result<()> {
//! let routine = unsafe { KernelRoutine::new("double", double_f64, 1) };
//! let data = ArrayBuf::from_vec(vec![1.0_f64, 2.0, 3.0, 4.0, 5.0], vec![5])?;
//!
//! let result = KernelCall::new(&routine).invoke(&[], &data.view(), &[5])?;
//! assert!(result.diagnostic.is_none());
//! assert_eq!(result.output.as_slice(), &[2.0, 4.0, 6.0, 8.0, 10.0]);
//! # Ok(())
//! # }
//! ```
//!
//! # Missing values
//!
//! Callers mark missing data with NaN (or an explicit sentinel of their
//! own). The kernel cannot test NaN across mixed element types, so before a
//! call every NaN is replaced by the type-matched default fill value and the
//! handle's `has_missing`/sentinel fields are set; after the call every
//! output element equal to the fill value is rewritten back to NaN. See
//! [`condition_input`] and [`condition_output`].
//!
//! # Parallel dispatch
//!
//! With the default `parallel` feature, [`dispatch_chunked`] runs blocks on
//! the rayon thread pool. Each block owns its descriptors and working
//! buffers outright and the kernel invocation holds no shared lock, so
//! blocks scale across cores. Disabling the feature keeps the same API with
//! sequential execution.

mod adapter;
mod buffer;
mod chunk;
mod elem;
mod handle;
mod missing;
mod view;

pub use adapter::{
    invoke, AnyCallResult, CallResult, KernelCall, KernelDiagnostic, KernelFlag, KernelFn,
    KernelRoutine,
};
pub use buffer::{AnyBuf, ArrayBuf};
pub use chunk::{dispatch_chunked, ChunkPlan, DispatchResult};
pub use elem::{ElemType, KernelElem, FILL_F32, FILL_F64, FILL_I32};
pub use handle::{Descriptor, KernelArray, MissingValue};
pub use missing::{condition_input, condition_output, restore_input, InputConditioning};
pub use view::{ensure_contiguous, ArrayView};

/// Errors raised on the host side of the kernel boundary.
///
/// A nonzero kernel status is deliberately *not* represented here; it is a
/// non-fatal [`KernelDiagnostic`] returned alongside the output.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Element type tag outside the supported set.
    #[error("unsupported element type tag {0}")]
    UnsupportedElementType(i32),

    /// Buffers of different element types mixed in one call.
    #[error("element type mismatch: {0:?} vs {1:?}")]
    ElemTypeMismatch(ElemType, ElemType),

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Array shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Buffer length disagrees with the declared shape.
    #[error("buffer length {len} does not match shape {shape:?}")]
    BufferShape { len: usize, shape: Vec<usize> },

    /// Stride array length doesn't match dimensions.
    #[error("stride and shape length mismatch")]
    StrideLengthMismatch,

    /// View would reach outside the underlying buffer.
    #[error("view exceeds buffer bounds")]
    OutOfBounds,

    /// Chunk plan inconsistent with the array or with the output plan.
    /// Detected before any kernel call is made.
    #[error("chunk plan mismatch on dim {dim}: {detail}")]
    BlockMismatch { dim: usize, detail: String },
}

/// Result type for marshaling operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
