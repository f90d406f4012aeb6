//! Element types supported at the kernel boundary.
//!
//! The kernel identifies element types by an integer tag carried in every
//! array handle. The supported set is closed: the tag is decoded exactly
//! once, when a buffer enters the marshaling layer, and everything after
//! that point is monomorphized over [`KernelElem`].

use crate::buffer::{AnyBuf, ArrayBuf};
use crate::handle::MissingValue;
use crate::{BridgeError, Result};
use std::os::raw::c_int;

/// Default fill sentinel for `f64` buffers (the netCDF default fill value).
pub const FILL_F64: f64 = 9.969_209_968_386_869e36;

/// Default fill sentinel for `f32` buffers.
pub const FILL_F32: f32 = 9.969_209_968_386_869e36;

/// Default fill sentinel for `i32` buffers.
pub const FILL_I32: i32 = -2_147_483_647;

/// Kernel-facing element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    F32,
    F64,
    I32,
}

impl ElemType {
    /// The integer tag written into array handles.
    pub const fn tag(self) -> c_int {
        match self {
            ElemType::F32 => 0,
            ElemType::F64 => 1,
            ElemType::I32 => 2,
        }
    }

    /// Decode a foreign tag.
    ///
    /// # Errors
    /// Returns [`BridgeError::UnsupportedElementType`] for tags outside the
    /// supported set.
    pub fn from_tag(tag: c_int) -> Result<Self> {
        match tag {
            0 => Ok(ElemType::F32),
            1 => Ok(ElemType::F64),
            2 => Ok(ElemType::I32),
            other => Err(BridgeError::UnsupportedElementType(other)),
        }
    }

    /// Element type of kernel output produced from this input type.
    ///
    /// Double input yields double output; everything else yields float.
    pub const fn output(self) -> ElemType {
        match self {
            ElemType::F64 => ElemType::F64,
            _ => ElemType::F32,
        }
    }

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElemType::F32 => 4,
            ElemType::F64 => 8,
            ElemType::I32 => 4,
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
}

/// An element type the kernel can consume.
///
/// Implemented for `f32`, `f64` and `i32`; the set is sealed so the
/// tag-to-type mapping stays total.
pub trait KernelElem:
    Copy + PartialEq + Default + Send + Sync + std::fmt::Debug + sealed::Sealed + 'static
{
    /// Tag for this element type.
    const TYPE: ElemType;

    /// Type-matched default fill sentinel.
    const FILL: Self;

    /// Element type of kernel output computed from this input type.
    type Output: KernelElem;

    /// True for a floating-point NaN; always false for integer types.
    fn is_nan(self) -> bool;

    /// The NaN of this type, if it has one.
    fn nan() -> Option<Self>;

    /// Coerce a caller-supplied scalar to this element type.
    fn from_f64(value: f64) -> Self;

    /// Encode a sentinel into the handle's missing-value union.
    fn to_missing(self) -> MissingValue;

    /// Decode a sentinel from the missing-value union.
    ///
    /// # Safety
    /// The union must have been written through the same element type.
    unsafe fn from_missing(value: MissingValue) -> Self;

    /// Borrow the typed buffer out of a tagged one, if the types agree.
    fn unwrap_any(buf: &AnyBuf) -> Option<&ArrayBuf<Self>>;
}

impl KernelElem for f32 {
    const TYPE: ElemType = ElemType::F32;
    const FILL: f32 = FILL_F32;
    type Output = f32;

    #[inline]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }

    #[inline]
    fn nan() -> Option<f32> {
        Some(<f32 as num_traits::Float>::nan())
    }

    #[inline]
    fn from_f64(value: f64) -> f32 {
        num_traits::cast(value).unwrap_or(Self::FILL)
    }

    #[inline]
    fn to_missing(self) -> MissingValue {
        MissingValue { f32_val: self }
    }

    #[inline]
    unsafe fn from_missing(value: MissingValue) -> f32 {
        value.f32_val
    }

    fn unwrap_any(buf: &AnyBuf) -> Option<&ArrayBuf<f32>> {
        match buf {
            AnyBuf::F32(b) => Some(b),
            _ => None,
        }
    }
}

impl KernelElem for f64 {
    const TYPE: ElemType = ElemType::F64;
    const FILL: f64 = FILL_F64;
    type Output = f64;

    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    #[inline]
    fn nan() -> Option<f64> {
        Some(<f64 as num_traits::Float>::nan())
    }

    #[inline]
    fn from_f64(value: f64) -> f64 {
        value
    }

    #[inline]
    fn to_missing(self) -> MissingValue {
        MissingValue { f64_val: self }
    }

    #[inline]
    unsafe fn from_missing(value: MissingValue) -> f64 {
        value.f64_val
    }

    fn unwrap_any(buf: &AnyBuf) -> Option<&ArrayBuf<f64>> {
        match buf {
            AnyBuf::F64(b) => Some(b),
            _ => None,
        }
    }
}

impl KernelElem for i32 {
    const TYPE: ElemType = ElemType::I32;
    const FILL: i32 = FILL_I32;
    type Output = f32;

    #[inline]
    fn is_nan(self) -> bool {
        false
    }

    #[inline]
    fn nan() -> Option<i32> {
        None
    }

    #[inline]
    fn from_f64(value: f64) -> i32 {
        num_traits::cast(value).unwrap_or(Self::FILL)
    }

    #[inline]
    fn to_missing(self) -> MissingValue {
        MissingValue { i32_val: self }
    }

    #[inline]
    unsafe fn from_missing(value: MissingValue) -> i32 {
        value.i32_val
    }

    fn unwrap_any(buf: &AnyBuf) -> Option<&ArrayBuf<i32>> {
        match buf {
            AnyBuf::I32(b) => Some(b),
            _ => None,
        }
    }
}
