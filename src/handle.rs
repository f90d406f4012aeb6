//! Managed array descriptors and the foreign array handle.
//!
//! [`KernelArray`] mirrors the C struct the kernel library consumes: a raw
//! data pointer, shape, element type tag and missing-value metadata. It
//! aliases caller-owned memory and owns none of it. [`Descriptor`] pairs one
//! handle with the buffer it describes for the duration of a single kernel
//! call: the handle is allocated at construction, borrows the buffer for
//! `'a`, and is freed exactly once when the descriptor drops. There is no
//! manual release to forget or to call twice.

use crate::buffer::ArrayBuf;
use crate::elem::{ElemType, KernelElem};
use crate::{BridgeError, Result};
use std::marker::PhantomData;
use std::os::raw::{c_int, c_void};

/// Type-punned missing-value sentinel, matching the kernel's union layout.
#[repr(C)]
#[derive(Clone, Copy)]
pub union MissingValue {
    pub f32_val: f32,
    pub f64_val: f64,
    pub i32_val: c_int,
}

/// The array handle struct the kernel reads, field for field.
///
/// `addr` points into a buffer the handle does not own; `shape` points into
/// the owning [`Descriptor`]. The sentinel is always populated (even with
/// `has_missing == 0`) so the kernel can branch uniformly.
#[repr(C)]
pub struct KernelArray {
    pub addr: *mut c_void,
    pub ndim: c_int,
    pub shape: *const usize,
    pub type_tag: c_int,
    pub has_missing: c_int,
    pub missing: MissingValue,
}

/// A caller buffer paired with its exclusively owned foreign handle.
///
/// Constructed immediately before a kernel call and dropped immediately
/// after its output has been consumed. Dropping frees only the handle,
/// never the buffer. The borrow on the buffer keeps `addr` valid for the
/// descriptor's whole lifetime, and raw pointers keep descriptors pinned to
/// the thread that built them.
pub struct Descriptor<'a> {
    handle: Box<KernelArray>,
    // KernelArray::shape points into this allocation; heap placement keeps
    // the pointer stable when the descriptor moves.
    shape: Box<[usize]>,
    elem: ElemType,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl<'a> Descriptor<'a> {
    /// Describe a read-only input buffer.
    ///
    /// Zero-copy: the handle points at `data` itself. The kernel contract
    /// treats input handles as read-only even though the C struct carries a
    /// mutable pointer for both roles.
    ///
    /// # Errors
    /// Fails if the slice length disagrees with the shape.
    pub fn from_slice<T: KernelElem>(data: &'a [T], shape: &[usize]) -> Result<Self> {
        Self::build(
            data.as_ptr() as *mut c_void,
            data.len(),
            shape,
            T::TYPE,
            T::FILL.to_missing(),
        )
    }

    /// Describe a mutable output buffer the kernel will write into.
    pub fn from_slice_mut<T: KernelElem>(data: &'a mut [T], shape: &[usize]) -> Result<Self> {
        Self::build(
            data.as_mut_ptr() as *mut c_void,
            data.len(),
            shape,
            T::TYPE,
            T::FILL.to_missing(),
        )
    }

    /// Describe an owned buffer as a read-only input.
    pub fn from_buf<T: KernelElem>(buf: &'a ArrayBuf<T>) -> Result<Self> {
        let shape = buf.shape().to_vec();
        Self::from_slice(buf.as_slice(), &shape)
    }

    fn build(
        addr: *mut c_void,
        len: usize,
        shape: &[usize],
        elem: ElemType,
        fill: MissingValue,
    ) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if len != expected {
            return Err(BridgeError::BufferShape {
                len,
                shape: shape.to_vec(),
            });
        }
        let shape: Box<[usize]> = shape.to_vec().into_boxed_slice();
        let handle = Box::new(KernelArray {
            addr,
            ndim: shape.len() as c_int,
            shape: shape.as_ptr(),
            type_tag: elem.tag(),
            has_missing: 0,
            missing: fill,
        });
        Ok(Self {
            handle,
            shape,
            elem,
            _buffer: PhantomData,
        })
    }

    /// Write a sentinel into the handle, coerced to the descriptor's
    /// element type by the caller.
    pub fn set_sentinel<T: KernelElem>(&mut self, value: T) {
        debug_assert_eq!(T::TYPE, self.elem);
        self.handle.missing = value.to_missing();
    }

    /// Flag whether the buffer actually carries missing values.
    pub fn mark_has_missing(&mut self, flag: bool) {
        self.handle.has_missing = flag as c_int;
    }

    /// The sentinel currently advertised to the kernel.
    pub fn sentinel<T: KernelElem>(&self) -> T {
        debug_assert_eq!(T::TYPE, self.elem);
        // the tag check above pins which union field was written
        unsafe { T::from_missing(self.handle.missing) }
    }

    /// Whether the handle advertises missing values.
    pub fn has_missing(&self) -> bool {
        self.handle.has_missing != 0
    }

    /// Element type of the described buffer.
    pub fn elem_type(&self) -> ElemType {
        self.elem
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Handle pointer to bind as a kernel input.
    pub fn handle_ptr(&self) -> *const KernelArray {
        &*self.handle
    }

    /// Handle pointer to bind as a kernel output.
    pub fn handle_mut_ptr(&mut self) -> *mut KernelArray {
        &mut *self.handle
    }
}
