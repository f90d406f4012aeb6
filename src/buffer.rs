//! Owned contiguous buffers.
//!
//! [`ArrayBuf`] is the working representation on this side of the kernel
//! boundary: row-major, exactly `shape.product()` elements, owned by the
//! caller and never freed by the marshaling layer. [`AnyBuf`] is the tagged
//! variant used at runtime-typed entry points; the tag is resolved once and
//! all further work is monomorphic.

use crate::elem::{ElemType, KernelElem};
use crate::view::{contiguous_strides, ArrayView};
use crate::{BridgeError, Result};

/// An owned, contiguous, row-major numeric buffer with a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBuf<T> {
    data: Vec<T>,
    shape: Vec<usize>,
}

impl<T: KernelElem> ArrayBuf<T> {
    /// Wrap an existing vector.
    ///
    /// # Errors
    /// Fails if the vector length disagrees with the shape.
    pub fn from_vec(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(BridgeError::BufferShape {
                len: data.len(),
                shape,
            });
        }
        Ok(Self { data, shape })
    }

    /// Allocate a zero-initialized buffer.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            data: vec![T::default(); len],
            shape,
        }
    }

    /// Returns the shape.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the elements in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the elements mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// A contiguous view over the whole buffer.
    pub fn view(&self) -> ArrayView<'_, T> {
        // shape and length agree by construction
        ArrayView::contiguous(&self.data, self.shape.clone()).expect("buffer invariant")
    }

    /// Consume the buffer, returning its elements.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Copy `block` into this buffer with its origin at `start`.
    ///
    /// Used to reassemble per-block kernel outputs into one logical array.
    pub fn write_block(&mut self, start: &[usize], block: &ArrayBuf<T>) -> Result<()> {
        let n = self.shape.len();
        if start.len() != n || block.shape.len() != n {
            return Err(BridgeError::RankMismatch(block.shape.len(), n));
        }
        for d in 0..n {
            if start[d] + block.shape[d] > self.shape[d] {
                return Err(BridgeError::ShapeMismatch(
                    block.shape.clone(),
                    self.shape.clone(),
                ));
            }
        }
        if block.data.is_empty() {
            return Ok(());
        }
        if n == 0 {
            self.data[0] = block.data[0];
            return Ok(());
        }

        let dest_strides = contiguous_strides(&self.shape);
        let inner = block.shape[n - 1];
        let outer = &block.shape[..n - 1];
        let mut idx = vec![0usize; n - 1];
        let mut src = 0usize;
        loop {
            // innermost runs are contiguous in both source and destination
            let mut dst = start[n - 1];
            for d in 0..n - 1 {
                dst += (start[d] + idx[d]) * dest_strides[d] as usize;
            }
            self.data[dst..dst + inner].copy_from_slice(&block.data[src..src + inner]);
            src += inner;

            let mut d = n - 1;
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < outer[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }
}

/// A buffer whose element type is known only at runtime.
///
/// This is the entry point matching the kernel's integer type tags; see
/// [`ElemType::from_tag`]. The variant is matched once per call and the rest
/// of the pipeline runs on the concrete type.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyBuf {
    F32(ArrayBuf<f32>),
    F64(ArrayBuf<f64>),
    I32(ArrayBuf<i32>),
}

impl AnyBuf {
    /// Allocate a zero-initialized buffer for a foreign type tag.
    ///
    /// # Errors
    /// Returns [`BridgeError::UnsupportedElementType`] for tags outside the
    /// supported set.
    pub fn from_tag(tag: std::os::raw::c_int, shape: Vec<usize>) -> Result<Self> {
        Ok(match ElemType::from_tag(tag)? {
            ElemType::F32 => AnyBuf::F32(ArrayBuf::zeros(shape)),
            ElemType::F64 => AnyBuf::F64(ArrayBuf::zeros(shape)),
            ElemType::I32 => AnyBuf::I32(ArrayBuf::zeros(shape)),
        })
    }

    /// Element type of the contained buffer.
    pub fn elem_type(&self) -> ElemType {
        match self {
            AnyBuf::F32(_) => ElemType::F32,
            AnyBuf::F64(_) => ElemType::F64,
            AnyBuf::I32(_) => ElemType::I32,
        }
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            AnyBuf::F32(b) => b.shape(),
            AnyBuf::F64(b) => b.shape(),
            AnyBuf::I32(b) => b.shape(),
        }
    }

    /// Returns the total number of elements.
    pub fn len(&self) -> usize {
        match self {
            AnyBuf::F32(b) => b.len(),
            AnyBuf::F64(b) => b.len(),
            AnyBuf::I32(b) => b.len(),
        }
    }

    /// Returns true if the buffer contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<ArrayBuf<f32>> for AnyBuf {
    fn from(buf: ArrayBuf<f32>) -> Self {
        AnyBuf::F32(buf)
    }
}

impl From<ArrayBuf<f64>> for AnyBuf {
    fn from(buf: ArrayBuf<f64>) -> Self {
        AnyBuf::F64(buf)
    }
}

impl From<ArrayBuf<i32>> for AnyBuf {
    fn from(buf: ArrayBuf<i32>) -> Self {
        AnyBuf::I32(buf)
    }
}
