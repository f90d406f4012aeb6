//! Borrowed strided views and the contiguity guarantee.
//!
//! The kernel requires every buffer argument in simple row-major layout:
//! successive elements exactly one element apart, no gaps, no reordering.
//! [`ArrayView`] describes caller data that may violate that (a transpose, a
//! slice of a larger array), and [`ensure_contiguous`] is the single point
//! where the layout precondition is enforced before anything crosses the
//! boundary.

use crate::{BridgeError, Result};
use std::borrow::Cow;

/// An immutable, possibly strided view over borrowed data.
///
/// Shape and strides are dynamic-rank; strides are in elements and may be
/// negative. Bounds are validated once at construction.
#[derive(Debug, Clone)]
pub struct ArrayView<'a, T> {
    data: &'a [T],
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: usize,
}

impl<'a, T> ArrayView<'a, T> {
    /// Create a view with explicit strides.
    ///
    /// # Errors
    /// Fails if shape and strides disagree in length or if any reachable
    /// index would fall outside `data`.
    pub fn new(data: &'a [T], shape: Vec<usize>, strides: Vec<isize>, offset: usize) -> Result<Self> {
        validate_bounds(data.len(), &shape, &strides, offset)?;
        Ok(Self {
            data,
            shape,
            strides,
            offset,
        })
    }

    /// Create a simple contiguous row-major view over `data`.
    pub fn contiguous(data: &'a [T], shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(BridgeError::BufferShape {
                len: data.len(),
                shape,
            });
        }
        let strides = contiguous_strides(&shape);
        Ok(Self {
            data,
            shape,
            strides,
            offset: 0,
        })
    }

    /// Returns the underlying data slice.
    #[inline]
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// Returns the shape.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element strides.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Returns the starting offset in elements.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns true if the view contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// True when the view is laid out in simple row-major order with
    /// element-size strides.
    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }

    /// A sub-view covering `extent` elements starting at `start` along each
    /// dimension. Zero-copy; shares strides with the parent.
    pub fn slice(&self, start: &[usize], extent: &[usize]) -> Result<ArrayView<'a, T>> {
        if start.len() != self.ndim() || extent.len() != self.ndim() {
            return Err(BridgeError::RankMismatch(start.len(), self.ndim()));
        }
        for d in 0..self.ndim() {
            if start[d] + extent[d] > self.shape[d] {
                return Err(BridgeError::ShapeMismatch(
                    extent.to_vec(),
                    self.shape.clone(),
                ));
            }
        }
        let mut offset = self.offset as isize;
        for d in 0..self.ndim() {
            offset += start[d] as isize * self.strides[d];
        }
        if offset < 0 {
            return Err(BridgeError::OutOfBounds);
        }
        ArrayView::new(
            self.data,
            extent.to_vec(),
            self.strides.clone(),
            offset as usize,
        )
    }
}

impl<'a, T: Copy> ArrayView<'a, T> {
    /// Copy the viewed elements into a fresh row-major vector.
    pub fn pack(&self) -> Vec<T> {
        let len = self.len();
        let mut out = Vec::with_capacity(len);
        if len == 0 {
            return out;
        }
        let n = self.shape.len();
        let mut idx = vec![0usize; n];
        loop {
            let mut off = self.offset as isize;
            for d in 0..n {
                off += idx[d] as isize * self.strides[d];
            }
            out.push(self.data[off as usize]);

            // advance row-major odometer, last dimension fastest
            let mut d = n;
            loop {
                if d == 0 {
                    return out;
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
    }
}

/// Hand back a simple contiguous slice for the view, borrowing when the
/// layout already qualifies and copying otherwise.
///
/// When a copy is made, later in-place mutation lands on the copy; callers
/// that need mutated data back must use the returned value.
pub fn ensure_contiguous<'a, T: Copy>(view: &ArrayView<'a, T>) -> Cow<'a, [T]> {
    if view.is_contiguous() {
        Cow::Borrowed(&view.data()[view.offset()..view.offset() + view.len()])
    } else {
        Cow::Owned(view.pack())
    }
}

/// Row-major strides for a shape.
pub(crate) fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let n = shape.len();
    let mut strides = vec![1isize; n];
    for d in (0..n.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1] as isize;
    }
    strides
}

fn validate_bounds(len: usize, shape: &[usize], strides: &[isize], offset: usize) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(BridgeError::StrideLengthMismatch);
    }
    if shape.contains(&0) {
        // an empty view still anchors its borrow at offset
        if offset > len {
            return Err(BridgeError::OutOfBounds);
        }
        return Ok(());
    }
    let mut min = offset as isize;
    let mut max = offset as isize;
    for (&d, &s) in shape.iter().zip(strides.iter()) {
        let span = (d as isize - 1) * s;
        if span >= 0 {
            max += span;
        } else {
            min += span;
        }
    }
    if min < 0 || max as usize >= len {
        return Err(BridgeError::OutOfBounds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_detection() {
        let data: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let view = ArrayView::contiguous(&data, vec![2, 3]).unwrap();
        assert!(view.is_contiguous());

        // column-major strides are not simple contiguous
        let view = ArrayView::new(&data, vec![2, 3], vec![1, 2], 0).unwrap();
        assert!(!view.is_contiguous());
    }

    #[test]
    fn test_ensure_contiguous_borrows_when_possible() {
        let data: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let view = ArrayView::contiguous(&data, vec![2, 3]).unwrap();
        let cow = ensure_contiguous(&view);
        assert!(matches!(cow, Cow::Borrowed(_)));
        assert_eq!(&*cow, &data[..]);
    }

    #[test]
    fn test_ensure_contiguous_packs_transposed() {
        // 2x3 row-major, viewed as its 3x2 transpose
        let data = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let view = ArrayView::new(&data, vec![3, 2], vec![1, 3], 0).unwrap();
        let cow = ensure_contiguous(&view);
        assert!(matches!(cow, Cow::Owned(_)));
        assert_eq!(&*cow, &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_slice_offsets_into_parent() {
        let data: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let view = ArrayView::contiguous(&data, vec![4, 3]).unwrap();
        let block = view.slice(&[1, 0], &[2, 3]).unwrap();
        assert_eq!(block.shape(), &[2, 3]);
        assert_eq!(block.pack(), vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_slice_out_of_range_rejected() {
        let data: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let view = ArrayView::contiguous(&data, vec![4, 3]).unwrap();
        assert!(view.slice(&[3, 0], &[2, 3]).is_err());
    }

    #[test]
    fn test_bounds_validated_at_construction() {
        let data = vec![0.0_f64; 5];
        assert!(matches!(
            ArrayView::new(&data, vec![2, 3], vec![3, 1], 0),
            Err(BridgeError::OutOfBounds)
        ));
        assert!(matches!(
            ArrayView::new(&data, vec![5], vec![1, 1], 0),
            Err(BridgeError::StrideLengthMismatch)
        ));
    }

    #[test]
    fn test_empty_view_offset_checked() {
        let data = vec![0.0_f64; 5];
        assert!(matches!(
            ArrayView::new(&data, vec![0], vec![1], 100),
            Err(BridgeError::OutOfBounds)
        ));

        // offset == len is the furthest an empty borrow can sit
        let view = ArrayView::new(&data, vec![0], vec![1], 5).unwrap();
        assert!(ensure_contiguous(&view).is_empty());
    }

    #[test]
    fn test_pack_negative_stride() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let view = ArrayView::new(&data, vec![4], vec![-1], 3).unwrap();
        assert!(!view.is_contiguous());
        assert_eq!(view.pack(), vec![4.0, 3.0, 2.0, 1.0]);
    }
}
