//! Chunked dispatch over the leading dimensions of a logical array.
//!
//! A logical array can be partitioned into independently computable blocks
//! along its leading dimensions; the trailing `core_rank` dimensions the
//! kernel processes jointly always stay whole within a block. Each block
//! runs the full single-block path with its own freshly constructed
//! descriptors and working buffers, so no state is shared between blocks and
//! results are identical regardless of scheduling order.
//!
//! The blocking scheme is the caller's: an explicit [`ChunkPlan`] per side,
//! validated up front. A plan that disagrees with the array, or whose block
//! counts differ between input and output along a leading dimension, is a
//! caller configuration error ([`BridgeError::BlockMismatch`]) raised before
//! any kernel call.

use crate::adapter::{CallResult, KernelCall, KernelDiagnostic};
use crate::buffer::ArrayBuf;
use crate::elem::KernelElem;
use crate::view::ArrayView;
use crate::{BridgeError, Result};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Block extents along each dimension of a logical array.
///
/// `blocks[d]` lists the extents of consecutive blocks along dimension `d`;
/// their sum must equal the array's extent there. A dimension with a single
/// entry is unchunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    blocks: Vec<Vec<usize>>,
}

impl ChunkPlan {
    /// Build a plan from explicit per-dimension block extents.
    pub fn new(blocks: Vec<Vec<usize>>) -> Self {
        Self { blocks }
    }

    /// The trivial plan: one block spanning the whole shape.
    pub fn whole(shape: &[usize]) -> Self {
        Self {
            blocks: shape.iter().map(|&d| vec![d]).collect(),
        }
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.blocks.len()
    }

    /// Number of blocks along dimension `dim`.
    pub fn count(&self, dim: usize) -> usize {
        self.blocks[dim].len()
    }

    /// Block extents along dimension `dim`.
    pub fn extents(&self, dim: usize) -> &[usize] {
        &self.blocks[dim]
    }

    /// Total extent covered along dimension `dim`.
    pub fn total(&self, dim: usize) -> usize {
        self.blocks[dim].iter().sum()
    }

    /// Block start offsets along dimension `dim`.
    fn starts(&self, dim: usize) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.blocks[dim].len());
        let mut at = 0;
        for &extent in &self.blocks[dim] {
            starts.push(at);
            at += extent;
        }
        starts
    }

    /// Check that the plan covers `shape` exactly.
    pub fn validate_covers(&self, shape: &[usize]) -> Result<()> {
        if self.ndim() != shape.len() {
            return Err(BridgeError::RankMismatch(self.ndim(), shape.len()));
        }
        for (dim, &extent) in shape.iter().enumerate() {
            let covered = self.total(dim);
            if covered != extent {
                return Err(BridgeError::BlockMismatch {
                    dim,
                    detail: format!("plan covers {covered} elements but array extent is {extent}"),
                });
            }
        }
        Ok(())
    }
}

/// Reassembled output of a chunked dispatch.
#[derive(Debug)]
pub struct DispatchResult<O: KernelElem> {
    /// The logical output array, all blocks written in place.
    pub output: ArrayBuf<O>,
    /// Diagnostics from blocks whose kernel call returned nonzero status.
    /// A diagnosed block does not cancel or retry its siblings.
    pub diagnostics: Vec<KernelDiagnostic>,
}

struct BlockSpec {
    start: Vec<usize>,
    extent: Vec<usize>,
}

/// Fan one logical call out across the blocks of `in_plan`, reassembling
/// per-block outputs into one array shaped by `out_plan`'s trailing extents.
///
/// `coords` are shared read-only across blocks and are never chunked.
/// Preconditions, checked before any kernel call:
///
/// - both plans cover their arrays exactly
/// - input and output declare identical blocking along every leading
///   dimension
/// - kernel-processed dimensions are a single block on both sides; the
///   output's trailing extents are taken from `out_plan` independent of the
///   input's
pub fn dispatch_chunked<T: KernelElem>(
    call: &KernelCall<'_>,
    coords: &[ArrayView<'_, T>],
    data: &ArrayView<'_, T>,
    in_plan: &ChunkPlan,
    out_plan: &ChunkPlan,
) -> Result<DispatchResult<T::Output>> {
    let core = call.routine().core_rank();
    let leading = data
        .ndim()
        .checked_sub(core)
        .ok_or(BridgeError::RankMismatch(data.ndim(), core))?;

    in_plan.validate_covers(data.shape())?;
    if out_plan.ndim() < leading {
        return Err(BridgeError::RankMismatch(out_plan.ndim(), leading));
    }
    for dim in 0..leading {
        if in_plan.extents(dim) != out_plan.extents(dim) {
            return Err(BridgeError::BlockMismatch {
                dim,
                detail: format!(
                    "input declares blocks {:?} but output declares {:?}",
                    in_plan.extents(dim),
                    out_plan.extents(dim)
                ),
            });
        }
    }
    for dim in leading..in_plan.ndim() {
        if in_plan.count(dim) != 1 {
            return Err(BridgeError::BlockMismatch {
                dim,
                detail: "kernel-processed dimension must stay whole within a block".into(),
            });
        }
    }
    for dim in leading..out_plan.ndim() {
        if out_plan.count(dim) != 1 {
            return Err(BridgeError::BlockMismatch {
                dim,
                detail: "kernel-processed output dimension must be a single block".into(),
            });
        }
    }

    let out_trailing: Vec<usize> = (leading..out_plan.ndim())
        .map(|dim| out_plan.extents(dim)[0])
        .collect();
    let mut out_shape: Vec<usize> = data.shape()[..leading].to_vec();
    out_shape.extend_from_slice(&out_trailing);

    let specs = block_specs(data.shape(), in_plan, leading);

    #[cfg(feature = "parallel")]
    let per_block: Vec<(Vec<usize>, CallResult<T::Output>)> = specs
        .par_iter()
        .map(|spec| run_block(call, coords, data, spec, &out_trailing, leading))
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let per_block: Vec<(Vec<usize>, CallResult<T::Output>)> = specs
        .iter()
        .map(|spec| run_block(call, coords, data, spec, &out_trailing, leading))
        .collect::<Result<_>>()?;

    let mut output = ArrayBuf::<T::Output>::zeros(out_shape);
    let mut diagnostics = Vec::new();
    for (out_start, result) in per_block {
        output.write_block(&out_start, &result.output)?;
        if let Some(diag) = result.diagnostic {
            diagnostics.push(diag);
        }
    }

    Ok(DispatchResult {
        output,
        diagnostics,
    })
}

/// Enumerate blocks over the leading dimensions; core dimensions are taken
/// whole.
fn block_specs(shape: &[usize], plan: &ChunkPlan, leading: usize) -> Vec<BlockSpec> {
    let counts: Vec<usize> = (0..leading).map(|d| plan.count(d)).collect();
    // a zero-extent dimension carries no blocks, so there is no work at all
    if counts.iter().any(|&c| c == 0) {
        return Vec::new();
    }
    let starts: Vec<Vec<usize>> = (0..leading).map(|d| plan.starts(d)).collect();

    let total: usize = counts.iter().product();
    let mut specs = Vec::with_capacity(total);
    let mut idx = vec![0usize; leading];
    loop {
        let mut start = Vec::with_capacity(shape.len());
        let mut extent = Vec::with_capacity(shape.len());
        for d in 0..leading {
            start.push(starts[d][idx[d]]);
            extent.push(plan.extents(d)[idx[d]]);
        }
        for d in leading..shape.len() {
            start.push(0);
            extent.push(shape[d]);
        }
        specs.push(BlockSpec { start, extent });

        let mut d = leading;
        loop {
            if d == 0 {
                return specs;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < counts[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}

fn run_block<T: KernelElem>(
    call: &KernelCall<'_>,
    coords: &[ArrayView<'_, T>],
    data: &ArrayView<'_, T>,
    spec: &BlockSpec,
    out_trailing: &[usize],
    leading: usize,
) -> Result<(Vec<usize>, CallResult<T::Output>)> {
    let view = data.slice(&spec.start, &spec.extent)?;

    let mut block_out_shape = spec.extent[..leading].to_vec();
    block_out_shape.extend_from_slice(out_trailing);
    let result = call.invoke(coords, &view, &block_out_shape)?;

    let mut out_start = spec.start[..leading].to_vec();
    out_start.resize(out_start.len() + out_trailing.len(), 0);
    Ok((out_start, result))
}
