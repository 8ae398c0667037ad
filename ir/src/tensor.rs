//! Tensor views and memory attributes.
//!
//! A tensor describes how one node output is laid out over the graph's axes:
//! `axis`, `repeats` and `strides` are parallel lists, one entry per axis, and
//! a stride of zero marks a broadcast dimension. The three lists are private so
//! that their lengths can only change together.

use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::DType;

use crate::axis::AxisId;
use crate::error::{Result, ViewLengthMismatchSnafu};
use crate::expr::SizeExpr;
use crate::op::ComputeUnit;

/// Where a tensor's storage comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum AllocType {
    /// Global memory owned by the caller (kernel inputs and outputs).
    #[default]
    Global,
    /// Pipelined on-chip queue between compute units.
    Queue,
    /// Plain on-chip buffer used inside one compute unit.
    Buffer,
    /// Global scratch memory allocated per launch.
    Workspace,
}

/// Compute-unit side a tensor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, derive_more::Display)]
pub enum Position {
    #[default]
    Gm,
    VecIn,
    VecOut,
    VecCalc,
    L1,
    L0C,
}

/// Memory attributes assigned by buffer/queue allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemAttr {
    pub alloc_type: AllocType,
    /// Physical allocation; tensors that alias share it.
    pub tensor_id: Option<u32>,
    /// Liveness-reuse group: tensors with the same id never overlap in time.
    pub reuse_id: Option<u32>,
    pub position: Position,
    /// Engine that reads or writes the tensor.
    pub hardware: ComputeUnit,
    /// Queue depth (number of in-flight producer/consumer handoffs).
    pub depth: u32,
    /// Double-buffering factor.
    pub buf_num: u32,
    /// Tensors carrying a merge scope opt out of queue/buffer merging.
    pub merge_scope: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    pub dtype: DType,
    axis: SmallVec<[AxisId; 4]>,
    repeats: SmallVec<[SizeExpr; 4]>,
    strides: SmallVec<[SizeExpr; 4]>,
    /// Axes whose whole extent sits in one on-chip tile.
    pub vectorized_axis: SmallVec<[AxisId; 4]>,
    pub mem: MemAttr,
}

impl Tensor {
    pub fn new(
        dtype: DType,
        axis: impl IntoIterator<Item = AxisId>,
        repeats: impl IntoIterator<Item = SizeExpr>,
        strides: impl IntoIterator<Item = SizeExpr>,
    ) -> Result<Self> {
        let mut tensor = Self::scalar(dtype);
        tensor.set_view(axis, repeats, strides)?;
        Ok(tensor)
    }

    /// Rank-0 tensor.
    pub fn scalar(dtype: DType) -> Self {
        Self {
            dtype,
            axis: SmallVec::new(),
            repeats: SmallVec::new(),
            strides: SmallVec::new(),
            vectorized_axis: SmallVec::new(),
            mem: MemAttr::default(),
        }
    }

    /// Dense row-major layout over `axis` with the given extents.
    pub fn contiguous(
        dtype: DType,
        axis: impl IntoIterator<Item = AxisId>,
        repeats: impl IntoIterator<Item = SizeExpr>,
    ) -> Self {
        let repeats: SmallVec<[SizeExpr; 4]> = repeats.into_iter().collect();
        let strides = contiguous_strides(&repeats);
        Self {
            dtype,
            axis: axis.into_iter().collect(),
            repeats,
            strides,
            vectorized_axis: SmallVec::new(),
            mem: MemAttr::default(),
        }
    }

    pub fn set_view(
        &mut self,
        axis: impl IntoIterator<Item = AxisId>,
        repeats: impl IntoIterator<Item = SizeExpr>,
        strides: impl IntoIterator<Item = SizeExpr>,
    ) -> Result<()> {
        let axis: SmallVec<[AxisId; 4]> = axis.into_iter().collect();
        let repeats: SmallVec<[SizeExpr; 4]> = repeats.into_iter().collect();
        let strides: SmallVec<[SizeExpr; 4]> = strides.into_iter().collect();
        ensure!(
            axis.len() == repeats.len() && axis.len() == strides.len(),
            ViewLengthMismatchSnafu { axis: axis.len(), repeats: repeats.len(), strides: strides.len() }
        );
        self.axis = axis;
        self.repeats = repeats;
        self.strides = strides;
        Ok(())
    }

    pub fn axis(&self) -> &[AxisId] {
        &self.axis
    }

    pub fn repeats(&self) -> &[SizeExpr] {
        &self.repeats
    }

    pub fn strides(&self) -> &[SizeExpr] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.axis.len()
    }

    pub fn position_of(&self, axis: AxisId) -> Option<usize> {
        self.axis.iter().position(|a| *a == axis)
    }

    /// Every dimension has extent one.
    pub fn is_degenerate(&self) -> bool {
        self.repeats.iter().all(SizeExpr::is_one)
    }

    pub fn is_broadcast_dim(&self, index: usize) -> bool {
        self.strides.get(index).is_some_and(SizeExpr::is_zero)
    }

    pub fn is_contiguous(&self) -> bool {
        contiguous_strides(&self.repeats) == self.strides
    }

    pub fn element_count(&self) -> SizeExpr {
        SizeExpr::product(self.repeats.iter().cloned())
    }

    pub fn size_bytes(&self) -> SizeExpr {
        SizeExpr::product([self.element_count(), SizeExpr::constant(self.dtype.bytes() as i64)])
    }

    /// Same view with a dense layout.
    pub fn to_contiguous(&self) -> Self {
        let mut out = self.clone();
        out.strides = contiguous_strides(&self.repeats);
        out
    }
}

/// Row-major strides; extent-one dimensions get stride zero.
pub fn contiguous_strides(repeats: &[SizeExpr]) -> SmallVec<[SizeExpr; 4]> {
    let mut strides: SmallVec<[SizeExpr; 4]> = SmallVec::with_capacity(repeats.len());
    let mut running = SizeExpr::one();
    for repeat in repeats.iter().rev() {
        if repeat.is_one() {
            strides.push(SizeExpr::zero());
        } else {
            strides.push(running.clone());
            running = SizeExpr::mul(running, repeat.clone());
        }
    }
    strides.reverse();
    strides
}
