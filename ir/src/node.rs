//! Graph nodes.

use smallvec::SmallVec;

use crate::axis::AxisId;
use crate::error::{InvalidSlotSnafu, Result};
use crate::expr::SizeExpr;
use crate::op::{ComputeType, OpKind};
use crate::tensor::Tensor;

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("n{_0}")]
pub struct NodeId(pub u32);

/// Reference to one output of a producer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub node: NodeId,
    pub slot: usize,
}

impl Edge {
    pub const fn new(node: NodeId, slot: usize) -> Self {
        Self { node, slot }
    }

    /// First output of `node`.
    pub const fn of(node: NodeId) -> Self {
        Self { node, slot: 0 }
    }
}

impl From<NodeId> for Edge {
    fn from(node: NodeId) -> Self {
        Self::of(node)
    }
}

/// Loop placement of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sched {
    /// Axes the node is scheduled under, outermost first.
    pub axis: SmallVec<[AxisId; 6]>,
    /// Innermost loop the node executes in; axes after it are vectorized.
    pub loop_axis: Option<AxisId>,
    pub exec_order: i64,
}

/// Scratch space a node needs beyond its declared outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpBuffer {
    pub size: SizeExpr,
    pub reuse_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: OpKind,
    pub compute_type: ComputeType,
    pub inputs: SmallVec<[Edge; 3]>,
    pub outputs: SmallVec<[Tensor; 1]>,
    pub sched: Sched,
    pub tmp_buffers: Vec<TmpBuffer>,
}

impl Node {
    pub fn output(&self, slot: usize) -> Result<&Tensor> {
        let available = self.outputs.len();
        self.outputs.get(slot).ok_or_else(|| InvalidSlotSnafu { node: self.name.clone(), slot, available }.build())
    }

    pub fn output_mut(&mut self, slot: usize) -> Result<&mut Tensor> {
        let available = self.outputs.len();
        let name = self.name.clone();
        self.outputs.get_mut(slot).ok_or_else(|| InvalidSlotSnafu { node: name, slot, available }.build())
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}
