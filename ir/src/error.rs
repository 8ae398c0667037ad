use snafu::Snafu;

use crate::axis::AxisId;
use crate::node::NodeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Node id does not refer to a live node.
    #[snafu(display("node {id} not found"))]
    NodeNotFound { id: NodeId },

    #[snafu(display("axis {id} not found"))]
    AxisNotFound { id: AxisId },

    /// Output slot index past the node's outputs.
    #[snafu(display("node '{node}' has {available} outputs, slot {slot} requested"))]
    InvalidSlot { node: String, slot: usize, available: usize },

    #[snafu(display("node '{node}' has {available} inputs, index {index} requested"))]
    InvalidInputIndex { node: String, index: usize, available: usize },

    /// Removing a node that still has consumers.
    #[snafu(display("node '{node}' is still consumed by {consumers} node(s)"))]
    NodeInUse { node: String, consumers: usize },

    #[snafu(display("view lists differ in length: axis {axis}, repeats {repeats}, strides {strides}"))]
    ViewLengthMismatch { axis: usize, repeats: usize, strides: usize },

    #[snafu(display("graph '{graph}' contains a cycle"))]
    Cycle { graph: String },

    /// Operands of an elementwise op span different axes.
    #[snafu(display("'{op}' operands span different axes"))]
    AxisMismatch { op: String },

    #[snafu(display("invalid permutation {perm:?} for rank {rank}"))]
    InvalidPermutation { perm: Vec<usize>, rank: usize },

    #[snafu(display("axis {axis} is not part of the input view"))]
    AxisNotInTensor { axis: AxisId },

    #[snafu(display("'{op}' expects {expected} inputs, got {actual}"))]
    InputCount { op: String, expected: String, actual: usize },
}
