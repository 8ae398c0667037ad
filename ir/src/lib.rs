//! Graph IR for the Tessera NPU kernel scheduler.
//!
//! # Module Organization
//!
//! - [`expr`] - Symbolic size expressions with canonical simplification
//! - [`axis`] - Iteration axes and their derivation
//! - [`tensor`] - Tensor views (axis/repeats/strides) and memory attributes
//! - [`op`] - The closed operator set
//! - [`node`] - Nodes, edges and loop placement
//! - [`graph`] - Arena graph, traversal and typed constructors
//! - [`error`] - Error types and result handling

pub mod axis;
pub mod error;
pub mod expr;
pub mod graph;
pub mod node;
pub mod op;
pub mod tensor;


pub use axis::{Axis, AxisId, AxisKind};
pub use error::{Error, Result};
pub use expr::{ExprKind, SizeExpr};
pub use graph::{Graph, SizeVar};
pub use node::{Edge, Node, NodeId, Sched, TmpBuffer};
pub use op::{BinaryOp, ComputeType, ComputeUnit, MatMulKind, OpKind, ReduceOp, UnaryOp};
pub use tensor::{AllocType, MemAttr, Position, Tensor, contiguous_strides};

pub use tessera_dtype::DType;
