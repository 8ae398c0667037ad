//! Typed node constructors.
//!
//! Each constructor derives its output view from its inputs, validates the
//! operand shapes that matter for the operator and appends the node.

use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::DType;

use super::Graph;
use crate::axis::AxisId;
use crate::error::*;
use crate::expr::SizeExpr;
use crate::node::{Edge, NodeId};
use crate::op::{BinaryOp, MatMulKind, OpKind, ReduceOp, UnaryOp};
use crate::tensor::Tensor;

impl Graph {
    // =========================================================================
    // I/O
    // =========================================================================

    /// Kernel input `index` laid out densely over `axes`.
    pub fn data(&mut self, name: &str, index: usize, dtype: DType, axes: &[AxisId]) -> Result<NodeId> {
        let repeats = self.axis_sizes(axes)?;
        let tensor = Tensor::contiguous(dtype, axes.iter().copied(), repeats);
        self.add_node(name, OpKind::Data { index }, [], [tensor])
    }

    pub fn workspace(&mut self, name: &str, dtype: DType, axes: &[AxisId]) -> Result<NodeId> {
        let repeats = self.axis_sizes(axes)?;
        let tensor = Tensor::contiguous(dtype, axes.iter().copied(), repeats);
        self.add_node(name, OpKind::Workspace, [], [tensor])
    }

    /// Workspace written by `src` (the sink of a producing kernel).
    pub fn workspace_from(&mut self, name: &str, src: impl Into<Edge>) -> Result<NodeId> {
        let src = src.into();
        let tensor = self.fresh_copy(src)?;
        self.add_node(name, OpKind::Workspace, [src], [tensor])
    }

    /// Copy from global memory. The view and strides of `src` are kept.
    pub fn load(&mut self, name: &str, src: impl Into<Edge>) -> Result<NodeId> {
        let src = src.into();
        let tensor = self.fresh_copy(src)?;
        self.add_node(name, OpKind::Load, [src], [tensor])
    }

    pub fn store(&mut self, name: &str, src: impl Into<Edge>) -> Result<NodeId> {
        let src = src.into();
        let tensor = self.fresh_copy(src)?.to_contiguous();
        self.add_node(name, OpKind::Store, [src], [tensor])
    }

    pub fn output(&mut self, name: &str, index: usize, src: impl Into<Edge>) -> Result<NodeId> {
        let src = src.into();
        let tensor = self.fresh_copy(src)?;
        self.add_node(name, OpKind::Output { index }, [src], [tensor])
    }

    // =========================================================================
    // Elementwise
    // =========================================================================

    pub fn unary(&mut self, name: &str, op: UnaryOp, x: impl Into<Edge>) -> Result<NodeId> {
        let x = x.into();
        let mut tensor = self.fresh_copy(x)?.to_contiguous();
        if op == UnaryOp::LogicalNot {
            tensor.dtype = DType::Bool;
        }
        self.add_node(name, OpKind::Unary(op), [x], [tensor])
    }

    /// Comparisons produce `Bool`; everything else takes the lhs dtype.
    pub fn binary(&mut self, name: &str, op: BinaryOp, lhs: impl Into<Edge>, rhs: impl Into<Edge>) -> Result<NodeId> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let mut tensor = self.elementwise_view(op.to_string(), &[lhs, rhs])?;
        if op.is_comparison() || op.is_logical() {
            tensor.dtype = DType::Bool;
        }
        self.add_node(name, OpKind::Binary(op), [lhs, rhs], [tensor])
    }

    /// `where(cond, on_true, on_false)`, typed after `on_true`.
    pub fn select(
        &mut self,
        name: &str,
        cond: impl Into<Edge>,
        on_true: impl Into<Edge>,
        on_false: impl Into<Edge>,
    ) -> Result<NodeId> {
        let inputs = [cond.into(), on_true.into(), on_false.into()];
        let mut tensor = self.elementwise_view("Select".to_string(), &inputs)?;
        tensor.dtype = self.tensor(inputs[1])?.dtype;
        self.add_node(name, OpKind::Select, inputs, [tensor])
    }

    pub fn cast(&mut self, name: &str, x: impl Into<Edge>, dtype: DType) -> Result<NodeId> {
        let x = x.into();
        let mut tensor = self.fresh_copy(x)?.to_contiguous();
        tensor.dtype = dtype;
        self.add_node(name, OpKind::Cast, [x], [tensor])
    }

    /// Constant broadcastable over `axes`: extent one and stride zero on each.
    pub fn scalar(&mut self, name: &str, value: impl Into<String>, dtype: DType, axes: &[AxisId]) -> Result<NodeId> {
        let tensor = Tensor::new(
            dtype,
            axes.iter().copied(),
            axes.iter().map(|_| SizeExpr::one()),
            axes.iter().map(|_| SizeExpr::zero()),
        )?;
        self.add_node(name, OpKind::Scalar { value: value.into() }, [], [tensor])
    }

    // =========================================================================
    // Shape ops
    // =========================================================================

    /// Expand `x` to the full extent of `axes`.
    pub fn broadcast(&mut self, name: &str, x: impl Into<Edge>, axes: &[AxisId]) -> Result<NodeId> {
        let x = x.into();
        let src = self.tensor(x)?;
        for axis in src.axis() {
            ensure!(axes.contains(axis), AxisNotInTensorSnafu { axis: *axis });
        }
        let dtype = src.dtype;
        let repeats = self.axis_sizes(axes)?;
        let tensor = Tensor::contiguous(dtype, axes.iter().copied(), repeats);
        self.add_node(name, OpKind::Broadcast, [x], [tensor])
    }

    /// Reduce over `axes`, keeping them with extent one.
    pub fn reduce(&mut self, name: &str, op: ReduceOp, x: impl Into<Edge>, axes: &[AxisId]) -> Result<NodeId> {
        let x = x.into();
        let src = self.tensor(x)?;
        for axis in axes {
            ensure!(src.position_of(*axis).is_some(), AxisNotInTensorSnafu { axis: *axis });
        }
        let repeats: SmallVec<[SizeExpr; 4]> = src
            .axis()
            .iter()
            .zip(src.repeats())
            .map(|(a, r)| if axes.contains(a) { SizeExpr::one() } else { r.clone() })
            .collect();
        let mut tensor = Tensor::contiguous(src.dtype, src.axis().iter().copied(), repeats);
        if matches!(op, ReduceOp::Any | ReduceOp::All) {
            tensor.dtype = DType::Bool;
        }
        self.add_node(name, OpKind::Reduce(op), [x], [tensor])
    }

    /// Permute the view of `x`: output dim `i` is input dim `perm[i]`.
    pub fn transpose(&mut self, name: &str, x: impl Into<Edge>, perm: &[usize]) -> Result<NodeId> {
        let x = x.into();
        let src = self.tensor(x)?;
        let rank = src.rank();
        let mut seen = vec![false; rank];
        let valid = perm.len() == rank
            && perm.iter().all(|p| *p < rank && !std::mem::replace(&mut seen[*p], true));
        ensure!(valid, InvalidPermutationSnafu { perm: perm.to_vec(), rank });
        let axis: SmallVec<[AxisId; 4]> = perm.iter().map(|p| src.axis()[*p]).collect();
        let repeats: SmallVec<[SizeExpr; 4]> = perm.iter().map(|p| src.repeats()[*p].clone()).collect();
        let tensor = Tensor::contiguous(src.dtype, axis, repeats);
        self.add_node(name, OpKind::Transpose, [x], [tensor])
    }

    /// Join `inputs` along `axis`; the output extent is the sum of theirs.
    pub fn concat(&mut self, name: &str, inputs: &[Edge], axis: AxisId) -> Result<NodeId> {
        ensure!(
            !inputs.is_empty(),
            InputCountSnafu { op: "Concat", expected: "at least 1", actual: inputs.len() }
        );
        let first = self.tensor(inputs[0])?;
        let dim = first.position_of(axis).ok_or_else(|| AxisNotInTensorSnafu { axis }.build())?;
        let dtype = first.dtype;
        let axes: SmallVec<[AxisId; 4]> = first.axis().iter().copied().collect();
        let mut repeats: SmallVec<[SizeExpr; 4]> = first.repeats().iter().cloned().collect();
        let mut extents = Vec::with_capacity(inputs.len());
        for edge in inputs {
            let tensor = self.tensor(*edge)?;
            ensure!(tensor.axis() == axes.as_slice(), AxisMismatchSnafu { op: "Concat" });
            extents.push(tensor.repeats()[dim].clone());
        }
        repeats[dim] = SizeExpr::sum(extents);
        let tensor = Tensor::contiguous(dtype, axes, repeats);
        self.add_node(name, OpKind::Concat { axis }, inputs.iter().copied(), [tensor])
    }

    /// Cut `x` along `axis` into pieces of the given extents, one output each.
    pub fn split(&mut self, name: &str, x: impl Into<Edge>, axis: AxisId, sizes: &[SizeExpr]) -> Result<NodeId> {
        let x = x.into();
        let src = self.tensor(x)?;
        let dim = src.position_of(axis).ok_or_else(|| AxisNotInTensorSnafu { axis }.build())?;
        let outputs: Vec<Tensor> = sizes
            .iter()
            .map(|size| {
                let mut repeats: SmallVec<[SizeExpr; 4]> = src.repeats().iter().cloned().collect();
                repeats[dim] = size.clone();
                Tensor::contiguous(src.dtype, src.axis().iter().copied(), repeats)
            })
            .collect();
        self.add_node(name, OpKind::Split { axis }, [x], outputs)
    }

    /// Index `params` along `axis` with `indices`; the indices' axes replace
    /// the gathered axis in the output.
    pub fn gather(
        &mut self,
        name: &str,
        params: impl Into<Edge>,
        indices: impl Into<Edge>,
        axis: AxisId,
    ) -> Result<NodeId> {
        let (params, indices) = (params.into(), indices.into());
        let src = self.tensor(params)?;
        let idx = self.tensor(indices)?;
        let dim = src.position_of(axis).ok_or_else(|| AxisNotInTensorSnafu { axis }.build())?;
        let mut axes: SmallVec<[AxisId; 4]> = src.axis()[..dim].iter().copied().collect();
        let mut repeats: SmallVec<[SizeExpr; 4]> = src.repeats()[..dim].iter().cloned().collect();
        axes.extend(idx.axis().iter().copied());
        repeats.extend(idx.repeats().iter().cloned());
        axes.extend(src.axis()[dim + 1..].iter().copied());
        repeats.extend(src.repeats()[dim + 1..].iter().cloned());
        let tensor = Tensor::contiguous(src.dtype, axes, repeats);
        self.add_node(name, OpKind::Gather { axis }, [params, indices], [tensor])
    }

    /// `a[.., m, k] x b[.., k, n]`, plus `bias` for [`MatMulKind::MatMulBias`].
    pub fn matmul(
        &mut self,
        name: &str,
        kind: MatMulKind,
        a: impl Into<Edge>,
        b: impl Into<Edge>,
        bias: Option<Edge>,
    ) -> Result<NodeId> {
        let (a, b) = (a.into(), b.into());
        let expected_bias = kind == MatMulKind::MatMulBias;
        ensure!(
            bias.is_some() == expected_bias,
            InputCountSnafu {
                op: kind.to_string(),
                expected: if expected_bias { "3" } else { "2" },
                actual: 2 + usize::from(bias.is_some()),
            }
        );
        let lhs = self.tensor(a)?;
        let rhs = self.tensor(b)?;
        ensure!(lhs.rank() >= 2 && rhs.rank() >= 2, AxisMismatchSnafu { op: kind.to_string() });
        let mut axes: SmallVec<[AxisId; 4]> = lhs.axis()[..lhs.rank() - 1].iter().copied().collect();
        let mut repeats: SmallVec<[SizeExpr; 4]> = lhs.repeats()[..lhs.rank() - 1].iter().cloned().collect();
        axes.push(rhs.axis()[rhs.rank() - 1]);
        repeats.push(rhs.repeats()[rhs.rank() - 1].clone());
        let tensor = Tensor::contiguous(lhs.dtype, axes, repeats);
        let inputs: SmallVec<[Edge; 3]> = [a, b].into_iter().chain(bias).collect();
        self.add_node(name, OpKind::MatMul(kind), inputs, [tensor])
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Output tensor of `edge` with memory attributes cleared.
    fn fresh_copy(&self, edge: Edge) -> Result<Tensor> {
        let mut tensor = self.tensor(edge)?.clone();
        tensor.mem = Default::default();
        tensor.vectorized_axis.clear();
        Ok(tensor)
    }

    /// Dense view covering every operand. Operands of lower rank or extent
    /// one broadcast; full-rank operands must agree on the axis list.
    fn elementwise_view(&self, op: String, inputs: &[Edge]) -> Result<Tensor> {
        let tensors = inputs.iter().map(|e| self.tensor(*e)).collect::<Result<Vec<_>>>()?;
        let widest = tensors.iter().copied().max_by_key(|t| t.rank()).ok_or_else(|| {
            InputCountSnafu { op: op.clone(), expected: "at least 1", actual: 0usize }.build()
        })?;
        let axes: SmallVec<[AxisId; 4]> = widest.axis().iter().copied().collect();
        let mut repeats: SmallVec<[SizeExpr; 4]> = widest.repeats().iter().cloned().collect();
        for tensor in &tensors {
            if tensor.rank() == 0 {
                continue;
            }
            ensure!(tensor.axis() == axes.as_slice(), AxisMismatchSnafu { op: op.clone() });
            for (out, r) in repeats.iter_mut().zip(tensor.repeats()) {
                if out.is_one() {
                    *out = r.clone();
                }
            }
        }
        Ok(Tensor::contiguous(tensors[0].dtype, axes, repeats))
    }
}
