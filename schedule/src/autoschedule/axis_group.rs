//! Axis roles of a schedule group.

use snafu::ResultExt;
use tessera_ir::{AxisId, AxisKind, Graph, OpKind, Tensor};

use super::task::{TaskKind, first_input};
use crate::error::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AxisRole {
    /// Already distributed across cores.
    #[strum(to_string = "b")]
    Batch,
    /// Kept in the output.
    #[strum(to_string = "y")]
    Y,
    /// Reduced away.
    #[strum(to_string = "r")]
    R,
}

/// Axes of the group's anchor tensor with their roles, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisGroup {
    pub axes: Vec<(AxisId, AxisRole)>,
}

impl AxisGroup {
    /// Role letters in axis order, e.g. `yr`.
    pub fn letters(&self) -> String {
        self.axes.iter().map(|(_, r)| r.to_string()).collect()
    }

    pub fn with_role(&self, role: AxisRole) -> impl Iterator<Item = AxisId> + '_ {
        self.axes.iter().filter(move |(_, r)| *r == role).map(|(a, _)| *a)
    }

    pub fn role_of(&self, axis: AxisId) -> Option<AxisRole> {
        self.axes.iter().find(|(a, _)| *a == axis).map(|(_, r)| *r)
    }
}

fn is_block_outer(graph: &Graph, axis: AxisId) -> bool {
    graph.axis(axis).is_ok_and(|a| a.kind == AxisKind::BlockOuter)
}

fn kept_role(graph: &Graph, axis: AxisId) -> AxisRole {
    if is_block_outer(graph, axis) { AxisRole::Batch } else { AxisRole::Y }
}

/// Highest-rank output among compute nodes (lowest id on ties), falling back
/// to any tensor.
fn widest_tensor(graph: &Graph) -> Option<&Tensor> {
    let pick = |compute_only: bool| {
        graph
            .nodes()
            .filter(|n| !compute_only || !n.kind.is_io())
            .flat_map(|n| n.outputs.iter())
            .fold(None, |best: Option<&Tensor>, t| match best {
                Some(b) if b.rank() >= t.rank() => Some(b),
                _ => Some(t),
            })
    };
    pick(true).or_else(|| pick(false))
}

/// Assign roles for a group of kind `kind` over `graph`.
pub fn axis_roles(graph: &Graph, kind: TaskKind) -> Result<AxisGroup> {
    let mut axes = Vec::new();
    match kind {
        TaskKind::Reduce => {
            let reduce = graph.nodes().find(|n| matches!(n.kind, OpKind::Reduce(_)));
            if let Some(reduce) = reduce {
                let input = graph.tensor(first_input(graph, reduce.id)?).context(GraphSnafu)?;
                let output = reduce.output(0).context(GraphSnafu)?;
                for (i, axis) in input.axis().iter().enumerate() {
                    let reduced = output.repeats()[i].is_one() && !input.repeats()[i].is_one();
                    axes.push((*axis, if reduced { AxisRole::R } else { kept_role(graph, *axis) }));
                }
            }
        }
        TaskKind::Cube => {
            let matmul = graph.nodes().find(|n| matches!(n.kind, OpKind::MatMul(_)));
            if let Some(matmul) = matmul {
                let out = matmul.output(0).context(GraphSnafu)?;
                let rank = out.rank();
                for (i, axis) in out.axis().iter().enumerate() {
                    let role = if i + 2 < rank { AxisRole::Batch } else { kept_role(graph, *axis) };
                    axes.push((*axis, role));
                }
                let lhs = graph.tensor(first_input(graph, matmul.id)?).context(GraphSnafu)?;
                if let Some(k) = lhs.axis().last() {
                    axes.push((*k, AxisRole::R));
                }
            }
        }
        TaskKind::Elementwise => {
            if let Some(tensor) = widest_tensor(graph) {
                axes.extend(tensor.axis().iter().map(|a| (*a, kept_role(graph, *a))));
            }
        }
    }
    Ok(AxisGroup { axes })
}
