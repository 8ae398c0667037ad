//! Workspace sizing.
//!
//! A workspace spans `repeats[0] * max(1, strides[0])` elements of its
//! outermost dimension. Sizes are symbolic; the generated `GetWorkspaceSize`
//! evaluates them against the tiling data at launch.

use std::collections::BTreeMap;

use itertools::Itertools;
use tessera_ir::{Graph, OpKind, SizeExpr, Tensor};

use crate::render::tiling_data_expr;
use crate::result::ScheduledResult;

/// Bytes of one workspace tensor, rounded up to `align`.
pub fn tensor_workspace_bytes(tensor: &Tensor, align: u32) -> SizeExpr {
    let bytes = SizeExpr::constant(tensor.dtype.bytes() as i64);
    let span = match (tensor.repeats().first(), tensor.strides().first()) {
        (Some(extent), Some(stride)) => {
            SizeExpr::product([bytes, extent.clone(), SizeExpr::max([SizeExpr::one(), stride.clone()])])
        }
        _ => bytes,
    };
    span.align_up(i64::from(align))
}

/// Per-name workspace bytes of one graph.
fn named_sizes(graph: &Graph, align: u32) -> BTreeMap<String, SizeExpr> {
    graph
        .nodes()
        .filter(|n| matches!(n.kind, OpKind::Workspace))
        .filter_map(|n| Some((n.name.clone(), tensor_workspace_bytes(n.outputs.first()?, align))))
        .collect()
}

/// Total workspace bytes of one graph; zero without workspaces.
pub fn workspace_size(graph: &Graph, align: u32) -> SizeExpr {
    SizeExpr::sum(named_sizes(graph, align).into_values()).align_up(i64::from(align))
}

/// Workspace bytes of one candidate.
///
/// A workspace shared between groups is counted once; across the ImplGraphs
/// that the tiling key chooses between, the largest size is taken.
pub fn candidate_workspace_size(result: &ScheduledResult, align: u32) -> SizeExpr {
    let per_name = result
        .impl_graphs()
        .flat_map(|ig| named_sizes(&ig.graph, align))
        .into_group_map();
    SizeExpr::sum(per_name.into_values().map(SizeExpr::max))
}

/// Workspace bytes of a fused kernel: per task the worst candidate, summed
/// over tasks.
pub fn fused_workspace_size(results: &[Vec<ScheduledResult>], align: u32) -> SizeExpr {
    SizeExpr::sum(
        results
            .iter()
            .filter(|candidates| !candidates.is_empty())
            .map(|candidates| SizeExpr::max(candidates.iter().map(|c| candidate_workspace_size(c, align)))),
    )
}

/// Text of the generated `GetWorkspaceSize` function.
pub fn render_get_workspace_size(results: &[Vec<ScheduledResult>], align: u32) -> String {
    let total = fused_workspace_size(results, align);
    format!(
        "int64_t GetWorkspaceSize(AutofuseTilingData &t) {{\n  int64_t ws_size = 0;\n  ws_size += {};\n  return ws_size;\n}}\n",
        tiling_data_expr(&total)
    )
}
