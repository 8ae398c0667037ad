//! Two-phase reduction across cores.
//!
//! Phase 1 splits the outermost reduced axis `r` into `rB` (one slice per
//! core) and `rb` (elements per core), reduces each slice, and stores the
//! partials into a workspace. Phase 2 loads the `rB_size` partials and finishes
//! the reduction with the combining operator, followed by a division for
//! `Mean`. The two phases are separate schedule groups; the workspace is the
//! only value passed between them.
//!
//! When some consumer of the reduction still runs over the full `r` extent
//! (`x - max(x)`), phase 2 stops after finishing the reduction and stores it
//! into a second workspace. A third group reloads it together with the other
//! operands and runs the remaining nodes over `r`.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt};
use tessera_ir::{AxisId, AxisKind, BinaryOp, Edge, Graph, NodeId, OpKind, ReduceOp, SizeExpr, Tensor};
use tracing::{debug, warn};

use super::task::ReduceInfo;
use super::tiling::{BLOCK_SPLIT, split_axis};
use crate::error::*;
use crate::result::VarRelations;

/// Both phases of a split reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoPhase {
    pub phase1: Graph,
    pub phase2: Graph,
    pub workspace: String,
    /// Consumers of the finished reduction that run over the full reduced
    /// axis, reading it back from `{task}_ws1`.
    pub epilogue: Option<Graph>,
    pub var_relations: VarRelations,
}

fn ancestors(graph: &Graph, node: NodeId) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::from([node]);
    let mut frontier = vec![node];
    while let Some(id) = frontier.pop() {
        let Ok(n) = graph.node(id) else { continue };
        for edge in &n.inputs {
            if seen.insert(edge.node) {
                frontier.push(edge.node);
            }
        }
    }
    seen
}

fn descendants(graph: &Graph, node: NodeId) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::from([node]);
    let mut frontier = vec![node];
    while let Some(id) = frontier.pop() {
        for reader in graph.node_consumers(id) {
            if seen.insert(reader) {
                frontier.push(reader);
            }
        }
    }
    seen
}

/// Remove unread nodes except kernel outputs and workspaces.
fn sweep(graph: &mut Graph) -> Result<()> {
    loop {
        let dead: Vec<NodeId> = graph
            .nodes()
            .filter(|n| !matches!(n.kind, OpKind::Output { .. } | OpKind::Workspace))
            .filter(|n| graph.node_consumers(n.id).is_empty())
            .map(|n| n.id)
            .collect();
        if dead.is_empty() {
            return Ok(());
        }
        for id in dead {
            graph.remove_node(id).context(GraphSnafu)?;
        }
    }
}

/// Whether some node downstream of the reduction spans `r` beyond extent one.
fn reads_full_axis(graph: &Graph, reduce: NodeId, r: AxisId) -> bool {
    descendants(graph, reduce).into_iter().filter(|id| *id != reduce).filter_map(|id| graph.node(id).ok()).any(|n| {
        n.outputs.iter().any(|t| t.position_of(r).is_some_and(|p| !t.repeats()[p].is_one()))
    })
}

/// Keep only `node` and what it reads.
fn keep_ancestors(graph: &mut Graph, node: NodeId) -> Result<()> {
    let keep = ancestors(graph, node);
    let mut order = graph.topo_order().context(GraphSnafu)?;
    order.reverse();
    for id in order.into_iter().filter(|id| !keep.contains(id)) {
        graph.remove_node(id).context(GraphSnafu)?;
    }
    Ok(())
}

/// The original graph with the reduction replaced by a load of `workspace`.
fn epilogue_graph(graph: &Graph, info: &ReduceInfo, task_name: &str, workspace: &str) -> Result<Graph> {
    let mut epilogue = graph.clone();
    epilogue.set_name(format!("{task_name}_phase3"));
    let reduced = epilogue.node(info.node).context(GraphSnafu)?.output(0).context(GraphSnafu)?;
    let tensor = Tensor::contiguous(reduced.dtype, reduced.axis().iter().copied(), reduced.repeats().iter().cloned());
    let ws = epilogue.add_node(workspace, OpKind::Workspace, [], [tensor]).context(GraphSnafu)?;
    let load = epilogue.load(&format!("{workspace}_load"), ws).context(GraphSnafu)?;
    epilogue.replace_uses(Edge::of(info.node), Edge::of(load)).context(GraphSnafu)?;
    epilogue.remove_node(info.node).context(GraphSnafu)?;
    sweep(&mut epilogue)?;
    Ok(epilogue)
}

fn with_axis_replaced(tensor: &Tensor, from: AxisId, to: AxisId, extent: Option<SizeExpr>) -> Tensor {
    let Some(p) = tensor.position_of(from) else { return tensor.clone() };
    let axes: SmallVec<[AxisId; 4]> = tensor.axis().iter().map(|a| if *a == from { to } else { *a }).collect();
    let mut repeats: SmallVec<[SizeExpr; 4]> = tensor.repeats().iter().cloned().collect();
    if let Some(extent) = extent {
        repeats[p] = extent;
    }
    let mut out = Tensor::contiguous(tensor.dtype, axes, repeats);
    out.mem = tensor.mem.clone();
    out
}

/// Build both phases for the reduction `info` of `graph`; `None` when the
/// reduced axis cannot be split.
#[tracing::instrument(skip_all, fields(task = task_name))]
pub fn split_two_phase(graph: &Graph, info: &ReduceInfo, task_name: &str) -> Result<Option<TwoPhase>> {
    let Some(&r) = info.axes.first() else { return Ok(None) };
    let r_axis = graph.axis(r).context(GraphSnafu)?.clone();
    let workspace = format!("{task_name}_ws0");
    let reduce_name = graph.node(info.node).context(GraphSnafu)?.name.clone();

    // Phase 1: partial reduction per core into the workspace.
    let mut phase1 = graph.clone();
    phase1.set_name(format!("{task_name}_phase1"));
    keep_ancestors(&mut phase1, info.node)?;
    let Some((r_outer, _)) = split_axis(&mut phase1, r, BLOCK_SPLIT)? else {
        warn!(axis = %r_axis.name, "reduced axis cannot be split across cores");
        return Ok(None);
    };
    let partial_extent = phase1.axis(r_outer).context(GraphSnafu)?.size.clone();
    let partial = phase1.node_mut(info.node).context(GraphSnafu)?;
    partial.kind = OpKind::Reduce(info.op.combiner());
    let out = partial.output(0).context(GraphSnafu)?;
    let partial_tensor = {
        let p = out.position_of(r_outer).context(InvalidInputSnafu { reason: "partial reduce lost its block axis" })?;
        let mut repeats: SmallVec<[SizeExpr; 4]> = out.repeats().iter().cloned().collect();
        repeats[p] = partial_extent.clone();
        Tensor::contiguous(out.dtype, out.axis().iter().copied(), repeats)
    };
    *partial.output_mut(0).context(GraphSnafu)? = partial_tensor;
    let store = phase1.store(&format!("{reduce_name}_partial_store"), info.node).context(GraphSnafu)?;
    phase1.workspace_from(&workspace, store).context(GraphSnafu)?;

    // Phase 2: reload the partials and finish.
    let result_workspace = reads_full_axis(graph, info.node, r).then(|| format!("{task_name}_ws1"));
    let mut phase2 = graph.clone();
    phase2.set_name(format!("{task_name}_phase2"));
    if result_workspace.is_some() {
        keep_ancestors(&mut phase2, info.node)?;
    }
    let count_var = format!("{}B_size", r_axis.name);
    let count = phase2.create_size_var(&count_var);
    let r_blocks = phase2.create_derived_axis(format!("{}B", r_axis.name), count.clone(), AxisKind::BlockOuter, [r]);

    let downstream = descendants(&phase2, info.node);
    for id in &downstream {
        let node = phase2.node_mut(*id).context(GraphSnafu)?;
        for tensor in node.outputs.iter_mut() {
            *tensor = with_axis_replaced(tensor, r, r_blocks, None);
        }
        for axis in node.sched.axis.iter_mut().filter(|a| **a == r) {
            *axis = r_blocks;
        }
    }
    let finished = phase2.node(info.node).context(GraphSnafu)?.output(0).context(GraphSnafu)?.clone();
    let ws_tensor = with_axis_replaced(&finished, r_blocks, r_blocks, Some(count));
    let ws = phase2.add_node(workspace.clone(), OpKind::Workspace, [], [ws_tensor]).context(GraphSnafu)?;
    let load = phase2.load(&format!("{workspace}_load"), ws).context(GraphSnafu)?;
    let combine = phase2
        .add_node(format!("{reduce_name}_combine"), OpKind::Reduce(info.op.combiner()), [Edge::of(load)], [finished.clone()])
        .context(GraphSnafu)?;
    let mut result = combine;
    if info.op == ReduceOp::Mean {
        let axes: Vec<AxisId> = finished.axis().to_vec();
        let divisor = phase2
            .scalar(&format!("{reduce_name}_count"), info.extent.to_string(), finished.dtype, &axes)
            .context(GraphSnafu)?;
        result = phase2
            .add_node(
                format!("{reduce_name}_mean"),
                OpKind::Binary(BinaryOp::Div),
                [Edge::of(combine), Edge::of(divisor)],
                [finished],
            )
            .context(GraphSnafu)?;
    }
    phase2.replace_uses(Edge::of(info.node), Edge::of(result)).context(GraphSnafu)?;
    phase2.remove_node(info.node).context(GraphSnafu)?;
    let epilogue = match &result_workspace {
        Some(name) => {
            let store = phase2.store(&format!("{reduce_name}_result_store"), result).context(GraphSnafu)?;
            phase2.workspace_from(name, store).context(GraphSnafu)?;
            Some(epilogue_graph(graph, info, task_name, name)?)
        }
        None => None,
    };
    sweep(&mut phase2)?;

    let relation = SizeExpr::ceil_div(r_axis.size.clone(), SizeExpr::symbol(format!("{}b_size", r_axis.name)));
    let var_relations: VarRelations =
        BTreeMap::from([(1, BTreeMap::from([(0, BTreeMap::from([(count_var, relation)]))]))]);

    debug!(
        reduce = %reduce_name,
        axis = %r_axis.name,
        %workspace,
        epilogue = epilogue.is_some(),
        "split reduction in two phases"
    );
    Ok(Some(TwoPhase { phase1, phase2, workspace, epilogue, var_relations }))
}
