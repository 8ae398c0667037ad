//! Buffer and queue allocation.
//!
//! Runs once per ImplGraph and fills every tensor's [`MemAttr`]:
//!
//! - kernel inputs, outputs and the stores writing them live in global memory,
//!   workspaces and their writers in workspace memory; a store shares the id of
//!   the global tensor it writes;
//! - values crossing a compute-unit boundary become queues, everything else a
//!   plain buffer;
//! - on-chip values whose lifetimes never overlap share a `reuse_id`;
//! - operators with scratch needs get `tmp_buffers`.
//!
//! Global ids follow the hint graph (inputs by index, then outputs, then
//! workspaces) so every ImplGraph of a kernel agrees on them.

pub mod liveness;
pub mod workspace;

use std::collections::{BTreeMap, BTreeSet};

use snafu::{ResultExt, ensure};
use tessera_ir::{AllocType, ComputeType, ComputeUnit, Edge, Graph, MemAttr, NodeId, OpKind, Position, SizeExpr, TmpBuffer};
use tracing::{debug, trace};

use crate::capability::{ScratchRule, capability};
use crate::config::PlatformConfig;
use crate::error::*;
use liveness::{Interval, ReuseRequest};

pub use workspace::{
    candidate_workspace_size, fused_workspace_size, render_get_workspace_size, tensor_workspace_bytes, workspace_size,
};

/// Names of global tensors in id order.
fn global_names(hint: &Graph, graph: &Graph) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };
    for id in hint.inputs().into_iter().chain(hint.outputs()).chain(hint.workspaces()) {
        if let Ok(node) = hint.node(id) {
            push(&node.name);
        }
    }
    let mut extra: Vec<&str> = graph
        .nodes()
        .filter(|n| n.kind.is_io())
        .map(|n| n.name.as_str())
        .collect();
    extra.sort();
    for name in extra {
        push(name);
    }
    names
}

/// Global node written by `store`, if it feeds one.
fn store_target(graph: &Graph, store: NodeId) -> Option<NodeId> {
    graph
        .consumers(Edge::of(store))
        .into_iter()
        .map(|(reader, _)| reader)
        .find(|reader| graph.node(*reader).is_ok_and(|n| matches!(n.kind, OpKind::Output { .. } | OpKind::Workspace)))
}

fn global_alloc(kind: &OpKind) -> AllocType {
    if matches!(kind, OpKind::Workspace) { AllocType::Workspace } else { AllocType::Global }
}

/// Allocate every tensor of `graph`; `hint` is the graph the ImplGraph was
/// scheduled from.
#[tracing::instrument(skip_all, fields(graph = graph.name()))]
pub fn alloc_buf_que(hint: &Graph, graph: &mut Graph, platform: &PlatformConfig, double_buffer: bool) -> Result<()> {
    let order = graph.topo_order().context(GraphSnafu)?;
    let names = global_names(hint, graph);
    let global_id = |name: &str| names.iter().position(|n| n == name).map(|p| p as u32);
    let buf_num = if double_buffer { 2 } else { 1 };

    let mut mem: BTreeMap<Edge, MemAttr> = BTreeMap::new();
    let mut next_id = names.len() as u32;

    for id in &order {
        let node = graph.node(*id).context(GraphSnafu)?;
        let cap = capability(&node.kind);
        for (slot, tensor) in node.outputs.iter().enumerate() {
            let edge = Edge::new(*id, slot);
            let mut attr = MemAttr { merge_scope: tensor.mem.merge_scope, ..MemAttr::default() };

            if node.kind.is_io() {
                attr.alloc_type = global_alloc(&node.kind);
                attr.tensor_id = global_id(&node.name);
                attr.position = Position::Gm;
            } else if matches!(node.kind, OpKind::Store) {
                let target = store_target(graph, *id).and_then(|t| graph.node(t).ok());
                attr.alloc_type = target.map_or(AllocType::Global, |t| global_alloc(&t.kind));
                attr.tensor_id = match target {
                    Some(t) => global_id(&t.name),
                    None => {
                        next_id += 1;
                        Some(next_id - 1)
                    }
                };
                attr.position = Position::Gm;
                attr.hardware = ComputeUnit::Mte3;
            } else {
                let feeds_store = graph
                    .consumers(edge)
                    .iter()
                    .any(|(reader, _)| graph.node(*reader).is_ok_and(|n| matches!(n.kind, OpKind::Store)));
                let moves_in = matches!(node.kind, OpKind::Load | OpKind::Nddma) || node.compute_type == ComputeType::Load;
                let (alloc_type, position, hardware) = if moves_in {
                    (AllocType::Queue, Position::VecIn, ComputeUnit::Mte2)
                } else if matches!(node.kind, OpKind::MatMul(_)) {
                    (AllocType::Queue, Position::L0C, ComputeUnit::Cube)
                } else if feeds_store {
                    (AllocType::Queue, Position::VecOut, cap.unit)
                } else {
                    (AllocType::Buffer, Position::VecCalc, cap.unit)
                };
                attr.alloc_type = alloc_type;
                attr.position = position;
                attr.hardware = hardware;
                attr.tensor_id = Some(next_id);
                next_id += 1;
                if alloc_type == AllocType::Queue {
                    attr.depth = cap.depth.max(1);
                    attr.buf_num = buf_num;
                } else {
                    attr.depth = 1;
                    attr.buf_num = 1;
                }
            }
            trace!(node = %node.name, slot, alloc = %attr.alloc_type, position = %attr.position, "allocate tensor");
            mem.insert(edge, attr);
        }
    }

    let mut scratch = scratch_buffers(graph, &order, platform)?;
    assign_reuse(graph, &order, &mut mem, &mut scratch);

    for (edge, attr) in &mem {
        graph.tensor_mut(*edge).context(GraphSnafu)?.mem = attr.clone();
    }
    for id in graph.node_ids() {
        graph.node_mut(id).context(GraphSnafu)?.tmp_buffers = scratch.remove(&id).unwrap_or_default();
    }
    verify(graph, &order)?;
    debug!(tensors = mem.len(), "buffers allocated");
    Ok(())
}

/// Scratch requirement of each node from its [`ScratchRule`].
fn scratch_buffers(graph: &Graph, order: &[NodeId], platform: &PlatformConfig) -> Result<BTreeMap<NodeId, Vec<TmpBuffer>>> {
    let align = i64::from(platform.block_align);
    let mut out = BTreeMap::new();
    for id in order {
        let node = graph.node(*id).context(GraphSnafu)?;
        let input = |i: usize| graph.input_tensor(*id, i).context(GraphSnafu);
        let size = match capability(&node.kind).scratch {
            ScratchRule::None => None,
            ScratchRule::UnalignedBroadcast => {
                let src = input(0)?;
                let row = src.repeats().last().cloned().unwrap_or_else(SizeExpr::one);
                let row_bytes = SizeExpr::mul(row, SizeExpr::constant(src.dtype.bytes() as i64));
                let aligned = row_bytes.as_const().is_some_and(|b| b % align == 0);
                match (aligned, node.outputs.first()) {
                    (false, Some(out)) => Some(out.size_bytes().align_up(align)),
                    _ => None,
                }
            }
            ScratchRule::Reduce => {
                let src = input(0)?;
                let row = src.repeats().last().cloned().unwrap_or_else(SizeExpr::one);
                Some(SizeExpr::mul(row, SizeExpr::constant(src.dtype.bytes() as i64)).align_up(align))
            }
            ScratchRule::Transpose => Some(input(0)?.size_bytes().align_up(align)),
            ScratchRule::Gather if node.compute_type == ComputeType::Gather => {
                let indices = input(1)?;
                Some(SizeExpr::mul(indices.element_count(), SizeExpr::constant(4)).align_up(align))
            }
            ScratchRule::Gather => None,
        };
        if let Some(size) = size {
            out.insert(*id, vec![TmpBuffer { size, reuse_id: None }]);
        }
    }
    Ok(out)
}

/// Key of a reusable value: an output edge or a node's scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ReuseKey {
    Tensor(Edge),
    Scratch(NodeId, usize),
}

fn assign_reuse(
    graph: &Graph,
    order: &[NodeId],
    mem: &mut BTreeMap<Edge, MemAttr>,
    scratch: &mut BTreeMap<NodeId, Vec<TmpBuffer>>,
) {
    let intervals = liveness::intervals(graph, order);
    let step: BTreeMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut requests: Vec<ReuseRequest<ReuseKey>> = mem
        .iter()
        .filter(|(_, attr)| is_on_chip(attr))
        .filter_map(|(edge, attr)| {
            Some(ReuseRequest {
                key: ReuseKey::Tensor(*edge),
                position: attr.position,
                interval: *intervals.get(edge)?,
                exclusive: attr.merge_scope.is_some(),
            })
        })
        .collect();
    for (id, buffers) in scratch.iter() {
        let Some(&at) = step.get(id) else { continue };
        requests.extend((0..buffers.len()).map(|i| ReuseRequest {
            key: ReuseKey::Scratch(*id, i),
            position: Position::VecCalc,
            interval: Interval { start: at, end: at },
            exclusive: false,
        }));
    }

    for (key, color) in liveness::color(&requests, 0) {
        match key {
            ReuseKey::Tensor(edge) => {
                if let Some(attr) = mem.get_mut(&edge) {
                    attr.reuse_id = Some(color);
                }
            }
            ReuseKey::Scratch(id, i) => {
                if let Some(buffer) = scratch.get_mut(&id).and_then(|b| b.get_mut(i)) {
                    buffer.reuse_id = Some(color);
                }
            }
        }
    }
}

fn is_on_chip(attr: &MemAttr) -> bool {
    matches!(attr.alloc_type, AllocType::Queue | AllocType::Buffer)
}

/// On-chip ids are unique and values sharing a reuse id never overlap.
fn verify(graph: &Graph, order: &[NodeId]) -> Result<()> {
    let intervals = liveness::intervals(graph, order);
    let mut ids = BTreeSet::new();
    let mut groups: BTreeMap<(Position, u32), Vec<(Interval, &str)>> = BTreeMap::new();
    for node in graph.nodes() {
        for (slot, tensor) in node.outputs.iter().enumerate() {
            let attr = &tensor.mem;
            if !is_on_chip(attr) {
                continue;
            }
            if let Some(id) = attr.tensor_id {
                ensure!(
                    ids.insert(id),
                    AllocationConflictSnafu { graph: graph.name(), reason: format!("tensor id {id} assigned twice") }
                );
            }
            if let (Some(reuse), Some(interval)) = (attr.reuse_id, intervals.get(&Edge::new(node.id, slot))) {
                groups.entry((attr.position, reuse)).or_default().push((*interval, node.name.as_str()));
            }
        }
    }
    for ((position, reuse), members) in &groups {
        for (i, (a, name_a)) in members.iter().enumerate() {
            for (b, name_b) in &members[i + 1..] {
                ensure!(
                    !a.overlaps(b),
                    AllocationConflictSnafu {
                        graph: graph.name(),
                        reason: format!("'{name_a}' and '{name_b}' share {position} reuse id {reuse} while both live"),
                    }
                );
            }
        }
    }
    Ok(())
}
