//! Scalar broadcast simplification.
//!
//! A broadcast chain is a run of `Broadcast` nodes fed by a degenerate source
//! (a `Scalar`, or a `Load` whose view has extent one everywhere), each link
//! read only by the next. For every chain:
//!
//! - if each reader can take the degenerate source directly in that input slot,
//!   the chain is removed and readers are wired to the source;
//! - otherwise a chain of several broadcasts collapses into its last one;
//! - otherwise it is left alone.
//!
//! Of the operands of one reader, only the lowest accepting slot that is
//! scalar-derived is eligible, so a reader never ends up with two degenerate
//! operands (`Select(c, bcast(a), bcast(b))` keeps the broadcast on `b`).

use snafu::ResultExt;
use tessera_ir::{Edge, Graph, NodeId, OpKind};
use tracing::{debug, trace};

use super::{Pass, PassContext};
use crate::capability::capability;
use crate::error::*;

const NAME: &str = "ScalarBroadcastSimplify";

pub struct ScalarBroadcastSimplify;

impl Pass for ScalarBroadcastSimplify {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, _ctx: &PassContext<'_>) -> Result<bool> {
        let ends: Vec<NodeId> = graph
            .nodes()
            .filter(|n| matches!(n.kind, OpKind::Broadcast))
            .filter(|n| graph.node_consumers(n.id).iter().all(|c| !is_broadcast(graph, *c)))
            .map(|n| n.id)
            .collect();

        let mut changed = false;
        for end in ends {
            if !graph.contains(end) {
                continue;
            }
            let Some(chain) = broadcast_chain(graph, end) else { continue };
            changed |= simplify_chain(graph, &chain)?;
        }
        Ok(changed)
    }
}

/// Broadcasts from the chain end down to the one reading `source`.
#[derive(Debug)]
struct Chain {
    source: Edge,
    broadcasts: Vec<NodeId>,
}

fn is_broadcast(graph: &Graph, id: NodeId) -> bool {
    graph.node(id).is_ok_and(|n| matches!(n.kind, OpKind::Broadcast))
}

fn is_degenerate_source(graph: &Graph, edge: Edge) -> bool {
    let Ok(node) = graph.node(edge.node) else { return false };
    match node.kind {
        OpKind::Scalar { .. } => true,
        OpKind::Load => graph.tensor(edge).is_ok_and(|t| t.is_degenerate()),
        _ => false,
    }
}

fn broadcast_chain(graph: &Graph, end: NodeId) -> Option<Chain> {
    let mut broadcasts = vec![end];
    let mut current = end;
    loop {
        let input = graph.input_edge(current, 0).ok()?;
        if is_degenerate_source(graph, input) {
            return Some(Chain { source: input, broadcasts });
        }
        if !is_broadcast(graph, input.node) || graph.node_consumers(input.node) != [current] {
            return None;
        }
        broadcasts.push(input.node);
        current = input.node;
    }
}

fn is_scalar_derived(graph: &Graph, edge: Edge) -> bool {
    is_degenerate_source(graph, edge) || (is_broadcast(graph, edge.node) && broadcast_chain(graph, edge.node).is_some())
}

/// The one input slot of `consumer` allowed to take a degenerate operand.
fn simplifiable_slot(graph: &Graph, consumer: NodeId) -> Option<usize> {
    let node = graph.node(consumer).ok()?;
    let cap = capability(&node.kind);
    cap.scalar_slots.iter().copied().filter(|s| *s < node.inputs.len()).find(|s| is_scalar_derived(graph, node.inputs[*s]))
}

fn simplify_chain(graph: &mut Graph, chain: &Chain) -> Result<bool> {
    let end = chain.broadcasts[0];
    let readers = graph.consumers(Edge::of(end));
    let removable = !readers.is_empty() && readers.iter().all(|(c, slot)| simplifiable_slot(graph, *c) == Some(*slot));

    if removable {
        graph.replace_uses(Edge::of(end), chain.source).context(GraphSnafu)?;
        for id in &chain.broadcasts {
            graph.remove_node(*id).context(GraphSnafu)?;
        }
        debug!(pass = NAME, source = %chain.source.node, removed = chain.broadcasts.len(), "remove scalar broadcast chain");
        return Ok(true);
    }

    if chain.broadcasts.len() > 1 {
        graph.set_input(end, 0, chain.source).context(GraphSnafu)?;
        for id in &chain.broadcasts[1..] {
            graph.remove_node(*id).context(GraphSnafu)?;
        }
        debug!(pass = NAME, end = %end, collapsed = chain.broadcasts.len() - 1, "collapse broadcast chain");
        return Ok(true);
    }

    trace!(pass = NAME, end = %end, "broadcast kept");
    Ok(false)
}
