//! Redundant cast cancellation.
//!
//! Three rewrites run to a fixpoint:
//!
//! 1. identity casts (`A -> A`) are bypassed and removed;
//! 2. a cast whose producer is a single-consumer cast is composed with it
//!    when the composed conversion is one hardware instruction and the
//!    intermediate dtype holds every source value exactly;
//! 3. casts reading the same producer output into the same dtype are merged
//!    into the lowest-id one, which then fans out to all their readers.
//!
//! Rule 2 never composes a chain that [`super::DtypeConsistency`] expanded
//! (those exist because no direct instruction does), which keeps the two
//! passes jointly idempotent.

use std::collections::BTreeMap;

use snafu::ResultExt;
use tessera_dtype::DType;
use tessera_ir::{Edge, Graph, NodeId, OpKind};
use tracing::debug;

use super::{Pass, PassContext};
use crate::error::*;

const NAME: &str = "CancelRedundantCast";

pub struct CancelRedundantCast;

impl Pass for CancelRedundantCast {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, _ctx: &PassContext<'_>) -> Result<bool> {
        let mut total = 0;
        loop {
            let step = remove_identity_casts(graph)? + merge_cast_chains(graph)? + merge_duplicate_casts(graph)?;
            if step == 0 {
                break;
            }
            total += step;
        }
        Ok(total > 0)
    }
}

fn cast_ids(graph: &Graph) -> Vec<NodeId> {
    graph.nodes().filter(|n| n.kind.is_cast()).map(|n| n.id).collect()
}

/// `(input edge, source dtype, target dtype)` of a cast.
fn cast_signature(graph: &Graph, id: NodeId) -> Result<(Edge, DType, DType)> {
    let input = graph.input_edge(id, 0).context(GraphSnafu)?;
    let from = graph.tensor(input).context(GraphSnafu)?.dtype;
    let to = graph.tensor(Edge::of(id)).context(GraphSnafu)?.dtype;
    Ok((input, from, to))
}

fn remove_identity_casts(graph: &mut Graph) -> Result<usize> {
    let mut removed = 0;
    for id in cast_ids(graph) {
        let (input, from, to) = cast_signature(graph, id)?;
        if from != to {
            continue;
        }
        graph.replace_uses(Edge::of(id), input).context(GraphSnafu)?;
        let node = graph.remove_node(id).context(GraphSnafu)?;
        debug!(pass = NAME, node = %node.name, dtype = %from, "remove identity cast");
        removed += 1;
    }
    Ok(removed)
}

fn merge_cast_chains(graph: &mut Graph) -> Result<usize> {
    let mut merged = 0;
    for id in cast_ids(graph) {
        if !graph.contains(id) {
            continue;
        }
        let (inner, mid, to) = cast_signature(graph, id)?;
        if !matches!(graph.node(inner.node).context(GraphSnafu)?.kind, OpKind::Cast) {
            continue;
        }
        if graph.node_consumers(inner.node) != [id] || graph.consumers(inner) != [(id, 0)] {
            continue;
        }
        let (source, from, _) = cast_signature(graph, inner.node)?;
        if !(from.has_direct_cast(to) && from.can_safe_cast(mid)) {
            debug!(pass = NAME, %from, %mid, %to, "keep cast chain");
            continue;
        }
        graph.set_input(id, 0, source).context(GraphSnafu)?;
        let node = graph.remove_node(inner.node).context(GraphSnafu)?;
        debug!(pass = NAME, removed = %node.name, %from, %mid, %to, "compose cast chain");
        merged += 1;
    }
    Ok(merged)
}

fn merge_duplicate_casts(graph: &mut Graph) -> Result<usize> {
    let mut groups: BTreeMap<(Edge, DType), Vec<NodeId>> = BTreeMap::new();
    for id in cast_ids(graph) {
        let (input, _, to) = cast_signature(graph, id)?;
        groups.entry((input, to)).or_default().push(id);
    }

    let mut merged = 0;
    for ((input, to), ids) in groups {
        let Some((&keeper, duplicates)) = ids.split_first() else { continue };
        for &duplicate in duplicates {
            graph.replace_uses(Edge::of(duplicate), Edge::of(keeper)).context(GraphSnafu)?;
            graph.remove_node(duplicate).context(GraphSnafu)?;
            merged += 1;
        }
        if !duplicates.is_empty() {
            debug!(pass = NAME, producer = %input.node, %to, merged = duplicates.len(), "merge duplicate casts");
        }
    }
    Ok(merged)
}
