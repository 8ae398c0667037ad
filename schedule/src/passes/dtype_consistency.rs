//! Dtype consistency.
//!
//! Walks the graph in data-flow order and makes every edge carry a dtype the
//! consumer can compute in:
//!
//! - operands that must agree are promoted to their least upper dtype (then
//!   widened to one the operator supports) by casts on the input edges;
//! - the operator's own output dtype is retyped in place to follow;
//! - a `Store` keeps its declared dtype, so a trailing cast is inserted on its
//!   input when the computed value differs;
//! - a cast the vector unit cannot execute in one instruction is expanded into
//!   the shortest chain of direct casts.

use snafu::{OptionExt, ResultExt};
use tessera_dtype::DType;
use tessera_ir::{Edge, Graph, NodeId, OpKind};
use tracing::debug;

use super::{Pass, PassContext};
use crate::capability::{OutputDtype, capability, compute_dtype, promoted_slots};
use crate::error::*;

const NAME: &str = "DtypeConsistency";

pub struct DtypeConsistency;

impl Pass for DtypeConsistency {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, _ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for id in graph.topo_order().context(GraphSnafu)? {
            changed |= align_node(graph, id)?;
        }
        changed |= expand_cast_routes(graph)?;
        Ok(changed)
    }
}

fn align_node(graph: &mut Graph, id: NodeId) -> Result<bool> {
    let node = graph.node(id).context(GraphSnafu)?;
    let kind = node.kind.clone();
    let name = node.name.clone();
    let arity = node.inputs.len();
    let input_dtypes = (0..arity)
        .map(|i| graph.input_tensor(id, i).map(|t| t.dtype))
        .collect::<Result<Vec<_>, _>>()
        .context(GraphSnafu)?;
    let mut changed = false;

    if matches!(kind, OpKind::Store) {
        let declared = node.output(0).context(GraphSnafu)?.dtype;
        if input_dtypes[0] != declared {
            insert_cast(graph, id, 0, declared)?;
            changed = true;
        }
        return Ok(changed);
    }

    let cap = capability(&kind);
    let slots = promoted_slots(&kind, arity);
    let compute = if slots.is_empty() {
        input_dtypes.first().copied()
    } else {
        let operands: Vec<DType> = slots.iter().map(|s| input_dtypes[*s]).collect();
        let reason = || format!("no {} compute dtype for {operands:?}", kind.type_name());
        let upper = DType::least_upper_dtype(&operands)
            .context(UnsupportedRewriteSnafu { pass: NAME, node: name.clone(), reason: reason() })?;
        let target = compute_dtype(upper, cap.dtypes)
            .context(UnsupportedRewriteSnafu { pass: NAME, node: name.clone(), reason: reason() })?;
        for slot in slots {
            if input_dtypes[slot] != target {
                insert_cast(graph, id, slot, target)?;
                changed = true;
            }
        }
        Some(target)
    };

    let expected = match cap.output {
        OutputDtype::SameAsInput => compute,
        OutputDtype::Bool => Some(DType::Bool),
        OutputDtype::Declared => None,
    };
    if let Some(expected) = expected {
        let node = graph.node_mut(id).context(GraphSnafu)?;
        for output in node.outputs.iter_mut().filter(|t| t.dtype != expected) {
            debug!(pass = NAME, node = %name, from = %output.dtype, to = %expected, "retype output");
            output.dtype = expected;
            changed = true;
        }
    }
    Ok(changed)
}

/// Cast input `slot` of `consumer` to `dtype`.
fn insert_cast(graph: &mut Graph, consumer: NodeId, slot: usize, dtype: DType) -> Result<NodeId> {
    let mut tensor = graph.input_tensor(consumer, slot).context(GraphSnafu)?.to_contiguous();
    tensor.dtype = dtype;
    tensor.mem = Default::default();
    let consumer_name = graph.node(consumer).context(GraphSnafu)?.name.clone();
    let name = graph.unique_name(&format!("{consumer_name}_in{slot}_cast"));
    debug!(pass = NAME, node = %consumer_name, slot, to = %dtype, "insert cast");
    graph.insert_on_input(consumer, slot, name, OpKind::Cast, tensor).context(GraphSnafu)
}

/// Replace every cast without a direct instruction by its shortest route.
fn expand_cast_routes(graph: &mut Graph) -> Result<bool> {
    let casts: Vec<NodeId> = graph.nodes().filter(|n| n.kind.is_cast()).map(|n| n.id).collect();
    let mut changed = false;
    for id in casts {
        let from = graph.input_tensor(id, 0).context(GraphSnafu)?.dtype;
        let node = graph.node(id).context(GraphSnafu)?;
        let to = node.output(0).context(GraphSnafu)?.dtype;
        if from.has_direct_cast(to) {
            continue;
        }
        let name = node.name.clone();
        let route = DType::cast_route(from, to).context(UnsupportedCastSnafu { node: name.clone(), from, to })?;
        debug!(pass = NAME, node = %name, %from, %to, steps = route.len(), "expand cast route");

        let template = node.output(0).context(GraphSnafu)?.clone();
        graph.tensor_mut(Edge::of(id)).context(GraphSnafu)?.dtype = route[0];
        let mut previous = id;
        for (i, step) in route.iter().enumerate().skip(1) {
            let mut tensor = template.clone();
            tensor.dtype = *step;
            let step_name = graph.unique_name(&format!("{name}_step{i}"));
            previous = graph.insert_after(Edge::of(previous), step_name, OpKind::Cast, tensor).context(GraphSnafu)?;
        }
        changed = true;
    }
    Ok(changed)
}
