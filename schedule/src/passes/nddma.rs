//! Non-contiguous DMA substitution.
//!
//! `Load` followed by a chain of `Broadcast`/`Transpose` nodes only
//! rearranges memory. When the chain's final view fits one strided DMA
//! descriptor the whole chain becomes a single `Nddma` node reading the load's
//! source directly.
//!
//! Whether this pays off depends on the runtime tail extent, so the variant is
//! normally offered as an alternative template and ranked by
//! [`nddma_score_func`]. Under [`crate::config::NddmaPolicy::Force`] the pass
//! runs unconditionally in the pipeline.

use snafu::ResultExt;
use tessera_ir::{Edge, Graph, NodeId, OpKind, SizeExpr};
use tracing::debug;

use super::{Pass, PassContext};
use crate::config::PlatformConfig;
use crate::error::*;
use crate::render::tiling_data_expr;

const NAME: &str = "NddmaSubstitution";

/// Tail rows shorter than this make the descriptor walk dominate the copy.
pub const NDDMA_MIN_TAIL_BYTES: i64 = 128;

pub struct NddmaSubstitution;

impl Pass for NddmaSubstitution {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, ctx: &PassContext<'_>) -> Result<bool> {
        Ok(substitute_nddma(graph, ctx.platform)? > 0)
    }
}

/// Memory-only nodes following `load`, each the sole reader of the previous.
fn movement_chain(graph: &Graph, load: NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = load;
    loop {
        let readers = graph.consumers(Edge::of(current));
        let [(next, _)] = readers.as_slice() else { break };
        let movement = graph.node(*next).is_ok_and(|n| matches!(n.kind, OpKind::Broadcast | OpKind::Transpose));
        if !movement || graph.node_consumers(current) != [*next] {
            break;
        }
        chain.push(*next);
        current = *next;
    }
    chain
}

/// Replace every eligible load chain; returns the number of `Nddma` nodes created.
#[tracing::instrument(skip_all, fields(graph = graph.name()))]
pub fn substitute_nddma(graph: &mut Graph, platform: &PlatformConfig) -> Result<usize> {
    let loads: Vec<NodeId> = graph.nodes().filter(|n| matches!(n.kind, OpKind::Load)).map(|n| n.id).collect();
    let mut created = 0;

    for load in loads {
        let chain = movement_chain(graph, load);
        let Some(&end) = chain.last() else { continue };
        let mut tensor = graph.tensor(Edge::of(end)).context(GraphSnafu)?.clone();
        if tensor.rank() > platform.nddma_max_dims {
            debug!(pass = NAME, rank = tensor.rank(), max = platform.nddma_max_dims, "view too deep for one descriptor");
            continue;
        }
        tensor.mem = Default::default();

        let source = graph.input_edge(load, 0).context(GraphSnafu)?;
        let load_name = graph.node(load).context(GraphSnafu)?.name.clone();
        let name = graph.unique_name(&format!("{load_name}_nddma"));
        let nddma = graph.add_node(name, OpKind::Nddma, [source], [tensor]).context(GraphSnafu)?;
        graph.replace_uses(Edge::of(end), Edge::of(nddma)).context(GraphSnafu)?;
        for id in chain.iter().rev() {
            graph.remove_node(*id).context(GraphSnafu)?;
        }
        graph.remove_node(load).context(GraphSnafu)?;

        debug!(pass = NAME, load = %load_name, folded = chain.len(), "substitute nddma");
        created += 1;
    }
    Ok(created)
}

/// Runtime score body ranking the `Nddma` variant of `graph`.
///
/// The tail row (innermost extent of each `Nddma` output, in bytes) must be
/// block aligned, or the variant is rejected with `-1`. A tail of at least
/// [`NDDMA_MIN_TAIL_BYTES`] is preferred with `1`; shorter tails score `0`.
/// Constant tails are decided here and yield a single `return`.
pub fn nddma_score_func(graph: &Graph, platform: &PlatformConfig) -> String {
    let tails: Vec<SizeExpr> = graph
        .nodes()
        .filter(|n| matches!(n.kind, OpKind::Nddma))
        .filter_map(|n| n.outputs.first())
        .filter_map(|t| {
            let last = t.repeats().last()?;
            Some(SizeExpr::mul(last.clone(), SizeExpr::constant(t.dtype.bytes() as i64)))
        })
        .collect();
    let align = i64::from(platform.block_align);

    if tails.is_empty() {
        return "return 0;".to_string();
    }
    if let Some(values) = tails.iter().map(SizeExpr::as_const).collect::<Option<Vec<_>>>() {
        let score = if values.iter().any(|v| v % align != 0) {
            -1
        } else if values.iter().all(|v| *v >= NDDMA_MIN_TAIL_BYTES) {
            1
        } else {
            0
        };
        return format!("return {score};");
    }

    let mut body = String::new();
    for (i, tail) in tails.iter().enumerate() {
        body.push_str(&format!("int64_t tail{i} = {};\n", tiling_data_expr(tail)));
        body.push_str(&format!("if (tail{i} % {align} != 0) {{ return -1; }}\n"));
    }
    let long = (0..tails.len()).map(|i| format!("tail{i} >= {NDDMA_MIN_TAIL_BYTES}")).collect::<Vec<_>>().join(" && ");
    body.push_str(&format!("return ({long}) ? 1 : 0;"));
    body
}
