//! Wide concat splitting.
//!
//! A `Concat` with more inputs than the vector unit joins in one instruction
//! becomes a tree: its inputs are partitioned into balanced runs, each run is
//! joined by an inner `Concat`, and the original node joins the runs. Input
//! order along the concat axis is preserved.

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tessera_ir::{Edge, Graph, NodeId, OpKind, SizeExpr, Tensor};
use tracing::debug;

use super::{Pass, PassContext};
use crate::error::*;

const NAME: &str = "ConcatSplit";

pub struct ConcatSplit;

impl Pass for ConcatSplit {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, ctx: &PassContext<'_>) -> Result<bool> {
        let limit = ctx.platform.max_concat_inputs;
        let concats: Vec<NodeId> =
            graph.nodes().filter(|n| matches!(n.kind, OpKind::Concat { .. })).map(|n| n.id).collect();

        let mut changed = false;
        for id in concats {
            while graph.node(id).context(GraphSnafu)?.inputs.len() > limit {
                let node = graph.node(id).context(GraphSnafu)?;
                ensure!(
                    limit >= 2,
                    UnsupportedRewriteSnafu {
                        pass: NAME,
                        node: node.name.clone(),
                        reason: format!("max_concat_inputs is {limit}"),
                    }
                );
                split_once(graph, id, limit)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Sizes of `chunks` runs covering `n` items, longer runs first.
fn balanced_runs(n: usize, chunks: usize) -> Vec<usize> {
    let (base, extra) = (n / chunks, n % chunks);
    (0..chunks).map(|i| base + usize::from(i < extra)).collect()
}

fn split_once(graph: &mut Graph, id: NodeId, limit: usize) -> Result<()> {
    let node = graph.node(id).context(GraphSnafu)?;
    let OpKind::Concat { axis } = node.kind else { return Ok(()) };
    let name = node.name.clone();
    let inputs: Vec<Edge> = node.inputs.to_vec();
    let out = node.output(0).context(GraphSnafu)?.clone();
    let dim = out.position_of(axis).unwrap_or_default();
    let chunks = inputs.len().div_ceil(limit);

    let mut joined: SmallVec<[Edge; 3]> = SmallVec::new();
    let mut start = 0;
    for (i, len) in balanced_runs(inputs.len(), chunks).into_iter().enumerate() {
        let run = &inputs[start..start + len];
        start += len;
        if let [single] = run {
            joined.push(*single);
            continue;
        }
        let extents = run
            .iter()
            .map(|e| graph.tensor(*e).map(|t| t.repeats()[dim].clone()))
            .collect::<Result<Vec<_>, _>>()
            .context(GraphSnafu)?;
        let mut repeats: SmallVec<[SizeExpr; 4]> = out.repeats().iter().cloned().collect();
        repeats[dim] = SizeExpr::sum(extents);
        let tensor = Tensor::contiguous(out.dtype, out.axis().iter().copied(), repeats);
        let part_name = graph.unique_name(&format!("{name}_part{i}"));
        let part = graph.add_node(part_name, OpKind::Concat { axis }, run.iter().copied(), [tensor]).context(GraphSnafu)?;
        joined.push(Edge::of(part));
    }

    debug!(pass = NAME, node = %name, inputs = inputs.len(), chunks, "split wide concat");
    graph.node_mut(id).context(GraphSnafu)?.inputs = joined;
    Ok(())
}
