//! Gather reclassification.
//!
//! A `Gather` whose index operand is a single element and whose gathered axis
//! is the outermost axis of a dense parameter tensor reads one contiguous
//! slab, so it is scheduled as a plain `Load`.

use snafu::ResultExt;
use tessera_ir::{ComputeType, Graph, NodeId, OpKind};
use tracing::debug;

use super::{Pass, PassContext};
use crate::error::*;

const NAME: &str = "GatherToLoad";

pub struct GatherToLoad;

impl Pass for GatherToLoad {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, _ctx: &PassContext<'_>) -> Result<bool> {
        let gathers: Vec<NodeId> = graph
            .nodes()
            .filter(|n| matches!(n.kind, OpKind::Gather { .. }) && n.compute_type != ComputeType::Load)
            .map(|n| n.id)
            .collect();

        let mut changed = false;
        for id in gathers {
            if !is_slab_gather(graph, id)? {
                continue;
            }
            let node = graph.node_mut(id).context(GraphSnafu)?;
            node.compute_type = ComputeType::Load;
            debug!(pass = NAME, node = %node.name, "gather reads one slab, schedule as load");
            changed = true;
        }
        Ok(changed)
    }
}

fn is_slab_gather(graph: &Graph, id: NodeId) -> Result<bool> {
    let node = graph.node(id).context(GraphSnafu)?;
    let OpKind::Gather { axis } = node.kind else { return Ok(false) };
    let params = graph.input_tensor(id, 0).context(GraphSnafu)?;
    let indices = graph.input_tensor(id, 1).context(GraphSnafu)?;
    Ok(indices.is_degenerate() && params.position_of(axis) == Some(0) && params.is_contiguous())
}
