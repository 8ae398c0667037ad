//! Dead node elimination.
//!
//! Removes computation whose results nobody reads. Kernel inputs, outputs and
//! workspaces are part of the signature and always survive.

use snafu::ResultExt;
use tessera_ir::{Graph, NodeId};
use tracing::debug;

use super::{Pass, PassContext};
use crate::error::*;

const NAME: &str = "DeadNodeElimination";

pub struct DeadNodeElimination;

impl Pass for DeadNodeElimination {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&self, graph: &mut Graph, _ctx: &PassContext<'_>) -> Result<bool> {
        let mut removed = 0;
        loop {
            let dead: Vec<NodeId> = graph
                .nodes()
                .filter(|n| !n.kind.is_io() && graph.node_consumers(n.id).is_empty())
                .map(|n| n.id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                let node = graph.remove_node(id).context(GraphSnafu)?;
                debug!(pass = NAME, node = %node.name, "remove dead node");
                removed += 1;
            }
        }
        Ok(removed > 0)
    }
}
