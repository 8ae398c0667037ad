//! End-to-end scheduling of one fused kernel.

use snafu::{ResultExt, ensure};
use tessera_ir::{Graph, Node, NodeId, SizeVar};
use tracing::{debug, info};

use crate::alloc::alloc_buf_que;
use crate::autoschedule::{AutoSchedule, generate_tasks};
use crate::axis_merge::merge_continuous_axis;
use crate::config::{OptimizerOptions, PlatformConfig};
use crate::error::*;
use crate::passes::run_passes;
use crate::result::{FusedScheduledResult, ScheduledResult};
use crate::tiling_key::TilingKeySelector;

/// Drives passes, axis merging, schedule generation, allocation and tiling-key
/// construction over a kernel's graphs.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    options: OptimizerOptions,
    platform: PlatformConfig,
}

impl Optimizer {
    pub fn new(options: OptimizerOptions, platform: PlatformConfig) -> Self {
        Self { options, platform }
    }

    /// Options from the `TESSERA_*` environment variables on the standard platform.
    pub fn from_env() -> Self {
        Self::new(OptimizerOptions::from_env(), PlatformConfig::standard())
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Schedule `units` (one graph, or the sub-graphs of a fused backend
    /// kernel). The graphs are rewritten in place by the pass pipeline and the
    /// axis merger.
    #[tracing::instrument(skip_all, fields(kernel = name, units = units.len()))]
    pub fn optimize(&self, name: &str, units: &mut [Graph]) -> Result<FusedScheduledResult> {
        ensure!(!units.is_empty(), InvalidInputSnafu { reason: "no graph to optimize" });

        for graph in units.iter_mut() {
            graph.validate().context(GraphSnafu)?;
            run_passes(graph, &self.platform, &self.options)?;
            let merged = merge_continuous_axis(graph)?;
            debug!(graph = graph.name(), merged, "graph prepared");
        }

        let tasks = generate_tasks(units, &self.options, &self.platform)?;
        let mut node_idx_to_scheduled_results: Vec<Vec<ScheduledResult>> = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let outputs = AutoSchedule::new(task, &self.options, &self.platform).do_auto_schedule()?;
            let mut candidates = Vec::with_capacity(outputs.len());
            for output in outputs {
                let mut scheduled = output.scheduled;
                for group in &mut scheduled.schedule_groups {
                    for impl_graph in &mut group.impl_graphs {
                        alloc_buf_que(&task.graph, &mut impl_graph.graph, &self.platform, group.double_buffer)?;
                    }
                }
                candidates.push(scheduled);
            }
            node_idx_to_scheduled_results.push(candidates);
        }

        let input_nodes = collect_nodes(units.iter().map(|g| (g, g.inputs())));
        let output_nodes = collect_nodes(units.iter().map(|g| (g, g.outputs())));
        let workspace_nodes = collect_nodes(
            node_idx_to_scheduled_results
                .iter()
                .flatten()
                .flat_map(ScheduledResult::impl_graphs)
                .map(|ig| (&ig.graph, ig.graph.workspaces())),
        );
        let mut origin_vars: Vec<SizeVar> = Vec::new();
        for var in units.iter().flat_map(|g| g.size_vars()) {
            if !origin_vars.iter().any(|v| v.name == var.name) {
                origin_vars.push(var.clone());
            }
        }

        let tiling_key_table = TilingKeySelector::build(&node_idx_to_scheduled_results);
        info!(
            tasks = tasks.len(),
            candidates = node_idx_to_scheduled_results.iter().map(Vec::len).sum::<usize>(),
            workspaces = workspace_nodes.len(),
            fused_keys = tiling_key_table.as_ref().map(|t| t.entries.len()),
            "kernel scheduled"
        );
        Ok(FusedScheduledResult {
            fused_name: name.to_string(),
            input_nodes,
            output_nodes,
            workspace_nodes,
            origin_vars,
            node_idx_to_scheduled_results,
            tiling_key_table,
        })
    }
}

/// Nodes in visiting order, first occurrence of each name kept.
fn collect_nodes<'a>(sources: impl Iterator<Item = (&'a Graph, Vec<NodeId>)>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    for (graph, ids) in sources {
        for node in ids.into_iter().filter_map(|id| graph.node(id).ok()) {
            if !out.iter().any(|n| n.name == node.name) {
                out.push(node.clone());
            }
        }
    }
    out
}
