//! Schedule generation.
//!
//! For each task, every template in its list yields one or more candidates
//! ([`ScheduledResult`]s), in template order:
//!
//! 1. the template's graph is prepared (Nddma substitution for
//!    [`Template::Nddma`]);
//! 2. the graph is partitioned: a single group, or the phases of a split
//!    reduction (both when the split is only decidable at run time);
//! 3. each group gets its axis roles and one [`ImplGraph`] per accepted
//!    tiling case.
//!
//! A candidate whose group ends up without ImplGraphs is dropped; a task
//! without any candidate fails with [`ScheduleError::InfeasibleSchedule`].

pub mod axis_group;
pub mod reduce_split;
pub mod score;
pub mod task;
pub mod tiling;

use snafu::ensure;
use tessera_ir::{Graph, OpKind};
use tracing::{debug, warn};

use crate::config::{OptimizerOptions, PlatformConfig};
use crate::error::*;
use crate::passes::{nddma_score_func, substitute_nddma};
use crate::result::{ImplGraph, ScheduleGroup, ScheduledResult, Template, VarRelations};

pub use axis_group::{AxisGroup, AxisRole, axis_roles};
pub use reduce_split::{TwoPhase, split_two_phase};
pub use task::{ReduceInfo, ReduceSplit, ScheduleTask, TaskKind, generate_tasks, single_reduce};
pub use tiling::{apply_tiling, tiling_cases};

/// One candidate of a task together with the template it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoScheduleOutput {
    pub template: Template,
    pub scheduled: ScheduledResult,
}

/// How a template graph is cut into schedule groups.
struct Partition {
    phases: Vec<Graph>,
    var_relations: VarRelations,
    is_reduce_mem_reuse: bool,
    score: Option<String>,
}

pub struct AutoSchedule<'a> {
    task: &'a ScheduleTask,
    options: &'a OptimizerOptions,
    platform: &'a PlatformConfig,
}

impl<'a> AutoSchedule<'a> {
    pub fn new(task: &'a ScheduleTask, options: &'a OptimizerOptions, platform: &'a PlatformConfig) -> Self {
        Self { task, options, platform }
    }

    #[tracing::instrument(skip_all, fields(task = %self.task.name, kind = %self.task.kind))]
    pub fn do_auto_schedule(&self) -> Result<Vec<AutoScheduleOutput>> {
        let mut outputs = Vec::new();
        for template in &self.task.templates {
            let mut graph = self.task.graph.clone();
            if *template == Template::Nddma {
                substitute_nddma(&mut graph, self.platform)?;
            }
            for partition in self.partitions(&graph)? {
                let candidate = outputs.len();
                let Some(groups) = self.build_groups(&partition, candidate)? else {
                    debug!(%template, candidate, "candidate has an untileable group, dropped");
                    continue;
                };
                let score_func = match (template, partition.score) {
                    (Template::Nddma, Some(score)) => {
                        score::gated_score(&nddma_score_func(&graph, self.platform), &score)
                    }
                    (Template::Nddma, None) => nddma_score_func(&graph, self.platform),
                    (_, Some(score)) => score,
                    (_, None) => score::NEUTRAL_SCORE.to_string(),
                };
                let scheduled = ScheduledResult {
                    schedule_groups: groups,
                    var_relations: partition.var_relations,
                    score_func,
                    is_reduce_mem_reuse: partition.is_reduce_mem_reuse,
                    enable_group_parallel: self.options.enable_group_parallel,
                    cube_type: template.cube_type(),
                    template: *template,
                };
                outputs.push(AutoScheduleOutput { template: *template, scheduled });
            }
        }
        ensure!(
            !outputs.is_empty(),
            InfeasibleScheduleSnafu { task: self.task.name.clone(), reason: "no template yields a tileable schedule" }
        );
        debug!(candidates = outputs.len(), "auto schedule finished");
        Ok(outputs)
    }

    fn partitions(&self, graph: &Graph) -> Result<Vec<Partition>> {
        let single = |score: Option<String>| Partition {
            phases: vec![graph.clone()],
            var_relations: VarRelations::new(),
            is_reduce_mem_reuse: false,
            score,
        };
        if self.task.reduce_split == ReduceSplit::None {
            return Ok(vec![single(None)]);
        }
        let Some(info) = single_reduce(graph)? else { return Ok(vec![single(None)]) };
        let split = split_two_phase(graph, &info, &self.task.name)?.map(|two| Partition {
            phases: [two.phase1, two.phase2].into_iter().chain(two.epilogue).collect(),
            var_relations: two.var_relations,
            is_reduce_mem_reuse: true,
            score: (self.task.reduce_split == ReduceSplit::Runtime)
                .then(|| score::two_phase_reduce_score(&info.bytes, self.platform)),
        });

        Ok(match (self.task.reduce_split, split) {
            (ReduceSplit::Required, Some(split)) => vec![split],
            (ReduceSplit::Runtime, Some(split)) => {
                vec![single(Some(score::single_core_reduce_score(&info.bytes, self.platform))), split]
            }
            (_, None) => {
                warn!(task = %self.task.name, "two-phase reduction not applicable, keeping one group");
                vec![single(None)]
            }
            (ReduceSplit::None, Some(_)) => vec![single(None)],
        })
    }

    fn build_groups(&self, partition: &Partition, candidate: usize) -> Result<Option<Vec<ScheduleGroup>>> {
        let mut groups = Vec::with_capacity(partition.phases.len());
        for (g, phase) in partition.phases.iter().enumerate() {
            let group = self.build_group(phase, candidate, g)?;
            if group.impl_graphs.is_empty() {
                return Ok(None);
            }
            groups.push(group);
        }
        Ok(Some(groups))
    }

    /// A reduce task's group without a reduction (the epilogue of a split
    /// reduction) is tiled like an elementwise one.
    fn group_kind(&self, graph: &Graph) -> TaskKind {
        match self.task.kind {
            TaskKind::Reduce if !graph.nodes().any(|n| matches!(n.kind, OpKind::Reduce(_))) => TaskKind::Elementwise,
            kind => kind,
        }
    }

    fn build_group(&self, graph: &Graph, candidate: usize, g: usize) -> Result<ScheduleGroup> {
        let kind = self.group_kind(graph);
        let roles = axis_roles(graph, kind)?;
        let name = format!("g{g}_{}", roles.letters());
        let cases = tiling_cases(graph, &roles, kind, self.options.max_tiling_cases);

        let mut impl_graphs: Vec<ImplGraph> = Vec::with_capacity(cases.len());
        for case in cases {
            let mut impl_graph = graph.clone();
            if !apply_tiling(&mut impl_graph, &case)? {
                continue;
            }
            let tiling_key = impl_graphs.len() as u32;
            impl_graph.set_name(format!("{}_result{candidate}_{name}_{tiling_key}", self.task.name));
            impl_graphs.push(ImplGraph { graph: impl_graph, tiling: case, tiling_key });
        }
        debug!(group = %name, impl_graphs = impl_graphs.len(), "build schedule group");

        let score_funcs = score::group_score_funcs(&impl_graphs, self.platform);
        Ok(ScheduleGroup { name, impl_graphs, double_buffer: self.options.double_buffer, score_funcs })
    }
}
