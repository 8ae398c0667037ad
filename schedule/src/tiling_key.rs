//! Fused tiling keys.
//!
//! Every reachable combination of per-task candidate and per-group tiling key
//! gets one fused key, in lexicographic order: task 0 varies slowest, and
//! within a task the candidate before its groups, group 0 before group 1. The
//! generated `FindBestTilingKey` maps the tiling keys observed at launch back
//! to that fused key.

use std::fmt::Write;

use itertools::Itertools;
use tracing::debug;

use crate::render::TILING_DATA;
use crate::result::ScheduledResult;

/// Returned when no entry matches the observed keys.
pub const NO_MATCH: u32 = u32::MAX;

/// Choice made for one task: a candidate and a tiling key per group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskChoice {
    pub candidate: usize,
    pub group_keys: Vec<u32>,
}

/// Keys observed at run time for one task; same layout as [`TaskChoice`].
pub type ObservedTask = TaskChoice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingKeyEntry {
    pub key: u32,
    /// One choice per task.
    pub choices: Vec<TaskChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingKeyTable {
    pub entries: Vec<TilingKeyEntry>,
    /// Candidate count of each task.
    pub candidates_per_task: Vec<usize>,
}

pub struct TilingKeySelector;

impl TilingKeySelector {
    /// Enumerate every leaf combination; `None` when some candidate runs its
    /// groups in parallel, since such a kernel has no single fused key.
    #[tracing::instrument(skip_all, fields(tasks = results.len()))]
    pub fn build(results: &[Vec<ScheduledResult>]) -> Option<TilingKeyTable> {
        if results.iter().flatten().any(|r| r.enable_group_parallel) {
            debug!("group parallel scheduling, no fused tiling key");
            return None;
        }
        let per_task: Vec<Vec<TaskChoice>> = results.iter().map(|candidates| task_choices(candidates)).collect();
        let entries: Vec<TilingKeyEntry> = if per_task.is_empty() {
            Vec::new()
        } else {
            per_task
                .into_iter()
                .multi_cartesian_product()
                .enumerate()
                .map(|(key, choices)| TilingKeyEntry { key: key as u32, choices })
                .collect()
        };
        debug!(entries = entries.len(), "fused tiling keys enumerated");
        Some(TilingKeyTable { entries, candidates_per_task: results.iter().map(Vec::len).collect() })
    }
}

/// Leaves of one task: per candidate, the product of its groups' key ranges.
fn task_choices(candidates: &[ScheduledResult]) -> Vec<TaskChoice> {
    candidates
        .iter()
        .enumerate()
        .flat_map(|(candidate, result)| {
            let ranges: Vec<Vec<u32>> = result
                .schedule_groups
                .iter()
                .map(|g| g.impl_graphs.iter().map(|ig| ig.tiling_key).collect())
                .collect();
            // `multi_cartesian_product` of zero iterators yields nothing.
            let combos: Vec<Vec<u32>> =
                if ranges.is_empty() { vec![Vec::new()] } else { ranges.into_iter().multi_cartesian_product().collect() };
            combos.into_iter().map(move |group_keys| TaskChoice { candidate, group_keys })
        })
        .collect()
}

impl TilingKeyTable {
    /// Fused key of the observed choices, or [`NO_MATCH`].
    pub fn find_best_tiling_key(&self, observed: &[ObservedTask]) -> u32 {
        self.entries.iter().find(|e| e.choices == observed).map_or(NO_MATCH, |e| e.key)
    }

    /// Text of the generated `FindBestTilingKey` function: one branch per entry.
    pub fn render_find_best_tiling_key(&self) -> String {
        let mut out = format!("uint32_t FindBestTilingKey(AutofuseTilingData &{TILING_DATA}) {{\n");
        for entry in &self.entries {
            let conditions = entry
                .choices
                .iter()
                .enumerate()
                .flat_map(|(task, choice)| self.conditions(task, choice))
                .collect::<Vec<_>>();
            let condition = if conditions.is_empty() { "true".to_string() } else { conditions.join(" && ") };
            let _ = writeln!(out, "  if ({condition}) {{ return {}u; }}", entry.key);
        }
        out.push_str("  return UINT32_MAX;\n}\n");
        out
    }

    fn conditions(&self, task: usize, choice: &TaskChoice) -> Vec<String> {
        let t = TILING_DATA;
        let c = choice.candidate;
        let mut out = Vec::with_capacity(choice.group_keys.len() + 1);
        if self.candidates_per_task.get(task).is_some_and(|n| *n > 1) {
            out.push(format!("{t}.graph{task}_tiling_key == {c}"));
        }
        out.extend(
            choice
                .group_keys
                .iter()
                .enumerate()
                .map(|(g, key)| format!("{t}.graph{task}_result{c}_g{g}_tiling_data.tiling_key == {key}")),
        );
        out
    }
}
