//! Scheduling results handed to code generation.
//!
//! Indexing is part of the contract with the generator:
//! `node_idx_to_scheduled_results[task][candidate]`, then
//! `schedule_groups[group].impl_graphs[graph]`. Generated names
//! (`<task>_result<c>_g<g>_<roles>_<k>`) follow the same coordinates.

use std::collections::BTreeMap;

use tessera_ir::{AxisId, Graph, Node, SizeExpr, SizeVar};

use crate::alloc::workspace;
use crate::tiling_key::TilingKeyTable;

/// Matmul template family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum CubeType {
    #[default]
    None,
    /// Epilogue folded into the cube's fixed-function output pipe.
    Fixpip,
    /// Plain cube kernel, epilogue as a separate vector stage.
    Common,
    /// Elementwise epilogue fused through the unified buffer.
    UBFuse,
    /// Epilogue fused through L2.
    L2Fuse,
}

/// Hardware template a candidate was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Template {
    Plain,
    Nddma,
    #[display("Cube({_0})")]
    Cube(CubeType),
}

impl Template {
    pub fn cube_type(&self) -> CubeType {
        match self {
            Self::Cube(cube) => *cube,
            _ => CubeType::None,
        }
    }
}

/// How a reduction axis is placed relative to the UB tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ReduceTiling {
    /// Whole reduction extent inside one tile; a kept axis is tiled.
    FullLoad,
    /// The reduction axis itself is tiled and accumulated across tiles.
    Tiled,
}

/// One tiling decision of a schedule group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingCase {
    /// Axis split across cores, when the group is not already blocked.
    pub block_axis: Option<AxisId>,
    /// Axis split into UB tiles; `None` for rank-0 kernels.
    pub tile_axis: Option<AxisId>,
    pub reduce_mode: Option<ReduceTiling>,
}

/// A fully scheduled graph: one tiling decision applied to an owned copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplGraph {
    pub graph: Graph,
    pub tiling: TilingCase,
    /// Position within the group; selected at run time.
    pub tiling_key: u32,
}

/// Alternative ImplGraphs for the same piece of work.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleGroup {
    pub name: String,
    pub impl_graphs: Vec<ImplGraph>,
    pub double_buffer: bool,
    /// Per-ImplGraph score bodies keyed by graph name; empty for a single graph.
    pub score_funcs: BTreeMap<String, String>,
}

/// `var_relations[dst_group][src_group][dst_var] = src_expr`.
pub type VarRelations = BTreeMap<usize, BTreeMap<usize, BTreeMap<String, SizeExpr>>>;

/// One candidate schedule of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledResult {
    pub schedule_groups: Vec<ScheduleGroup>,
    pub var_relations: VarRelations,
    /// Runtime score body ranking this candidate against its siblings.
    pub score_func: String,
    /// Groups hand data through a workspace that is reused between phases.
    pub is_reduce_mem_reuse: bool,
    pub enable_group_parallel: bool,
    pub cube_type: CubeType,
    pub template: Template,
}

impl ScheduledResult {
    pub fn impl_graphs(&self) -> impl Iterator<Item = &ImplGraph> {
        self.schedule_groups.iter().flat_map(|g| g.impl_graphs.iter())
    }

    /// Worst-case workspace bytes over the tiling-key-selected ImplGraphs.
    pub fn workspace_size(&self, align: u32) -> SizeExpr {
        workspace::candidate_workspace_size(self, align)
    }
}

/// Compiler output for one fused kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScheduledResult {
    pub fused_name: String,
    pub input_nodes: Vec<Node>,
    pub output_nodes: Vec<Node>,
    pub workspace_nodes: Vec<Node>,
    /// Externally visible shape variables in declaration order.
    pub origin_vars: Vec<SizeVar>,
    pub node_idx_to_scheduled_results: Vec<Vec<ScheduledResult>>,
    /// Fused tiling-key table; absent under group parallelism.
    pub tiling_key_table: Option<TilingKeyTable>,
}

impl FusedScheduledResult {
    pub fn workspace_size(&self, align: u32) -> SizeExpr {
        workspace::fused_workspace_size(&self.node_idx_to_scheduled_results, align)
    }

    /// `GetWorkspaceSize` body for the generator.
    pub fn render_get_workspace_size(&self, align: u32) -> String {
        workspace::render_get_workspace_size(&self.node_idx_to_scheduled_results, align)
    }

    /// `FindBestTilingKey`, or `None` when the kernel selects keys per group.
    pub fn render_find_best_tiling_key(&self) -> Option<String> {
        self.tiling_key_table.as_ref().map(TilingKeyTable::render_find_best_tiling_key)
    }
}
