//! Runtime score bodies.
//!
//! Scores are C++ statement bodies evaluated by the generated kernel at
//! selection time; a higher value wins. Nothing here ranks candidates at
//! compile time.

use std::collections::BTreeMap;

use tessera_ir::{Graph, SizeExpr};

use crate::config::PlatformConfig;
use crate::render::tiling_data_expr;
use crate::result::ImplGraph;

/// Score of a candidate with nothing to compare against.
pub const NEUTRAL_SCORE: &str = "return 1;";

/// Prefer the single-core variant while the reduced bytes fit one core.
pub fn single_core_reduce_score(reduce_bytes: &SizeExpr, platform: &PlatformConfig) -> String {
    format!("return ({}) <= {} ? 1 : 0;", tiling_data_expr(reduce_bytes), platform.single_core_reduce_bytes)
}

/// Prefer the two-phase variant once the reduced bytes exceed one core.
pub fn two_phase_reduce_score(reduce_bytes: &SizeExpr, platform: &PlatformConfig) -> String {
    format!("return ({}) > {} ? 1 : 0;", tiling_data_expr(reduce_bytes), platform.single_core_reduce_bytes)
}

/// `gate` (a template check) in front of `score`: a negative gate rejects
/// the candidate, otherwise `score` decides.
pub fn gated_score(gate: &str, score: &str) -> String {
    format!("int64_t gate = [&]() -> int64_t {{\n{gate}\n}}();\nif (gate < 0) {{ return -1; }}\n{score}")
}

/// Per-ImplGraph scores of a group: the tile that fills the most of the UB wins.
pub fn group_score_funcs(impl_graphs: &[ImplGraph], platform: &PlatformConfig) -> BTreeMap<String, String> {
    if impl_graphs.len() < 2 {
        return BTreeMap::new();
    }
    impl_graphs
        .iter()
        .map(|ig| {
            let tile = ig.tiling.tile_axis.and_then(|a| ig.graph.axis(a).ok()).map(|a| a.size.clone());
            let body = match tile {
                Some(extent) => {
                    let capacity = SizeExpr::constant(ub_elements(&ig.graph, platform));
                    format!("return {};", tiling_data_expr(&SizeExpr::min([capacity, extent])))
                }
                None => NEUTRAL_SCORE.to_string(),
            };
            (ig.graph.name().to_string(), body)
        })
        .collect()
}

/// Elements of the widest dtype in `graph` that fit in the UB.
fn ub_elements(graph: &Graph, platform: &PlatformConfig) -> i64 {
    let widest = graph.nodes().flat_map(|n| n.outputs.iter()).map(|t| t.dtype.bytes()).max().unwrap_or(1).max(1);
    (platform.ub_size / widest as u64) as i64
}
