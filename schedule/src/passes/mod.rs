//! Graph rewrite pipeline.
//!
//! Passes run in a fixed order over a hint graph before axis merging. Each
//! pass is idempotent and keeps the graph's external inputs and outputs (and
//! their dtypes and views) unchanged. A failing pass leaves the graph exactly
//! as it was before that pass started and aborts the pipeline.

pub mod cancel_cast;
pub mod concat_split;
pub mod dead_node;
pub mod dtype_consistency;
pub mod gather_to_load;
pub mod nddma;
pub mod scalar_broadcast;

use tessera_ir::Graph;
use tracing::{debug, warn};

use crate::config::{NddmaPolicy, OptimizerOptions, PlatformConfig};
use crate::error::Result;

pub use cancel_cast::CancelRedundantCast;
pub use concat_split::ConcatSplit;
pub use dead_node::DeadNodeElimination;
pub use dtype_consistency::DtypeConsistency;
pub use gather_to_load::GatherToLoad;
pub use nddma::{NddmaSubstitution, nddma_score_func, substitute_nddma};
pub use scalar_broadcast::ScalarBroadcastSimplify;

/// Inputs every pass may consult.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub platform: &'a PlatformConfig,
    pub options: &'a OptimizerOptions,
}

pub trait Pass {
    fn name(&self) -> &'static str;

    /// Rewrite `graph` in place; returns whether anything changed.
    fn run(&self, graph: &mut Graph, ctx: &PassContext<'_>) -> Result<bool>;
}

/// The ordered pass list for the given options.
pub fn default_passes(options: &OptimizerOptions) -> Vec<Box<dyn Pass>> {
    let mut passes: Vec<Box<dyn Pass>> = vec![
        Box::new(DtypeConsistency),
        Box::new(CancelRedundantCast),
        Box::new(ScalarBroadcastSimplify),
        Box::new(GatherToLoad),
        Box::new(ConcatSplit),
    ];
    if options.nddma == NddmaPolicy::Force {
        passes.push(Box::new(NddmaSubstitution));
    }
    passes.push(Box::new(DeadNodeElimination));
    passes
}

/// Run [`default_passes`] over `graph`.
#[tracing::instrument(skip_all, fields(graph = graph.name()))]
pub fn run_passes(graph: &mut Graph, platform: &PlatformConfig, options: &OptimizerOptions) -> Result<()> {
    let ctx = PassContext { platform, options };
    run_pass_list(graph, &ctx, &default_passes(options))
}

/// Run `passes` in order, restoring the pre-pass graph when one fails.
pub fn run_pass_list(graph: &mut Graph, ctx: &PassContext<'_>, passes: &[Box<dyn Pass>]) -> Result<()> {
    for pass in passes {
        let snapshot = graph.clone();
        match pass.run(graph, ctx) {
            Ok(changed) => debug!(pass = pass.name(), changed, nodes = graph.len(), "pass finished"),
            Err(error) => {
                *graph = snapshot;
                warn!(pass = pass.name(), %error, "pass failed, graph restored");
                return Err(error);
            }
        }
    }
    Ok(())
}
