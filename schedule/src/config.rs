//! Scheduler configuration.
//!
//! [`PlatformConfig`] carries the hardware limits of the target core and
//! [`OptimizerOptions`] the per-compile knobs. Both are plain values handed to
//! every entry point; nothing is read from process-wide state except through
//! the explicit `from_env` constructors.

use std::str::FromStr;

use bon::bon;

// ============================================================================
// PLATFORM
// ============================================================================

/// Hardware limits of the target NPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Vector cores available to one kernel.
    pub core_num: u32,
    /// Unified (on-chip) buffer size per core, in bytes.
    pub ub_size: u64,
    /// DMA block granularity in bytes.
    pub block_align: u32,
    /// Alignment of every workspace allocation, in bytes.
    pub workspace_align: u32,
    /// Widest Concat the vector unit executes in one instruction.
    pub max_concat_inputs: usize,
    /// Maximum rank a non-contiguous DMA descriptor can express.
    pub nddma_max_dims: usize,
    /// Reduction extent (in bytes) one core handles before a two-phase split pays off.
    pub single_core_reduce_bytes: u64,
}

impl PlatformConfig {
    /// Full-size training part.
    pub fn standard() -> Self {
        Self {
            core_num: 48,
            ub_size: 192 * 1024,
            block_align: 32,
            workspace_align: 512,
            max_concat_inputs: 32,
            nddma_max_dims: 5,
            single_core_reduce_bytes: 64 * 1024,
        }
    }

    /// Inference part with fewer cores and a smaller UB.
    pub fn lite() -> Self {
        Self {
            core_num: 8,
            ub_size: 128 * 1024,
            block_align: 32,
            workspace_align: 512,
            max_concat_inputs: 16,
            nddma_max_dims: 4,
            single_core_reduce_bytes: 32 * 1024,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[bon]
impl PlatformConfig {
    /// Create a platform description with builder pattern; unset fields take
    /// the [`PlatformConfig::standard`] values.
    #[builder]
    pub fn builder(
        #[builder(default = 48)] core_num: u32,
        #[builder(default = 192 * 1024)] ub_size: u64,
        #[builder(default = 32)] block_align: u32,
        #[builder(default = 512)] workspace_align: u32,
        #[builder(default = 32)] max_concat_inputs: usize,
        #[builder(default = 5)] nddma_max_dims: usize,
        #[builder(default = 64 * 1024)] single_core_reduce_bytes: u64,
    ) -> Self {
        Self {
            core_num,
            ub_size,
            block_align,
            workspace_align,
            max_concat_inputs,
            nddma_max_dims,
            single_core_reduce_bytes,
        }
    }
}

// ============================================================================
// OPTIMIZER OPTIONS
// ============================================================================

/// Shape of the compiler input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GraphType {
    /// One graph, one task.
    #[default]
    AscGraph,
    /// Fused kernel made of several sub-graphs, one task each.
    AscBackend,
}

/// When to use non-contiguous DMA for compute-free load chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NddmaPolicy {
    /// Never substitute.
    Off,
    /// Emit the substituted graph as an extra candidate (default).
    #[default]
    Template,
    /// Substitute in the pass pipeline; no plain alternative.
    Force,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerOptions {
    pub graph_type: GraphType,
    /// Allow schedule groups of one candidate to run concurrently.
    pub enable_group_parallel: bool,
    pub nddma: NddmaPolicy,
    /// Double-buffer queue tensors.
    pub double_buffer: bool,
    /// Upper bound on tiling cases per schedule group.
    pub max_tiling_cases: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            graph_type: GraphType::AscGraph,
            enable_group_parallel: false,
            nddma: NddmaPolicy::Template,
            double_buffer: true,
            max_tiling_cases: 8,
        }
    }
}

#[bon]
impl OptimizerOptions {
    /// Create optimizer options with builder pattern.
    #[builder]
    pub fn builder(
        #[builder(default)] graph_type: GraphType,
        #[builder(default = false)] enable_group_parallel: bool,
        #[builder(default)] nddma: NddmaPolicy,
        #[builder(default = true)] double_buffer: bool,
        #[builder(default = 8)] max_tiling_cases: usize,
    ) -> Self {
        Self { graph_type, enable_group_parallel, nddma, double_buffer, max_tiling_cases }
    }

    /// Create options from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_GRAPH_TYPE` - `asc_graph` (default) or `asc_backend`
    /// * `TESSERA_GROUP_PARALLEL` - `1`/`true` enables group-parallel scheduling
    /// * `TESSERA_NDDMA` - `off`, `template` (default) or `force`
    /// * `TESSERA_NO_DOUBLE_BUFFER` - Disable double buffering if set
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// [`OptimizerOptions::from_env`] over an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let graph_type = parse_or(var("TESSERA_GRAPH_TYPE"), defaults.graph_type);
        let enable_group_parallel = var("TESSERA_GROUP_PARALLEL")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on"))
            .unwrap_or(defaults.enable_group_parallel);
        let nddma = parse_or(var("TESSERA_NDDMA"), defaults.nddma);
        let double_buffer = var("TESSERA_NO_DOUBLE_BUFFER").is_none();

        Self { graph_type, enable_group_parallel, nddma, double_buffer, ..defaults }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
