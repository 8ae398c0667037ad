//! Scheduling core of the Tessera NPU kernel compiler.
//!
//! Takes a hint graph from the frontend and produces every schedulable
//! candidate for it, ready for code generation.
//!
//! # Module Organization
//!
//! - [`passes`] - Graph normalization (dtype consistency, cast cancellation,
//!   scalar broadcast, gather-to-load, concat splitting, non-contiguous DMA)
//! - [`axis_merge`] - Merging of adjacent contiguous axes
//! - [`autoschedule`] - Task generation, axis roles, tiling cases, two-phase
//!   reductions and score functions
//! - [`alloc`] - Buffer/queue allocation, liveness reuse and workspace sizing
//! - [`tiling_key`] - Fused tiling keys and `FindBestTilingKey`
//! - [`optimizer`] - End-to-end orchestration
//! - [`capability`] - Per-operator capability table
//! - [`result`] - Scheduling results handed to code generation
//!
//! # Control Flow
//!
//! ```text
//! hint graph -> passes -> axis merge -> tasks -> auto schedule
//!            -> buffer/queue allocation (per ImplGraph) -> tiling keys
//!            -> FusedScheduledResult
//! ```

pub mod alloc;
pub mod autoschedule;
pub mod axis_merge;
pub mod capability;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod passes;
pub mod render;
pub mod result;
pub mod tiling_key;


pub use alloc::{alloc_buf_que, workspace_size};
pub use autoschedule::{AutoSchedule, AutoScheduleOutput, ScheduleTask, TaskKind, generate_tasks};
pub use axis_merge::merge_continuous_axis;
pub use config::{GraphType, NddmaPolicy, OptimizerOptions, PlatformConfig};
pub use error::{Result, ScheduleError};
pub use optimizer::Optimizer;
pub use passes::{Pass, PassContext, run_passes};
pub use result::{
    CubeType, FusedScheduledResult, ImplGraph, ReduceTiling, ScheduleGroup, ScheduledResult, Template, TilingCase,
    VarRelations,
};
pub use tiling_key::{NO_MATCH, ObservedTask, TilingKeySelector, TilingKeyTable};
