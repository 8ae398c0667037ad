use snafu::Snafu;
use tessera_dtype::DType;

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;

/// Failure of any scheduling stage. Every variant aborts the compile.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum ScheduleError {
    /// A pass met an operator/shape combination it has no rule for.
    #[snafu(display("pass '{pass}' cannot rewrite '{node}': {reason}"))]
    UnsupportedRewrite { pass: &'static str, node: String, reason: String },

    /// No tiling or template choice fits the hardware.
    #[snafu(display("task '{task}' has no feasible schedule: {reason}"))]
    InfeasibleSchedule { task: String, reason: String },

    /// Liveness or aliasing invariant would be violated.
    #[snafu(display("allocation conflict in '{graph}': {reason}"))]
    AllocationConflict { graph: String, reason: String },

    #[snafu(display("no hardware cast from {from} to {to} for '{node}'"))]
    UnsupportedCast { node: String, from: DType, to: DType },

    #[snafu(display("graph operation failed: {source}"))]
    Graph { source: tessera_ir::Error },

    #[snafu(display("invalid optimizer input: {reason}"))]
    InvalidInput { reason: String },
}
