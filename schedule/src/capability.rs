//! Per-operator capability table.
//!
//! Everything the passes and the allocator need to know about an operator
//! (which dtypes the vector unit computes it in, how its output dtype follows
//! its inputs, whether it tolerates a degenerate operand, which axis pairs it
//! keeps contiguous, how much scratch space it needs) is resolved here by
//! matching on [`OpKind`].

use enumset::{EnumSet, enum_set};
use tessera_dtype::DType;
use tessera_ir::{BinaryOp, ComputeUnit, OpKind, ReduceOp, UnaryOp};

/// How an operator's output dtype relates to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDtype {
    /// Same as the (promoted) operand dtype.
    SameAsInput,
    Bool,
    /// Fixed by the node itself (casts, I/O, constants).
    Declared,
}

/// Which adjacent axis pairs an operator keeps contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityRule {
    /// Every operand must be contiguous across the pair.
    Strict,
    /// Both axes reduced or both kept.
    ReduceSides,
    /// Broadcast/permutation must be the identity across the pair.
    IdentityOnly,
    /// Neither axis is the concat/split axis.
    NonConcatAxes,
    /// Neither axis is the gathered axis.
    OutsideGather,
    /// No merge through this operator.
    Never,
}

/// Scratch-space formula beyond the declared outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchRule {
    None,
    /// Broadcast whose source rows are not block aligned.
    UnalignedBroadcast,
    Reduce,
    Transpose,
    Gather,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Dtypes the operator computes in.
    pub dtypes: EnumSet<DType>,
    /// Input slots whose dtypes must agree (promoted to a common dtype).
    pub value_slots: &'static [usize],
    pub output: OutputDtype,
    pub continuity: ContinuityRule,
    /// Input slots that accept a degenerate (all extents one) operand.
    pub scalar_slots: &'static [usize],
    pub scratch: ScratchRule,
    /// Queue depth of the operator's output when it is pipelined.
    pub depth: u32,
    pub unit: ComputeUnit,
}

const FLOAT: EnumSet<DType> = enum_set!(DType::Float16 | DType::Float32);
const ARITH: EnumSet<DType> = enum_set!(DType::Float16 | DType::Float32 | DType::Int16 | DType::Int32);
const COMPARE: EnumSet<DType> = enum_set!(DType::Float16 | DType::Float32 | DType::Int32);
const LOGICAL: EnumSet<DType> = enum_set!(DType::Bool);
const CUBE: EnumSet<DType> = enum_set!(DType::Float16 | DType::BFloat16 | DType::Float32);

impl Capability {
    fn movement(continuity: ContinuityRule, scratch: ScratchRule, unit: ComputeUnit) -> Self {
        Self {
            dtypes: EnumSet::all(),
            value_slots: &[],
            output: OutputDtype::SameAsInput,
            continuity,
            scalar_slots: &[],
            scratch,
            depth: 1,
            unit,
        }
    }

    fn io() -> Self {
        Self {
            dtypes: EnumSet::all(),
            value_slots: &[],
            output: OutputDtype::Declared,
            continuity: ContinuityRule::Strict,
            scalar_slots: &[],
            scratch: ScratchRule::None,
            depth: 0,
            unit: ComputeUnit::None,
        }
    }

    fn vector(dtypes: EnumSet<DType>, value_slots: &'static [usize], output: OutputDtype) -> Self {
        Self {
            dtypes,
            value_slots,
            output,
            continuity: ContinuityRule::Strict,
            scalar_slots: &[],
            scratch: ScratchRule::None,
            depth: 1,
            unit: ComputeUnit::Vector,
        }
    }

    pub fn accepts_scalar(&self, slot: usize) -> bool {
        self.scalar_slots.contains(&slot)
    }
}

pub fn capability(kind: &OpKind) -> Capability {
    use ContinuityRule as C;
    use ScratchRule as S;

    match kind {
        OpKind::Data { .. } | OpKind::Output { .. } | OpKind::Workspace | OpKind::Scalar { .. } => Capability::io(),
        OpKind::Load => Capability { depth: 2, ..Capability::movement(C::Strict, S::None, ComputeUnit::Mte2) },
        OpKind::Store => Capability {
            output: OutputDtype::Declared,
            depth: 2,
            ..Capability::movement(C::Strict, S::None, ComputeUnit::Mte3)
        },
        OpKind::Nddma => Capability { depth: 2, ..Capability::movement(C::Never, S::None, ComputeUnit::Mte2) },
        OpKind::Cast => Capability::vector(EnumSet::all(), &[], OutputDtype::Declared),
        OpKind::Unary(op) => match op {
            UnaryOp::Abs | UnaryOp::Neg | UnaryOp::Relu => Capability::vector(ARITH, &[0], OutputDtype::SameAsInput),
            UnaryOp::LogicalNot => Capability::vector(LOGICAL, &[0], OutputDtype::Bool),
            _ => Capability::vector(FLOAT, &[0], OutputDtype::SameAsInput),
        },
        OpKind::Binary(op) => {
            let base = match op {
                BinaryOp::Div | BinaryOp::Pow => Capability::vector(FLOAT, &[0, 1], OutputDtype::SameAsInput),
                BinaryOp::LogicalAnd | BinaryOp::LogicalOr => Capability::vector(LOGICAL, &[0, 1], OutputDtype::Bool),
                op if op.is_comparison() => Capability::vector(COMPARE, &[0, 1], OutputDtype::Bool),
                _ => Capability::vector(ARITH, &[0, 1], OutputDtype::SameAsInput),
            };
            let scalar_slots: &'static [usize] = match op {
                BinaryOp::Add | BinaryOp::Mul | BinaryOp::Max | BinaryOp::Min => &[0, 1],
                BinaryOp::Sub | BinaryOp::Div => &[1],
                _ => &[],
            };
            Capability { scalar_slots, ..base }
        }
        OpKind::Select => {
            Capability { scalar_slots: &[1, 2], ..Capability::vector(COMPARE, &[1, 2], OutputDtype::SameAsInput) }
        }
        OpKind::Reduce(op) => {
            let (dtypes, output) = match op {
                ReduceOp::Any | ReduceOp::All => (LOGICAL, OutputDtype::Bool),
                ReduceOp::Mean | ReduceOp::Prod => (FLOAT, OutputDtype::SameAsInput),
                _ => (COMPARE, OutputDtype::SameAsInput),
            };
            Capability { continuity: C::ReduceSides, scratch: S::Reduce, ..Capability::vector(dtypes, &[0], output) }
        }
        OpKind::Broadcast => Capability::movement(C::IdentityOnly, S::UnalignedBroadcast, ComputeUnit::Vector),
        OpKind::Transpose => Capability::movement(C::IdentityOnly, S::Transpose, ComputeUnit::Vector),
        OpKind::Concat { .. } | OpKind::Split { .. } => {
            Capability::movement(C::NonConcatAxes, S::None, ComputeUnit::Vector)
        }
        OpKind::Gather { .. } => {
            Capability { depth: 2, ..Capability::movement(C::OutsideGather, S::Gather, ComputeUnit::Mte2) }
        }
        OpKind::MatMul(_) => Capability {
            continuity: C::Never,
            depth: 2,
            unit: ComputeUnit::Cube,
            ..Capability::vector(CUBE, &[0, 1], OutputDtype::SameAsInput)
        },
    }
}

/// Every input of a Concat shares the promoted dtype regardless of arity.
pub fn promoted_slots(kind: &OpKind, arity: usize) -> Vec<usize> {
    match kind {
        OpKind::Concat { .. } => (0..arity).collect(),
        other => capability(other).value_slots.iter().copied().filter(|s| *s < arity).collect(),
    }
}

/// Dtype `target` is computed in by an operator supporting `supported`:
/// itself when supported, else the narrowest supported dtype it casts to
/// losslessly, else `Float32` for integers when available.
pub fn compute_dtype(target: DType, supported: EnumSet<DType>) -> Option<DType> {
    if supported.contains(target) {
        return Some(target);
    }
    let widened = supported.iter().filter(|d| !d.is_bool()).find(|d| target.can_safe_cast(*d));
    widened.or_else(|| (target.is_int() && supported.contains(DType::Float32)).then_some(DType::Float32))
}
