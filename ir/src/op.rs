//! Operator kinds.
//!
//! The operator set is closed: every node is one [`OpKind`] variant and all
//! per-operator policy (dtype support, continuity, scratch space) is resolved
//! by matching on it.

use crate::axis::AxisId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UnaryOp {
    Abs,
    Neg,
    Exp,
    Ln,
    Sqrt,
    Rsqrt,
    Reciprocal,
    Relu,
    Sigmoid,
    Tanh,
    Erf,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub const fn is_comparison(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne)
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }

    pub const fn is_commutative(&self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Max | Self::Min | Self::Eq | Self::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
    Mean,
    Prod,
    Any,
    All,
}

impl ReduceOp {
    /// Operator that combines partial results of this reduction.
    pub const fn combiner(&self) -> Self {
        match self {
            Self::Sum | Self::Mean => Self::Sum,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MatMulKind {
    MatMul,
    MatMulBias,
    BatchMatMul,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Kernel input, `index` is its position in the kernel signature.
    Data { index: usize },
    /// Kernel output.
    Output { index: usize },
    /// Global scratch tensor shared between schedule groups.
    Workspace,
    Load,
    Store,
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `where(cond, on_true, on_false)`.
    Select,
    Reduce(ReduceOp),
    Broadcast,
    Transpose,
    Concat { axis: AxisId },
    Split { axis: AxisId },
    Gather { axis: AxisId },
    Cast,
    Scalar { value: String },
    MatMul(MatMulKind),
    /// Non-contiguous DMA.
    Nddma,
}

impl OpKind {
    /// Operator type name as it appears in generated code and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Data { .. } => "Data",
            Self::Output { .. } => "Output",
            Self::Workspace => "Workspace",
            Self::Load => "Load",
            Self::Store => "Store",
            Self::Unary(op) => match op {
                UnaryOp::Abs => "Abs",
                UnaryOp::Neg => "Neg",
                UnaryOp::Exp => "Exp",
                UnaryOp::Ln => "Ln",
                UnaryOp::Sqrt => "Sqrt",
                UnaryOp::Rsqrt => "Rsqrt",
                UnaryOp::Reciprocal => "Reciprocal",
                UnaryOp::Relu => "Relu",
                UnaryOp::Sigmoid => "Sigmoid",
                UnaryOp::Tanh => "Tanh",
                UnaryOp::Erf => "Erf",
                UnaryOp::LogicalNot => "LogicalNot",
            },
            Self::Binary(op) => match op {
                BinaryOp::Add => "Add",
                BinaryOp::Sub => "Sub",
                BinaryOp::Mul => "Mul",
                BinaryOp::Div => "Div",
                BinaryOp::Max => "Maximum",
                BinaryOp::Min => "Minimum",
                BinaryOp::Pow => "Pow",
                BinaryOp::Lt => "Lt",
                BinaryOp::Le => "Le",
                BinaryOp::Gt => "Gt",
                BinaryOp::Ge => "Ge",
                BinaryOp::Eq => "Eq",
                BinaryOp::Ne => "Ne",
                BinaryOp::LogicalAnd => "LogicalAnd",
                BinaryOp::LogicalOr => "LogicalOr",
            },
            Self::Select => "Select",
            Self::Reduce(op) => match op {
                ReduceOp::Sum => "Sum",
                ReduceOp::Max => "Max",
                ReduceOp::Min => "Min",
                ReduceOp::Mean => "Mean",
                ReduceOp::Prod => "Prod",
                ReduceOp::Any => "Any",
                ReduceOp::All => "All",
            },
            Self::Broadcast => "Broadcast",
            Self::Transpose => "Transpose",
            Self::Concat { .. } => "Concat",
            Self::Split { .. } => "Split",
            Self::Gather { .. } => "Gather",
            Self::Cast => "Cast",
            Self::Scalar { .. } => "Scalar",
            Self::MatMul(kind) => match kind {
                MatMulKind::MatMul => "MatMul",
                MatMulKind::MatMulBias => "MatMulBias",
                MatMulKind::BatchMatMul => "BatchMatMul",
            },
            Self::Nddma => "Nddma",
        }
    }

    /// Classification a freshly created node of this kind gets.
    pub fn default_compute_type(&self) -> ComputeType {
        match self {
            Self::Data { .. } => ComputeType::Data,
            Self::Output { .. } => ComputeType::Output,
            Self::Workspace => ComputeType::Workspace,
            Self::Load => ComputeType::Load,
            Self::Store => ComputeType::Store,
            Self::Unary(_) | Self::Binary(_) | Self::Select | Self::Cast | Self::Scalar { .. } => ComputeType::Elewise,
            Self::Reduce(_) => ComputeType::Reduce,
            Self::Broadcast => ComputeType::Broadcast,
            Self::Transpose => ComputeType::Transpose,
            Self::Concat { .. } => ComputeType::Concat,
            Self::Split { .. } => ComputeType::Split,
            Self::Gather { .. } => ComputeType::Gather,
            Self::MatMul(_) => ComputeType::Cube,
            Self::Nddma => ComputeType::Dma,
        }
    }

    /// Nodes that only describe kernel I/O and carry no computation.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Data { .. } | Self::Output { .. } | Self::Workspace)
    }

    pub fn is_cast(&self) -> bool {
        matches!(self, Self::Cast)
    }
}

/// Scheduling classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ComputeType {
    Data,
    Output,
    Workspace,
    Load,
    Store,
    Elewise,
    Broadcast,
    Reduce,
    Transpose,
    Concat,
    Split,
    Gather,
    Cube,
    Dma,
}

/// Hardware engine executing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum ComputeUnit {
    #[default]
    None,
    /// Global memory to on-chip transfer engine.
    Mte2,
    /// On-chip to global memory transfer engine.
    Mte3,
    Vector,
    Cube,
}
