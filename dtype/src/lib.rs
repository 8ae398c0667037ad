//! Element data types for the Tessera NPU scheduler.
//!
//! Tensors on the device carry a single scalar element type. This crate defines
//! that type, its promotion lattice (used when two operands of different types
//! meet in one operator) and the table of cast instructions the vector unit
//! actually provides (see [`cast`]).

pub mod cast;


/// Scalar element types supported by the scheduler.
///
/// The discriminant doubles as the promotion priority: lower values are more
/// specific and win ties in [`DType::least_upper_dtype`].
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[derive(enumset::EnumSetType)]
#[cfg_attr(feature = "proptest", derive(proptest_derive::Arbitrary))]
#[enumset(repr = "u32")]
pub enum DType {
    Bool = 0,

    // Signed before unsigned of the same width.
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,

    Float16 = 9,
    BFloat16 = 10,
    Float32 = 11,
    Float64 = 12,
}

impl DType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 => 4,
            Self::Int64 | Self::UInt64 => 8,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    /// Type name used in generated kernel and tiling source.
    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Bool => "uint8_t",
            Self::Int8 => "int8_t",
            Self::Int16 => "int16_t",
            Self::Int32 => "int32_t",
            Self::Int64 => "int64_t",
            Self::UInt8 => "uint8_t",
            Self::UInt16 => "uint16_t",
            Self::UInt32 => "uint32_t",
            Self::UInt64 => "uint64_t",
            Self::Float16 => "half",
            Self::BFloat16 => "bfloat16_t",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }

    /// Direct widenings of `self` in the promotion lattice.
    const fn widenings(self) -> &'static [Self] {
        use DType::*;
        match self {
            Bool => &[Int8, UInt8],
            Int8 => &[Int16],
            UInt8 => &[Int16, UInt16],
            Int16 => &[Int32],
            UInt16 => &[Int32, UInt32],
            Int32 => &[Int64],
            UInt32 => &[Int64, UInt64],
            Int64 | UInt64 => &[Float16, BFloat16],
            Float16 | BFloat16 => &[Float32],
            Float32 => &[Float64],
            Float64 => &[],
        }
    }

    /// `self` and every dtype reachable from it by widening.
    fn promotable_to(self) -> enumset::EnumSet<Self> {
        let mut reached = enumset::EnumSet::only(self);
        let mut frontier = vec![self];
        while let Some(dtype) = frontier.pop() {
            for &wider in dtype.widenings() {
                if reached.insert(wider) {
                    frontier.push(wider);
                }
            }
        }
        reached
    }

    /// Whether every value of `self` is representable in `to`.
    pub fn can_safe_cast(self, to: Self) -> bool {
        if self == to || self.is_bool() {
            return true;
        }
        let (from_bytes, to_bytes) = (self.bytes(), to.bytes());
        if self.is_float() {
            // f16 and bf16 do not nest, so floats only widen strictly.
            return to.is_float() && from_bytes < to_bytes;
        }
        if to.is_float() {
            return from_bytes < to_bytes;
        }
        match (self.is_signed(), to.is_signed()) {
            (true, true) => from_bytes <= to_bytes,
            (true, false) => false,
            (false, _) => from_bytes < to_bytes,
        }
    }

    /// Narrowest dtype every one of `dtypes` promotes to; `None` for an
    /// empty slice or when the lattice has no common bound.
    pub fn least_upper_dtype(dtypes: &[Self]) -> Option<Self> {
        let common = dtypes.iter().map(|d| d.promotable_to()).reduce(|acc, set| acc & set)?;
        common.iter().min()
    }
}
