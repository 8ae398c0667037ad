//! Iteration axes.

use smallvec::SmallVec;

use crate::expr::SizeExpr;

/// Identity of an axis, unique within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("z{_0}")]
pub struct AxisId(pub u32);

/// How an axis came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum AxisKind {
    /// Declared by the frontend.
    #[default]
    Original,
    /// Product of contiguous axes fused by the axis merger.
    Merged,
    /// Loop over UB tiles.
    TileOuter,
    /// Elements inside one UB tile.
    TileInner,
    /// Loop over cores.
    BlockOuter,
    /// Work assigned to one core.
    BlockInner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub id: AxisId,
    pub name: String,
    pub size: SizeExpr,
    pub kind: AxisKind,
    /// Axes this one was derived from (empty for original axes).
    pub from: SmallVec<[AxisId; 2]>,
}

impl Axis {
    pub fn is_split(&self) -> bool {
        !matches!(self.kind, AxisKind::Original | AxisKind::Merged)
    }
}
