//! Vector-unit cast instructions.
//!
//! The vector unit does not convert between every pair of element types. Only
//! the pairs listed in [`DType::direct_cast_targets`] exist as one instruction;
//! other conversions have to be routed through intermediate types, and some
//! (anything touching `Float64`) have no realisation at all.

use std::collections::VecDeque;

use smallvec::SmallVec;
use strum::EnumCount;

use super::*;

/// Longest cast chain the scheduler is willing to emit for one conversion.
pub const MAX_CAST_ROUTE: usize = 3;

impl DType {
    /// Targets reachable from `self` with a single cast instruction.
    ///
    /// Order matters: [`DType::cast_route`] explores neighbours in this order,
    /// which makes the chosen route deterministic.
    pub const fn direct_cast_targets(self) -> &'static [Self] {
        use DType::*;
        match self {
            Bool => &[Float16, Int32],
            Int8 => &[Float16],
            UInt8 => &[Float16],
            Int16 => &[Float16, Int32],
            UInt16 => &[],
            Int32 => &[Float32, Float16, Int64, Int16],
            UInt32 => &[],
            Int64 => &[Float32, Int32],
            UInt64 => &[],
            Float16 => &[Float32, Int32, Int16, Int8, UInt8],
            BFloat16 => &[Float32],
            Float32 => &[Float16, BFloat16, Int32, Int64],
            Float64 => &[],
        }
    }

    /// Check whether one cast instruction converts `self` into `to`.
    pub fn has_direct_cast(self, to: Self) -> bool {
        self == to || self.direct_cast_targets().contains(&to)
    }

    /// Shortest chain of direct casts converting `from` into `to`.
    ///
    /// The returned route excludes `from` and ends with `to`; an identity
    /// conversion returns an empty route. Returns `None` when no chain of at
    /// most [`MAX_CAST_ROUTE`] instructions exists.
    pub fn cast_route(from: Self, to: Self) -> Option<SmallVec<[Self; 4]>> {
        if from == to {
            return Some(SmallVec::new());
        }

        let mut previous: [Option<DType>; DType::COUNT] = [None; DType::COUNT];
        let mut depth = [0usize; DType::COUNT];
        let mut queue = VecDeque::from([from]);
        let mut visited = enumset::EnumSet::only(from);

        while let Some(current) = queue.pop_front() {
            if depth[current as usize] == MAX_CAST_ROUTE {
                continue;
            }
            for &next in current.direct_cast_targets() {
                if !visited.insert(next) {
                    continue;
                }
                previous[next as usize] = Some(current);
                depth[next as usize] = depth[current as usize] + 1;
                if next == to {
                    let mut route = SmallVec::new();
                    let mut cursor = to;
                    while cursor != from {
                        route.push(cursor);
                        cursor = previous[cursor as usize]?;
                    }
                    route.reverse();
                    return Some(route);
                }
                queue.push_back(next);
            }
        }

        None
    }
}
