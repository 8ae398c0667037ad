//! Tiling cases and axis splitting.
//!
//! A tiling case picks the axis split across cores (`<axis>B` outer,
//! `<axis>b` inner of symbolic size `<axis>b_size`) and the axis split into UB
//! tiles (`<axis>T` outer, `<axis>t` inner of size `<axis>t_size`). Splitting
//! the block axis first means a tile split of the same axis applies to its
//! inner part (`<axis>bT` / `<axis>bt`).

use smallvec::SmallVec;
use snafu::ResultExt;
use tessera_ir::{AxisId, AxisKind, Graph, OpKind, SizeExpr, Tensor};
use tracing::{debug, trace};

use super::axis_group::{AxisGroup, AxisRole};
use super::task::TaskKind;
use crate::error::*;
use crate::result::{ReduceTiling, TilingCase};

/// Names and kinds of the two halves of a split.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitSpec {
    pub outer_suffix: &'static str,
    pub inner_suffix: &'static str,
    pub outer_kind: AxisKind,
    pub inner_kind: AxisKind,
    /// Suffix of the size variable holding the inner extent.
    pub factor_suffix: &'static str,
}

pub(crate) const BLOCK_SPLIT: SplitSpec = SplitSpec {
    outer_suffix: "B",
    inner_suffix: "b",
    outer_kind: AxisKind::BlockOuter,
    inner_kind: AxisKind::BlockInner,
    factor_suffix: "b_size",
};

pub(crate) const TILE_SPLIT: SplitSpec = SplitSpec {
    outer_suffix: "T",
    inner_suffix: "t",
    outer_kind: AxisKind::TileOuter,
    inner_kind: AxisKind::TileInner,
    factor_suffix: "t_size",
};

/// Split `axis` into outer and inner halves in every tensor and loop list.
///
/// Returns `None` (leaving the graph untouched) when some tensor covers only
/// part of the axis or an operator is parameterized by it.
pub(crate) fn split_axis(graph: &mut Graph, axis: AxisId, spec: SplitSpec) -> Result<Option<(AxisId, AxisId)>> {
    let info = graph.axis(axis).context(GraphSnafu)?.clone();
    for node in graph.nodes() {
        let bound = match node.kind {
            OpKind::Concat { axis: a } | OpKind::Split { axis: a } | OpKind::Gather { axis: a } => a == axis,
            _ => false,
        };
        let partial = node.outputs.iter().any(|t| {
            t.position_of(axis).is_some_and(|p| !t.repeats()[p].is_one() && t.repeats()[p] != info.size)
        });
        if bound || partial {
            trace!(axis = %info.name, node = %node.name, "axis cannot be split");
            return Ok(None);
        }
    }

    let factor = graph.create_size_var(format!("{}{}", info.name, spec.factor_suffix));
    let outer_size = SizeExpr::ceil_div(info.size.clone(), factor.clone());
    let outer =
        graph.create_derived_axis(format!("{}{}", info.name, spec.outer_suffix), outer_size.clone(), spec.outer_kind, [axis]);
    let inner =
        graph.create_derived_axis(format!("{}{}", info.name, spec.inner_suffix), factor.clone(), spec.inner_kind, [axis]);

    for id in graph.node_ids() {
        let node = graph.node_mut(id).context(GraphSnafu)?;
        for tensor in node.outputs.iter_mut() {
            split_tensor(tensor, axis, (outer, inner), &outer_size, &factor).context(GraphSnafu)?;
        }
        node.sched.axis = replace_one(&node.sched.axis, axis, [outer, inner]);
        if node.sched.loop_axis == Some(axis) {
            node.sched.loop_axis = Some(outer);
        }
    }
    Ok(Some((outer, inner)))
}

fn replace_one<const N: usize>(axes: &[AxisId], axis: AxisId, with: [AxisId; N]) -> SmallVec<[AxisId; 6]> {
    axes.iter().flat_map(|a| if *a == axis { with.to_vec() } else { vec![*a] }).collect()
}

fn split_tensor(
    tensor: &mut Tensor,
    axis: AxisId,
    (outer, inner): (AxisId, AxisId),
    outer_size: &SizeExpr,
    factor: &SizeExpr,
) -> tessera_ir::Result<()> {
    let Some(p) = tensor.position_of(axis) else { return Ok(()) };
    let mut axes: SmallVec<[AxisId; 4]> = tensor.axis().iter().copied().collect();
    let mut repeats: SmallVec<[SizeExpr; 4]> = tensor.repeats().iter().cloned().collect();
    let mut strides: SmallVec<[SizeExpr; 4]> = tensor.strides().iter().cloned().collect();

    let (outer_view, inner_view) = if repeats[p].is_one() {
        ((SizeExpr::one(), SizeExpr::zero()), (SizeExpr::one(), SizeExpr::zero()))
    } else {
        let stride = strides[p].clone();
        (
            (outer_size.clone(), SizeExpr::mul(factor.clone(), stride.clone())),
            (factor.clone(), stride),
        )
    };
    axes[p] = outer;
    axes.insert(p + 1, inner);
    repeats[p] = outer_view.0;
    repeats.insert(p + 1, inner_view.0);
    strides[p] = outer_view.1;
    strides.insert(p + 1, inner_view.1);

    tensor.vectorized_axis = replace_one(&tensor.vectorized_axis, axis, [outer, inner]).into_iter().collect();
    tensor.set_view(axes, repeats, strides)
}

/// Enumerate the tiling cases of a group, capped at `max_cases`.
pub fn tiling_cases(graph: &Graph, group: &AxisGroup, kind: TaskKind, max_cases: usize) -> Vec<TilingCase> {
    let blocked = group.with_role(AxisRole::Batch).any(|a| graph.axis(a).is_ok_and(|x| x.kind == AxisKind::BlockOuter));
    let y_axes: Vec<AxisId> = group.with_role(AxisRole::Y).collect();
    let r_axes: Vec<AxisId> = group.with_role(AxisRole::R).collect();
    let block_axis = if blocked {
        None
    } else {
        group.axes.iter().find(|(_, r)| *r != AxisRole::R).map(|(a, _)| *a)
    };

    let mut cases: Vec<TilingCase> = Vec::new();
    match kind {
        TaskKind::Reduce => {
            for y in &y_axes {
                cases.push(TilingCase { block_axis, tile_axis: Some(*y), reduce_mode: Some(ReduceTiling::FullLoad) });
            }
            for r in &r_axes {
                cases.push(TilingCase { block_axis, tile_axis: Some(*r), reduce_mode: Some(ReduceTiling::Tiled) });
            }
        }
        TaskKind::Elementwise | TaskKind::Cube => {
            for y in &y_axes {
                cases.push(TilingCase { block_axis, tile_axis: Some(*y), reduce_mode: None });
            }
        }
    }
    if cases.is_empty() && y_axes.is_empty() && r_axes.is_empty() {
        cases.push(TilingCase { block_axis, tile_axis: None, reduce_mode: None });
    }
    cases.truncate(max_cases);
    cases
}

/// Apply `case` to `graph`; `false` when one of its splits is refused.
pub fn apply_tiling(graph: &mut Graph, case: &TilingCase) -> Result<bool> {
    let mut tile_target = case.tile_axis;
    if let Some(block) = case.block_axis {
        let Some((_, inner)) = split_axis(graph, block, BLOCK_SPLIT)? else { return Ok(false) };
        if tile_target == Some(block) {
            tile_target = Some(inner);
        }
    }
    let tile_outer = match tile_target {
        Some(tile) => match split_axis(graph, tile, TILE_SPLIT)? {
            Some((outer, _)) => Some(outer),
            None => return Ok(false),
        },
        None => None,
    };

    for id in graph.node_ids() {
        let node = graph.node_mut(id).context(GraphSnafu)?;
        if node.kind.is_io() {
            continue;
        }
        if let Some(outer) = tile_outer
            && node.sched.axis.contains(&outer)
        {
            node.sched.loop_axis = Some(outer);
        }
        for tensor in node.outputs.iter_mut() {
            let inner_from = tile_outer.and_then(|o| tensor.position_of(o)).map_or(0, |p| p + 1);
            tensor.vectorized_axis = tensor.axis()[inner_from..].iter().copied().collect();
        }
    }
    debug!(graph = graph.name(), tile = ?tile_outer, "apply tiling");
    Ok(true)
}
