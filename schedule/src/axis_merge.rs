//! Contiguous axis merging.
//!
//! Two axes `a, b` (in that order) merge when every node of the graph treats
//! them as one run of memory:
//!
//! - every tensor and every `sched.axis` list holds both, adjacent and in
//!   order, or neither;
//! - in every tensor holding them, `a` steps over exactly one `b` row;
//! - every node touching either axis allows the merge under its
//!   [`ContinuityRule`].
//!
//! Legal pairs chain into classes (`a, b` and `b, c` give `a, b, c`), and each
//! class is replaced by one [`AxisKind::Merged`] axis whose extent is the
//! product of its members.

use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;
use snafu::ResultExt;
use tessera_ir::{AxisId, AxisKind, Graph, Node, OpKind, SizeExpr, Tensor};
use tracing::{debug, trace};

use crate::capability::{ContinuityRule, capability};
use crate::error::*;

/// Where an axis pair sits in an axis list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Absent,
    /// `a` at this position, `b` right after it.
    Adjacent(usize),
    Broken,
}

fn placement(axes: &[AxisId], a: AxisId, b: AxisId) -> Placement {
    let pa = axes.iter().position(|x| *x == a);
    let pb = axes.iter().position(|x| *x == b);
    match (pa, pb) {
        (None, None) => Placement::Absent,
        (Some(i), Some(j)) if j == i + 1 => Placement::Adjacent(i),
        _ => Placement::Broken,
    }
}

/// Stride of each dimension with extent-one dimensions taking the stride
/// they would have in a dense layout of what follows them.
fn effective_strides(tensor: &Tensor) -> SmallVec<[SizeExpr; 4]> {
    let rank = tensor.rank();
    let mut out: SmallVec<[SizeExpr; 4]> = SmallVec::from_elem(SizeExpr::one(), rank);
    for i in (0..rank).rev() {
        out[i] = if !tensor.repeats()[i].is_one() {
            tensor.strides()[i].clone()
        } else if i + 1 < rank {
            SizeExpr::mul(out[i + 1].clone(), tensor.repeats()[i + 1].clone())
        } else {
            SizeExpr::one()
        };
    }
    out
}

fn tensor_allows(tensor: &Tensor, a: AxisId, b: AxisId) -> bool {
    match placement(tensor.axis(), a, b) {
        Placement::Absent => true,
        Placement::Broken => false,
        Placement::Adjacent(i) => {
            let eff = effective_strides(tensor);
            eff[i] == SizeExpr::mul(tensor.repeats()[i + 1].clone(), eff[i + 1].clone())
        }
    }
}

/// Extents of `a` and `b` in `tensor`, if it holds them.
fn pair_extents(tensor: &Tensor, a: AxisId, b: AxisId) -> Option<(SizeExpr, SizeExpr)> {
    match placement(tensor.axis(), a, b) {
        Placement::Adjacent(i) => Some((tensor.repeats()[i].clone(), tensor.repeats()[i + 1].clone())),
        _ => None,
    }
}

fn node_allows(graph: &Graph, node: &Node, a: AxisId, b: AxisId) -> Result<bool> {
    let inputs: Vec<&Tensor> =
        node.inputs.iter().map(|e| graph.tensor(*e)).collect::<Result<_, _>>().context(GraphSnafu)?;
    let touches = |t: &Tensor| t.position_of(a).is_some() || t.position_of(b).is_some();
    if !inputs.iter().copied().chain(node.outputs.iter()).any(touches) {
        return Ok(true);
    }
    if placement(&node.sched.axis, a, b) == Placement::Broken {
        return Ok(false);
    }
    let output = node.outputs.first().and_then(|t| pair_extents(t, a, b));

    let allowed = match capability(&node.kind).continuity {
        ContinuityRule::Never => false,
        ContinuityRule::Strict => inputs.iter().all(|t| match (pair_extents(t, a, b), &output) {
            (None, _) => true,
            (Some(pair), Some(out)) => pair == *out || (pair.0.is_one() && pair.1.is_one()),
            (Some(_), None) => false,
        }),
        ContinuityRule::ReduceSides => match (inputs.first().and_then(|t| pair_extents(t, a, b)), output) {
            (Some((ia, ib)), Some((oa, ob))) => {
                let reduced = |i: &SizeExpr, o: &SizeExpr| o.is_one() && !i.is_one();
                reduced(&ia, &oa) == reduced(&ib, &ob)
            }
            _ => false,
        },
        ContinuityRule::IdentityOnly => inputs.iter().all(|t| match pair_extents(t, a, b) {
            None => true,
            Some(pair) => output.as_ref() == Some(&pair) || (pair.0.is_one() && pair.1.is_one()),
        }),
        ContinuityRule::NonConcatAxes | ContinuityRule::OutsideGather => match node.kind {
            OpKind::Concat { axis } | OpKind::Split { axis } | OpKind::Gather { axis } => axis != a && axis != b,
            _ => true,
        },
    };
    Ok(allowed)
}

fn pair_is_legal(graph: &Graph, a: AxisId, b: AxisId) -> Result<bool> {
    for node in graph.nodes() {
        if !node.outputs.iter().all(|t| tensor_allows(t, a, b)) || !node_allows(graph, node, a, b)? {
            trace!(%a, %b, node = %node.name, "axis pair not contiguous");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Merge every class of contiguous axes; returns whether anything merged.
#[tracing::instrument(skip_all, fields(graph = graph.name()))]
pub fn merge_continuous_axis(graph: &mut Graph) -> Result<bool> {
    let candidates: BTreeSet<(AxisId, AxisId)> = graph
        .nodes()
        .flat_map(|n| n.outputs.iter())
        .flat_map(|t| t.axis().windows(2).map(|w| (w[0], w[1])).collect::<Vec<_>>())
        .collect();

    let mut next: BTreeMap<AxisId, AxisId> = BTreeMap::new();
    for (a, b) in candidates {
        if pair_is_legal(graph, a, b)? {
            next.insert(a, b);
        }
    }
    if next.is_empty() {
        return Ok(false);
    }

    let inner: BTreeSet<AxisId> = next.values().copied().collect();
    let mut classes: Vec<Vec<AxisId>> = Vec::new();
    for head in next.keys().copied().filter(|a| !inner.contains(a)) {
        let mut class = vec![head];
        while let Some(b) = next.get(class.last().unwrap_or(&head)) {
            class.push(*b);
        }
        classes.push(class);
    }

    let mut merged_of: BTreeMap<AxisId, AxisId> = BTreeMap::new();
    let mut merged_classes: Vec<(AxisId, Vec<AxisId>)> = Vec::new();
    for class in classes {
        let members = class.iter().map(|a| graph.axis(*a).cloned()).collect::<Result<Vec<_>, _>>().context(GraphSnafu)?;
        let name: String = members.iter().map(|a| a.name.as_str()).collect();
        let size = SizeExpr::product(members.iter().map(|a| a.size.clone()));
        debug!(axis = %name, %size, members = class.len(), "merge contiguous axes");
        let merged = graph.create_derived_axis(name, size, AxisKind::Merged, class.iter().copied());
        merged_of.extend(class.iter().map(|a| (*a, merged)));
        merged_classes.push((merged, class));
    }

    for id in graph.node_ids() {
        let node = graph.node_mut(id).context(GraphSnafu)?;
        for tensor in node.outputs.iter_mut() {
            rewrite_tensor(tensor, &merged_classes).context(GraphSnafu)?;
        }
        node.sched.axis = collapse(&node.sched.axis, &merged_of);
        node.sched.loop_axis = node.sched.loop_axis.map(|a| merged_of.get(&a).copied().unwrap_or(a));
    }
    Ok(true)
}

/// Replace every member run by its merged axis, keeping first occurrences.
fn collapse(axes: &[AxisId], merged_of: &BTreeMap<AxisId, AxisId>) -> SmallVec<[AxisId; 6]> {
    let mut out: SmallVec<[AxisId; 6]> = SmallVec::new();
    for a in axes {
        let mapped = merged_of.get(a).copied().unwrap_or(*a);
        if out.last() != Some(&mapped) {
            out.push(mapped);
        }
    }
    out
}

fn rewrite_tensor(tensor: &mut Tensor, classes: &[(AxisId, Vec<AxisId>)]) -> tessera_ir::Result<()> {
    let mut axis: SmallVec<[AxisId; 4]> = tensor.axis().iter().copied().collect();
    let mut repeats: SmallVec<[SizeExpr; 4]> = tensor.repeats().iter().cloned().collect();
    let mut strides: SmallVec<[SizeExpr; 4]> = tensor.strides().iter().cloned().collect();

    for (merged, class) in classes {
        let Some(start) = axis.iter().position(|a| *a == class[0]) else { continue };
        let end = start + class.len();
        let eff = effective_strides(&Tensor::new(tensor.dtype, axis.clone(), repeats.clone(), strides.clone())?);
        let extent = SizeExpr::product(repeats[start..end].iter().cloned());
        let stride = if extent.is_one() { SizeExpr::zero() } else { eff[end - 1].clone() };
        axis.drain(start + 1..end);
        repeats.drain(start + 1..end);
        strides.drain(start + 1..end);
        axis[start] = *merged;
        repeats[start] = extent;
        strides[start] = stride;
    }

    let vectorized: SmallVec<[AxisId; 4]> = tensor
        .vectorized_axis
        .iter()
        .map(|a| classes.iter().find(|(_, c)| c.contains(a)).map_or(*a, |(m, _)| *m))
        .fold(SmallVec::new(), |mut acc, a| {
            if acc.last() != Some(&a) {
                acc.push(a);
            }
            acc
        });
    tensor.vectorized_axis = vectorized;
    tensor.set_view(axis, repeats, strides)
}
