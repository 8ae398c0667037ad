//! Liveness intervals and reuse coloring.

use std::collections::BTreeMap;

use tessera_ir::{Edge, Graph, NodeId, Position};

/// Closed interval of topological steps during which a value is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Interval of every output edge: from its producer to its last reader.
pub fn intervals(graph: &Graph, order: &[NodeId]) -> BTreeMap<Edge, Interval> {
    let step: BTreeMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut out = BTreeMap::new();
    for node in graph.nodes() {
        let Some(&start) = step.get(&node.id) else { continue };
        for slot in 0..node.outputs.len() {
            out.insert(Edge::new(node.id, slot), Interval { start, end: start });
        }
    }
    for node in graph.nodes() {
        let Some(&at) = step.get(&node.id) else { continue };
        for edge in &node.inputs {
            if let Some(interval) = out.get_mut(edge) {
                interval.end = interval.end.max(at);
            }
        }
    }
    out
}

/// A value competing for reusable on-chip space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseRequest<K> {
    pub key: K,
    pub position: Position,
    pub interval: Interval,
    /// Never shares its color with anything else.
    pub exclusive: bool,
}

struct Color {
    id: u32,
    position: Position,
    end: usize,
    closed: bool,
}

/// Greedy interval coloring: each request, in start order, takes the lowest
/// color of its position whose previous occupant is dead. Ids start at `first`.
pub fn color<K: Clone + Ord>(requests: &[ReuseRequest<K>], first: u32) -> BTreeMap<K, u32> {
    let mut sorted: Vec<&ReuseRequest<K>> = requests.iter().collect();
    sorted.sort_by(|a, b| a.interval.cmp(&b.interval).then_with(|| a.key.cmp(&b.key)));

    let mut colors: Vec<Color> = Vec::new();
    let mut assigned = BTreeMap::new();
    for request in sorted {
        let reusable = (!request.exclusive)
            .then(|| {
                colors
                    .iter_mut()
                    .find(|c| !c.closed && c.position == request.position && c.end < request.interval.start)
            })
            .flatten();
        let id = match reusable {
            Some(color) => {
                color.end = request.interval.end;
                color.id
            }
            None => {
                let id = first + colors.len() as u32;
                colors.push(Color {
                    id,
                    position: request.position,
                    end: request.interval.end,
                    closed: request.exclusive,
                });
                id
            }
        };
        assigned.insert(request.key.clone(), id);
    }
    assigned
}
