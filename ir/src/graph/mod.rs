//! Arena graph of computation nodes.
//!
//! Nodes live in a slot vector indexed by [`NodeId`]; removed nodes leave a
//! hole so ids stay stable across rewrites. Edges point from a consumer input
//! to a producer output (`Edge { node, slot }`). Consumers are computed on
//! demand by scanning, which keeps every mutation a local update.

pub mod constructors;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Write;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::axis::{Axis, AxisId, AxisKind};
use crate::error::*;
use crate::expr::SizeExpr;
use crate::node::{Edge, Node, NodeId, Sched};
use crate::op::OpKind;
use crate::tensor::Tensor;

/// Named shape variable declared on a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeVar {
    pub name: String,
    pub expr: SizeExpr,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    name: String,
    nodes: Vec<Option<Node>>,
    axes: Vec<Axis>,
    size_vars: Vec<SizeVar>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // =========================================================================
    // Size variables and axes
    // =========================================================================

    /// Declare (or look up) the symbolic size `name`.
    pub fn create_size_var(&mut self, name: impl Into<String>) -> SizeExpr {
        let name = name.into();
        if let Some(var) = self.size_vars.iter().find(|v| v.name == name) {
            return var.expr.clone();
        }
        let expr = SizeExpr::symbol(&name);
        self.size_vars.push(SizeVar { name, expr: expr.clone() });
        expr
    }

    pub fn size_vars(&self) -> &[SizeVar] {
        &self.size_vars
    }

    pub fn create_axis(&mut self, name: impl Into<String>, size: SizeExpr) -> AxisId {
        self.create_derived_axis(name, size, AxisKind::Original, [])
    }

    pub fn create_derived_axis(
        &mut self,
        name: impl Into<String>,
        size: SizeExpr,
        kind: AxisKind,
        from: impl IntoIterator<Item = AxisId>,
    ) -> AxisId {
        let id = AxisId(self.axes.len() as u32);
        self.axes.push(Axis { id, name: name.into(), size, kind, from: from.into_iter().collect() });
        id
    }

    pub fn axis(&self, id: AxisId) -> Result<&Axis> {
        self.axes.get(id.0 as usize).context(AxisNotFoundSnafu { id })
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn find_axis(&self, name: &str) -> Option<AxisId> {
        self.axes.iter().find(|a| a.name == name).map(|a| a.id)
    }

    /// Extents of `axes` in order.
    pub fn axis_sizes(&self, axes: &[AxisId]) -> Result<SmallVec<[SizeExpr; 4]>> {
        axes.iter().map(|a| self.axis(*a).map(|axis| axis.size.clone())).collect()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Append a node. Inputs must refer to existing producer outputs.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: OpKind,
        inputs: impl IntoIterator<Item = Edge>,
        outputs: impl IntoIterator<Item = Tensor>,
    ) -> Result<NodeId> {
        let inputs: SmallVec<[Edge; 3]> = inputs.into_iter().collect();
        for edge in &inputs {
            self.tensor(*edge)?;
        }
        let outputs: SmallVec<[Tensor; 1]> = outputs.into_iter().collect();
        let id = NodeId(self.nodes.len() as u32);
        let sched = Sched {
            axis: outputs.first().map(|t| t.axis().iter().copied().collect()).unwrap_or_default(),
            loop_axis: None,
            exec_order: id.0 as i64,
        };
        let node = Node {
            id,
            name: name.into(),
            compute_type: kind.default_compute_type(),
            kind,
            inputs,
            outputs,
            sched,
            tmp_buffers: Vec::new(),
        };
        trace!(graph = %self.name, node = %node.name, id = %id, kind = node.type_name(), "add node");
        self.nodes.push(Some(node));
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref).context(NodeNotFoundSnafu { id })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut).context(NodeNotFoundSnafu { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|n| n.name == name).map(|n| n.id)
    }

    /// Tensor produced at `edge`.
    pub fn tensor(&self, edge: Edge) -> Result<&Tensor> {
        self.node(edge.node)?.output(edge.slot)
    }

    pub fn tensor_mut(&mut self, edge: Edge) -> Result<&mut Tensor> {
        self.node_mut(edge.node)?.output_mut(edge.slot)
    }

    /// Tensor feeding input `index` of `node`.
    pub fn input_tensor(&self, node: NodeId, index: usize) -> Result<&Tensor> {
        let edge = self.input_edge(node, index)?;
        self.tensor(edge)
    }

    pub fn input_edge(&self, node: NodeId, index: usize) -> Result<Edge> {
        let n = self.node(node)?;
        n.inputs.get(index).copied().context(InvalidInputIndexSnafu {
            node: n.name.clone(),
            index,
            available: n.inputs.len(),
        })
    }

    /// Every `(consumer, input index)` reading `edge`, in id order.
    pub fn consumers(&self, edge: Edge) -> Vec<(NodeId, usize)> {
        self.nodes()
            .flat_map(|n| n.inputs.iter().enumerate().filter(|(_, e)| **e == edge).map(move |(i, _)| (n.id, i)))
            .collect()
    }

    /// Distinct nodes reading any output of `id`.
    pub fn node_consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes().filter(|n| n.inputs.iter().any(|e| e.node == id)).map(|n| n.id).collect()
    }

    pub fn set_input(&mut self, node: NodeId, index: usize, edge: Edge) -> Result<()> {
        self.tensor(edge)?;
        let n = self.node_mut(node)?;
        let available = n.inputs.len();
        let name = n.name.clone();
        let slot = n.inputs.get_mut(index).context(InvalidInputIndexSnafu { node: name, index, available })?;
        *slot = edge;
        Ok(())
    }

    /// Redirect every reader of `old` to `new`. The producer of `new` keeps
    /// its own inputs so a node inserted after `old` is not rewired to itself.
    pub fn replace_uses(&mut self, old: Edge, new: Edge) -> Result<usize> {
        self.tensor(new)?;
        let mut replaced = 0;
        for node in self.nodes.iter_mut().flatten() {
            if node.id == new.node {
                continue;
            }
            for input in node.inputs.iter_mut().filter(|e| **e == old) {
                *input = new;
                replaced += 1;
            }
        }
        Ok(replaced)
    }

    /// Delete a node nobody reads.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let consumers = self.node_consumers(id);
        let name = self.node(id)?.name.clone();
        ensure!(consumers.is_empty(), NodeInUseSnafu { node: name, consumers: consumers.len() });
        trace!(graph = %self.name, node = %name, id = %id, "remove node");
        self.nodes[id.0 as usize].take().context(NodeNotFoundSnafu { id })
    }

    /// Create a node reading `edge` and move every other reader of `edge` onto it.
    pub fn insert_after(&mut self, edge: Edge, name: impl Into<String>, kind: OpKind, output: Tensor) -> Result<NodeId> {
        let readers = self.consumers(edge);
        let id = self.add_node(name, kind, [edge], [output])?;
        for (consumer, index) in readers {
            self.set_input(consumer, index, Edge::of(id))?;
        }
        Ok(id)
    }

    /// Create a node between input `index` of `consumer` and its producer.
    pub fn insert_on_input(
        &mut self,
        consumer: NodeId,
        index: usize,
        name: impl Into<String>,
        kind: OpKind,
        output: Tensor,
    ) -> Result<NodeId> {
        let edge = self.input_edge(consumer, index)?;
        let id = self.add_node(name, kind, [edge], [output])?;
        self.set_input(consumer, index, Edge::of(id))?;
        Ok(id)
    }

    /// Name not used by any live node, derived from `base`.
    pub fn unique_name(&self, base: &str) -> String {
        if self.find_node(base).is_none() {
            return base.to_string();
        }
        (1..).map(|i| format!("{base}_{i}")).find(|n| self.find_node(n).is_none()).unwrap_or_default()
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Kahn's algorithm, ready nodes taken lowest id first.
    pub fn topo_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut readers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.nodes() {
            in_degree.entry(node.id).or_insert(0);
            for edge in &node.inputs {
                *in_degree.entry(node.id).or_insert(0) += 1;
                readers.entry(edge.node).or_default().push(node.id);
            }
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> =
            in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| Reverse(*id)).collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for reader in readers.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(reader) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*reader));
                    }
                }
            }
        }
        ensure!(order.len() == in_degree.len(), CycleSnafu { graph: self.name.clone() });
        Ok(order)
    }

    /// Kernel inputs ordered by signature index.
    pub fn inputs(&self) -> Vec<NodeId> {
        self.io_nodes(|kind| match kind {
            OpKind::Data { index } => Some(*index),
            _ => None,
        })
    }

    /// Kernel outputs ordered by signature index.
    pub fn outputs(&self) -> Vec<NodeId> {
        self.io_nodes(|kind| match kind {
            OpKind::Output { index } => Some(*index),
            _ => None,
        })
    }

    pub fn workspaces(&self) -> Vec<NodeId> {
        self.nodes().filter(|n| matches!(n.kind, OpKind::Workspace)).map(|n| n.id).collect()
    }

    fn io_nodes(&self, index_of: impl Fn(&OpKind) -> Option<usize>) -> Vec<NodeId> {
        let mut nodes: Vec<(usize, NodeId)> =
            self.nodes().filter_map(|n| index_of(&n.kind).map(|index| (index, n.id))).collect();
        nodes.sort();
        nodes.into_iter().map(|(_, id)| id).collect()
    }

    /// Structural check: every edge resolves and the graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes() {
            for edge in &node.inputs {
                self.tensor(*edge)?;
            }
            for tensor in &node.outputs {
                for axis in tensor.axis() {
                    self.axis(*axis)?;
                }
            }
        }
        self.topo_order().map(|_| ())
    }

    /// Human readable listing in topological order.
    pub fn dump(&self) -> String {
        let mut out = format!("graph {} {{\n", self.name);
        let order = self.topo_order().unwrap_or_else(|_| self.node_ids());
        for id in order {
            let Ok(node) = self.node(id) else { continue };
            let inputs = node.inputs.iter().map(|e| format!("{}:{}", e.node, e.slot)).collect::<Vec<_>>().join(", ");
            let _ = write!(out, "  {} {} = {}({inputs})", node.id, node.name, node.type_name());
            for tensor in &node.outputs {
                let axes = tensor.axis().iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                let repeats = tensor.repeats().iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                let strides = tensor.strides().iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                let _ = write!(out, " -> {}[{axes}] repeats=[{repeats}] strides=[{strides}]", tensor.dtype);
            }
            out.push('\n');
        }
        out.push('}');
        out
    }
}
