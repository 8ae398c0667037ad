//! Task generation.
//!
//! One task per unit of work: the single graph of an `AscGraph` input, or each
//! sub-graph of an `AscBackend` fused kernel. A task carries its
//! classification, its ordered template list and whether its reduction needs
//! the two-phase split.

use snafu::{OptionExt, ResultExt, ensure};
use tessera_ir::{Edge, Graph, NodeId, OpKind, ReduceOp, SizeExpr, UnaryOp};
use tracing::debug;

use crate::config::{GraphType, NddmaPolicy, OptimizerOptions, PlatformConfig};
use crate::error::*;
use crate::passes::substitute_nddma;
use crate::result::{CubeType, Template};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TaskKind {
    Elementwise,
    Reduce,
    Cube,
}

/// Whether the task's reduction is split across cores in two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ReduceSplit {
    None,
    /// The reduced extent exceeds what one core handles.
    Required,
    /// The reduced extent is symbolic; both variants are emitted.
    Runtime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleTask {
    pub index: usize,
    pub name: String,
    pub graph: Graph,
    pub kind: TaskKind,
    pub templates: Vec<Template>,
    pub reduce_split: ReduceSplit,
}

/// The single reduction of a graph with its reduced extent in elements.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceInfo {
    pub node: NodeId,
    pub op: ReduceOp,
    /// Reduced axes, outermost first.
    pub axes: Vec<tessera_ir::AxisId>,
    pub extent: SizeExpr,
    pub bytes: SizeExpr,
}

/// Reduction facts of the only `Reduce` node in `graph`, if it has exactly one.
pub fn single_reduce(graph: &Graph) -> Result<Option<ReduceInfo>> {
    let reduces: Vec<NodeId> =
        graph.nodes().filter(|n| matches!(n.kind, OpKind::Reduce(_))).map(|n| n.id).collect();
    let [id] = reduces.as_slice() else { return Ok(None) };
    let node = graph.node(*id).context(GraphSnafu)?;
    let OpKind::Reduce(op) = node.kind else { return Ok(None) };
    let input = graph.input_tensor(*id, 0).context(GraphSnafu)?;
    let output = node.output(0).context(GraphSnafu)?;

    let reduced: Vec<(tessera_ir::AxisId, SizeExpr)> = input
        .axis()
        .iter()
        .zip(input.repeats())
        .zip(output.repeats())
        .filter(|((_, i), o)| o.is_one() && !i.is_one())
        .map(|((a, i), _)| (*a, i.clone()))
        .collect();
    let extent = SizeExpr::product(reduced.iter().map(|(_, e)| e.clone()));
    let bytes = SizeExpr::mul(extent.clone(), SizeExpr::constant(input.dtype.bytes() as i64));
    Ok(Some(ReduceInfo { node: *id, op, axes: reduced.into_iter().map(|(a, _)| a).collect(), extent, bytes }))
}

fn classify(graph: &Graph) -> TaskKind {
    if graph.nodes().any(|n| matches!(n.kind, OpKind::MatMul(_))) {
        TaskKind::Cube
    } else if graph.nodes().any(|n| matches!(n.kind, OpKind::Reduce(_))) {
        TaskKind::Reduce
    } else {
        TaskKind::Elementwise
    }
}

/// Compute nodes downstream of the first matmul, stopping at stores.
fn cube_epilogue(graph: &Graph) -> Vec<OpKind> {
    let Some(matmul) = graph.nodes().find(|n| matches!(n.kind, OpKind::MatMul(_))).map(|n| n.id) else {
        return Vec::new();
    };
    let mut epilogue = Vec::new();
    let mut frontier = vec![matmul];
    let mut seen = vec![matmul];
    while let Some(id) = frontier.pop() {
        for reader in graph.node_consumers(id) {
            let Ok(node) = graph.node(reader) else { continue };
            if seen.contains(&reader) || matches!(node.kind, OpKind::Store | OpKind::Output { .. }) || node.kind.is_io() {
                continue;
            }
            seen.push(reader);
            epilogue.push(node.kind.clone());
            frontier.push(reader);
        }
    }
    epilogue
}

fn cube_templates(graph: &Graph) -> Vec<Template> {
    let epilogue = cube_epilogue(graph);
    let fixpipe = epilogue.iter().all(|k| matches!(k, OpKind::Cast | OpKind::Unary(UnaryOp::Relu)));
    let elementwise = epilogue
        .iter()
        .all(|k| matches!(k, OpKind::Cast | OpKind::Unary(_) | OpKind::Binary(_) | OpKind::Select | OpKind::Scalar { .. }));

    let mut templates = Vec::new();
    if fixpipe {
        templates.push(Template::Cube(CubeType::Fixpip));
    }
    templates.push(Template::Cube(CubeType::Common));
    if !epilogue.is_empty() && elementwise {
        templates.push(Template::Cube(CubeType::UBFuse));
    }
    if !epilogue.is_empty() {
        templates.push(Template::Cube(CubeType::L2Fuse));
    }
    templates
}

fn reduce_split(graph: &Graph, platform: &PlatformConfig) -> Result<ReduceSplit> {
    let Some(info) = single_reduce(graph)? else { return Ok(ReduceSplit::None) };
    if info.axes.is_empty() {
        return Ok(ReduceSplit::None);
    }
    Ok(match info.bytes.as_const() {
        Some(bytes) if bytes > platform.single_core_reduce_bytes as i64 => ReduceSplit::Required,
        Some(_) => ReduceSplit::None,
        None => ReduceSplit::Runtime,
    })
}

/// Build the tasks for `units` (already passed through the pipeline and the
/// axis merger).
#[tracing::instrument(skip_all, fields(units = units.len(), graph_type = %options.graph_type))]
pub fn generate_tasks(
    units: &[Graph],
    options: &OptimizerOptions,
    platform: &PlatformConfig,
) -> Result<Vec<ScheduleTask>> {
    ensure!(!units.is_empty(), InvalidInputSnafu { reason: "no graph to schedule" });
    if options.graph_type == GraphType::AscGraph {
        ensure!(
            units.len() == 1,
            InvalidInputSnafu { reason: format!("asc_graph input takes one graph, got {}", units.len()) }
        );
    }

    let mut tasks = Vec::with_capacity(units.len());
    for (index, graph) in units.iter().enumerate() {
        let kind = classify(graph);
        let templates = match kind {
            TaskKind::Cube => cube_templates(graph),
            _ => {
                let mut templates = vec![Template::Plain];
                if options.nddma == NddmaPolicy::Template && substitute_nddma(&mut graph.clone(), platform)? > 0 {
                    templates.push(Template::Nddma);
                }
                templates
            }
        };
        let reduce_split = match kind {
            TaskKind::Reduce => reduce_split(graph, platform)?,
            _ => ReduceSplit::None,
        };
        let name = if graph.name().is_empty() { format!("graph{index}") } else { graph.name().to_string() };
        debug!(task = %name, %kind, templates = templates.len(), %reduce_split, "generate task");
        tasks.push(ScheduleTask { index, name, graph: graph.clone(), kind, templates, reduce_split });
    }
    Ok(tasks)
}

/// Producer edge feeding input 0 of `node`.
pub(crate) fn first_input(graph: &Graph, node: NodeId) -> Result<Edge> {
    let n = graph.node(node).context(GraphSnafu)?;
    n.inputs.first().copied().context(InvalidInputSnafu { reason: format!("'{}' has no input", n.name) })
}
