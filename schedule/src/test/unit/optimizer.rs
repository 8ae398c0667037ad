use tessera_ir::{DType, Edge, Graph, OpKind, ReduceOp, SizeExpr, UnaryOp};

use crate::config::{GraphType, OptimizerOptions, PlatformConfig};
use crate::error::ScheduleError;
use crate::optimizer::Optimizer;
use crate::result::Template;
use crate::test::helpers::{elementwise, normalization, reduction};

fn optimizer(options: OptimizerOptions) -> Optimizer {
    Optimizer::new(options, PlatformConfig::standard())
}

#[test]
fn elementwise_kernel_end_to_end() {
    let (g, _) = elementwise("ew", &[SizeExpr::constant(16)], DType::Float32);
    let fused = Optimizer::default().optimize("kernel", &mut [g]).unwrap();

    assert_eq!(fused.fused_name, "kernel");
    assert_eq!(fused.input_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["x"]);
    assert_eq!(fused.output_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["out"]);
    assert!(fused.workspace_nodes.is_empty());
    assert!(fused.origin_vars.is_empty());

    let [task] = fused.node_idx_to_scheduled_results.as_slice() else { panic!("expected one task") };
    let [candidate] = task.as_slice() else { panic!("expected one candidate") };
    assert_eq!(candidate.template, Template::Plain);
    let [group] = candidate.schedule_groups.as_slice() else { panic!("expected one group") };
    let [impl_graph] = group.impl_graphs.as_slice() else { panic!("expected one ImplGraph") };

    let graph = &impl_graph.graph;
    let store = graph.find_node("store").unwrap();
    let out = graph.find_node("out").unwrap();
    assert_eq!(graph.node(store).unwrap().output(0).unwrap().mem.tensor_id, graph.node(out).unwrap().output(0).unwrap().mem.tensor_id);

    assert!(fused.workspace_size(512).is_zero());
    let table = fused.tiling_key_table.as_ref().unwrap();
    assert_eq!(table.entries.len(), 1);
    assert!(fused.render_find_best_tiling_key().unwrap().contains("{ return 0u; }"));
}

#[test]
fn empty_kernel_is_rejected() {
    let err = Optimizer::default().optimize("kernel", &mut []).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidInput { .. }));
}

#[test]
fn large_reduction_shares_one_workspace() {
    let (g, _) = reduction("red", None, SizeExpr::constant(1 << 20), ReduceOp::Sum);
    let fused = Optimizer::default().optimize("kernel", &mut [g]).unwrap();

    let candidates = &fused.node_idx_to_scheduled_results[0];
    assert_eq!(candidates.len(), 1);
    let groups = &candidates[0].schedule_groups;
    assert!(groups.len() >= 2);
    assert!(candidates[0].is_reduce_mem_reuse);

    assert_eq!(fused.workspace_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["red_ws0"]);
    assert!(!fused.workspace_size(512).is_zero());
    let text = fused.render_get_workspace_size(512);
    assert!(text.starts_with("int64_t GetWorkspaceSize(AutofuseTilingData &t) {\n  int64_t ws_size = 0;\n"));
    assert!(text.contains("  ws_size += "));
    assert!(text.ends_with("  return ws_size;\n}\n"));
}

#[test]
fn symbolic_reduction_keeps_both_variants() {
    let (g, _) = reduction("red", Some(SizeExpr::constant(8)), SizeExpr::symbol("s0"), ReduceOp::Sum);
    let fused = Optimizer::default().optimize("kernel", &mut [g]).unwrap();

    let candidates = &fused.node_idx_to_scheduled_results[0];
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].schedule_groups.len(), 1);
    assert_eq!(candidates[1].schedule_groups.len(), 2);
    let text = fused.render_find_best_tiling_key().unwrap();
    assert!(text.contains("t.graph0_tiling_key == 1"));
}

#[test]
fn mean_finishes_with_division() {
    let (g, _) = reduction("avg", None, SizeExpr::constant(1 << 20), ReduceOp::Mean);
    let fused = Optimizer::default().optimize("kernel", &mut [g]).unwrap();

    let phase2 = &fused.node_idx_to_scheduled_results[0][0].schedule_groups[1].impl_graphs[0].graph;
    let mean = phase2.find_node("reduce_mean").unwrap();
    assert!(matches!(phase2.node(mean).unwrap().kind, OpKind::Binary(_)));
}

#[test]
fn large_normalization_reloads_the_reduction() {
    let g = normalization("norm", SizeExpr::constant(1 << 20));
    let fused = Optimizer::default().optimize("kernel", &mut [g]).unwrap();

    let [candidate] = fused.node_idx_to_scheduled_results[0].as_slice() else { panic!("expected one candidate") };
    let names: Vec<&str> = candidate.schedule_groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["g0_br", "g1_r", "g2_y"]);
    assert!(candidate.schedule_groups.iter().all(|g| !g.impl_graphs.is_empty()));
    assert_eq!(fused.workspace_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["norm_ws0", "norm_ws1"]);

    let epilogue = &candidate.schedule_groups[2].impl_graphs[0].graph;
    let wide = epilogue.find_node("wide").unwrap();
    assert_eq!(epilogue.input_edge(wide, 0).unwrap(), Edge::of(epilogue.find_node("norm_ws1_load").unwrap()));
}

#[test]
fn group_parallel_skips_fused_keys() {
    let options = OptimizerOptions::builder().enable_group_parallel(true).build();
    let (g, _) = elementwise("ew", &[SizeExpr::constant(16)], DType::Float32);
    let fused = optimizer(options).optimize("kernel", &mut [g]).unwrap();

    assert!(fused.tiling_key_table.is_none());
    assert!(fused.render_find_best_tiling_key().is_none());
    assert!(fused.node_idx_to_scheduled_results[0].iter().all(|r| r.enable_group_parallel));
}

#[test]
fn backend_units_share_kernel_io() {
    let options = OptimizerOptions::builder().graph_type(GraphType::AscBackend).build();
    let mut units = Vec::new();
    for name in ["first", "second"] {
        let mut g = Graph::new(name);
        let s0 = g.create_size_var("s0");
        let z = g.create_axis("z", s0);
        let x = g.data("x", 0, DType::Float32, &[z]).unwrap();
        let load = g.load("load", x).unwrap();
        let exp = g.unary("exp", UnaryOp::Exp, load).unwrap();
        let store = g.store("store", exp).unwrap();
        g.output(&format!("{name}_out"), 0, store).unwrap();
        units.push(g);
    }
    let fused = optimizer(options).optimize("kernel", &mut units).unwrap();

    assert_eq!(fused.node_idx_to_scheduled_results.len(), 2);
    assert_eq!(fused.input_nodes.len(), 1);
    assert_eq!(fused.output_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["first_out", "second_out"]);
    assert_eq!(fused.origin_vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(), ["s0"]);
    assert_eq!(fused.tiling_key_table.as_ref().unwrap().candidates_per_task, [1, 1]);
}
