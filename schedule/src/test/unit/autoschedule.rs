use test_case::test_case;
use tessera_ir::{AxisKind, DType, Edge, Graph, MatMulKind, OpKind, ReduceOp, SizeExpr, UnaryOp};

use crate::autoschedule::{
    AutoSchedule, AxisRole, ReduceSplit, TaskKind, apply_tiling, axis_roles, generate_tasks, single_reduce,
    split_two_phase, tiling_cases,
};
use crate::config::{GraphType, NddmaPolicy, OptimizerOptions, PlatformConfig};
use crate::error::ScheduleError;
use crate::result::{CubeType, ReduceTiling, Template};
use crate::test::helpers::{count_kind, elementwise, normalization, reduction};

fn backend() -> OptimizerOptions {
    OptimizerOptions::builder().graph_type(GraphType::AscBackend).build()
}

fn transpose_graph() -> Graph {
    let mut g = Graph::new("tr");
    let a = g.create_axis("a", SizeExpr::constant(16));
    let b = g.create_axis("b", SizeExpr::constant(64));
    let x = g.data("x", 0, DType::Float32, &[a, b]).unwrap();
    let load = g.load("load", x).unwrap();
    let t = g.transpose("t", load, &[1, 0]).unwrap();
    let store = g.store("store", t).unwrap();
    g.output("out", 0, store).unwrap();
    g
}

/// `a[m, k] x b[k, n]` followed by `epilogue` unary ops.
fn matmul_graph(epilogue: &[UnaryOp]) -> Graph {
    let mut g = Graph::new("mm");
    let m = g.create_axis("m", SizeExpr::constant(64));
    let k = g.create_axis("k", SizeExpr::constant(32));
    let n = g.create_axis("n", SizeExpr::constant(16));
    let a = g.data("a", 0, DType::Float16, &[m, k]).unwrap();
    let b = g.data("b", 1, DType::Float16, &[k, n]).unwrap();
    let la = g.load("la", a).unwrap();
    let lb = g.load("lb", b).unwrap();
    let mut last = g.matmul("mm", MatMulKind::MatMul, la, lb, None).unwrap();
    for (i, op) in epilogue.iter().enumerate() {
        last = g.unary(&format!("epi{i}"), *op, last).unwrap();
    }
    let store = g.store("store", last).unwrap();
    g.output("out", 0, store).unwrap();
    g
}

#[test]
fn asc_graph_takes_exactly_one_unit() {
    let (a, _) = elementwise("a", &[SizeExpr::constant(16)], DType::Float32);
    let (b, _) = elementwise("b", &[SizeExpr::constant(16)], DType::Float32);
    let platform = PlatformConfig::standard();

    let err = generate_tasks(&[a.clone(), b.clone()], &OptimizerOptions::default(), &platform).unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidInput { .. }));
    assert!(matches!(
        generate_tasks(&[], &backend(), &platform).unwrap_err(),
        ScheduleError::InvalidInput { .. }
    ));

    let tasks = generate_tasks(&[a, b], &backend(), &platform).unwrap();
    assert_eq!(tasks.iter().map(|t| (t.index, t.name.as_str())).collect::<Vec<_>>(), [(0, "a"), (1, "b")]);
    assert!(tasks.iter().all(|t| t.kind == TaskKind::Elementwise && t.templates == [Template::Plain]));
}

#[test]
fn unnamed_unit_gets_positional_name() {
    let (g, _) = elementwise("", &[SizeExpr::constant(8)], DType::Float32);
    let tasks = generate_tasks(&[g], &OptimizerOptions::default(), &PlatformConfig::standard()).unwrap();
    assert_eq!(tasks[0].name, "graph0");
}

#[test_case(NddmaPolicy::Template, &[Template::Plain, Template::Nddma] ; "template")]
#[test_case(NddmaPolicy::Off, &[Template::Plain] ; "off")]
fn nddma_template_follows_policy(nddma: NddmaPolicy, expected: &[Template]) {
    let options = OptimizerOptions::builder().nddma(nddma).build();
    let tasks = generate_tasks(&[transpose_graph()], &options, &PlatformConfig::standard()).unwrap();
    assert_eq!(tasks[0].templates, expected);
}

#[test_case(&[UnaryOp::Relu], &[CubeType::Fixpip, CubeType::Common, CubeType::UBFuse, CubeType::L2Fuse] ; "relu epilogue")]
#[test_case(&[], &[CubeType::Fixpip, CubeType::Common] ; "bare matmul")]
#[test_case(&[UnaryOp::Exp], &[CubeType::Common, CubeType::UBFuse, CubeType::L2Fuse] ; "vector epilogue")]
fn cube_templates_follow_epilogue(epilogue: &[UnaryOp], expected: &[CubeType]) {
    let tasks = generate_tasks(&[matmul_graph(epilogue)], &OptimizerOptions::default(), &PlatformConfig::standard())
        .unwrap();
    assert_eq!(tasks[0].kind, TaskKind::Cube);
    let cubes: Vec<CubeType> = tasks[0].templates.iter().map(|t| t.cube_type()).collect();
    assert_eq!(cubes, expected);
}

#[test_case(SizeExpr::constant(1024), ReduceSplit::None ; "fits one core")]
#[test_case(SizeExpr::constant(1 << 20), ReduceSplit::Required ; "too large")]
#[test_case(SizeExpr::symbol("s0"), ReduceSplit::Runtime ; "symbolic")]
fn reduce_split_by_extent(r: SizeExpr, expected: ReduceSplit) {
    let (g, _) = reduction("red", None, r, ReduceOp::Sum);
    let tasks = generate_tasks(&[g], &OptimizerOptions::default(), &PlatformConfig::standard()).unwrap();
    assert_eq!(tasks[0].kind, TaskKind::Reduce);
    assert_eq!(tasks[0].reduce_split, expected);
}

#[test]
fn reduce_roles_and_tiling_cases() {
    let (g, _) = reduction("red", Some(SizeExpr::constant(32)), SizeExpr::constant(256), ReduceOp::Max);
    let y = g.find_axis("y").unwrap();
    let r = g.find_axis("r").unwrap();

    let roles = axis_roles(&g, TaskKind::Reduce).unwrap();
    assert_eq!(roles.letters(), "yr");
    assert_eq!(roles.role_of(r), Some(AxisRole::R));

    let cases = tiling_cases(&g, &roles, TaskKind::Reduce, 8);
    assert_eq!(cases.len(), 2);
    assert!(cases.iter().all(|c| c.block_axis == Some(y)));
    assert_eq!((cases[0].tile_axis, cases[0].reduce_mode), (Some(y), Some(ReduceTiling::FullLoad)));
    assert_eq!((cases[1].tile_axis, cases[1].reduce_mode), (Some(r), Some(ReduceTiling::Tiled)));
    assert_eq!(tiling_cases(&g, &roles, TaskKind::Reduce, 1).len(), 1);
}

#[test]
fn tiling_splits_block_then_tile() {
    let (mut g, reduce) = reduction("red", Some(SizeExpr::constant(32)), SizeExpr::constant(256), ReduceOp::Max);
    let roles = axis_roles(&g, TaskKind::Reduce).unwrap();
    let case = tiling_cases(&g, &roles, TaskKind::Reduce, 8).remove(0);

    assert!(apply_tiling(&mut g, &case).unwrap());
    let names = ["yB", "yb", "ybT", "ybt"].map(|n| g.find_axis(n).unwrap());
    assert_eq!(g.axis(names[0]).unwrap().kind, AxisKind::BlockOuter);
    assert_eq!(g.axis(names[3]).unwrap().kind, AxisKind::TileInner);
    assert!(g.size_vars().iter().any(|v| v.name == "ybt_size"));

    let r = g.find_axis("r").unwrap();
    let input = g.input_tensor(reduce, 0).unwrap();
    assert_eq!(input.axis(), &[names[0], names[2], names[3], r]);
    assert_eq!(input.vectorized_axis.as_slice(), &[names[3], r]);
    assert_eq!(g.node(reduce).unwrap().sched.loop_axis, Some(names[2]));
}

#[test]
fn two_phase_split_passes_partials_through_workspace() {
    let (g, _) = reduction("red", None, SizeExpr::constant(1 << 20), ReduceOp::Sum);
    let info = single_reduce(&g).unwrap().unwrap();
    let two = split_two_phase(&g, &info, "red").unwrap().unwrap();

    assert_eq!(two.workspace, "red_ws0");
    let ws1 = two.phase1.find_node("red_ws0").unwrap();
    assert_eq!(two.phase1.node(ws1).unwrap().kind, OpKind::Workspace);
    assert!(two.phase1.find_node("reduce_partial_store").is_some());
    assert_eq!(count_kind(&two.phase1, "Output"), 0);

    let p2 = &two.phase2;
    assert!(p2.find_node("reduce").is_none());
    assert!(p2.find_node("x").is_none());
    let combine = p2.find_node("reduce_combine").unwrap();
    assert_eq!(p2.node(combine).unwrap().kind, OpKind::Reduce(ReduceOp::Sum));
    assert_eq!(p2.input_edge(combine, 0).unwrap(), Edge::of(p2.find_node("red_ws0_load").unwrap()));
    p2.validate().unwrap();
    assert!(two.epilogue.is_none());

    let relation = &two.var_relations[&1][&0]["rB_size"];
    assert_eq!(*relation, SizeExpr::ceil_div(SizeExpr::constant(1 << 20), SizeExpr::symbol("rb_size")));
}

#[test]
fn mean_divides_after_combining() {
    let (g, _) = reduction("avg", None, SizeExpr::constant(1 << 20), ReduceOp::Mean);
    let info = single_reduce(&g).unwrap().unwrap();
    let two = split_two_phase(&g, &info, "avg").unwrap().unwrap();

    let partial = two.phase1.find_node("reduce").unwrap();
    assert_eq!(two.phase1.node(partial).unwrap().kind, OpKind::Reduce(ReduceOp::Sum));
    let mean = two.phase2.find_node("reduce_mean").unwrap();
    let out = two.phase2.find_node("store").unwrap();
    assert_eq!(two.phase2.input_edge(out, 0).unwrap(), Edge::of(mean));
    assert_eq!(count_kind(&two.phase2, "Scalar"), 1);
}

#[test]
fn full_axis_consumers_move_to_an_epilogue() {
    let g = normalization("norm", SizeExpr::constant(1 << 20));
    let info = single_reduce(&g).unwrap().unwrap();
    let two = split_two_phase(&g, &info, "norm").unwrap().unwrap();

    let p2 = &two.phase2;
    assert!(p2.find_node("sub").is_none());
    assert!(p2.find_node("x").is_none());
    let store = p2.find_node("max_result_store").unwrap();
    let ws = p2.find_node("norm_ws1").unwrap();
    assert_eq!(p2.input_edge(ws, 0).unwrap(), Edge::of(store));
    assert_eq!(p2.input_edge(store, 0).unwrap(), Edge::of(p2.find_node("max_combine").unwrap()));
    p2.validate().unwrap();

    let epilogue = two.epilogue.unwrap();
    assert!(epilogue.find_node("max").is_none());
    let reload = epilogue.find_node("norm_ws1_load").unwrap();
    let wide = epilogue.find_node("wide").unwrap();
    assert_eq!(epilogue.input_edge(wide, 0).unwrap(), Edge::of(reload));
    let r = epilogue.find_axis("r").unwrap();
    let sub = epilogue.find_node("sub").unwrap();
    assert_eq!(epilogue.node(sub).unwrap().output(0).unwrap().axis(), &[r]);
    assert_eq!(epilogue.node(reload).unwrap().output(0).unwrap().repeats()[0], SizeExpr::one());
    epilogue.validate().unwrap();
}

#[test]
fn nddma_keeps_the_split_preference() {
    let mut g = Graph::new("red");
    let s0 = g.create_size_var("s0");
    let y = g.create_axis("y", SizeExpr::constant(64));
    let r = g.create_axis("r", s0);
    let x = g.data("x", 0, DType::Float32, &[y, r]).unwrap();
    let load = g.load("load", x).unwrap();
    let t = g.transpose("t", load, &[1, 0]).unwrap();
    let reduce = g.reduce("reduce", ReduceOp::Sum, t, &[r]).unwrap();
    let store = g.store("store", reduce).unwrap();
    g.output("out", 0, store).unwrap();

    let options = OptimizerOptions::builder().nddma(NddmaPolicy::Template).build();
    let platform = PlatformConfig::standard();
    let tasks = generate_tasks(&[g], &options, &platform).unwrap();
    assert_eq!(tasks[0].templates, [Template::Plain, Template::Nddma]);
    let outputs = AutoSchedule::new(&tasks[0], &options, &platform).do_auto_schedule().unwrap();

    let nddma: Vec<_> = outputs.iter().filter(|o| o.template == Template::Nddma).map(|o| &o.scheduled).collect();
    let [single, split] = nddma.as_slice() else { panic!("expected two Nddma candidates") };
    assert_eq!((single.schedule_groups.len(), split.schedule_groups.len()), (1, 2));
    assert_ne!(single.score_func, split.score_func);
    assert!(single.score_func.contains("if (gate < 0) { return -1; }"));
    assert!(single.score_func.contains("<= 65536"));
    assert!(split.score_func.contains("> 65536"));
}

#[test]
fn elementwise_task_yields_one_candidate() {
    let options = OptimizerOptions::default();
    let platform = PlatformConfig::standard();
    let (g, _) = elementwise("ew", &[SizeExpr::constant(16)], DType::Float32);
    let tasks = generate_tasks(&[g], &options, &platform).unwrap();
    let outputs = AutoSchedule::new(&tasks[0], &options, &platform).do_auto_schedule().unwrap();

    assert_eq!(outputs.len(), 1);
    let scheduled = &outputs[0].scheduled;
    assert_eq!(scheduled.template, Template::Plain);
    assert_eq!(scheduled.score_func, "return 1;");
    let [group] = scheduled.schedule_groups.as_slice() else { panic!("expected one group") };
    assert_eq!(group.name, "g0_y");
    assert_eq!(group.impl_graphs.len(), 1);
    assert_eq!(group.impl_graphs[0].graph.name(), "ew_result0_g0_y_0");
    assert!(group.score_funcs.is_empty());
}

#[test]
fn symbolic_reduce_offers_both_variants() {
    let options = OptimizerOptions::default();
    let platform = PlatformConfig::standard();
    let (g, _) = reduction("red", None, SizeExpr::symbol("s0"), ReduceOp::Sum);
    let tasks = generate_tasks(&[g], &options, &platform).unwrap();
    let outputs = AutoSchedule::new(&tasks[0], &options, &platform).do_auto_schedule().unwrap();

    assert_eq!(outputs.len(), 2);
    let single = &outputs[0].scheduled;
    assert_eq!(single.schedule_groups.len(), 1);
    assert!(single.score_func.contains("<= 65536"));
    assert!(!single.is_reduce_mem_reuse);

    let split = &outputs[1].scheduled;
    let names: Vec<&str> = split.schedule_groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["g0_br", "g1_r"]);
    assert!(split.score_func.contains("> 65536"));
    assert!(split.is_reduce_mem_reuse);
    assert!(split.var_relations[&1][&0].contains_key("rB_size"));
    assert_eq!(split.schedule_groups[1].impl_graphs[0].graph.name(), "red_result1_g1_r_0");
}
