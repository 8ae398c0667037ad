use crate::graph::Graph;
use crate::node::Edge;
use crate::op::{BinaryOp, MatMulKind, ReduceOp};
use crate::{DType, Error, SizeExpr};

fn c(v: i64) -> SizeExpr {
    SizeExpr::constant(v)
}

#[test]
fn load_keeps_source_view() {
    let mut g = Graph::new("g");
    let s0 = g.create_size_var("s0");
    let z0 = g.create_axis("z0", s0.clone());
    let z1 = g.create_axis("z1", c(8));
    let x = g.data("x", 0, DType::Float16, &[z0, z1]).unwrap();
    let load = g.load("load", x).unwrap();
    let tensor = g.tensor(Edge::of(load)).unwrap();
    assert_eq!(tensor.axis(), &[z0, z1]);
    assert_eq!(tensor.repeats(), &[s0, c(8)]);
    assert_eq!(tensor.strides(), &[c(8), c(1)]);
}

#[test]
fn comparison_produces_bool() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(8));
    let x = g.data("x", 0, DType::Float32, &[z0]).unwrap();
    let y = g.data("y", 1, DType::Float32, &[z0]).unwrap();
    let lt = g.binary("lt", BinaryOp::Lt, x, y).unwrap();
    assert_eq!(g.tensor(Edge::of(lt)).unwrap().dtype, DType::Bool);
}

#[test]
fn scalar_broadcasts_through_binary() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(8));
    let z1 = g.create_axis("z1", c(4));
    let x = g.data("x", 0, DType::Float32, &[z0, z1]).unwrap();
    let k = g.scalar("k", "2.0", DType::Float32, &[z0, z1]).unwrap();
    let mul = g.binary("mul", BinaryOp::Mul, x, k).unwrap();
    let out = g.tensor(Edge::of(mul)).unwrap();
    assert_eq!(out.repeats(), &[c(8), c(4)]);
    assert_eq!(out.strides(), &[c(4), c(1)]);

    let scalar = g.tensor(Edge::of(k)).unwrap();
    assert!(scalar.is_degenerate());
    assert_eq!(scalar.strides(), &[c(0), c(0)]);
}

#[test]
fn mismatched_axes_are_rejected() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(8));
    let z1 = g.create_axis("z1", c(8));
    let x = g.data("x", 0, DType::Float32, &[z0]).unwrap();
    let y = g.data("y", 1, DType::Float32, &[z1]).unwrap();
    assert!(matches!(g.binary("add", BinaryOp::Add, x, y), Err(Error::AxisMismatch { .. })));
}

#[test]
fn reduce_keeps_axis_with_unit_extent() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(8));
    let z1 = g.create_axis("z1", c(64));
    let x = g.data("x", 0, DType::Float32, &[z0, z1]).unwrap();
    let sum = g.reduce("sum", ReduceOp::Sum, x, &[z1]).unwrap();
    let out = g.tensor(Edge::of(sum)).unwrap();
    assert_eq!(out.axis(), &[z0, z1]);
    assert_eq!(out.repeats(), &[c(8), c(1)]);
    assert_eq!(out.strides(), &[c(1), c(0)]);

    let z2 = g.create_axis("z2", c(2));
    assert!(matches!(g.reduce("bad", ReduceOp::Sum, x, &[z2]), Err(Error::AxisNotInTensor { .. })));
}

#[test]
fn transpose_permutes_view() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(2));
    let z1 = g.create_axis("z1", c(3));
    let x = g.data("x", 0, DType::Float32, &[z0, z1]).unwrap();
    let t = g.transpose("t", x, &[1, 0]).unwrap();
    let out = g.tensor(Edge::of(t)).unwrap();
    assert_eq!(out.axis(), &[z1, z0]);
    assert_eq!(out.strides(), &[c(2), c(1)]);
    assert!(matches!(g.transpose("bad", x, &[0, 0]), Err(Error::InvalidPermutation { .. })));
}

#[test]
fn concat_sums_extents() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(4));
    let z1 = g.create_axis("z1", c(16));
    let a = g.data("a", 0, DType::Float16, &[z0, z1]).unwrap();
    let b = g.data("b", 1, DType::Float16, &[z0, z1]).unwrap();
    let cat = g.concat("cat", &[Edge::of(a), Edge::of(b)], z1).unwrap();
    assert_eq!(g.tensor(Edge::of(cat)).unwrap().repeats(), &[c(4), c(32)]);
    assert!(matches!(g.concat("empty", &[], z1), Err(Error::InputCount { actual: 0, .. })));
}

#[test]
fn split_has_one_output_per_piece() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(12));
    let x = g.data("x", 0, DType::Float32, &[z0]).unwrap();
    let split = g.split("split", x, z0, &[c(4), c(8)]).unwrap();
    assert_eq!(g.node(split).unwrap().outputs.len(), 2);
    assert_eq!(g.tensor(Edge::new(split, 1)).unwrap().repeats(), &[c(8)]);
}

#[test]
fn gather_replaces_axis_with_index_axes() {
    let mut g = Graph::new("g");
    let z0 = g.create_axis("z0", c(100));
    let z1 = g.create_axis("z1", c(32));
    let z2 = g.create_axis("z2", c(7));
    let params = g.data("params", 0, DType::Float32, &[z0, z1]).unwrap();
    let indices = g.data("indices", 1, DType::Int32, &[z2]).unwrap();
    let gather = g.gather("gather", params, indices, z0).unwrap();
    let out = g.tensor(Edge::of(gather)).unwrap();
    assert_eq!(out.axis(), &[z2, z1]);
    assert_eq!(out.dtype, DType::Float32);
}

#[test]
fn matmul_bias_requires_bias() {
    let mut g = Graph::new("g");
    let m = g.create_axis("m", c(16));
    let k = g.create_axis("k", c(32));
    let n = g.create_axis("n", c(8));
    let a = g.data("a", 0, DType::Float16, &[m, k]).unwrap();
    let b = g.data("b", 1, DType::Float16, &[k, n]).unwrap();
    let mm = g.matmul("mm", MatMulKind::MatMul, a, b, None).unwrap();
    assert_eq!(g.tensor(Edge::of(mm)).unwrap().axis(), &[m, n]);
    assert!(matches!(g.matmul("bad", MatMulKind::MatMulBias, a, b, None), Err(Error::InputCount { .. })));
}
