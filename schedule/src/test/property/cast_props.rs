use proptest::prelude::*;
use tessera_ir::{DType, Edge, Graph, OpKind, SizeExpr};

use crate::config::{OptimizerOptions, PlatformConfig};
use crate::passes::run_passes;

fn arb_dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(vec![DType::Float16, DType::Float32, DType::Int32, DType::Int16])
}

/// `x(from) -> load -> cast* -> store -> out`, one cast per entry of `chain`.
fn cast_chain(from: DType, chain: &[DType]) -> Graph {
    let mut g = Graph::new("casts");
    let z = g.create_axis("z", SizeExpr::constant(64));
    let x = g.data("x", 0, from, &[z]).unwrap();
    let mut last = g.load("load", x).unwrap();
    for (i, dtype) in chain.iter().enumerate() {
        last = g.cast(&format!("cast{i}"), last, *dtype).unwrap();
    }
    let store = g.store("store", last).unwrap();
    g.output("out", 0, store).unwrap();
    g
}

fn store_input_dtype(g: &Graph) -> DType {
    let store = g.find_node("store").unwrap();
    g.input_tensor(store, 0).unwrap().dtype
}

proptest! {
    #[test]
    fn passes_settle_in_one_run(from in arb_dtype(), chain in prop::collection::vec(arb_dtype(), 1..4)) {
        let platform = PlatformConfig::standard();
        let options = OptimizerOptions::default();
        let mut g = cast_chain(from, &chain);
        let target = store_input_dtype(&g);
        prop_assume!(run_passes(&mut g, &platform, &options).is_ok());

        for node in g.nodes().filter(|n| matches!(n.kind, OpKind::Cast)) {
            let input = g.input_tensor(node.id, 0).unwrap().dtype;
            let output = g.tensor(Edge::of(node.id)).unwrap().dtype;
            prop_assert_ne!(input, output, "identity cast '{}' survived", node.name);
        }
        prop_assert_eq!(store_input_dtype(&g), target);

        let once = g.clone();
        run_passes(&mut g, &platform, &options).unwrap();
        prop_assert_eq!(g, once);
    }
}
