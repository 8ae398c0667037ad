use proptest::prelude::*;
use tessera_ir::{DType, SizeExpr};

use crate::axis_merge::merge_continuous_axis;
use crate::test::helpers::elementwise;

proptest! {
    #[test]
    fn dense_elementwise_collapses_to_one_axis(extents in prop::collection::vec(1i64..64, 2..=3)) {
        let sizes: Vec<SizeExpr> = extents.iter().map(|e| SizeExpr::constant(*e)).collect();
        let (mut g, _) = elementwise("dense", &sizes, DType::Float16);
        prop_assert!(merge_continuous_axis(&mut g).unwrap());

        let total: i64 = extents.iter().product();
        for node in g.nodes() {
            let tensor = &node.outputs[0];
            prop_assert_eq!(tensor.rank(), 1, "'{}' kept {} axes", node.name, tensor.rank());
            prop_assert_eq!(tensor.repeats()[0].as_const(), Some(total));
            prop_assert!(tensor.is_contiguous());
        }
        g.validate().unwrap();
    }
}
