use proptest::prelude::*;
use tessera_ir::Position;

use crate::alloc::liveness::{Interval, ReuseRequest, color};

fn arb_request(key: u32) -> impl Strategy<Value = ReuseRequest<u32>> {
    (0usize..20, 0usize..6, prop::sample::select(vec![Position::VecCalc, Position::VecIn]), prop::bool::weighted(0.2))
        .prop_map(move |(start, len, position, exclusive)| ReuseRequest {
            key,
            position,
            interval: Interval { start, end: start + len },
            exclusive,
        })
}

fn arb_requests() -> impl Strategy<Value = Vec<ReuseRequest<u32>>> {
    (1u32..24).prop_flat_map(|n| (0..n).map(arb_request).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn shared_colors_never_overlap(requests in arb_requests()) {
        let colors = color(&requests, 0);
        prop_assert_eq!(colors.len(), requests.len());
        for (i, a) in requests.iter().enumerate() {
            for b in &requests[i + 1..] {
                if colors[&a.key] != colors[&b.key] {
                    continue;
                }
                prop_assert_eq!(a.position, b.position);
                prop_assert!(!a.interval.overlaps(&b.interval), "{:?} and {:?} share a color", a, b);
                prop_assert!(!a.exclusive && !b.exclusive);
            }
        }
    }
}
