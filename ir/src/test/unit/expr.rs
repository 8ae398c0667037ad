use std::collections::HashMap;

use test_case::test_case;

use crate::expr::{ExprKind, SizeExpr};

fn s(name: &str) -> SizeExpr {
    SizeExpr::symbol(name)
}

fn c(value: i64) -> SizeExpr {
    SizeExpr::constant(value)
}

#[test]
fn constants_fold() {
    assert_eq!(SizeExpr::add(c(2), c(3)), c(5));
    assert_eq!(SizeExpr::mul(c(4), c(3)), c(12));
    assert_eq!(SizeExpr::floor_div(c(7), c(2)), c(3));
    assert_eq!(SizeExpr::ceil_div(c(7), c(2)), c(4));
    assert_eq!(SizeExpr::min([c(7), c(2), c(5)]), c(2));
    assert_eq!(SizeExpr::max([c(7), c(2), c(5)]), c(7));
}

#[test]
fn identities_are_dropped() {
    assert_eq!(SizeExpr::add(s("s0"), c(0)), s("s0"));
    assert_eq!(SizeExpr::mul(s("s0"), c(1)), s("s0"));
    assert_eq!(SizeExpr::mul(s("s0"), c(0)), c(0));
    assert_eq!(SizeExpr::floor_div(s("s0"), c(1)), s("s0"));
    assert_eq!(SizeExpr::floor_div(s("s0"), s("s0")), c(1));
}

#[test]
fn like_terms_collect() {
    let doubled = SizeExpr::add(s("s0"), s("s0"));
    assert_eq!(doubled, SizeExpr::mul(c(2), s("s0")));
    assert!(SizeExpr::sub(s("s0"), s("s0")).is_zero());

    let sum = SizeExpr::add(s("s0"), s("s1"));
    assert!(SizeExpr::sub(sum.clone(), sum).is_zero());
}

#[test]
fn operand_order_is_canonical() {
    assert_eq!(SizeExpr::add(s("s1"), s("s0")), SizeExpr::add(s("s0"), s("s1")));
    assert_eq!(SizeExpr::mul(s("s1"), s("s0")), SizeExpr::mul(s("s0"), s("s1")));
    assert_eq!(SizeExpr::max([s("s1"), s("s0")]), SizeExpr::max([s("s0"), s("s1")]));
}

#[test]
fn exact_division_cancels() {
    let four_s0 = SizeExpr::mul(c(4), s("s0"));
    assert_eq!(SizeExpr::floor_div(four_s0.clone(), c(2)), SizeExpr::mul(c(2), s("s0")));
    assert_eq!(SizeExpr::ceil_div(four_s0, c(4)), s("s0"));

    let product = SizeExpr::mul(s("s0"), s("s1"));
    assert_eq!(SizeExpr::floor_div(product, s("s1")), s("s0"));
}

#[test]
fn inexact_division_stays_symbolic() {
    let div = SizeExpr::floor_div(s("s0"), c(3));
    assert!(matches!(div.kind(), ExprKind::Div(..)));
    let ceil = SizeExpr::ceil_div(s("s0"), c(3));
    assert!(matches!(ceil.kind(), ExprKind::CeilDiv(..)));
}

#[test_case(SizeExpr::add(SizeExpr::symbol("s0"), SizeExpr::constant(1)), "(s0 + 1)" ; "sum prints constant last")]
#[test_case(SizeExpr::sub(SizeExpr::symbol("s0"), SizeExpr::constant(3)), "(s0 - 3)" ; "negative constant")]
#[test_case(SizeExpr::sub(SizeExpr::symbol("s0"), SizeExpr::symbol("s1")), "(s0 - s1)" ; "negative term")]
#[test_case(SizeExpr::mul(SizeExpr::constant(2), SizeExpr::symbol("s0")), "(2 * s0)" ; "product")]
#[test_case(SizeExpr::floor_div(SizeExpr::symbol("s0"), SizeExpr::constant(3)), "(s0 / 3)" ; "floor division")]
#[test_case(SizeExpr::ceil_div(SizeExpr::symbol("s0"), SizeExpr::constant(3)), "CeilDiv(s0, 3)" ; "ceil division")]
#[test_case(
    SizeExpr::max([SizeExpr::symbol("s0"), SizeExpr::symbol("s1"), SizeExpr::constant(4)]),
    "Max(4, Max(s0, s1))" ;
    "nested max"
)]
fn display(expr: SizeExpr, expected: &str) {
    assert_eq!(expr.to_string(), expected);
}

#[test]
fn align_up_rounds_to_multiple() {
    assert_eq!(c(33).align_up(32), c(64));
    assert_eq!(c(64).align_up(32), c(64));
    assert_eq!(c(0).align_up(32), c(0));
    assert_eq!(SizeExpr::mul(c(32), s("s0")).align_up(32), SizeExpr::mul(c(32), s("s0")));

    let aligned = s("s0").align_up(32);
    let env = HashMap::from([("s0".to_string(), 33)]);
    assert_eq!(aligned.eval(&env), Some(64));
}

#[test]
fn eval_reports_unbound_symbols() {
    let expr = SizeExpr::add(s("s0"), s("s1"));
    let env = HashMap::from([("s0".to_string(), 3)]);
    assert_eq!(expr.eval(&env), None);
    assert_eq!(expr.symbols().into_iter().collect::<Vec<_>>(), vec!["s0".to_string(), "s1".to_string()]);
}

#[test]
fn substitute_resimplifies() {
    let expr = SizeExpr::mul(s("s0"), s("s1"));
    let map = HashMap::from([("s1".to_string(), c(0))]);
    assert!(expr.substitute(&map).is_zero());
}

#[test]
fn operators_match_constructors() {
    let (a, b) = (s("s0"), s("s1"));
    assert_eq!(&a + &b, SizeExpr::add(a.clone(), b.clone()));
    assert_eq!(&a - &b, SizeExpr::sub(a.clone(), b.clone()));
    assert_eq!(&a * &b, SizeExpr::mul(a.clone(), b.clone()));
    assert_eq!(a.clone() / b.clone(), SizeExpr::floor_div(a, b));
}
