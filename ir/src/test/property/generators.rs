//! Generators for property-based testing.

use std::collections::HashMap;

use proptest::prelude::*;

use crate::expr::SizeExpr;

/// Symbols the generated expressions draw from.
pub const SYMBOLS: [&str; 3] = ["s0", "s1", "s2"];

/// Unsimplified arithmetic tree, evaluated directly as a reference.
#[derive(Debug, Clone)]
pub enum RawExpr {
    Const(i64),
    Symbol(usize),
    Add(Box<RawExpr>, Box<RawExpr>),
    Sub(Box<RawExpr>, Box<RawExpr>),
    Mul(Box<RawExpr>, Box<RawExpr>),
    FloorDiv(Box<RawExpr>, i64),
    CeilDiv(Box<RawExpr>, i64),
    Min(Box<RawExpr>, Box<RawExpr>),
    Max(Box<RawExpr>, Box<RawExpr>),
}

impl RawExpr {
    pub fn eval(&self, values: &[i64; 3]) -> i64 {
        match self {
            Self::Const(v) => *v,
            Self::Symbol(i) => values[*i],
            Self::Add(a, b) => a.eval(values) + b.eval(values),
            Self::Sub(a, b) => a.eval(values) - b.eval(values),
            Self::Mul(a, b) => a.eval(values) * b.eval(values),
            Self::FloorDiv(a, d) => a.eval(values).div_euclid(*d),
            Self::CeilDiv(a, d) => -((-a.eval(values)).div_euclid(*d)),
            Self::Min(a, b) => a.eval(values).min(b.eval(values)),
            Self::Max(a, b) => a.eval(values).max(b.eval(values)),
        }
    }

    /// Build through the simplifying constructors.
    pub fn build(&self) -> SizeExpr {
        match self {
            Self::Const(v) => SizeExpr::constant(*v),
            Self::Symbol(i) => SizeExpr::symbol(SYMBOLS[*i]),
            Self::Add(a, b) => SizeExpr::add(a.build(), b.build()),
            Self::Sub(a, b) => SizeExpr::sub(a.build(), b.build()),
            Self::Mul(a, b) => SizeExpr::mul(a.build(), b.build()),
            Self::FloorDiv(a, d) => SizeExpr::floor_div(a.build(), SizeExpr::constant(*d)),
            Self::CeilDiv(a, d) => SizeExpr::ceil_div(a.build(), SizeExpr::constant(*d)),
            Self::Min(a, b) => SizeExpr::min([a.build(), b.build()]),
            Self::Max(a, b) => SizeExpr::max([a.build(), b.build()]),
        }
    }
}

/// Small expression trees; divisors are positive literals.
pub fn arb_raw_expr() -> impl Strategy<Value = RawExpr> {
    let leaf = prop_oneof![(-8i64..=8).prop_map(RawExpr::Const), (0usize..SYMBOLS.len()).prop_map(RawExpr::Symbol),];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| RawExpr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| RawExpr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| RawExpr::Mul(Box::new(a), Box::new(b))),
            (inner.clone(), 1i64..=6).prop_map(|(a, d)| RawExpr::FloorDiv(Box::new(a), d)),
            (inner.clone(), 1i64..=6).prop_map(|(a, d)| RawExpr::CeilDiv(Box::new(a), d)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| RawExpr::Min(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| RawExpr::Max(Box::new(a), Box::new(b))),
        ]
    })
}

/// Positive symbol values.
pub fn arb_symbol_values() -> impl Strategy<Value = [i64; 3]> {
    [1i64..=16, 1i64..=16, 1i64..=16]
}

pub fn bindings(values: &[i64; 3]) -> HashMap<String, i64> {
    SYMBOLS.iter().zip(values).map(|(name, value)| (name.to_string(), *value)).collect()
}
