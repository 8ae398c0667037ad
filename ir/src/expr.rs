//! Symbolic size expressions.
//!
//! A [`SizeExpr`] is an immutable arithmetic value over integer literals and
//! named symbols (the shape variables a graph declares). Expressions are built
//! through smart constructors that keep them in a canonical normal form:
//!
//! - constants are folded and identities (`x + 0`, `x * 1`, `x / 1`) dropped
//! - `+`, `*`, `min` and `max` are flattened and their operands sorted
//! - like terms are collected (`s0 + s0` becomes `2 * s0`, `x - x` becomes `0`)
//! - exact divisions cancel (`(4 * s0) / 2` becomes `2 * s0`, `(s0 * s1) / s1` becomes `s0`)
//!
//! Structural equality of two canonical expressions is therefore the equality
//! the scheduler relies on when it compares strides and extents.
//!
//! Symbols denote non-negative sizes; `x / x` simplifies to `1` under that
//! assumption.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops;
use std::sync::Arc;

/// Immutable, cheaply clonable symbolic integer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeExpr(Arc<ExprKind>);

/// Node of a [`SizeExpr`] tree.
///
/// Variant order is significant: it is the sort order of operands, which puts
/// constants first inside sums and products.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    Const(i64),
    Symbol(Arc<str>),
    Add(Vec<SizeExpr>),
    Mul(Vec<SizeExpr>),
    /// Floor division.
    Div(SizeExpr, SizeExpr),
    CeilDiv(SizeExpr, SizeExpr),
    Min(Vec<SizeExpr>),
    Max(Vec<SizeExpr>),
}

impl SizeExpr {
    fn from_kind(kind: ExprKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn constant(value: i64) -> Self {
        Self::from_kind(ExprKind::Const(value))
    }

    pub fn symbol(name: impl AsRef<str>) -> Self {
        Self::from_kind(ExprKind::Symbol(Arc::from(name.as_ref())))
    }

    pub fn zero() -> Self {
        Self::constant(0)
    }

    pub fn one() -> Self {
        Self::constant(1)
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    pub fn as_const(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0)
    }

    pub fn is_one(&self) -> bool {
        self.as_const() == Some(1)
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    // =========================================================================
    // Smart constructors
    // =========================================================================

    /// Canonical sum of `terms`.
    pub fn sum(terms: impl IntoIterator<Item = SizeExpr>) -> Self {
        let mut constant = 0i64;
        let mut coefficients: BTreeMap<SizeExpr, i64> = BTreeMap::new();
        let mut pending: Vec<SizeExpr> = terms.into_iter().collect();

        while let Some(term) = pending.pop() {
            match term.kind() {
                ExprKind::Const(v) => constant = constant.wrapping_add(*v),
                ExprKind::Add(children) => pending.extend(children.iter().cloned()),
                _ => {
                    let (coefficient, rest) = term.split_coefficient();
                    if let ExprKind::Add(children) = rest.kind() {
                        // c * (a + b) -> c*a + c*b
                        let scaled = children.iter().map(|c| Self::product([Self::constant(coefficient), c.clone()]));
                        pending.extend(scaled);
                    } else {
                        *coefficients.entry(rest).or_insert(0) += coefficient;
                    }
                }
            }
        }

        let mut operands: Vec<SizeExpr> = coefficients
            .into_iter()
            .filter(|(_, coefficient)| *coefficient != 0)
            .map(|(rest, coefficient)| {
                if coefficient == 1 { rest } else { Self::product([Self::constant(coefficient), rest]) }
            })
            .collect();

        if constant != 0 {
            operands.push(Self::constant(constant));
        }
        match operands.len() {
            0 => Self::zero(),
            1 => operands.remove(0),
            _ => {
                operands.sort();
                Self::from_kind(ExprKind::Add(operands))
            }
        }
    }

    /// Canonical product of `factors`.
    pub fn product(factors: impl IntoIterator<Item = SizeExpr>) -> Self {
        let mut constant = 1i64;
        let mut operands = Vec::new();
        let mut pending: Vec<SizeExpr> = factors.into_iter().collect();

        while let Some(factor) = pending.pop() {
            match factor.kind() {
                ExprKind::Const(v) => constant = constant.wrapping_mul(*v),
                ExprKind::Mul(children) => pending.extend(children.iter().cloned()),
                _ => operands.push(factor),
            }
        }

        if constant == 0 {
            return Self::zero();
        }
        if operands.is_empty() {
            return Self::constant(constant);
        }
        operands.sort();
        if constant != 1 {
            operands.insert(0, Self::constant(constant));
        }
        if operands.len() == 1 {
            return operands.remove(0);
        }
        Self::from_kind(ExprKind::Mul(operands))
    }

    pub fn add(lhs: SizeExpr, rhs: SizeExpr) -> Self {
        Self::sum([lhs, rhs])
    }

    pub fn sub(lhs: SizeExpr, rhs: SizeExpr) -> Self {
        Self::sum([lhs, Self::product([Self::constant(-1), rhs])])
    }

    pub fn mul(lhs: SizeExpr, rhs: SizeExpr) -> Self {
        Self::product([lhs, rhs])
    }

    /// Floor division.
    pub fn floor_div(lhs: SizeExpr, rhs: SizeExpr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const())
            && b != 0
        {
            return Self::constant(a.div_euclid(b));
        }
        if let Some(quotient) = Self::exact_div(&lhs, &rhs) {
            return quotient;
        }
        Self::from_kind(ExprKind::Div(lhs, rhs))
    }

    /// Division rounding towards positive infinity.
    pub fn ceil_div(lhs: SizeExpr, rhs: SizeExpr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const())
            && b > 0
        {
            return Self::constant((a + b - 1).div_euclid(b));
        }
        if let Some(quotient) = Self::exact_div(&lhs, &rhs) {
            return quotient;
        }
        Self::from_kind(ExprKind::CeilDiv(lhs, rhs))
    }

    pub fn min(items: impl IntoIterator<Item = SizeExpr>) -> Self {
        Self::extremum(items, true)
    }

    pub fn max(items: impl IntoIterator<Item = SizeExpr>) -> Self {
        Self::extremum(items, false)
    }

    /// Round up to the next multiple of `align`.
    pub fn align_up(&self, align: i64) -> Self {
        if align <= 1 {
            return self.clone();
        }
        let align = Self::constant(align);
        Self::product([Self::ceil_div(self.clone(), align.clone()), align])
    }

    /// Split `c * rest` into `(c, rest)`; expressions without a literal factor
    /// have coefficient one.
    fn split_coefficient(&self) -> (i64, SizeExpr) {
        if let ExprKind::Mul(factors) = self.kind()
            && let Some(coefficient) = factors[0].as_const()
        {
            return (coefficient, Self::product(factors[1..].iter().cloned()));
        }
        (1, self.clone())
    }

    /// Quotient when `lhs` is a known multiple of `rhs`.
    fn exact_div(lhs: &SizeExpr, rhs: &SizeExpr) -> Option<SizeExpr> {
        if rhs.is_one() {
            return Some(lhs.clone());
        }
        if lhs.is_zero() {
            return Some(Self::zero());
        }
        if lhs == rhs && !rhs.is_zero() {
            return Some(Self::one());
        }

        let (coefficient, rest) = lhs.split_coefficient();
        if let Some(divisor) = rhs.as_const() {
            if divisor != 0 && coefficient % divisor == 0 {
                return Some(Self::product([Self::constant(coefficient / divisor), rest]));
            }
            return None;
        }

        // Cancel a symbolic factor: (a * b * c) / b -> a * c
        let factors: Vec<SizeExpr> = match lhs.kind() {
            ExprKind::Mul(factors) => factors.clone(),
            _ => return None,
        };
        let position = factors.iter().position(|f| f == rhs)?;
        Some(Self::product(factors.into_iter().enumerate().filter(|(i, _)| *i != position).map(|(_, f)| f)))
    }

    fn extremum(items: impl IntoIterator<Item = SizeExpr>, is_min: bool) -> Self {
        let mut constant: Option<i64> = None;
        let mut operands = BTreeSet::new();
        let mut pending: Vec<SizeExpr> = items.into_iter().collect();

        while let Some(item) = pending.pop() {
            match (item.kind(), is_min) {
                (ExprKind::Const(v), _) => {
                    constant = Some(match constant {
                        None => *v,
                        Some(c) if is_min => c.min(*v),
                        Some(c) => c.max(*v),
                    });
                }
                (ExprKind::Min(children), true) | (ExprKind::Max(children), false) => {
                    pending.extend(children.iter().cloned())
                }
                _ => {
                    operands.insert(item);
                }
            }
        }

        let mut operands: Vec<SizeExpr> = operands.into_iter().collect();
        if let Some(c) = constant {
            operands.insert(0, Self::constant(c));
        }
        match operands.len() {
            0 => Self::zero(),
            1 => operands.remove(0),
            _ if is_min => Self::from_kind(ExprKind::Min(operands)),
            _ => Self::from_kind(ExprKind::Max(operands)),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Evaluate with the given symbol bindings.
    ///
    /// Returns `None` when a symbol is unbound or a division by zero occurs.
    pub fn eval(&self, bindings: &HashMap<String, i64>) -> Option<i64> {
        match self.kind() {
            ExprKind::Const(v) => Some(*v),
            ExprKind::Symbol(name) => bindings.get(name.as_ref()).copied(),
            ExprKind::Add(terms) => terms.iter().try_fold(0i64, |acc, t| Some(acc.wrapping_add(t.eval(bindings)?))),
            ExprKind::Mul(factors) => {
                factors.iter().try_fold(1i64, |acc, f| Some(acc.wrapping_mul(f.eval(bindings)?)))
            }
            ExprKind::Div(a, b) => {
                let b = b.eval(bindings)?;
                if b == 0 { None } else { Some(a.eval(bindings)?.div_euclid(b)) }
            }
            ExprKind::CeilDiv(a, b) => {
                let b = b.eval(bindings)?;
                if b == 0 { None } else { Some(-((-a.eval(bindings)?).div_euclid(b))) }
            }
            ExprKind::Min(items) => items.iter().map(|i| i.eval(bindings)).collect::<Option<Vec<_>>>()?.into_iter().min(),
            ExprKind::Max(items) => items.iter().map(|i| i.eval(bindings)).collect::<Option<Vec<_>>>()?.into_iter().max(),
        }
    }

    /// Names of all symbols referenced by this expression, sorted.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self.kind() {
            ExprKind::Const(_) => {}
            ExprKind::Symbol(name) => {
                out.insert(name.to_string());
            }
            ExprKind::Add(items) | ExprKind::Mul(items) | ExprKind::Min(items) | ExprKind::Max(items) => {
                items.iter().for_each(|i| i.collect_symbols(out))
            }
            ExprKind::Div(a, b) | ExprKind::CeilDiv(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    /// Replace symbols by expressions, re-simplifying on the way up.
    pub fn substitute(&self, map: &HashMap<String, SizeExpr>) -> SizeExpr {
        match self.kind() {
            ExprKind::Const(_) => self.clone(),
            ExprKind::Symbol(name) => map.get(name.as_ref()).cloned().unwrap_or_else(|| self.clone()),
            ExprKind::Add(items) => Self::sum(items.iter().map(|i| i.substitute(map))),
            ExprKind::Mul(items) => Self::product(items.iter().map(|i| i.substitute(map))),
            ExprKind::Min(items) => Self::min(items.iter().map(|i| i.substitute(map))),
            ExprKind::Max(items) => Self::max(items.iter().map(|i| i.substitute(map))),
            ExprKind::Div(a, b) => Self::floor_div(a.substitute(map), b.substitute(map)),
            ExprKind::CeilDiv(a, b) => Self::ceil_div(a.substitute(map), b.substitute(map)),
        }
    }
}

impl From<i64> for SizeExpr {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

macro_rules! impl_binary_ops {
    ($($trait:ident :: $method:ident => $ctor:ident),+ $(,)?) => {
        $(
            impl ops::$trait for SizeExpr {
                type Output = SizeExpr;

                fn $method(self, rhs: SizeExpr) -> SizeExpr {
                    SizeExpr::$ctor(self, rhs)
                }
            }

            impl ops::$trait<&SizeExpr> for &SizeExpr {
                type Output = SizeExpr;

                fn $method(self, rhs: &SizeExpr) -> SizeExpr {
                    SizeExpr::$ctor(self.clone(), rhs.clone())
                }
            }
        )+
    };
}

impl_binary_ops! {
    Add::add => add,
    Sub::sub => sub,
    Mul::mul => mul,
    Div::div => floor_div,
}

// =========================================================================
// Rendering
// =========================================================================

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Const(v) => write!(f, "{v}"),
            ExprKind::Symbol(name) => f.write_str(name),
            ExprKind::Add(terms) => {
                // Constants sort first; print them last so sums read as `s0 + 1`.
                let (constants, others): (Vec<_>, Vec<_>) = terms.iter().partition(|t| t.is_const());
                f.write_str("(")?;
                for (i, term) in others.iter().chain(constants.iter()).enumerate() {
                    if i == 0 {
                        write!(f, "{term}")?;
                        continue;
                    }
                    if let Some(c) = term.as_const() {
                        if c < 0 { write!(f, " - {}", -c)? } else { write!(f, " + {c}")? }
                        continue;
                    }
                    match term.split_coefficient() {
                        (-1, rest) => write!(f, " - {rest}")?,
                        (c, rest) if c < 0 => write!(f, " - {}", Self::product([Self::constant(-c), rest]))?,
                        _ => write!(f, " + {term}")?,
                    }
                }
                f.write_str(")")
            }
            ExprKind::Mul(factors) => {
                f.write_str("(")?;
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" * ")?;
                    }
                    write!(f, "{factor}")?;
                }
                f.write_str(")")
            }
            ExprKind::Div(a, b) => write!(f, "({a} / {b})"),
            ExprKind::CeilDiv(a, b) => write!(f, "CeilDiv({a}, {b})"),
            ExprKind::Min(items) => render_nested(f, "Min", items),
            ExprKind::Max(items) => render_nested(f, "Max", items),
        }
    }
}

/// Render a variadic extremum as nested two-argument calls.
fn render_nested(f: &mut fmt::Formatter<'_>, name: &str, items: &[SizeExpr]) -> fmt::Result {
    match items {
        [] => f.write_str("0"),
        [single] => write!(f, "{single}"),
        [first, rest @ ..] => {
            write!(f, "{name}({first}, ")?;
            render_nested(f, name, rest)?;
            f.write_str(")")
        }
    }
}

impl fmt::Debug for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
