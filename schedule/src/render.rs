//! Helpers for the C++ snippets handed to code generation.

use std::collections::HashMap;

use tessera_ir::SizeExpr;

/// Name of the tiling-data struct parameter in generated functions.
pub const TILING_DATA: &str = "t";

/// `expr` with every symbol read from the tiling-data struct (`s0` -> `t.s0`).
pub fn tiling_data_expr(expr: &SizeExpr) -> String {
    let fields: HashMap<String, SizeExpr> =
        expr.symbols().into_iter().map(|s| (s.clone(), SizeExpr::symbol(format!("{TILING_DATA}.{s}")))).collect();
    expr.substitute(&fields).to_string()
}
