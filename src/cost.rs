//! Cost estimation for programs.
//!
//! The score of a program is the sum of the cost rule of every
//! operation call it contains, applied to the call's compile-time
//! parameters. Lookups and literals are free. Scores only order
//! programs; ties are a protocol policy concern, not an estimator one.

use crate::ir::{Expr, Program};
use crate::ops;

/// Score a program. Calls naming unknown functions contribute nothing;
/// the static checker is the place where they are rejected.
pub fn score(prog: &Program) -> u64 {
    prog.assignments
        .iter()
        .map(|asgt| score_expr(&asgt.expr))
        .sum()
}

fn score_expr(expr: &Expr) -> u64 {
    match expr {
        Expr::Lookup(_) | Expr::Literal { .. } => 0,
        Expr::Call { func, params, args } => {
            let own = ops::lookup(func).map(|op| op.cost(params)).unwrap_or(0);
            own + args.iter().map(score_expr).sum::<u64>()
        }
    }
}
