//! Symbolic encoding of programs and the equivalence oracle.
//!
//! A program is compiled into a conjunction of per-assignment
//! equalities over bit-vector symbols, one symbol per port and
//! temporary. The same encoding serves three entry points: proving two
//! programs equivalent (or extracting a counterexample), executing a
//! program on concrete inputs, and rendering the formula as SMT-LIB
//! text. Every entry point builds a fresh, scoped Z3 context and
//! solver; no formula state survives a call, so independent
//! invocations can run concurrently.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;
use z3::ast::{Ast, Bool, BV};
use z3::{Config, Context, SatResult, Solver};

use crate::env::{self, Env, UnknownPolicy};
use crate::error::InputError;
use crate::ir::{Counterexample, Expr, Program};
use crate::ops;

/// Failure of an equivalence query.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The two programs do not expose the same port signature, so the
    /// question is not well-posed.
    #[error("programs have different port signatures")]
    SignatureMismatch,

    /// The solver answered `unknown`.
    #[error("solver could not decide the query")]
    Undecided,

    /// The model violated an invariant the formula construction
    /// guarantees. This is a bug in the encoder, not a property of the
    /// compared programs.
    #[error("internal encoder invariant violated: {0}")]
    Internal(String),
}

/// Decide whether two programs with identical signatures compute the
/// same outputs on every input. `None` means equivalent; `Some` carries
/// a minimal witness of disagreement.
pub fn equivalent(p1: &Program, p2: &Program) -> Result<Option<Counterexample>, OracleError> {
    if !p1.signature_matches(p2) {
        return Err(OracleError::SignatureMismatch);
    }

    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);

    let left = assert_program(&ctx, &solver, p1, "l!");
    let right = assert_program(&ctx, &solver, p2, "r!");

    let inputs_equal: Vec<Bool> = p1
        .inputs
        .keys()
        .map(|name| left[name]._eq(&right[name]))
        .collect();
    let outputs_differ: Vec<Bool> = p1
        .outputs
        .keys()
        .map(|name| left[name]._eq(&right[name]).not())
        .collect();

    let inputs_equal: Vec<&Bool> = inputs_equal.iter().collect();
    let outputs_differ: Vec<&Bool> = outputs_differ.iter().collect();
    solver.assert(&Bool::and(&ctx, &inputs_equal));
    solver.assert(&Bool::or(&ctx, &outputs_differ));

    log::debug!(
        "equivalence query: {} inputs, {} outputs, {} + {} assignments",
        p1.inputs.len(),
        p1.outputs.len(),
        p1.assignments.len(),
        p2.assignments.len()
    );

    match solver.check() {
        SatResult::Unsat => Ok(None),
        SatResult::Unknown => Err(OracleError::Undecided),
        SatResult::Sat => {
            let model = solver
                .get_model()
                .ok_or_else(|| OracleError::Internal("sat without a model".into()))?;
            extract_counterexample(&model, p1, &left, &right).map(Some)
        }
    }
}

/// Execute a program on a concrete input environment by pinning every
/// input symbol to a constant and reading the outputs off the model.
///
/// The environment is validated strictly before the solver is
/// consulted. For a program that passed the static checker the pinned
/// formula is satisfiable by construction, so an unsatisfiable result
/// here panics rather than surfacing as a user error.
pub fn run(prog: &Program, env: &Env) -> Result<BTreeMap<String, u64>, InputError> {
    let values = env::validate(prog, env, UnknownPolicy::Reject)?;
    Ok(run_validated(prog, &values))
}

/// As [`run`], but with unknown environment names silently dropped.
/// This is the behavior of the protocol's `eval` move.
pub fn run_permissive(prog: &Program, env: &Env) -> Result<BTreeMap<String, u64>, InputError> {
    let values = env::validate(prog, env, UnknownPolicy::Drop)?;
    Ok(run_validated(prog, &values))
}

fn run_validated(prog: &Program, values: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);

    let syms = assert_program(&ctx, &solver, prog, "");
    for port in prog.inputs.values() {
        let pinned = bv_const(&ctx, values[&port.name], port.width);
        solver.assert(&syms[&port.name]._eq(&pinned));
    }

    match solver.check() {
        SatResult::Sat => {}
        other => panic!(
            "input-pinned program has no model ({:?}); encoder invariant violated",
            other
        ),
    }
    let model = solver.get_model().expect("sat query yields a model");

    prog.outputs
        .keys()
        .map(|name| {
            let value = eval_u64(&model, &syms[name])
                .unwrap_or_else(|| panic!("output '{}' not representable in 64 bits", name));
            (name.clone(), value)
        })
        .collect()
}

/// Render a program's formula as SMT-LIB text, one declaration per
/// symbol and one assertion per assignment.
pub fn to_smtlib(prog: &Program) -> String {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let syms = declare_symbols(&ctx, prog, "");

    let mut out = String::new();
    for (name, sym) in &syms {
        let _ = writeln!(out, "(declare-const {} (_ BitVec {}))", name, sym.get_size());
    }
    for asgt in &prog.assignments {
        let term = encode_expr(&ctx, &syms, &asgt.expr);
        let _ = writeln!(out, "(assert {})", syms[&asgt.dest]._eq(&term));
    }
    out
}

/// Allocate one bit-vector symbol per input, output, and temporary,
/// named with the caller's prefix so two programs' symbols stay
/// disjoint.
fn declare_symbols<'ctx>(
    ctx: &'ctx Context,
    prog: &Program,
    prefix: &str,
) -> BTreeMap<String, BV<'ctx>> {
    let mut syms = BTreeMap::new();
    let ports = prog
        .inputs
        .values()
        .chain(prog.outputs.values())
        .cloned()
        .chain(prog.temps().into_values());
    for port in ports {
        let sym = BV::new_const(ctx, format!("{}{}", prefix, port.name), port.width);
        syms.insert(port.name, sym);
    }
    syms
}

/// Encode a program into the solver: declare its symbols and assert
/// one equality per assignment. Returns the symbol table.
fn assert_program<'ctx>(
    ctx: &'ctx Context,
    solver: &Solver<'ctx>,
    prog: &Program,
    prefix: &str,
) -> BTreeMap<String, BV<'ctx>> {
    let syms = declare_symbols(ctx, prog, prefix);
    for asgt in &prog.assignments {
        let term = encode_expr(ctx, &syms, &asgt.expr);
        solver.assert(&syms[&asgt.dest]._eq(&term));
    }
    syms
}

/// Structural recursion over an expression. Assumes the program passed
/// the static checker: every lookup resolves and every call matches
/// its operation's signature.
fn encode_expr<'ctx>(
    ctx: &'ctx Context,
    syms: &BTreeMap<String, BV<'ctx>>,
    expr: &Expr,
) -> BV<'ctx> {
    match expr {
        Expr::Lookup(var) => syms[var].clone(),
        Expr::Literal { width, value, .. } => bv_const(ctx, *value, *width),
        Expr::Call { func, params, args } => {
            let op = ops::lookup(func).expect("checked program references a known operation");
            let args: Vec<BV> = args.iter().map(|a| encode_expr(ctx, syms, a)).collect();
            op.apply(ctx, params, &args)
        }
    }
}

fn bv_const(ctx: &Context, value: u64, width: u32) -> BV<'_> {
    BV::from_u64(ctx, value, width)
}

// The checker caps widths at `check::MAX_WIDTH`, so every value in a
// checked program fits a `u64`; `None` here means an encoder bug.
fn eval_u64(model: &z3::Model, bv: &BV) -> Option<u64> {
    model.eval(bv, true).and_then(|v| v.as_u64())
}

/// Read one self-consistent counterexample off a satisfying model,
/// defensively re-checking the invariants the formula guarantees.
fn extract_counterexample(
    model: &z3::Model,
    prog: &Program,
    left: &BTreeMap<String, BV>,
    right: &BTreeMap<String, BV>,
) -> Result<Counterexample, OracleError> {
    let mut inputs = BTreeMap::new();
    for name in prog.inputs.keys() {
        let l = eval_u64(model, &left[name])
            .ok_or_else(|| OracleError::Internal(format!("input '{}' has no value", name)))?;
        let r = eval_u64(model, &right[name])
            .ok_or_else(|| OracleError::Internal(format!("input '{}' has no value", name)))?;
        if l != r {
            // The formula asserts prefixed input equality, so a
            // disagreement means the construction is broken.
            return Err(OracleError::Internal(format!(
                "input '{}' differs between prefixes ({} vs {})",
                name, l, r
            )));
        }
        inputs.insert(name.clone(), l);
    }

    let mut differing = BTreeMap::new();
    for name in prog.outputs.keys() {
        let l = eval_u64(model, &left[name])
            .ok_or_else(|| OracleError::Internal(format!("output '{}' has no value", name)))?;
        let r = eval_u64(model, &right[name])
            .ok_or_else(|| OracleError::Internal(format!("output '{}' has no value", name)))?;
        if l != r {
            differing.insert(name.clone(), (l, r));
        }
    }
    if differing.is_empty() {
        return Err(OracleError::Internal(
            "satisfying model refutes no output".into(),
        ));
    }

    Ok(Counterexample { inputs, differing })
}
