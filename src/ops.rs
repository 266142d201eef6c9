//! The operation library: the fixed catalog of parametric operations.
//!
//! Every operation carries three rules keyed on its compile-time
//! integer parameters: a signature rule giving the expected input
//! widths and the output width, a cost rule giving a scalar price, and
//! a semantics rule building the Z3 term for a call. The catalog is
//! built once behind a `OnceLock` and never changes during a run.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use z3::ast::{Ast, BV};
use z3::Context;

/// Input widths and output width computed from a call's parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub inputs: Vec<u32>,
    pub output: u32,
}

pub type SignatureFn = fn(&[u32]) -> Result<Signature, String>;
pub type CostFn = fn(&[u32]) -> u64;
pub type SemanticsFn = for<'ctx> fn(&'ctx Context, &[u32], &[BV<'ctx>]) -> BV<'ctx>;

/// One entry in the operation library.
pub struct OpDef {
    pub name: &'static str,
    pub param_count: usize,
    signature: SignatureFn,
    cost: CostFn,
    semantics: SemanticsFn,
}

impl OpDef {
    /// Apply the signature rule. `Err` carries a description of why the
    /// parameters are rejected; the checker wraps it into a
    /// `CheckError`. Callers must supply exactly `param_count`
    /// parameters.
    pub fn signature(&self, params: &[u32]) -> Result<Signature, String> {
        (self.signature)(params)
    }

    /// Apply the cost rule.
    pub fn cost(&self, params: &[u32]) -> u64 {
        (self.cost)(params)
    }

    /// Apply the semantics rule to already-encoded argument terms.
    /// Callers must have validated the call against the signature rule;
    /// the argument count and widths are trusted here.
    pub fn apply<'ctx>(&self, ctx: &'ctx Context, params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
        (self.semantics)(ctx, params, args)
    }
}

/// Look up an operation by name.
pub fn lookup(name: &str) -> Option<&'static OpDef> {
    table().get(name)
}

/// All operations, in name order. Used to describe the language to the
/// agent.
pub fn all() -> impl Iterator<Item = &'static OpDef> {
    table().values()
}

fn table() -> &'static BTreeMap<&'static str, OpDef> {
    static TABLE: OnceLock<BTreeMap<&'static str, OpDef>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn build_table() -> BTreeMap<&'static str, OpDef> {
    let defs = [
        op("add", 1, sig_binary, cost_linear, sem_add),
        op("sub", 1, sig_binary, cost_linear, sem_sub),
        op("mul", 1, sig_binary, cost_quadratic, sem_mul),
        op("div", 1, sig_binary, cost_division, sem_div),
        op("mod", 1, sig_binary, cost_division, sem_mod),
        op("gt", 1, sig_compare, cost_linear, sem_gt),
        op("lt", 1, sig_compare, cost_linear, sem_lt),
        op("if", 1, sig_select, cost_linear, sem_if),
        op("and", 1, sig_binary, cost_linear, sem_and),
        op("or", 1, sig_binary, cost_linear, sem_or),
        op("xor", 1, sig_binary, cost_linear, sem_xor),
        op("shl", 1, sig_binary, cost_linear, sem_shl),
        op("shr", 1, sig_binary, cost_linear, sem_shr),
        op("ashr", 1, sig_binary, cost_linear, sem_ashr),
        op("sext", 2, sig_extend, cost_wiring, sem_sext),
        op("zext", 2, sig_extend, cost_wiring, sem_zext),
        op("slice", 3, sig_slice, cost_wiring, sem_slice),
    ];
    defs.into_iter().map(|def| (def.name, def)).collect()
}

fn op(
    name: &'static str,
    param_count: usize,
    signature: SignatureFn,
    cost: CostFn,
    semantics: SemanticsFn,
) -> OpDef {
    OpDef {
        name,
        param_count,
        signature,
        cost,
        semantics,
    }
}

// Signature rules.

fn width_param(params: &[u32]) -> Result<u32, String> {
    match params.first() {
        Some(0) => Err("width must be positive".into()),
        Some(n) => Ok(*n),
        None => Err("missing width parameter".into()),
    }
}

fn sig_binary(params: &[u32]) -> Result<Signature, String> {
    let n = width_param(params)?;
    Ok(Signature {
        inputs: vec![n, n],
        output: n,
    })
}

fn sig_compare(params: &[u32]) -> Result<Signature, String> {
    let n = width_param(params)?;
    Ok(Signature {
        inputs: vec![n, n],
        output: 1,
    })
}

fn sig_select(params: &[u32]) -> Result<Signature, String> {
    let n = width_param(params)?;
    Ok(Signature {
        inputs: vec![1, n, n],
        output: n,
    })
}

fn sig_extend(params: &[u32]) -> Result<Signature, String> {
    let (from, to) = (params[0], params[1]);
    if from == 0 {
        return Err("input width must be positive".into());
    }
    if to < from {
        return Err(format!("cannot extend from {} bits down to {}", from, to));
    }
    Ok(Signature {
        inputs: vec![from],
        output: to,
    })
}

fn sig_slice(params: &[u32]) -> Result<Signature, String> {
    let (from, lo, hi) = (params[0], params[1], params[2]);
    if from == 0 {
        return Err("input width must be positive".into());
    }
    if lo > hi {
        return Err(format!("empty bit range {}..{}", lo, hi));
    }
    if hi >= from {
        return Err(format!("bit {} out of range for width {}", hi, from));
    }
    Ok(Signature {
        inputs: vec![from],
        output: hi - lo + 1,
    })
}

// Cost rules. Scaled with width so that wider datapaths price higher;
// multiplication and division dominate, bit rewiring is free.

fn cost_linear(params: &[u32]) -> u64 {
    params.first().copied().unwrap_or(0) as u64
}

fn cost_quadratic(params: &[u32]) -> u64 {
    let n = params.first().copied().unwrap_or(0) as u64;
    n * n
}

fn cost_division(params: &[u32]) -> u64 {
    let n = params.first().copied().unwrap_or(0) as u64;
    3 * n * n
}

fn cost_wiring(_params: &[u32]) -> u64 {
    0
}

// Semantics rules. All arithmetic is unsigned and wraps at the
// operation width, matching Z3's fixed-width bit-vector theory.

fn bit<'ctx>(ctx: &'ctx Context, cond: z3::ast::Bool<'ctx>) -> BV<'ctx> {
    cond.ite(&BV::from_u64(ctx, 1, 1), &BV::from_u64(ctx, 0, 1))
}

fn sem_add<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvadd(&args[1])
}

fn sem_sub<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvsub(&args[1])
}

fn sem_mul<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvmul(&args[1])
}

fn sem_div<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvudiv(&args[1])
}

fn sem_mod<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvurem(&args[1])
}

fn sem_gt<'ctx>(ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    bit(ctx, args[0].bvugt(&args[1]))
}

fn sem_lt<'ctx>(ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    bit(ctx, args[0].bvult(&args[1]))
}

fn sem_if<'ctx>(ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0]
        ._eq(&BV::from_u64(ctx, 1, 1))
        .ite(&args[1], &args[2])
}

fn sem_and<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvand(&args[1])
}

fn sem_or<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvor(&args[1])
}

fn sem_xor<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvxor(&args[1])
}

fn sem_shl<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvshl(&args[1])
}

fn sem_shr<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvlshr(&args[1])
}

fn sem_ashr<'ctx>(_ctx: &'ctx Context, _params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].bvashr(&args[1])
}

fn sem_sext<'ctx>(_ctx: &'ctx Context, params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].sign_ext(params[1] - params[0])
}

fn sem_zext<'ctx>(_ctx: &'ctx Context, params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].zero_ext(params[1] - params[0])
}

fn sem_slice<'ctx>(_ctx: &'ctx Context, params: &[u32], args: &[BV<'ctx>]) -> BV<'ctx> {
    args[0].extract(params[2], params[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_signature_tracks_width() {
        let add = lookup("add").expect("add is in the library");
        let sig = add.signature(&[8]).expect("valid params");
        assert_eq!(sig.inputs, vec![8, 8]);
        assert_eq!(sig.output, 8);
    }

    #[test]
    fn compare_yields_one_bit() {
        let gt = lookup("gt").expect("gt is in the library");
        let sig = gt.signature(&[16]).expect("valid params");
        assert_eq!(sig.output, 1);
    }

    #[test]
    fn select_takes_one_bit_condition() {
        let sel = lookup("if").expect("if is in the library");
        let sig = sel.signature(&[8]).expect("valid params");
        assert_eq!(sig.inputs, vec![1, 8, 8]);
    }

    #[test]
    fn slice_bounds_are_checked() {
        let slice = lookup("slice").expect("slice is in the library");
        assert!(slice.signature(&[8, 0, 8]).is_err());
        assert!(slice.signature(&[8, 4, 3]).is_err());
        let sig = slice.signature(&[8, 0, 3]).expect("valid params");
        assert_eq!(sig.inputs, vec![8]);
        assert_eq!(sig.output, 4);
    }

    #[test]
    fn extension_cannot_shrink() {
        let zext = lookup("zext").expect("zext is in the library");
        assert!(zext.signature(&[8, 4]).is_err());
        let sig = zext.signature(&[4, 8]).expect("valid params");
        assert_eq!(sig.output, 8);
    }

    #[test]
    fn zero_width_rejected() {
        let add = lookup("add").expect("add is in the library");
        assert!(add.signature(&[0]).is_err());
    }

    #[test]
    fn division_outprices_addition() {
        let add = lookup("add").expect("add");
        let div = lookup("div").expect("div");
        assert!(div.cost(&[8]) > add.cost(&[8]));
    }

    #[test]
    fn wiring_is_free() {
        let slice = lookup("slice").expect("slice");
        assert_eq!(slice.cost(&[8, 0, 3]), 0);
    }
}
