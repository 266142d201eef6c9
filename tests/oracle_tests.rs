//! Tests driving the equivalence oracle and concrete execution
//! end to end through Z3.

use bvopt::error::InputError;
use bvopt::{check, env, equivalent, parse, smt};

fn fixture(source: &str) -> bvopt::Program {
    let prog = parse(source).expect("fixture parses");
    check(&prog).expect("fixture checks");
    prog
}

#[test]
fn a_program_is_equivalent_to_itself() {
    let prog = fixture("in x: 8; in y: 8; out z: 8; z = add[8](x, y);");
    let verdict = equivalent(&prog, &prog).expect("oracle decides");
    assert!(verdict.is_none());
}

#[test]
fn addition_commutes() {
    let a = fixture("in x: 8; in y: 8; out z: 8; z = add[8](x, y);");
    let b = fixture("in x: 8; in y: 8; out z: 8; z = add[8](y, x);");
    assert!(equivalent(&a, &b).expect("oracle decides").is_none());
}

#[test]
fn temporaries_do_not_affect_equivalence() {
    let flat = fixture("in x: 8; out z: 8; z = xor[8](x, x);");
    let temped = fixture("in x: 8; out z: 8; t: 8 = x; z = xor[8](t, x);");
    assert!(equivalent(&flat, &temped).expect("oracle decides").is_none());
}

#[test]
fn add_and_sub_differ_with_a_witness() {
    let a = fixture("in x: 8; in y: 8; out z: 8; z = add[8](x, y);");
    let b = fixture("in x: 8; in y: 8; out z: 8; z = sub[8](x, y);");
    let cex = equivalent(&a, &b)
        .expect("oracle decides")
        .expect("programs differ");

    // The witness binds every input once and refutes at least one
    // output under it.
    assert_eq!(cex.inputs.len(), 2);
    assert!(!cex.differing.is_empty());
    let (ours, theirs) = cex.differing["z"];
    let x = cex.inputs["x"];
    let y = cex.inputs["y"];
    assert_eq!(ours, x.wrapping_add(y) & 0xFF);
    assert_eq!(theirs, x.wrapping_sub(y) & 0xFF);
}

#[test]
fn constant_programs_need_no_witness_inputs() {
    let a = fixture("out z: 8; z = 8d1;");
    let b = fixture("out z: 8; z = 8d2;");
    let cex = equivalent(&a, &b)
        .expect("oracle decides")
        .expect("constants differ");
    assert!(cex.inputs.is_empty());
    assert_eq!(cex.differing["z"], (1, 2));
    assert_eq!(cex.to_string(), "the outputs always differ: z = 1 vs 2;");
}

#[test]
fn different_signatures_are_not_comparable() {
    let a = fixture("in x: 8; out z: 8; z = x;");
    let b = fixture("in x: 4; out z: 4; z = x;");
    assert!(matches!(
        equivalent(&a, &b),
        Err(smt::OracleError::SignatureMismatch)
    ));
}

#[test]
fn masking_equals_slicing_and_extending() {
    let masked = fixture("in x: 8; out z: 8; z = and[8](x, 8x0F);");
    let sliced = fixture(
        "in x: 8; out z: 8; lo: 4 = slice[8, 0, 3](x); z = zext[4, 8](lo);",
    );
    assert!(equivalent(&masked, &sliced).expect("oracle decides").is_none());
}

#[test]
fn run_computes_outputs() {
    let prog = fixture("in x: 8; in y: 8; out z: 8; z = add[8](x, y);");
    let env = env::parse_env(&["x=3", "y=4"]).expect("env parses");
    let outputs = smt::run(&prog, &env).expect("inputs are valid");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs["z"], 7);
}

#[test]
fn run_wraps_at_the_operation_width() {
    let prog = fixture("in x: 8; in y: 8; out z: 8; z = add[8](x, y);");
    let env = env::parse_env(&["x=200", "y=100"]).expect("env parses");
    let outputs = smt::run(&prog, &env).expect("inputs are valid");
    assert_eq!(outputs["z"], (200 + 100) % 256);
}

#[test]
fn run_is_deterministic() {
    let prog = fixture(
        "in x: 8; out z: 4; lo: 4 = slice[8, 0, 3](x); hi: 4 = slice[8, 4, 7](x); \
         z = xor[4](lo, hi);",
    );
    let env = env::parse_env(&["x=179"]).expect("env parses");
    let first = smt::run(&prog, &env).expect("inputs are valid");
    let second = smt::run(&prog, &env).expect("inputs are valid");
    assert_eq!(first, second);
    // 179 = 0xB3: low nibble 3, high nibble 11, xor 8.
    assert_eq!(first["z"], 8);
}

#[test]
fn run_rejects_bad_environments() {
    let prog = fixture("in x: 8; out z: 8; z = x;");
    let env = env::parse_env(&["x=3", "w=1"]).expect("env parses");
    assert!(matches!(
        smt::run(&prog, &env),
        Err(InputError::Unknown(_))
    ));
    let env = env::parse_env(&["x=256"]).expect("env parses");
    assert!(matches!(smt::run(&prog, &env), Err(InputError::TooWide { .. })));
}

#[test]
fn permissive_run_drops_stray_bindings() {
    let prog = fixture("in x: 8; out z: 8; z = x;");
    let env = env::parse_env(&["x=3", "w=1"]).expect("env parses");
    let outputs = smt::run_permissive(&prog, &env).expect("stray binding dropped");
    assert_eq!(outputs["z"], 3);
}

#[test]
fn smtlib_rendering_declares_every_symbol() {
    let prog = fixture(
        "in x: 8; out z: 4; lo: 4 = slice[8, 0, 3](x); z = lo;",
    );
    let text = smt::to_smtlib(&prog);
    assert!(text.contains("(declare-const x (_ BitVec 8))"));
    assert!(text.contains("(declare-const z (_ BitVec 4))"));
    assert!(text.contains("(declare-const lo (_ BitVec 4))"));
    assert_eq!(text.matches("(assert ").count(), 2);
}
