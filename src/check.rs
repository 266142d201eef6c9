//! Static checking of programs against their declarations and the
//! operation library.
//!
//! Checking walks the assignments in order, inferring every
//! expression's width bottom-up. Temporaries must be assigned (and
//! thereby widthed) before they are referenced; forward references are
//! rejected because a width is only known from a prior assignment.
//! Checking is purely structural and deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CheckError;
use crate::ir::{Expr, Program};
use crate::ops;

/// Widest signal a checked program may carry. Concrete values travel
/// as `u64` through the oracle and `run`, so wider signals cannot be
/// evaluated or reported in a counterexample.
pub const MAX_WIDTH: u32 = 64;

/// Validate a program. `Ok(())` means the program is well-formed:
/// widths are consistent everywhere, every referenced variable is in
/// scope, and every declared output is assigned exactly once.
pub fn check(prog: &Program) -> Result<(), CheckError> {
    for name in prog.inputs.keys() {
        if prog.outputs.contains_key(name) {
            return Err(CheckError::DuplicatePort(name.clone()));
        }
    }
    for port in prog.inputs.values().chain(prog.outputs.values()) {
        if port.width == 0 {
            return Err(CheckError::ZeroWidth(port.name.clone()));
        }
        if port.width > MAX_WIDTH {
            return Err(CheckError::WidthTooLarge {
                name: port.name.clone(),
                width: port.width,
            });
        }
    }

    // Lookup scope: inputs plus temporaries assigned so far. Outputs
    // are write-only and never enter the scope.
    let mut scope: BTreeMap<String, u32> = prog
        .inputs
        .values()
        .map(|p| (p.name.clone(), p.width))
        .collect();
    let mut assigned: BTreeSet<&str> = BTreeSet::new();

    for asgt in &prog.assignments {
        if !assigned.insert(&asgt.dest) {
            return Err(CheckError::DuplicateAssignment(asgt.dest.clone()));
        }
        if prog.inputs.contains_key(&asgt.dest) {
            return Err(CheckError::InputAssigned(asgt.dest.clone()));
        }

        let inferred = infer_width(&scope, &asgt.expr)?;

        let declared = match prog.outputs.get(&asgt.dest) {
            Some(port) => {
                if let Some(width) = asgt.width {
                    if width != port.width {
                        return Err(CheckError::OutputWidthConflict {
                            dest: asgt.dest.clone(),
                            declared: width,
                            width: port.width,
                        });
                    }
                }
                port.width
            }
            None => match asgt.width {
                Some(0) => return Err(CheckError::ZeroWidth(asgt.dest.clone())),
                Some(width) if width > MAX_WIDTH => {
                    return Err(CheckError::WidthTooLarge {
                        name: asgt.dest.clone(),
                        width,
                    })
                }
                Some(width) => width,
                None => return Err(CheckError::MissingTempWidth(asgt.dest.clone())),
            },
        };

        if inferred != declared {
            return Err(CheckError::DestWidthMismatch {
                dest: asgt.dest.clone(),
                declared,
                found: inferred,
            });
        }

        if !prog.outputs.contains_key(&asgt.dest) {
            scope.insert(asgt.dest.clone(), declared);
        }
    }

    for name in prog.outputs.keys() {
        if !assigned.contains(name.as_str()) {
            return Err(CheckError::UnassignedOutput(name.clone()));
        }
    }

    Ok(())
}

/// Infer the width of an expression under the given scope.
fn infer_width(scope: &BTreeMap<String, u32>, expr: &Expr) -> Result<u32, CheckError> {
    match expr {
        Expr::Lookup(var) => scope
            .get(var)
            .copied()
            .ok_or_else(|| CheckError::UnknownVar(var.clone())),
        Expr::Literal { width, value, .. } => {
            if *width == 0 {
                return Err(CheckError::ZeroWidth(format!("literal {}", value)));
            }
            if *width > MAX_WIDTH {
                return Err(CheckError::WidthTooLarge {
                    name: format!("literal {}", value),
                    width: *width,
                });
            }
            if *width < 64 && *value >> *width != 0 {
                return Err(CheckError::LiteralTooWide {
                    value: *value,
                    width: *width,
                });
            }
            Ok(*width)
        }
        Expr::Call { func, params, args } => {
            let op = ops::lookup(func).ok_or_else(|| CheckError::UnknownFunction(func.clone()))?;
            if params.len() != op.param_count {
                return Err(CheckError::ParamCountMismatch {
                    func: func.clone(),
                    expected: op.param_count,
                    found: params.len(),
                });
            }
            let sig = op
                .signature(params)
                .map_err(|reason| CheckError::InvalidParams {
                    func: func.clone(),
                    reason,
                })?;
            // Arguments are checked recursively, so only the derived
            // output width can introduce an over-wide signal here.
            if sig.output > MAX_WIDTH {
                return Err(CheckError::WidthTooLarge {
                    name: func.clone(),
                    width: sig.output,
                });
            }
            if args.len() != sig.inputs.len() {
                return Err(CheckError::ArityMismatch {
                    func: func.clone(),
                    expected: sig.inputs.len(),
                    found: args.len(),
                });
            }
            for (i, (arg, expected)) in args.iter().zip(&sig.inputs).enumerate() {
                let found = infer_width(scope, arg)?;
                if found != *expected {
                    return Err(CheckError::ArgWidthMismatch {
                        func: func.clone(),
                        index: i + 1,
                        expected: *expected,
                        found,
                    });
                }
            }
            Ok(sig.output)
        }
    }
}
