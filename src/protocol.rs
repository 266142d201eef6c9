//! The negotiation protocol: a bounded, fault-tolerant conversation
//! that turns free-form agent replies into verified rewrites.
//!
//! One `optimize` call drives one strictly sequential conversation. A
//! round consumes one well-formed command (`check`, `eval`, `cost`, or
//! `commit`) and answers it with feedback; malformed replies are
//! answered with a description of the problem and retried without
//! consuming a round, up to a budget of consecutive failures. Every
//! candidate is gated through the static checker, the equivalence
//! oracle, and the cost estimator before it can influence the result,
//! and the best verified-equivalent program seen so far is never lost.

use crate::chat::{ModelClient, Role, Transcript};
use crate::env::{self, Env};
use crate::error::{AskError, CheckError, CommandError};
use crate::ir::{Counterexample, Program};
use crate::{check, cost, ops, parse, smt};

/// Budgets bounding one optimization attempt.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Maximum number of well-formed command rounds.
    pub max_rounds: usize,
    /// Maximum number of consecutive malformed replies.
    pub max_errors: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            max_errors: 5,
        }
    }
}

/// A well-formed agent move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Check(Program),
    Eval(Env, Program),
    Cost(Program),
    Commit(Program),
}

/// Result of a completed attempt. `committed` distinguishes a rewrite
/// the agent committed (strictly cheaper, verified) from the best
/// verified rewrite recorded when a budget ran out.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub program: Program,
    pub rounds: usize,
    pub committed: bool,
}

/// Drive one optimization attempt against the reference program.
///
/// The reference is assumed to have passed the static checker. Returns
/// the committed rewrite, or the best verified-equivalent rewrite when
/// a budget is exhausted; fails with [`AskError`] only when no
/// verified rewrite was ever recorded.
pub fn optimize<C: ModelClient>(
    client: &C,
    reference: &Program,
    limits: &Limits,
) -> Result<Outcome, AskError> {
    let ref_cost = cost::score(reference);
    let mut transcript = Transcript::new()
        .push(Role::System, system_prompt())
        .push(Role::User, opening_prompt(reference, ref_cost));
    let mut best: Option<(Program, u64)> = None;

    for round in 1..=limits.max_rounds {
        let cmd = match next_command(client, &mut transcript, limits) {
            Ok(cmd) => cmd,
            Err(AskError::ErrorBudget(n)) => {
                // Exhausted retries, but verified progress is kept.
                if let Some((program, _)) = best {
                    log::info!("error budget exhausted; returning best rewrite");
                    return Ok(Outcome {
                        program,
                        rounds: round - 1,
                        committed: false,
                    });
                }
                return Err(AskError::ErrorBudget(n));
            }
            Err(err) => return Err(err),
        };

        log::info!("round {}: {}", round, describe(&cmd));
        match dispatch(cmd, reference, ref_cost, &mut best)? {
            Verdict::Feedback(message) => {
                log::debug!("feedback: {}", message);
                transcript = transcript.push(Role::User, message);
            }
            Verdict::Committed(program) => {
                return Ok(Outcome {
                    program,
                    rounds: round,
                    committed: true,
                });
            }
        }
    }

    match best {
        Some((program, _)) => Ok(Outcome {
            program,
            rounds: limits.max_rounds,
            committed: false,
        }),
        None => Err(AskError::RoundBudget(limits.max_rounds)),
    }
}

fn describe(cmd: &Command) -> &'static str {
    match cmd {
        Command::Check(_) => "check",
        Command::Eval(_, _) => "eval",
        Command::Cost(_) => "cost",
        Command::Commit(_) => "commit",
    }
}

/// Request replies until one parses as a command, feeding parse
/// problems back to the agent. Retries do not consume rounds; only the
/// consecutive-failure budget bounds them.
fn next_command<C: ModelClient>(
    client: &C,
    transcript: &mut Transcript,
    limits: &Limits,
) -> Result<Command, AskError> {
    let mut errors = 0;
    loop {
        let reply = client.send(transcript)?;
        *transcript = transcript.push(Role::Assistant, reply.clone());
        match parse_command(&reply) {
            Ok(cmd) => return Ok(cmd),
            Err(err) => {
                errors += 1;
                log::warn!("malformed reply {}/{}: {}", errors, limits.max_errors, err);
                if errors >= limits.max_errors {
                    return Err(AskError::ErrorBudget(errors));
                }
                *transcript = transcript.push(
                    Role::User,
                    format!(
                        "Your reply could not be used: {}. Answer with one command \
                         keyword (check, eval, cost, or commit) on the first line, \
                         followed by a complete program.",
                        err
                    ),
                );
            }
        }
    }
}

/// Interpret one raw reply as a command. If the plain text fails, a
/// fenced code block is extracted and interpreted instead.
pub fn parse_command(reply: &str) -> Result<Command, CommandError> {
    match interpret(reply) {
        Ok(cmd) => Ok(cmd),
        Err(err) => match fenced_block(reply) {
            Some(block) => interpret(&block),
            None => Err(err),
        },
    }
}

fn interpret(text: &str) -> Result<Command, CommandError> {
    let lines: Vec<&str> = text.lines().collect();
    let idx = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .ok_or(CommandError::MissingKeyword)?;

    let mut tokens = lines[idx].split_whitespace();
    let keyword = tokens
        .next()
        .ok_or(CommandError::MissingKeyword)?
        .trim_end_matches(';')
        .to_ascii_lowercase();

    let body = lines[idx + 1..].join("\n");
    let program = |keyword: &str| -> Result<Program, CommandError> {
        if body.trim().is_empty() {
            return Err(CommandError::MissingProgram(keyword.to_string()));
        }
        Ok(parse::parse(&body)?)
    };

    match keyword.as_str() {
        "check" => Ok(Command::Check(program("check")?)),
        "cost" => Ok(Command::Cost(program("cost")?)),
        "commit" => Ok(Command::Commit(program("commit")?)),
        "eval" => {
            let bindings: Vec<String> = tokens
                .map(|t| t.trim_end_matches(';').to_string())
                .filter(|t| !t.is_empty())
                .collect();
            let env = env::parse_env(&bindings).map_err(CommandError::BadEnv)?;
            Ok(Command::Eval(env, program("eval")?))
        }
        _ => Err(CommandError::MissingKeyword),
    }
}

/// Extract the contents of the first fenced code block, skipping the
/// info string on the opening fence.
fn fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].to_string())
}

enum Verdict {
    Feedback(String),
    Committed(Program),
}

/// Gate outcomes for a candidate measured against the reference.
enum Review {
    SignatureMismatch,
    CheckFailed(CheckError),
    Identical,
    Differs(Counterexample),
    Equivalent { cost: u64 },
}

/// Run the check pipeline: signature, static checker, identity, then
/// the equivalence oracle. On proven equivalence the best-known
/// rewrite is updated when the candidate is cheaper.
fn review(
    prog: &Program,
    reference: &Program,
    best: &mut Option<(Program, u64)>,
) -> Result<Review, AskError> {
    if !prog.signature_matches(reference) {
        return Ok(Review::SignatureMismatch);
    }
    if let Err(err) = check::check(prog) {
        return Ok(Review::CheckFailed(err));
    }
    if prog == reference {
        return Ok(Review::Identical);
    }
    match smt::equivalent(prog, reference)? {
        Some(cex) => Ok(Review::Differs(cex)),
        None => {
            let prog_cost = cost::score(prog);
            let improves = best
                .as_ref()
                .map(|(_, best_cost)| prog_cost < *best_cost)
                .unwrap_or(true);
            if improves {
                log::info!("recording verified rewrite with cost {}", prog_cost);
                *best = Some((prog.clone(), prog_cost));
            }
            Ok(Review::Equivalent { cost: prog_cost })
        }
    }
}

fn review_feedback(review: &Review, ref_cost: u64) -> String {
    match review {
        Review::SignatureMismatch => {
            "signature mismatch: the candidate must declare exactly the reference's \
             input and output ports"
                .to_string()
        }
        Review::CheckFailed(err) => format!("the program does not check: {}", err),
        Review::Identical => "identical to the reference, nothing to verify".to_string(),
        Review::Differs(cex) => format!("not equivalent; {}", cex),
        Review::Equivalent { cost } => {
            format!("equivalent; cost {} (reference costs {})", cost, ref_cost)
        }
    }
}

fn dispatch(
    cmd: Command,
    reference: &Program,
    ref_cost: u64,
    best: &mut Option<(Program, u64)>,
) -> Result<Verdict, AskError> {
    match cmd {
        Command::Check(prog) => {
            let review = review(&prog, reference, best)?;
            Ok(Verdict::Feedback(review_feedback(&review, ref_cost)))
        }
        Command::Commit(prog) => match review(&prog, reference, best)? {
            Review::Equivalent { cost } if cost < ref_cost => Ok(Verdict::Committed(prog)),
            Review::Equivalent { cost } => Ok(Verdict::Feedback(format!(
                "not an improvement: cost {} is not below the reference's {}",
                cost, ref_cost
            ))),
            other => Ok(Verdict::Feedback(review_feedback(&other, ref_cost))),
        },
        Command::Cost(prog) => {
            if let Err(err) = check::check(&prog) {
                return Ok(Verdict::Feedback(format!(
                    "the program does not check: {}",
                    err
                )));
            }
            Ok(Verdict::Feedback(format!("cost {}", cost::score(&prog))))
        }
        Command::Eval(env, prog) => {
            if let Err(err) = check::check(&prog) {
                return Ok(Verdict::Feedback(format!(
                    "the program does not check: {}",
                    err
                )));
            }
            match smt::run_permissive(&prog, &env) {
                Ok(outputs) => Ok(Verdict::Feedback(env::env_str(&outputs))),
                Err(err) => Ok(Verdict::Feedback(format!("invalid inputs: {}", err))),
            }
        }
    }
}

fn system_prompt() -> String {
    let op_names: Vec<&str> = ops::all().map(|op| op.name).collect();
    format!(
        "You optimize programs in a small bit-vector language. A program \
         declares ports (`in x: 8;`, `out z: 8;`) and assigns each output \
         once (`z = add[8](x, y);`). Temporaries carry a width annotation \
         (`t: 4 = slice[8, 0, 3](x);`). Literals are width-tagged, e.g. \
         `8x1F`. Available operations: {}.\n\
         Reply with exactly one command keyword on the first line, then a \
         complete program on the following lines:\n\
         - check: verify your candidate is equivalent to the reference\n\
         - eval x=1 y=2: run a program on concrete inputs\n\
         - cost: price a program\n\
         - commit: submit a verified, strictly cheaper rewrite\n\
         Your goal is to commit an equivalent program with lower cost.",
        op_names.join(", ")
    )
}

fn opening_prompt(reference: &Program, ref_cost: u64) -> String {
    format!(
        "Optimize this program. Its cost is {}.\n\n{}",
        ref_cost, reference
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;

    #[test]
    fn parses_keyword_and_body() {
        let cmd = parse_command("check;\nin x: 8; out z: 8; z = x;").expect("command parses");
        match cmd {
            Command::Check(prog) => assert_eq!(prog.inputs.len(), 1),
            other => panic!("expected check, got {:?}", other),
        }
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let cmd = parse_command("COMMIT\nin x: 8; out z: 8; z = x;").expect("command parses");
        assert!(matches!(cmd, Command::Commit(_)));
    }

    #[test]
    fn eval_carries_bindings() {
        let cmd =
            parse_command("eval x=3 y=4;\nin x: 8; in y: 8; out z: 8; z = add[8](x, y);")
                .expect("command parses");
        match cmd {
            Command::Eval(env, _) => {
                assert_eq!(env["x"], 3);
                assert_eq!(env["y"], 4);
            }
            other => panic!("expected eval, got {:?}", other),
        }
    }

    #[test]
    fn missing_body_is_reported() {
        let err = parse_command("check;\n\n").expect_err("no body");
        assert!(matches!(err, CommandError::MissingProgram(_)));
    }

    #[test]
    fn missing_keyword_is_reported() {
        let err = parse_command("here is my program:\nz = x;").expect_err("no keyword");
        assert!(matches!(err, CommandError::MissingKeyword));
    }

    #[test]
    fn fenced_block_is_retried() {
        let reply = "Sure! Here is my attempt.\n```\ncheck\nin x: 8; out z: 8; z = x;\n```\n";
        let cmd = parse_command(reply).expect("fenced command parses");
        match cmd {
            Command::Check(prog) => match &prog.assignments[0].expr {
                Expr::Lookup(var) => assert_eq!(var, "x"),
                other => panic!("expected lookup, got {:?}", other),
            },
            other => panic!("expected check, got {:?}", other),
        }
    }

    #[test]
    fn syntax_error_is_a_command_error() {
        let err = parse_command("check\nin x 8;").expect_err("bad syntax");
        assert!(matches!(err, CommandError::Syntax(_)));
    }

    #[test]
    fn bad_eval_binding_is_reported() {
        let err = parse_command("eval x=?\nin x: 8; out z: 8; z = x;").expect_err("bad env");
        assert!(matches!(err, CommandError::BadEnv(_)));
    }
}
