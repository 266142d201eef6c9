use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use bvopt::error::{AskError, CheckError, InputError};
use bvopt::{Limits, OracleError, ParseError, PipeClient, Program, env, parse, protocol, smt};
use clap::{Parser, Subcommand};
use thiserror::Error;

/// Command line interface for the bvopt optimizer.
#[derive(Parser, Debug)]
#[command(
    name = "bvopt",
    about = "Check, run, and optimize bit-vector programs with a verified agent loop",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Statically check a program.
    Check {
        /// Path to the program file.
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Run a program on concrete inputs and print its outputs.
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Input bindings, e.g. `x=3 y=4`.
        #[arg(value_name = "BINDING")]
        bindings: Vec<String>,
    },

    /// Print a program's estimated cost.
    Cost {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Print a program's formula as SMT-LIB text.
    Smt {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Decide whether the two programs in a `---`-separated file are
    /// equivalent, printing a counterexample when they are not.
    Equiv {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Ask an agent to optimize a program and print the best verified
    /// rewrite.
    Opt {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Shell command invoked once per round; the transcript arrives
        /// on stdin and the reply is read from stdout.
        #[arg(long, value_name = "COMMAND")]
        agent: String,

        /// Maximum number of well-formed command rounds.
        #[arg(long, default_value_t = 10)]
        rounds: usize,

        /// Maximum number of consecutive malformed replies.
        #[arg(long, default_value_t = 5)]
        errors: usize,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read input '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("'{}' does not check", path.display())]
    Check {
        path: PathBuf,
        #[source]
        source: CheckError,
    },
    #[error("'{}' does not contain a second program after '---'", path.display())]
    MissingSecond { path: PathBuf },
    #[error("bad input binding '{0}'; expected name=value")]
    BadBinding(String),
    #[error("bad inputs: {source}")]
    Input {
        #[source]
        source: InputError,
    },
    #[error("equivalence query failed")]
    Oracle {
        #[source]
        source: OracleError,
    },
    #[error("optimization failed")]
    Ask {
        #[source]
        source: AskError,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cmd: Cmd) -> Result<(), CliError> {
    match cmd {
        Cmd::Check { input } => {
            load_checked(&input)?;
            println!("ok");
            Ok(())
        }
        Cmd::Run { input, bindings } => {
            let prog = load_checked(&input)?;
            let env = env::parse_env(&bindings).map_err(CliError::BadBinding)?;
            let outputs = smt::run(&prog, &env).map_err(|source| CliError::Input { source })?;
            println!("{}", env::env_str(&outputs));
            Ok(())
        }
        Cmd::Cost { input } => {
            let prog = load_checked(&input)?;
            println!("{}", bvopt::score(&prog));
            Ok(())
        }
        Cmd::Smt { input } => {
            let prog = load_checked(&input)?;
            print!("{}", smt::to_smtlib(&prog));
            Ok(())
        }
        Cmd::Equiv { input } => {
            let (first, second) = load_checked_pair(&input)?;
            match smt::equivalent(&first, &second).map_err(|source| CliError::Oracle { source })? {
                None => println!("equivalent"),
                Some(cex) => println!("not equivalent; {}", cex),
            }
            Ok(())
        }
        Cmd::Opt {
            input,
            agent,
            rounds,
            errors,
        } => {
            let prog = load_checked(&input)?;
            let client = PipeClient::new(agent);
            let limits = Limits {
                max_rounds: rounds,
                max_errors: errors,
            };
            let outcome = protocol::optimize(&client, &prog, &limits)
                .map_err(|source| CliError::Ask { source })?;
            log::info!(
                "finished after {} rounds ({})",
                outcome.rounds,
                if outcome.committed {
                    "committed"
                } else {
                    "best effort"
                }
            );
            print!("{}", outcome.program);
            Ok(())
        }
    }
}

fn load(path: &PathBuf) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.clone(),
        source,
    })
}

fn load_checked(path: &PathBuf) -> Result<Program, CliError> {
    let source = load(path)?;
    let prog = parse(&source).map_err(|source| CliError::Parse {
        path: path.clone(),
        source,
    })?;
    bvopt::check(&prog).map_err(|source| CliError::Check {
        path: path.clone(),
        source,
    })?;
    Ok(prog)
}

fn load_checked_pair(path: &PathBuf) -> Result<(Program, Program), CliError> {
    let source = load(path)?;
    let (first, second) = parse_pair_at(path, &source)?;
    for prog in [&first, &second] {
        bvopt::check(prog).map_err(|source| CliError::Check {
            path: path.clone(),
            source,
        })?;
    }
    Ok((first, second))
}

fn parse_pair_at(path: &PathBuf, source: &str) -> Result<(Program, Program), CliError> {
    let (first, second) = bvopt::parse_pair(source).map_err(|source| CliError::Parse {
        path: path.clone(),
        source,
    })?;
    let second = second.ok_or_else(|| CliError::MissingSecond { path: path.clone() })?;
    Ok((first, second))
}

fn report_error(err: &CliError) {
    eprintln!("error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}
