pub mod chat;
pub mod check;
pub mod cost;
pub mod env;
pub mod error;
pub mod ir;
pub mod ops;
pub mod parse;
pub mod protocol;
pub mod smt;

// Re-export commonly used types
pub use chat::{ModelClient, PipeClient, ScriptClient, Transcript};
pub use check::check;
pub use cost::score;
pub use env::{Env, parse_env};
pub use error::{AskError, CheckError, CommandError, InputError};
pub use ir::{Counterexample, Expr, Port, Program};
pub use parse::{ParseError, parse, parse_pair};
pub use protocol::{Limits, Outcome, optimize};
pub use smt::{OracleError, equivalent, run, to_smtlib};
