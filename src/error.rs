//! Error types shared across the checker, the oracle, and the protocol.

use thiserror::Error;

/// High level error produced when statically checking a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The same name is declared both as an input and as an output.
    #[error("port '{0}' declared more than once")]
    DuplicatePort(String),

    /// A destination appears on the left-hand side of two assignments.
    #[error("'{0}' assigned multiple times")]
    DuplicateAssignment(String),

    /// An assignment writes to a declared input port.
    #[error("cannot assign to input '{0}'")]
    InputAssigned(String),

    /// A variable was referenced but is neither an input nor an
    /// already-assigned temporary.
    #[error("unknown variable '{0}'")]
    UnknownVar(String),

    /// A call names a function that is not in the operation library.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A call supplies the wrong number of compile-time parameters.
    #[error("{func} expects {expected} parameters but call has {found}")]
    ParamCountMismatch {
        func: String,
        expected: usize,
        found: usize,
    },

    /// The compile-time parameters are rejected by the operation's
    /// signature rule.
    #[error("invalid parameters for {func}: {reason}")]
    InvalidParams { func: String, reason: String },

    /// A call supplies the wrong number of argument expressions.
    #[error("{func} expects {expected} inputs but call has {found}")]
    ArityMismatch {
        func: String,
        expected: usize,
        found: usize,
    },

    /// An argument's inferred width disagrees with the signature rule.
    /// Positions are 1-based.
    #[error("argument {index} of {func} has width {found} but width {expected} is expected")]
    ArgWidthMismatch {
        func: String,
        index: usize,
        expected: u32,
        found: u32,
    },

    /// The assignment's declared width disagrees with the inferred
    /// expression width.
    #[error("width mismatch: {dest} has width {declared}, but expression has width {found}")]
    DestWidthMismatch {
        dest: String,
        declared: u32,
        found: u32,
    },

    /// A temporary is assigned without a declared width.
    #[error("temporary '{0}' needs a declared width")]
    MissingTempWidth(String),

    /// An output assignment carries a width annotation that contradicts
    /// the port declaration.
    #[error("output '{dest}' declared with width {declared} but its port has width {width}")]
    OutputWidthConflict {
        dest: String,
        declared: u32,
        width: u32,
    },

    /// A literal constant does not fit in its declared width.
    #[error("literal value {value} does not fit in {width} bits")]
    LiteralTooWide { value: u64, width: u32 },

    /// A port or literal was declared with a zero width.
    #[error("'{0}' has zero width")]
    ZeroWidth(String),

    /// A declared or derived width exceeds the 64-bit ceiling on
    /// concrete values.
    #[error("'{name}' has width {width}, but widths above 64 bits are not supported")]
    WidthTooLarge { name: String, width: u32 },

    /// A declared output never appears as an assignment destination.
    #[error("output '{0}' is never assigned")]
    UnassignedOutput(String),
}

/// Error produced when validating a concrete input environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// A declared input has no value in the environment.
    #[error("missing value for input '{0}'")]
    Missing(String),

    /// Inputs are unsigned; a negative value was supplied.
    #[error("input '{name}' has negative value {value}")]
    Negative { name: String, value: i64 },

    /// The supplied value needs more bits than the port declares.
    #[error("value {value} for input '{name}' does not fit in {width} bits")]
    TooWide { name: String, value: u64, width: u32 },

    /// The environment names something that is not a declared input.
    #[error("unknown input '{0}'")]
    Unknown(String),
}

/// A malformed agent reply. These are recovered locally with feedback
/// and a retry; only the retry budget turns them fatal.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The reply's first line does not start with a known keyword.
    #[error("no command keyword found; expected check, eval, cost, or commit")]
    MissingKeyword,

    /// The keyword line was followed by no program text.
    #[error("missing program body after '{0}'")]
    MissingProgram(String),

    /// An `eval` binding such as `x=3` could not be parsed.
    #[error("bad input binding '{0}'; expected name=value")]
    BadEnv(String),

    /// The program body does not parse.
    #[error("program does not parse: {0}")]
    Syntax(#[from] crate::parse::ParseError),
}

/// Fatal exhaustion of one optimization attempt.
#[derive(Debug, Error)]
pub enum AskError {
    /// Too many malformed replies in a row, with no verified rewrite
    /// recorded to fall back on.
    #[error("gave up after {0} consecutive malformed replies")]
    ErrorBudget(usize),

    /// The round budget ran out before any equivalent rewrite was seen.
    #[error("no verified rewrite found within {0} rounds")]
    RoundBudget(usize),

    /// The model transport failed mid-conversation.
    #[error("model client failed: {0}")]
    Client(#[from] crate::chat::ClientError),

    /// The equivalence oracle failed on a query the protocol needed.
    #[error("equivalence oracle failed: {0}")]
    Oracle(#[from] crate::smt::OracleError),
}
