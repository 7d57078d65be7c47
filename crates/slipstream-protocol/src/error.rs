//! Error types for the protocol layer.
//!
//! Parsing is tagged-result dispatch: every malformed line maps to a
//! variant here, and the caller decides what to do (the server logs the
//! error and drops the line — it never tears the connection down over a
//! bad command).

/// Errors that can occur while parsing a protocol line.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The first token is not a known command verb.
    #[error("unrecognised command: {0}")]
    UnknownCommand(String),

    /// The command verb is known but the argument count is wrong.
    #[error("{command}: expected {expected} argument(s), got {got}")]
    WrongArity {
        command: String,
        expected: usize,
        got: usize,
    },

    /// An argument failed to parse as the expected type.
    #[error("{command}: bad argument {value:?}: {reason}")]
    InvalidArgument {
        command: String,
        value: String,
        reason: String,
    },

    /// The line was empty (or all whitespace).
    #[error("empty command line")]
    EmptyLine,
}
