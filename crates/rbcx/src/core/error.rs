/*!

Every fallible public operation in this crate returns a [`CoreResult`]. There is no
`CATCH`/`FAIL`-style unwind and no process exit: a [`CoreError`] is an ordinary value that
propagates with `?` up to the public entry point that the host application called, exactly
as Rust's `Result` already gives the "abort the current request, report a diagnostic"
behavior that an exception-based implementation would otherwise need to fake.

Following the convention of hand-rolled, enumerable error types elsewhere in this codebase
(see `core::sort::kind::KindError`) rather than `thiserror`/`anyhow`: the error surface here is
small and closed, so a derive macro would buy us little.

*/

use std::fmt::{Display, Formatter};

/// The kinds of error this crate's operations can raise, per the error-kind table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UndefinedSymbol,
    RedefiningSymbol,
    AmbiguousSymbol,
    RecursiveModule,
    CircularDefine,
    RecursiveAssignment,
    TypeMismatch,
    InvalidRange,
    OutOfBounds,
    NonConstant,
    NonDeterministicWithoutLayer,
    InternalInconsistency,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UndefinedSymbol => "undefined-symbol",
            ErrorKind::RedefiningSymbol => "redefining-symbol",
            ErrorKind::AmbiguousSymbol => "ambiguous-symbol",
            ErrorKind::RecursiveModule => "recursive-module",
            ErrorKind::CircularDefine => "circular-define",
            ErrorKind::RecursiveAssignment => "recursive-assignment",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::InvalidRange => "invalid-range",
            ErrorKind::OutOfBounds => "out-of-bounds",
            ErrorKind::NonConstant => "non-constant",
            ErrorKind::NonDeterministicWithoutLayer => "non-deterministic-without-layer",
            ErrorKind::InternalInconsistency => "internal-inconsistency",
        };
        write!(f, "{}", s)
    }
}

/// A fatal-for-the-current-request diagnostic: a kind, the source line it was raised at
/// (`0` meaning "unknown"), and a human-readable message. Mirrors the "Error at
/// `<file>:<line>`: `<message>`" user-visible form without owning a file name (the host
/// application knows which file it parsed; this crate only ever sees line numbers).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub line: u32,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, line: u32, message: impl Into<String>) -> Self {
        CoreError { kind, line, message: message.into() }
    }

    /// A second source line is sometimes relevant (e.g. reporting both declarations of a
    /// redefined symbol); bundle it into the message rather than adding a second field that
    /// every other error kind would leave unused.
    pub fn with_secondary_line(kind: ErrorKind, line: u32, secondary_line: u32, message: impl Display) -> Self {
        CoreError::new(kind, line, format!("{} (previously at line {})", message, secondary_line))
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "Error: {}: {}", self.kind, self.message)
        } else {
            write!(f, "Error at line {}: {}: {}", self.line, self.kind, self.message)
        }
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
