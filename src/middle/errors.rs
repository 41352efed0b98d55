//! The error taxonomy (§7): every lowering- or selection-time failure the
//! core can raise, each carrying a source line where one is meaningful.
//!
//! Lexical and syntactic errors are not modeled here — they belong to the
//! out-of-scope parser collaborator (see `front::parse::ParseError` for the
//! supplemental front end's own take on that).

use thiserror::Error;

use crate::common::{Id, Line};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Reference to an unbound identifier.
    #[error("{line}: undefined identifier '{name}'")]
    Undefined { name: Id, line: Line },

    /// Duplicate function definition.
    #[error("{line}: function '{name}' is already defined")]
    Redefinition { name: Id, line: Line },

    /// E.g. an array used as a scalar or vice versa.
    #[error("{line}: type mismatch: {detail}")]
    TypeMismatch { detail: String, line: Line },

    /// Call argument count does not match the callee's formal count.
    #[error("{line}: call to '{callee}' passes {got} argument(s), expected {expected}")]
    ArityMismatch {
        callee: Id,
        expected: usize,
        got: usize,
        line: Line,
    },

    /// `break`/`continue` outside any loop, or `return <expr>` from `void`.
    #[error("{line}: {what}")]
    MisplacedControl { what: String, line: Line },

    /// A negative or non-constant dimension in an array declaration.
    #[error("{line}: invalid array shape: {detail}")]
    ArrayShape { detail: String, line: Line },

    /// A selection-time invariant violation: indicates a lowering bug, and
    /// aborts the whole translation rather than just the enclosing
    /// function (§4.10).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Whether this error should abort the entire translation (true only
    /// for `Internal`) rather than just the function being lowered.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }
}
