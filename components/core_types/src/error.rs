//! Host-facing error records.
//!
//! An uncaught fault leaves the engine as a [`JsError`]: the kind from the
//! error taxonomy, a message, and the frames that were active when it was
//! raised. The heap also reports its own failures (stale handles, rejected
//! redeclarations) with this type.

use crate::{SourcePosition, StackFrame};
use std::fmt;
use thiserror::Error;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Syntax error reported by a compiler collaborator
    SyntaxError,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Reference to an unresolved identifier
    ReferenceError,
    /// Recursion depth or argument count limits exceeded
    RangeError,
    /// Allocation failure
    OutOfMemory,
    /// Engine invariant violated or malformed input from a collaborator
    InternalError,
    /// A value thrown by user code
    Thrown,
}

impl ErrorKind {
    /// The `name` an error object of this kind carries.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::OutOfMemory => "InternalError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::Thrown => "uncaught exception",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error with message and stack trace.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind};
///
/// let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
/// assert_eq!(error.message, "undefined is not a function");
/// assert!(error.stack.is_empty());
/// ```
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Stack trace (call stack at the time of the error), innermost first
    pub stack: Vec<StackFrame>,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Creates an error without stack or position information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        JsError {
            kind,
            message: message.into(),
            stack: Vec::new(),
            source_position: None,
        }
    }

    /// Shorthand for a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Attaches a stack trace.
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }
}
