//! Engine errors.

use crate::vm::Vm;
use bytecode_system::VerifyError;
use core_types::{ErrorKind, JsError, JsString, Value};
use thiserror::Error;

/// Result type used throughout the interpreter.
pub type VmResult<T> = Result<T, VmError>;

/// Errors raised while executing bytecode.
///
/// Catchable variants are handed to user-level handlers by the unwinder;
/// the others abort execution up to the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// A value thrown by user code, or a fault already turned into an
    /// error object
    #[error("uncaught exception: {0}")]
    Throw(Value),
    /// Type fault
    #[error("TypeError: {0}")]
    Type(String),
    /// Unresolved identifier
    #[error("ReferenceError: {0}")]
    Reference(String),
    /// Recursion or argument-count limit
    #[error("RangeError: {0}")]
    Range(String),
    /// Source rejected by the eval compiler
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// Allocation failure
    #[error("out of memory")]
    OutOfMemory,
    /// The bytecode image is inconsistent
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
    /// The operand-stack arena is exhausted
    #[error("stack overflow")]
    StackOverflow,
    /// The operation callback aborted execution
    #[error("execution interrupted")]
    Interrupted,
    /// An engine invariant broke (e.g. a stale object handle)
    #[error("internal error: {0}")]
    Internal(String),
}

impl VmError {
    /// True if user-level handlers may catch this error.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            VmError::Throw(_)
                | VmError::Type(_)
                | VmError::Reference(_)
                | VmError::Range(_)
                | VmError::Syntax(_)
                | VmError::OutOfMemory
        )
    }

    /// Error kind for faults raised by the engine itself.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::Throw(_) => ErrorKind::Thrown,
            VmError::Type(_) => ErrorKind::TypeError,
            VmError::Reference(_) => ErrorKind::ReferenceError,
            VmError::Range(_) | VmError::StackOverflow => ErrorKind::RangeError,
            VmError::Syntax(_) => ErrorKind::SyntaxError,
            VmError::OutOfMemory => ErrorKind::OutOfMemory,
            VmError::MalformedBytecode(_) | VmError::Interrupted | VmError::Internal(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Converts to the host-facing error record. Thrown error objects
    /// report their `name` and `message` properties.
    pub fn to_js_error(&self, vm: &Vm) -> JsError {
        match self {
            VmError::Throw(Value::Object(id)) => {
                let name = vm.peek_property(*id, "name").and_then(|v| v.primitive_to_string());
                let message = vm
                    .peek_property(*id, "message")
                    .and_then(|v| v.primitive_to_string())
                    .map(|m| m.to_string())
                    .unwrap_or_default();
                let kind = name.as_ref().map_or(ErrorKind::Thrown, kind_from_name);
                JsError::new(kind, message)
            }
            VmError::Throw(value) => JsError::new(
                ErrorKind::Thrown,
                value.primitive_to_string().map(|s| s.to_string()).unwrap_or_default(),
            ),
            other => JsError::new(other.kind(), other.message()),
        }
    }

    pub(crate) fn message(&self) -> String {
        match self {
            VmError::Type(m)
            | VmError::Reference(m)
            | VmError::Range(m)
            | VmError::Syntax(m)
            | VmError::MalformedBytecode(m)
            | VmError::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

fn kind_from_name(name: &JsString) -> ErrorKind {
    match name.as_str() {
        "TypeError" => ErrorKind::TypeError,
        "ReferenceError" => ErrorKind::ReferenceError,
        "RangeError" => ErrorKind::RangeError,
        "SyntaxError" => ErrorKind::SyntaxError,
        "InternalError" => ErrorKind::InternalError,
        _ => ErrorKind::Thrown,
    }
}

impl From<JsError> for VmError {
    fn from(err: JsError) -> Self {
        match err.kind {
            ErrorKind::TypeError => VmError::Type(err.message),
            ErrorKind::ReferenceError => VmError::Reference(err.message),
            ErrorKind::RangeError => VmError::Range(err.message),
            ErrorKind::SyntaxError => VmError::Syntax(err.message),
            ErrorKind::OutOfMemory => VmError::OutOfMemory,
            ErrorKind::InternalError | ErrorKind::Thrown => VmError::Internal(err.message),
        }
    }
}

impl From<VerifyError> for VmError {
    fn from(err: VerifyError) -> Self {
        VmError::MalformedBytecode(err.to_string())
    }
}
