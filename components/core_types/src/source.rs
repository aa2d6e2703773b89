//! Source position and stack frame types for error tracking.

use std::fmt;

/// Represents a position in source code.
///
/// The engine itself only knows bytecode offsets; compilers that keep line
/// tables can translate them into positions for reports.
///
/// # Examples
///
/// ```
/// use core_types::SourcePosition;
///
/// let pos = SourcePosition { line: 10, column: 5, offset: 150 };
/// assert_eq!(pos.to_string(), "10:5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
    /// Byte offset from the start of the source (or bytecode offset)
    pub offset: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single entry of a stack trace.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: Some("step".to_string()),
///     source_url: Some("main.js".to_string()),
///     line: 0,
///     column: 0,
///     pc: Some(12),
/// };
/// assert_eq!(frame.to_string(), "step@main.js:pc 12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function, or None for anonymous functions and scripts
    pub function_name: Option<String>,
    /// URL or file path of the source, or None if not available
    pub source_url: Option<String>,
    /// Line number where the call occurred (0 when unknown)
    pub line: u32,
    /// Column number where the call occurred (0 when unknown)
    pub column: u32,
    /// Bytecode offset of the active instruction
    pub pc: Option<usize>,
}

impl StackFrame {
    /// A frame for native code, which has no source or pc.
    pub fn native(name: &str) -> Self {
        StackFrame {
            function_name: Some(name.to_string()),
            source_url: None,
            line: 0,
            column: 0,
            pc: None,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@", self.function_name.as_deref().unwrap_or(""))?;
        write!(f, "{}", self.source_url.as_deref().unwrap_or("[native]"))?;
        match self.pc {
            Some(pc) => write!(f, ":pc {}", pc),
            None if self.line > 0 => write!(f, ":{}", self.line),
            None => Ok(()),
        }
    }
}
