//! Compiled script images.
//!
//! A [`Script`] is the immutable unit handed over by the compiler: opcode
//! stream, constants, atoms, nested functions, block scopes and the try-table.
//! Scripts are shared through `Rc` between function objects, frames and
//! suspended generators.

use crate::opcode::Opcode;
use core_types::{JsString, Value};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a script, unique for the life of the process.
///
/// Property cache entries are keyed by script identity and pc, so ids are
/// never reused even after the script itself is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl ScriptId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScriptId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String literal
    String(JsString),
}

impl Constant {
    /// Converts the constant into a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Number(d) => Value::number(*d),
            Constant::String(s) => Value::String(s.clone()),
        }
    }
}

/// A compile-time lexical block.
///
/// Its locals live on the operand stack starting at `depth`; local `i` is
/// frame slot `nfixed + depth + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockScope {
    /// Operand-stack depth of the first local
    pub depth: u32,
    /// Names of the block's locals, in slot order
    pub names: Vec<JsString>,
}

/// Kind of a protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryKind {
    /// Handler entry is a catch block
    Catch,
    /// Handler entry is a finally block
    Finally,
    /// The region owns an open iterator that must be closed on exit
    Iter,
}

/// Try-table entry.
///
/// The region covers `start..start + length`; the handler entry is the
/// instruction right after the region. `stack_depth` is the operand-stack
/// depth at region entry (for `Iter` it includes the iterator itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryNote {
    /// Handler kind
    pub kind: TryKind,
    /// First protected pc
    pub start: u32,
    /// Number of protected instructions
    pub length: u32,
    /// Operand-stack depth at region entry
    pub stack_depth: u32,
}

impl TryNote {
    /// Returns true if `pc` lies inside the protected region.
    pub fn covers(&self, pc: usize) -> bool {
        (pc as u64).wrapping_sub(self.start as u64) < self.length as u64
    }

    /// The handler entry pc.
    pub fn handler(&self) -> usize {
        (self.start + self.length) as usize
    }
}

/// Static properties of a script discovered by the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptFlags {
    /// Bindings may escape (closures, `arguments`, eval): frames need an
    /// activation record
    pub heavyweight: bool,
    /// The function is a generator
    pub generator: bool,
    /// The function reads `arguments`
    pub uses_arguments: bool,
    /// Strict code
    pub strict: bool,
}

/// Immutable compiled script.
#[derive(Debug)]
pub struct Script {
    /// Process-unique identity
    pub id: ScriptId,
    /// Function name, if any
    pub name: Option<JsString>,
    /// Opcode stream
    pub code: Vec<Opcode>,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// Atom table
    pub atoms: Vec<JsString>,
    /// Nested function scripts
    pub functions: Vec<Rc<Script>>,
    /// Compile-time block scopes
    pub blocks: Vec<BlockScope>,
    /// Try-table, innermost regions first
    pub try_notes: Vec<TryNote>,
    /// Fast-global table: global slot -> atom index
    pub global_names: Vec<u32>,
    /// Formal parameter names
    pub params: Vec<JsString>,
    /// Declared local variable names
    pub vars: Vec<JsString>,
    /// Maximum operand-stack depth
    pub max_stack: u32,
    /// Static flags
    pub flags: ScriptFlags,
}

impl Script {
    /// Number of formal parameters.
    pub fn nargs(&self) -> usize {
        self.params.len()
    }

    /// Number of declared locals (fixed slots before the operand stack).
    pub fn nfixed(&self) -> usize {
        self.vars.len()
    }

    /// Atom at `index`.
    pub fn atom(&self, index: u32) -> Option<&JsString> {
        self.atoms.get(index as usize)
    }

    /// Nested function at `index`.
    pub fn function(&self, index: u32) -> Option<&Rc<Script>> {
        self.functions.get(index as usize)
    }

    /// Block scope at `index`.
    pub fn block(&self, index: u32) -> Option<&BlockScope> {
        self.blocks.get(index as usize)
    }

    /// Global slot of an atom declared at top level, if the compiler gave it one.
    pub fn global_slot_of(&self, atom: u32) -> Option<u16> {
        self.global_names
            .iter()
            .position(|&a| a == atom)
            .map(|slot| slot as u16)
    }

    /// Display name for stack traces.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}
