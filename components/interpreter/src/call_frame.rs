//! Call frames.
//!
//! A frame's storage lives in one arena segment, laid out as
//! `[callee, this, args.., padding.., vars.., operand stack..]`. The frame
//! record itself only keeps offsets into it.

use bytecode_system::Script;
use core_types::{ObjectId, Value};
use std::rc::Rc;

/// Lifecycle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Pushed, no instruction executed yet
    Created,
    /// Executing
    Running,
    /// Tearing down after a return
    Returning,
    /// Searching for a handler
    Throwing,
    /// Saved into a generator
    Suspended,
}

/// A compile-time block open in a frame, with its scope-chain clone if one
/// was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenBlock {
    /// Index into the script's block table
    pub index: u32,
    /// Operand-stack depth of the block's first local
    pub depth: u32,
    /// Clone reflecting the block onto the scope chain
    pub clone: Option<ObjectId>,
}

/// Resolution state of a fast-global slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastGlobal {
    /// Use ordinary name resolution
    Name,
    /// Read and write this slot of the global object directly
    Slot(u32),
}

/// Frame flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Invoked by `new`
    pub constructing: bool,
    /// Running code for a direct eval
    pub eval: bool,
    /// Returning from this frame returns to the host (or native) that pushed it
    pub entry: bool,
}

/// An activation of a script.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Code being run
    pub script: Rc<Script>,
    /// Function object being run; `None` for top-level scripts
    pub callee: Option<ObjectId>,
    /// Arena segment holding the frame's storage
    pub seg: usize,
    /// Index of the callee value in the segment
    pub base: usize,
    /// Number of actual arguments
    pub argc: usize,
    /// Number of argument slots (`max(nargs, argc)`)
    pub nslots: usize,
    /// Current instruction
    pub pc: usize,
    /// Return value register
    pub rval: Value,
    /// Head of the scope chain
    pub scope_chain: ObjectId,
    /// Object receiving `var` and function declarations
    pub var_obj: Option<ObjectId>,
    /// Activation record, once materialized
    pub call_obj: Option<ObjectId>,
    /// Reified `arguments`
    pub args_obj: Option<ObjectId>,
    /// Open compile-time blocks, innermost last
    pub blocks: Vec<OpenBlock>,
    /// Fast-global table
    pub fast_globals: Vec<FastGlobal>,
    /// Flags
    pub flags: FrameFlags,
    /// Lifecycle state
    pub state: FrameState,
    /// Number of `with` scopes this frame has open
    pub with_count: u32,
    /// Generator object owning this frame
    pub generator: Option<ObjectId>,
}

impl Frame {
    /// Index of `this`.
    pub fn this_index(&self) -> usize {
        self.base + 1
    }

    /// Index of the first argument.
    pub fn argv(&self) -> usize {
        self.base + 2
    }

    /// Index of the first local variable.
    pub fn vars(&self) -> usize {
        self.argv() + self.nslots
    }

    /// Index of the bottom of the operand stack.
    pub fn spbase(&self) -> usize {
        self.vars() + self.script.nfixed()
    }

    /// Values needed beyond the arguments: locals plus the deepest operand
    /// stack.
    pub fn extent(script: &Script) -> usize {
        script.nfixed() + script.max_stack as usize
    }

    /// True for frames running a function body.
    pub fn is_function(&self) -> bool {
        self.callee.is_some() && !self.flags.eval
    }
}
