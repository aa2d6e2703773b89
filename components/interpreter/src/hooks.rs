//! Host hooks: debugger callbacks, the eval compiler and the operation
//! callback.

use crate::error::{VmError, VmResult};
use crate::vm::Vm;
use bytecode_system::Script;
use core_types::{JsError, ObjectId, Value};
use std::rc::Rc;

/// What a debugger trap asks the interpreter to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TrapAction {
    /// Carry on
    Continue,
    /// Leave the current frame with this value
    Return(Value),
    /// Throw this value from the current instruction
    Throw(Value),
}

/// Debugger callbacks. Every method has a no-op default; an engine without
/// hooks installed never calls into this trait.
pub trait DebugHooks {
    /// A function is about to run. `depth` counts live frames.
    fn on_call(&mut self, _callee: Option<ObjectId>, _depth: usize) {}

    /// A frame returned `value`.
    fn on_return(&mut self, _value: &Value, _depth: usize) {}

    /// `value` is being thrown.
    fn on_throw(&mut self, _value: &Value) -> TrapAction {
        TrapAction::Continue
    }

    /// A `Debugger` instruction was reached.
    fn on_trap(&mut self, _script: &Script, _pc: usize) -> TrapAction {
        TrapAction::Continue
    }

    /// A backward branch was taken.
    fn on_branch(&mut self, _script: &Script, _pc: usize) {}
}

/// Compiles source text for direct and indirect `eval`.
pub trait EvalCompiler {
    /// Compiles `source` as an eval script. Syntax problems are reported as
    /// `SyntaxError` records.
    fn compile(&mut self, source: &str) -> Result<Rc<Script>, JsError>;
}

/// Called every `operation_budget` operations; returning false aborts
/// execution.
pub type OperationCallback = Box<dyn FnMut() -> bool>;

impl Vm {
    /// Installs or removes debugger callbacks.
    pub fn set_debug_hooks(&mut self, hooks: Option<Box<dyn DebugHooks>>) {
        self.hooks = hooks;
    }

    /// Installs or removes the operation callback.
    pub fn set_operation_callback(&mut self, callback: Option<OperationCallback>) {
        self.operation_callback = callback;
    }

    /// Installs or removes the eval compiler.
    pub fn set_eval_compiler(&mut self, compiler: Option<Box<dyn EvalCompiler>>) {
        self.eval_compiler = compiler;
    }

    /// Counts one operation at a safe point (backward branch or call). When
    /// the budget runs out, the operation callback decides whether to go on
    /// and an automatic collection may run.
    pub(crate) fn operation_tick(&mut self) -> VmResult<()> {
        self.operations = self.operations.saturating_sub(1);
        if self.operations > 0 {
            return Ok(());
        }
        self.operations = self.config.operation_budget;
        if let Some(callback) = self.operation_callback.as_mut() {
            if !callback() {
                tracing::debug!(target: "vm::unwind", "operation callback aborted execution");
                return Err(VmError::Interrupted);
            }
        }
        self.maybe_collect();
        Ok(())
    }

    pub(crate) fn hook_call(&mut self, callee: Option<ObjectId>) {
        let depth = self.frames.len();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_call(callee, depth);
        }
    }

    pub(crate) fn hook_return(&mut self, value: &Value) {
        let depth = self.frames.len();
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_return(value, depth);
        }
    }

    pub(crate) fn hook_throw(&mut self, value: &Value) -> TrapAction {
        match self.hooks.as_mut() {
            Some(hooks) => hooks.on_throw(value),
            None => TrapAction::Continue,
        }
    }

    pub(crate) fn hook_trap(&mut self, script: &Script, pc: usize) -> TrapAction {
        match self.hooks.as_mut() {
            Some(hooks) => hooks.on_trap(script, pc),
            None => TrapAction::Continue,
        }
    }

    pub(crate) fn hook_branch(&mut self, script: &Script, pc: usize) {
        if let Some(hooks) = self.hooks.as_mut() {
            hooks.on_branch(script, pc);
        }
    }
}
