//! Bytecode interpreter for JavaScript runtime
//!
//! This crate executes verified [`bytecode_system::Script`] images against
//! the object model of [`memory_manager`]:
//! - Frames in a segmented operand-stack arena, lightweight until
//!   something needs their activation record
//! - Scope chains with lazily cloned blocks and `with` scopes
//! - A property cache keyed by bytecode site and shape
//! - Tagged-integer fast paths for arithmetic and increments
//! - Try-note driven unwinding with catch, finally and iterator cleanup
//! - Generators, iteration protocols and operation-count cancellation
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//! use core_types::Value;
//! use interpreter::{EngineConfig, Vm};
//!
//! let mut b = ScriptBuilder::new();
//! let x = b.atom("x");
//! b.emit(Opcode::DefVar(x));
//! b.emit(Opcode::BindName(x));
//! b.emit(Opcode::Int(20));
//! b.emit(Opcode::SetName(x));
//! b.emit(Opcode::Pop);
//! b.emit(Opcode::NameIncDec(x, bytecode_system::IncDec::PreInc));
//! b.emit(Opcode::SetRval);
//! b.emit(Opcode::Stop);
//! let script = b.finish().unwrap();
//!
//! let mut vm = Vm::new(EngineConfig::default()).unwrap();
//! assert_eq!(vm.execute(&script).unwrap(), Value::Smi(21));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
pub mod error;
pub mod generator;
pub mod hooks;
pub mod native;
pub mod property_cache;
pub mod stack_arena;
pub mod vm;

mod activation;
mod conversions;
mod dispatch;
mod gc_integration;
mod invoke;
mod iteration;
mod object_ops;
mod scope_chain;
mod unwind;

// Re-export main types at crate root
pub use call_frame::{FastGlobal, Frame, FrameFlags, FrameState, OpenBlock};
pub use config::{EngineConfig, RedeclarationPolicy};
pub use error::{VmError, VmResult};
pub use generator::{GeneratorResult, GeneratorStatus, ResumeMode};
pub use hooks::{DebugHooks, EvalCompiler, OperationCallback, TrapAction};
pub use native::{NativeArgs, NativeFn};
pub use property_cache::{CacheStats, PropertyCache};
pub use stack_arena::StackArena;
pub use vm::{Realm, Vm};
