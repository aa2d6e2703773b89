//! Bytecode image consumed by the execution core
//!
//! The compiler is an external collaborator; this crate defines what it
//! hands over: the stack-machine instruction set, the immutable [`Script`]
//! image with its constant/atom/function/block tables and try-table, a
//! [`ScriptBuilder`] for assembling images by hand, and the verifier that
//! rejects malformed images before they run.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//!
//! let mut b = ScriptBuilder::new();
//! let k = b.number(40.5);
//! b.emit(Opcode::Const(k));
//! b.emit(Opcode::Int(2));
//! b.emit(Opcode::Add);
//! b.emit(Opcode::SetRval);
//! b.emit(Opcode::Stop);
//!
//! let script = b.finish().unwrap();
//! assert_eq!(script.max_stack, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod opcode;
pub mod script;
pub mod verify;

pub use builder::{Label, ScriptBuilder};
pub use opcode::{AtomIndex, ConstIndex, IncDec, IterKind, Opcode};
pub use script::{BlockScope, Constant, Script, ScriptFlags, ScriptId, TryKind, TryNote};
pub use verify::{verify, VerifyError};
