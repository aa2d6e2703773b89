//! Integration test suite for the execution core
//!
//! Verifies the bytecode images, the object model and the interpreter
//! working together across component boundaries.

use bytecode_system::{Opcode, Script, ScriptBuilder};
use interpreter::{EngineConfig, Vm};
use std::rc::Rc;

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use memory_manager;
}

/// Routes engine logs to the test harness. `RUST_LOG=vm::cache=trace`
/// shows cache traffic, for example.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine with default configuration and logging set up.
pub fn engine() -> Vm {
    engine_with(EngineConfig::default())
}

/// An engine with `config` and logging set up.
pub fn engine_with(config: EngineConfig) -> Vm {
    init_tracing();
    match Vm::new(config) {
        Ok(vm) => vm,
        Err(err) => panic!("engine creation failed: {}", err),
    }
}

/// Assembles a top-level script with `build`, ending it with `SetRval; Stop`.
pub fn program(build: impl FnOnce(&mut ScriptBuilder)) -> Rc<Script> {
    let mut b = ScriptBuilder::new();
    build(&mut b);
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    match b.finish() {
        Ok(script) => script,
        Err(err) => panic!("script rejected: {}", err),
    }
}
