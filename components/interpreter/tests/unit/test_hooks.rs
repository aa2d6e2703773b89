//! Debugger hooks, the operation callback and eval

use bytecode_system::{Opcode, Script, ScriptBuilder};
use core_types::{JsError, ObjectId, Value};
use interpreter::{DebugHooks, EngineConfig, EvalCompiler, TrapAction, Vm, VmError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Recorder {
    events: Rc<RefCell<Vec<String>>>,
    trap: Option<TrapAction>,
}

impl DebugHooks for Recorder {
    fn on_call(&mut self, _callee: Option<ObjectId>, depth: usize) {
        self.events.borrow_mut().push(format!("call {}", depth));
    }

    fn on_return(&mut self, value: &Value, depth: usize) {
        self.events.borrow_mut().push(format!("return {} {}", value, depth));
    }

    fn on_throw(&mut self, value: &Value) -> TrapAction {
        self.events.borrow_mut().push(format!("throw {}", value));
        TrapAction::Continue
    }

    fn on_trap(&mut self, _script: &Script, pc: usize) -> TrapAction {
        self.events.borrow_mut().push(format!("trap {}", pc));
        self.trap.clone().unwrap_or(TrapAction::Continue)
    }
}

fn trapping_function() -> Rc<Script> {
    let mut b = ScriptBuilder::function("paused", &[]);
    b.emit(Opcode::Debugger);
    b.emit(Opcode::Int(1));
    b.emit(Opcode::Return);
    b.finish().unwrap()
}

#[test]
fn test_hooks_see_calls_and_returns() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    vm.set_debug_hooks(Some(Box::new(Recorder { events: Rc::clone(&events), trap: None })));

    let f = vm.create_function(&trapping_function()).unwrap();
    assert_eq!(vm.call(&Value::Object(f), &Value::Undefined, &[]).unwrap(), Value::Smi(1));
    assert_eq!(*events.borrow(), vec!["call 1", "trap 0", "return 1 1"]);
}

#[test]
fn test_trap_can_force_a_return() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let trap = Some(TrapAction::Return(Value::Smi(9)));
    vm.set_debug_hooks(Some(Box::new(Recorder { events, trap })));

    let f = vm.create_function(&trapping_function()).unwrap();
    assert_eq!(vm.call(&Value::Object(f), &Value::Undefined, &[]).unwrap(), Value::Smi(9));
    assert_eq!(vm.frame_depth(), 0);
}

#[test]
fn test_trap_can_throw() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let trap = Some(TrapAction::Throw(Value::from("stop")));
    vm.set_debug_hooks(Some(Box::new(Recorder { events: Rc::default(), trap })));

    let f = vm.create_function(&trapping_function()).unwrap();
    let err = vm.call(&Value::Object(f), &Value::Undefined, &[]).unwrap_err();
    assert_eq!(err, VmError::Throw(Value::from("stop")));
}

#[test]
fn test_operation_callback_runs_on_backward_branches() {
    let mut b = ScriptBuilder::new();
    let i = b.global_slot("i");
    let i_atom = b.atom("i");
    b.emit(Opcode::DefVar(i_atom));
    b.emit(Opcode::Int(0));
    b.emit(Opcode::SetGVar(i));
    b.emit(Opcode::Pop);
    let (top, done) = (b.mark(), b.label());
    b.emit(Opcode::GetGVar(i));
    b.emit(Opcode::Int(100));
    b.emit(Opcode::Lt);
    b.branch(Opcode::IfEq(0), done);
    b.emit(Opcode::GVarIncDec(i, bytecode_system::IncDec::PreInc));
    b.emit(Opcode::Pop);
    b.branch(Opcode::Goto(0), top);
    b.bind(done);
    b.emit(Opcode::GetGVar(i));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&ticks);
    let mut vm = Vm::new(EngineConfig::default().with_operation_budget(10)).unwrap();
    vm.set_operation_callback(Some(Box::new(move || {
        seen.set(seen.get() + 1);
        true
    })));
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(100));
    assert_eq!(ticks.get(), 10);
}

struct Fixed(Rc<Script>);

impl EvalCompiler for Fixed {
    fn compile(&mut self, _source: &str) -> Result<Rc<Script>, JsError> {
        Ok(Rc::clone(&self.0))
    }
}

#[test]
fn test_direct_eval_sees_caller_locals() {
    let mut code = ScriptBuilder::new();
    let a = code.atom("a");
    code.emit(Opcode::Name(a));
    code.emit(Opcode::Int(1));
    code.emit(Opcode::Add);
    code.emit(Opcode::SetRval);
    code.emit(Opcode::Stop);
    let code = code.finish().unwrap();

    let mut b = ScriptBuilder::function("f", &["a"]);
    let eval = b.atom("eval");
    let src = b.string("a + 1");
    b.emit(Opcode::CallName(eval));
    b.emit(Opcode::Const(src));
    b.emit(Opcode::Eval(1));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    vm.set_eval_compiler(Some(Box::new(Fixed(code))));
    let f = vm.create_function(&script).unwrap();
    let result = vm.call(&Value::Object(f), &Value::Undefined, &[Value::Smi(41)]).unwrap();
    assert_eq!(result, Value::Smi(42));
}

#[test]
fn test_eval_without_compiler_fails() {
    let mut b = ScriptBuilder::new();
    let eval = b.atom("eval");
    let src = b.string("1");
    b.emit(Opcode::CallName(eval));
    b.emit(Opcode::Const(src));
    b.emit(Opcode::Eval(1));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert!(vm.execute(&script).is_err());
}
