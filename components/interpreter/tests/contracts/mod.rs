//! Contract tests for interpreter API
//!
//! These tests pin the observable behavior hosts rely on.

use bytecode_system::{Constant, Opcode, ScriptBuilder, TryKind};
use core_types::{ErrorKind, Value};
use interpreter::{EngineConfig, RedeclarationPolicy, Vm, VmError};
use std::cell::Cell;
use std::rc::Rc;

fn compare(left: Constant, right: Constant, op: Opcode) -> Value {
    let mut b = ScriptBuilder::new();
    let (l, r) = (b.constant(left), b.constant(right));
    b.emit(Opcode::Const(l));
    b.emit(Opcode::Const(r));
    b.emit(op);
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();
    Vm::new(EngineConfig::default()).unwrap().execute(&script).unwrap()
}

/// Test Vm::new() builds a realm with the fixed globals
#[test]
fn test_vm_new_contract() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let global = Value::Object(vm.global());
    assert_eq!(vm.get_property(&global, "undefined").unwrap(), Value::Undefined);
    assert_eq!(vm.frame_depth(), 0);
    assert!(vm.heap().len() > 0);
}

/// Test Vm::execute() returns the return value register
#[test]
fn test_vm_execute_contract() {
    let mut b = ScriptBuilder::new();
    b.emit(Opcode::Int(42));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(42));
}

/// Test numeric and equality laws
#[test]
fn test_equality_laws_contract() {
    let nan = || Constant::Number(f64::NAN);
    let ten = || Constant::String("10".into());
    assert_eq!(compare(nan(), nan(), Opcode::StrictEq), Value::Boolean(false));
    assert_eq!(compare(nan(), nan(), Opcode::Eq), Value::Boolean(false));
    assert_eq!(
        compare(Constant::Number(0.0), Constant::Number(-0.0), Opcode::StrictEq),
        Value::Boolean(true)
    );
    assert_eq!(compare(ten(), Constant::Number(10.0), Opcode::Eq), Value::Boolean(true));
    assert_eq!(compare(ten(), Constant::Number(10.0), Opcode::StrictEq), Value::Boolean(false));
    for op in [Opcode::Lt, Opcode::Le, Opcode::Gt, Opcode::Ge] {
        assert_eq!(compare(nan(), Constant::Number(1.0), op.clone()), Value::Boolean(false));
        assert_eq!(compare(Constant::Number(1.0), nan(), op), Value::Boolean(false));
    }
}

/// Test an uncaught throw reaches the host as VmError::Throw
#[test]
fn test_uncaught_throw_contract() {
    let mut b = ScriptBuilder::new();
    let s = b.string("boom");
    b.emit(Opcode::Const(s));
    b.emit(Opcode::Throw);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let err = vm.execute(&script).unwrap_err();
    assert_eq!(err, VmError::Throw(Value::from("boom")));
    let record = err.to_js_error(&vm);
    assert_eq!(record.kind, ErrorKind::Thrown);
    assert_eq!(record.message, "boom");
    assert_eq!(vm.frame_depth(), 0);
}

/// Test `try { return 1 } finally { effect() }` runs the finally once
#[test]
fn test_return_through_finally_contract() {
    for overrides in [false, true] {
        let mut b = ScriptBuilder::function("f", &[]);
        let effect = b.atom("effect");
        let (start, fin) = (b.mark(), b.label());
        b.emit(Opcode::Int(1));
        b.emit(Opcode::SetRval);
        b.branch(Opcode::Gosub(0), fin);
        b.emit(Opcode::RetRval);
        b.bind(fin);
        b.try_note(TryKind::Finally, start, fin, 0);
        b.emit(Opcode::Finally);
        b.emit(Opcode::CallName(effect));
        b.emit(Opcode::Call(0));
        b.emit(Opcode::Pop);
        if overrides {
            b.emit(Opcode::Int(2));
            b.emit(Opcode::Return);
        } else {
            b.emit(Opcode::Retsub);
        }
        let script = b.finish().unwrap();

        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let mut vm = Vm::new(EngineConfig::default()).unwrap();
        vm.define_native("effect", 0, move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Undefined)
        })
        .unwrap();
        let f = Value::Object(vm.create_function(&script).unwrap());
        let expected = if overrides { Value::Smi(2) } else { Value::Smi(1) };
        assert_eq!(vm.call(&f, &Value::Undefined, &[]).unwrap(), expected);
        assert_eq!(runs.get(), 1);
    }
}

/// Test exhausting the operand stack is fatal and not catchable
#[test]
fn test_stack_overflow_contract() {
    let mut b = ScriptBuilder::function("deep", &[]);
    let deep = b.atom("deep");
    let (start, handler) = (b.mark(), b.label());
    b.emit(Opcode::CallName(deep));
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Return);
    b.bind(handler);
    b.try_note(TryKind::Catch, start, handler, 0);
    b.emit(Opcode::Exception);
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let config = EngineConfig::default().with_stack_segment_values(64).with_max_stack_values(256);
    let mut vm = Vm::new(config).unwrap();
    let deep_fn = vm.create_function(&script).unwrap();
    let global = vm.global();
    vm.set_property(global, "deep", Value::Object(deep_fn)).unwrap();

    let err = vm.call(&Value::Object(deep_fn), &Value::Undefined, &[]).unwrap_err();
    assert_eq!(err, VmError::StackOverflow);
    assert!(!err.is_catchable());
    assert_eq!(vm.frame_depth(), 0);
}

/// Test allocation failure is catchable
#[test]
fn test_out_of_memory_contract() {
    let realm_size = Vm::new(EngineConfig::default()).unwrap().heap().len();
    let mut b = ScriptBuilder::new();
    let (start, handler) = (b.mark(), b.label());
    b.emit(Opcode::NewObject);
    b.emit(Opcode::NewObject);
    b.emit(Opcode::NewObject);
    b.emit(Opcode::PopN(3));
    b.emit(Opcode::Stop);
    b.bind(handler);
    b.try_note(TryKind::Catch, start, handler, 0);
    b.emit(Opcode::Exception);
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default().with_heap_limit(realm_size + 1)).unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::from("out of memory"));
}

/// Test EngineConfig::from_json() keeps defaults for missing fields
#[test]
fn test_config_json_contract() {
    let config = EngineConfig::from_json(r#"{ "redeclaration": "warn", "strict": true }"#).unwrap();
    assert_eq!(config.redeclaration, RedeclarationPolicy::Warn);
    assert!(config.strict);
    assert_eq!(config.max_call_depth, EngineConfig::default().max_call_depth);
}
