//! Calls, construction and frame limits

use bytecode_system::{Opcode, Script, ScriptBuilder};
use core_types::{ErrorKind, Value};
use interpreter::{EngineConfig, Vm, VmError};
use memory_manager::Attrs;
use std::rc::Rc;

fn function(vm: &mut Vm, script: &Rc<Script>) -> Value {
    Value::Object(vm.create_function(script).unwrap())
}

#[test]
fn test_missing_parameters_are_undefined() {
    let mut b = ScriptBuilder::function("f", &["a", "b", "c"]);
    b.emit(Opcode::GetArg(2));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let result = vm.call(&f, &Value::Undefined, &[Value::Smi(1)]).unwrap();
    assert_eq!(result, Value::Undefined);
}

#[test]
fn test_arguments_length_counts_actuals() {
    let mut b = ScriptBuilder::function("f", &["a", "b", "c"]);
    b.uses_arguments();
    let length = b.atom("length");
    b.emit(Opcode::Arguments);
    b.emit(Opcode::GetProp(length));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let one = vm.call(&f, &Value::Undefined, &[Value::Smi(1)]).unwrap();
    assert_eq!(one, Value::Smi(1));
    let five = vm.call(&f, &Value::Undefined, &vec![Value::Smi(1); 5]).unwrap();
    assert_eq!(five, Value::Smi(5));
}

#[test]
fn test_extra_actuals_are_reachable_through_arguments() {
    let mut b = ScriptBuilder::function("f", &["a"]);
    b.uses_arguments();
    b.emit(Opcode::Arguments);
    b.emit(Opcode::Int(2));
    b.emit(Opcode::GetElem);
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let args = [Value::Smi(1), Value::Smi(2), Value::Smi(3)];
    assert_eq!(vm.call(&f, &Value::Undefined, &args).unwrap(), Value::Smi(3));
}

#[test]
fn test_construct_ignores_primitive_result() {
    let mut b = ScriptBuilder::function("F", &[]);
    let x = b.atom("x");
    b.emit(Opcode::This);
    b.emit(Opcode::Int(1));
    b.emit(Opcode::SetProp(x));
    b.emit(Opcode::Pop);
    b.emit(Opcode::Int(5));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let Value::Object(obj) = vm.construct(&f, &[]).unwrap() else {
        panic!("construct must produce an object");
    };
    assert_eq!(vm.peek_property(obj, "x"), Some(Value::Smi(1)));
}

#[test]
fn test_construct_keeps_object_result() {
    let mut b = ScriptBuilder::function("F", &[]);
    let (x, y) = (b.atom("x"), b.atom("y"));
    b.emit(Opcode::This);
    b.emit(Opcode::Int(1));
    b.emit(Opcode::SetProp(x));
    b.emit(Opcode::Pop);
    b.emit(Opcode::NewObject);
    b.emit(Opcode::Int(2));
    b.emit(Opcode::InitProp(y));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let Value::Object(obj) = vm.construct(&f, &[]).unwrap() else {
        panic!("construct must produce an object");
    };
    assert_eq!(vm.peek_property(obj, "y"), Some(Value::Smi(2)));
    assert_eq!(vm.peek_property(obj, "x"), None);
}

#[test]
fn test_constructed_object_inherits_prototype_property() {
    let mut b = ScriptBuilder::function("F", &[]);
    b.emit(Opcode::Undefined);
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let fid = vm.create_function(&script).unwrap();
    let proto = vm.create_object().unwrap();
    vm.define_property(proto, "kind", Value::from("F"), Attrs::NONE).unwrap();
    vm.define_property(fid, "prototype", Value::Object(proto), Attrs::NONE).unwrap();

    let f = Value::Object(fid);

    let obj = vm.construct(&f, &[]).unwrap();
    assert_eq!(vm.get_property(&obj, "kind").unwrap(), Value::from("F"));
}

#[test]
fn test_interpreted_call_from_bytecode() {
    let mut callee = ScriptBuilder::function("add", &["a", "b"]);
    callee.emit(Opcode::GetArg(0));
    callee.emit(Opcode::GetArg(1));
    callee.emit(Opcode::Add);
    callee.emit(Opcode::Return);
    let callee = callee.finish().unwrap();

    let mut b = ScriptBuilder::new();
    let add = b.atom("add");
    let f = b.nested(callee);
    b.emit(Opcode::DefFun(f));
    b.emit(Opcode::CallName(add));
    b.emit(Opcode::Int(40));
    b.emit(Opcode::Int(2));
    b.emit(Opcode::Call(2));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(42));
    assert_eq!(vm.frame_depth(), 0);
}

#[test]
fn test_native_receives_this_and_arguments() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    vm.define_native("second", 2, |_, args| Ok(args.arg(1))).unwrap();

    let mut b = ScriptBuilder::new();
    let second = b.atom("second");
    b.emit(Opcode::CallName(second));
    b.emit(Opcode::Int(1));
    b.emit(Opcode::Int(2));
    b.emit(Opcode::Call(2));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(2));
}

#[test]
fn test_runaway_recursion_is_range_error() {
    let mut b = ScriptBuilder::function("rec", &[]);
    let rec = b.atom("rec");
    b.emit(Opcode::CallName(rec));
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default().with_max_call_depth(50)).unwrap();
    let f = function(&mut vm, &script);
    let global = vm.global();
    vm.define_property(global, "rec", f.clone(), Attrs::NONE).unwrap();

    let err = vm.call(&f, &Value::Undefined, &[]).unwrap_err();
    assert_eq!(err.to_js_error(&vm).kind, ErrorKind::RangeError);
    assert_eq!(vm.frame_depth(), 0);
}

#[test]
fn test_calling_a_primitive_is_type_error() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let err = vm.call(&Value::Smi(3), &Value::Undefined, &[]).unwrap_err();
    assert!(matches!(err, VmError::Type(_)));
}

#[test]
fn test_too_many_arguments_is_range_error() {
    let mut vm = Vm::new(EngineConfig::default().with_max_arguments(2)).unwrap();
    let f = vm.create_native_function("noop", 0, |_, _| Ok(Value::Undefined)).unwrap();
    let err = vm.call(&Value::Object(f), &Value::Undefined, &vec![Value::Null; 3]).unwrap_err();
    assert!(matches!(err, VmError::Range(_)));
}

#[test]
fn test_sloppy_callee_sees_global_this() {
    let mut b = ScriptBuilder::function("who", &[]);
    b.emit(Opcode::This);
    b.emit(Opcode::Return);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = function(&mut vm, &script);
    let global = Value::Object(vm.global());
    assert_eq!(vm.call(&f, &Value::Undefined, &[]).unwrap(), global);
}

#[test]
fn test_failed_activation_leaves_no_frame() {
    let realm_size = Vm::new(EngineConfig::default()).unwrap().heap().len();

    let mut heavy = ScriptBuilder::function("heavy", &["a"]);
    heavy.heavyweight();
    heavy.emit(Opcode::GetArg(0));
    heavy.emit(Opcode::Return);
    let heavy = heavy.finish().unwrap();
    let mut light = ScriptBuilder::function("light", &[]);
    light.emit(Opcode::Int(3));
    light.emit(Opcode::Return);
    let light = light.finish().unwrap();

    // room for the two function objects but not for an activation record
    let mut vm = Vm::new(EngineConfig::default().with_heap_limit(realm_size + 2)).unwrap();
    let heavy = function(&mut vm, &heavy);
    let light = function(&mut vm, &light);

    assert!(vm.call(&heavy, &Value::Undefined, &[Value::Smi(1)]).is_err());
    assert_eq!(vm.frame_depth(), 0);
    assert_eq!(vm.call(&light, &Value::Undefined, &[]).unwrap(), Value::Smi(3));
}
