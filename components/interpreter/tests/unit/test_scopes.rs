//! Scope chain: blocks, `with` and closures

use bytecode_system::{IncDec, Opcode, ScriptBuilder, TryKind};
use core_types::Value;
use interpreter::{EngineConfig, Vm};

#[test]
fn test_block_local_lives_in_the_frame() {
    let mut b = ScriptBuilder::new();
    let blk = b.block(0, &["y"]);
    b.emit(Opcode::EnterBlock(blk));
    b.emit(Opcode::Int(6));
    b.emit(Opcode::SetLocal(0));
    b.emit(Opcode::Pop);
    b.emit(Opcode::LocalIncDec(0, IncDec::PreInc));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::LeaveBlock(blk));
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(7));
}

#[test]
fn test_closure_keeps_block_value_after_block_exit() {
    let mut inner = ScriptBuilder::function("peek", &[]);
    let y = inner.atom("y");
    inner.emit(Opcode::Name(y));
    inner.emit(Opcode::Return);
    let inner = inner.finish().unwrap();

    let mut b = ScriptBuilder::new();
    let blk = b.block(0, &["y"]);
    let f = b.nested(inner);
    b.emit(Opcode::EnterBlock(blk));
    b.emit(Opcode::Int(6));
    b.emit(Opcode::SetLocal(0));
    b.emit(Opcode::Pop);
    b.emit(Opcode::Lambda(f));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Int(8));
    b.emit(Opcode::SetLocal(0));
    b.emit(Opcode::Pop);
    b.emit(Opcode::LeaveBlock(blk));
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let peek = vm.execute(&script).unwrap();
    assert_eq!(vm.call(&peek, &Value::Undefined, &[]).unwrap(), Value::Smi(8));
}

#[test]
fn test_with_scope_resolves_object_properties_first() {
    let mut b = ScriptBuilder::new();
    let v = b.atom("v");
    b.emit(Opcode::DefVar(v));
    b.emit(Opcode::BindName(v));
    b.emit(Opcode::Int(1));
    b.emit(Opcode::SetName(v));
    b.emit(Opcode::Pop);
    b.emit(Opcode::NewObject);
    b.emit(Opcode::Int(4));
    b.emit(Opcode::InitProp(v));
    b.emit(Opcode::EnterWith);
    b.emit(Opcode::Name(v));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::LeaveWith);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(4));
    let global = Value::Object(vm.global());
    assert_eq!(vm.get_property(&global, "v").unwrap(), Value::Smi(1));
}

#[test]
fn test_with_on_null_is_catchable_type_error() {
    let mut b = ScriptBuilder::new();
    let (start, handler) = (b.mark(), b.label());
    b.emit(Opcode::Null);
    b.emit(Opcode::EnterWith);
    b.emit(Opcode::LeaveWith);
    b.emit(Opcode::Stop);
    b.bind(handler);
    b.try_note(TryKind::Catch, start, handler, 0);
    b.emit(Opcode::Exception);
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let Value::Object(err) = vm.execute(&script).unwrap() else {
        panic!("expected an error object");
    };
    assert_eq!(vm.peek_property(err, "name"), Some(Value::from("TypeError")));
}

#[test]
fn test_counter_closure_shares_activation() {
    let mut inc = ScriptBuilder::function("inc", &[]);
    let n = inc.atom("n");
    inc.emit(Opcode::NameIncDec(n, IncDec::PreInc));
    inc.emit(Opcode::Return);
    let inc = inc.finish().unwrap();

    let mut make = ScriptBuilder::function("counter", &[]);
    make.heavyweight();
    make.var("n");
    let f = make.nested(inc);
    make.emit(Opcode::Int(0));
    make.emit(Opcode::SetLocal(0));
    make.emit(Opcode::Pop);
    make.emit(Opcode::Lambda(f));
    make.emit(Opcode::Return);
    let make = make.finish().unwrap();

    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let counter = Value::Object(vm.create_function(&make).unwrap());
    let first = vm.call(&counter, &Value::Undefined, &[]).unwrap();
    let second = vm.call(&counter, &Value::Undefined, &[]).unwrap();

    assert_eq!(vm.call(&first, &Value::Undefined, &[]).unwrap(), Value::Smi(1));
    assert_eq!(vm.call(&first, &Value::Undefined, &[]).unwrap(), Value::Smi(2));
    assert_eq!(vm.call(&second, &Value::Undefined, &[]).unwrap(), Value::Smi(1));
}
