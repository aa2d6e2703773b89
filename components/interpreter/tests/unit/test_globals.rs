//! Fast globals and the redeclaration policy

use bytecode_system::{IncDec, Opcode, ScriptBuilder};
use core_types::Value;
use interpreter::{EngineConfig, RedeclarationPolicy, Vm, VmError};
use memory_manager::{Attrs, DefineOutcome, PropertyDef};

/// `var x; x = 5; ++x; x` through the fast-global opcodes
fn bump_global() -> std::rc::Rc<bytecode_system::Script> {
    let mut b = ScriptBuilder::new();
    let x = b.global_slot("x");
    let x_atom = b.atom("x");
    b.emit(Opcode::DefVar(x_atom));
    b.emit(Opcode::Int(5));
    b.emit(Opcode::SetGVar(x));
    b.emit(Opcode::Pop);
    b.emit(Opcode::GVarIncDec(x, IncDec::PreInc));
    b.emit(Opcode::Pop);
    b.emit(Opcode::GetGVar(x));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    b.finish().unwrap()
}

#[test]
fn test_declared_global_uses_its_slot() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    assert_eq!(vm.execute(&bump_global()).unwrap(), Value::Smi(6));
    // slot access never consults the property cache
    assert_eq!(vm.cache_stats().probes, 0);
    let global = Value::Object(vm.global());
    assert_eq!(vm.get_property(&global, "x").unwrap(), Value::Smi(6));
}

#[test]
fn test_accessor_global_falls_back_to_name_lookup() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let global = vm.global();
    let getter = vm.create_native_function("get x", 0, |_, _| Ok(Value::Smi(7))).unwrap();
    vm.heap_mut()
        .define_property(global, "x".into(), PropertyDef::getter(getter, Attrs::ENUMERATE | Attrs::PERMANENT))
        .unwrap();

    let mut b = ScriptBuilder::new();
    let x = b.global_slot("x");
    let x_atom = b.atom("x");
    b.emit(Opcode::DefVar(x_atom));
    b.emit(Opcode::GetGVar(x));
    b.emit(Opcode::SetRval);
    b.emit(Opcode::Stop);
    let script = b.finish().unwrap();

    assert_eq!(vm.execute(&script).unwrap(), Value::Smi(7));
    assert!(vm.cache_stats().probes > 0);
}

#[test]
fn test_deletable_global_falls_back_to_name_lookup() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let global = vm.global();
    vm.set_property(global, "x", Value::Smi(1)).unwrap();

    assert_eq!(vm.execute(&bump_global()).unwrap(), Value::Smi(6));
    assert!(vm.cache_stats().probes > 0);
    assert!(vm.delete_property(global, "x").unwrap());
    assert_eq!(vm.peek_property(global, "x"), None);
}

#[test]
fn test_incompatible_redefinition_is_an_error_by_default() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let obj = vm.create_object().unwrap();
    vm.define_property(obj, "k", Value::Smi(1), Attrs::PERMANENT).unwrap();

    let err = vm.define_property(obj, "k", Value::Smi(2), Attrs::ENUMERATE).unwrap_err();
    assert!(matches!(err, VmError::Type(_)), "{:?}", err);
    assert_eq!(vm.peek_property(obj, "k"), Some(Value::Smi(1)));
}

#[test]
fn test_incompatible_redefinition_is_reported_under_warn_policy() {
    let config = EngineConfig::default().with_redeclaration(RedeclarationPolicy::Warn);
    let mut vm = Vm::new(config).unwrap();
    let obj = vm.create_object().unwrap();
    vm.define_property(obj, "k", Value::Smi(1), Attrs::PERMANENT).unwrap();

    let outcome = vm.define_property(obj, "k", Value::Smi(2), Attrs::ENUMERATE).unwrap();
    assert_eq!(outcome, DefineOutcome::Rejected);
    assert_eq!(vm.peek_property(obj, "k"), Some(Value::Smi(1)));
}

#[test]
fn test_compatible_redefinition_updates_value() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let obj = vm.create_object().unwrap();
    vm.define_property(obj, "k", Value::Smi(1), Attrs::PERMANENT).unwrap();
    let outcome = vm.define_property(obj, "k", Value::Smi(2), Attrs::PERMANENT).unwrap();
    assert_eq!(outcome, DefineOutcome::Updated);
    assert_eq!(vm.peek_property(obj, "k"), Some(Value::Smi(2)));
}
