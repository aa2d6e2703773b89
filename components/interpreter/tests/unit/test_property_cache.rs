//! Property cache behavior observed through the engine

use bytecode_system::{Opcode, Script, ScriptBuilder};
use core_types::Value;
use interpreter::{EngineConfig, Vm};
use memory_manager::Attrs;
use std::rc::Rc;

/// `function (o) { return o.key; }`
fn reader(key: &str) -> Rc<Script> {
    let mut b = ScriptBuilder::function("read", &["o"]);
    let k = b.atom(key);
    b.emit(Opcode::GetArg(0));
    b.emit(Opcode::GetProp(k));
    b.emit(Opcode::Return);
    b.finish().unwrap()
}

/// `function (o) { return o.key(); }`
fn method_caller(key: &str) -> Rc<Script> {
    let mut b = ScriptBuilder::function("invoke", &["o"]);
    let k = b.atom(key);
    b.emit(Opcode::GetArg(0));
    b.emit(Opcode::CallProp(k));
    b.emit(Opcode::Call(0));
    b.emit(Opcode::Return);
    b.finish().unwrap()
}

#[test]
fn test_inherited_method_hits_for_sibling_objects() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = Value::Object(vm.create_function(&method_caller("valueOf")).unwrap());
    let a = Value::Object(vm.create_object().unwrap());
    let b = Value::Object(vm.create_object().unwrap());

    assert_eq!(vm.call(&f, &Value::Undefined, &[a.clone()]).unwrap(), a);
    let cold = vm.cache_stats();
    assert_eq!(cold.hits, 0);
    assert_eq!(cold.fills, 1);

    assert_eq!(vm.call(&f, &Value::Undefined, &[b.clone()]).unwrap(), b);
    assert_eq!(vm.cache_stats().hits, cold.hits + 1);
}

#[test]
fn test_shape_change_forces_a_miss() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = Value::Object(vm.create_function(&reader("x")).unwrap());
    let obj = vm.create_object().unwrap();
    vm.define_property(obj, "x", Value::Smi(1), Attrs::ENUMERATE).unwrap();
    let o = Value::Object(obj);

    assert_eq!(vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap(), Value::Smi(1));
    assert_eq!(vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap(), Value::Smi(1));
    let warm = vm.cache_stats();
    assert_eq!(warm.hits, 1);

    vm.define_property(obj, "y", Value::Smi(2), Attrs::ENUMERATE).unwrap();
    assert!(vm.delete_property(obj, "x").unwrap());
    vm.define_property(obj, "x", Value::Smi(3), Attrs::ENUMERATE).unwrap();
    assert_eq!(vm.call(&f, &Value::Undefined, &[o]).unwrap(), Value::Smi(3));
    assert_eq!(vm.cache_stats().hits, warm.hits);
}

#[test]
fn test_shadowing_an_inherited_property_is_seen() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = Value::Object(vm.create_function(&reader("m")).unwrap());
    let proto = vm.create_object().unwrap();
    vm.define_property(proto, "m", Value::Smi(1), Attrs::NONE).unwrap();
    let obj = vm.create_object().unwrap();
    vm.set_prototype(obj, Some(proto)).unwrap();
    let o = Value::Object(obj);

    assert_eq!(vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap(), Value::Smi(1));
    vm.set_property(obj, "m", Value::Smi(2)).unwrap();
    assert_eq!(vm.call(&f, &Value::Undefined, &[o]).unwrap(), Value::Smi(2));
}

#[test]
fn test_disabled_cache_gives_same_results() {
    for enabled in [true, false] {
        let mut vm = Vm::new(EngineConfig::default().with_property_cache(enabled)).unwrap();
        let f = Value::Object(vm.create_function(&reader("x")).unwrap());
        let mut total = 0;
        for i in 0..4 {
            let obj = vm.create_object().unwrap();
            vm.define_property(obj, "x", Value::Smi(i), Attrs::ENUMERATE).unwrap();
            if let Value::Smi(n) = vm.call(&f, &Value::Undefined, &[Value::Object(obj)]).unwrap() {
                total += n;
            }
        }
        assert_eq!(total, 6);
        let stats = vm.cache_stats();
        if enabled {
            assert_eq!(stats.hits, 3);
        } else {
            assert_eq!(stats.probes, 0);
        }
    }
}

#[test]
fn test_flush_drops_entries() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = Value::Object(vm.create_function(&reader("x")).unwrap());
    let obj = vm.create_object().unwrap();
    vm.define_property(obj, "x", Value::Smi(1), Attrs::ENUMERATE).unwrap();
    let o = Value::Object(obj);

    vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap();
    vm.flush_property_cache();
    vm.call(&f, &Value::Undefined, &[o]).unwrap();
    let stats = vm.cache_stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.fills, 2);
    assert!(stats.flushes >= 1);
}

#[test]
fn test_redefined_method_on_branded_prototype_is_called() {
    let mut vm = Vm::new(EngineConfig::default()).unwrap();
    let f = Value::Object(vm.create_function(&method_caller("m")).unwrap());
    let one = vm.create_native_function("m", 0, |_, _| Ok(Value::Smi(1))).unwrap();
    let proto = vm.create_object().unwrap();
    vm.define_property(proto, "m", Value::Object(one), Attrs::NONE).unwrap();
    let obj = vm.create_object().unwrap();
    vm.set_prototype(obj, Some(proto)).unwrap();
    let o = Value::Object(obj);

    assert_eq!(vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap(), Value::Smi(1));
    assert_eq!(vm.call(&f, &Value::Undefined, &[o.clone()]).unwrap(), Value::Smi(1));
    let warm = vm.cache_stats();
    assert_eq!(warm.hits, 1);

    // same attributes, new function: only the slot changes
    let two = vm.create_native_function("m", 0, |_, _| Ok(Value::Smi(2))).unwrap();
    vm.define_property(proto, "m", Value::Object(two), Attrs::NONE).unwrap();
    assert_eq!(vm.call(&f, &Value::Undefined, &[o]).unwrap(), Value::Smi(2));
    assert_eq!(vm.cache_stats().hits, warm.hits);
}
