//! Contract tests for the public heap API

use core_types::{JsError, JsString, ObjectId, Value};
use memory_manager::{
    Attrs, Class, ClassHooks, DefineOutcome, Heap, ObjectPayload, PropertyDef,
};
use std::rc::Rc;

struct Lazy;

impl ClassHooks for Lazy {
    fn name(&self) -> &str {
        "Lazy"
    }

    fn resolve(&self, heap: &mut Heap, obj: ObjectId, key: &JsString) -> Result<bool, JsError> {
        if key.as_str() != "answer" {
            return Ok(false);
        }
        heap.define_property(obj, key.clone(), PropertyDef::data(Value::Smi(42), Attrs::ENUMERATE))?;
        Ok(true)
    }
}

#[test]
fn contract_host_resolve_hook_defines_on_demand() {
    let mut heap = Heap::new();
    let obj = heap.allocate(Class::Host(Rc::new(Lazy)), None, None, ObjectPayload::None).unwrap();
    let found = heap.lookup(obj, &"answer".into()).unwrap().unwrap();
    assert_eq!(found.holder, obj);
    assert_eq!(heap.get_slot(obj, found.prop.slot.unwrap()).unwrap(), Value::Smi(42));
    assert!(heap.lookup(obj, &"other".into()).unwrap().is_none());
}

#[test]
fn contract_define_outcomes() {
    let mut heap = Heap::new();
    let obj = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    let def = PropertyDef::data(Value::Smi(1), Attrs::ENUMERATE | Attrs::PERMANENT);
    assert_eq!(heap.define_property(obj, "v".into(), def.clone()).unwrap(), DefineOutcome::Added);
    assert_eq!(heap.define_property(obj, "v".into(), def).unwrap(), DefineOutcome::Updated);
    let clash = PropertyDef::data(Value::Smi(2), Attrs::READONLY | Attrs::PERMANENT);
    assert_eq!(heap.define_property(obj, "v".into(), clash).unwrap(), DefineOutcome::Rejected);
}

#[test]
fn contract_allocation_limit_is_out_of_memory() {
    let mut heap = Heap::with_limit(1);
    heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    let err = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap_err();
    assert_eq!(err.kind, core_types::ErrorKind::OutOfMemory);
}
