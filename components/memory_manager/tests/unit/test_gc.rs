//! Tests for collection

use core_types::{ObjectId, Value};
use memory_manager::{Attrs, Class, Heap, ObjectPayload, PropertyDef};

#[test]
fn test_values_in_slots_keep_objects_alive() {
    let mut heap = Heap::new();
    let holder = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    let child = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    let garbage = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    heap.define_property(holder, "c".into(), PropertyDef::data(Value::Object(child), Attrs::ENUMERATE))
        .unwrap();

    let freed = heap.collect(|t| t.mark_object(holder));
    assert_eq!(freed, 1);
    assert!(heap.contains(child));
    assert!(!heap.contains(garbage));
    assert_eq!(heap.stats().collections, 1);
}

#[test]
fn test_accessor_functions_are_traced() {
    let mut heap = Heap::new();
    let holder = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    let getter = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    heap.define_property(holder, "g".into(), PropertyDef::getter(getter, Attrs::ENUMERATE)).unwrap();
    heap.collect(|t| t.mark_object(holder));
    assert!(heap.contains(getter));
}

#[test]
fn test_freed_slots_are_reused_with_new_generation() {
    let mut heap = Heap::new();
    let a: ObjectId = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    heap.collect(|_| {});
    let b = heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap();
    assert_eq!(a.index, b.index);
    assert_ne!(a.generation, b.generation);
    assert!(heap.object(a).is_err());
}
