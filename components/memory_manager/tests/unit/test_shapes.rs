//! Tests for shape identity across objects

use core_types::Value;
use memory_manager::{Attrs, Class, Heap, ObjectPayload, PropertyDef};

fn object(heap: &mut Heap) -> core_types::ObjectId {
    heap.allocate(Class::Object, None, None, ObjectPayload::None).unwrap()
}

#[test]
fn test_same_insertion_order_shares_shape() {
    let mut heap = Heap::new();
    let a = object(&mut heap);
    let b = object(&mut heap);
    for o in [a, b] {
        for key in ["x", "y", "z"] {
            heap.define_property(o, key.into(), PropertyDef::data(Value::Smi(1), Attrs::ENUMERATE))
                .unwrap();
        }
    }
    assert_eq!(heap.get(a).unwrap().shape_id(), heap.get(b).unwrap().shape_id());
}

#[test]
fn test_different_insertion_order_differs() {
    let mut heap = Heap::new();
    let a = object(&mut heap);
    let b = object(&mut heap);
    for key in ["x", "y"] {
        heap.define_property(a, key.into(), PropertyDef::data(Value::Null, Attrs::ENUMERATE)).unwrap();
    }
    for key in ["y", "x"] {
        heap.define_property(b, key.into(), PropertyDef::data(Value::Null, Attrs::ENUMERATE)).unwrap();
    }
    assert_ne!(heap.get(a).unwrap().shape_id(), heap.get(b).unwrap().shape_id());
}

#[test]
fn test_slots_survive_overflow_and_delete() {
    let mut heap = Heap::new();
    let o = object(&mut heap);
    for i in 0..10 {
        let key = format!("k{}", i);
        heap.define_property(o, key.as_str().into(), PropertyDef::data(Value::Smi(i), Attrs::ENUMERATE))
            .unwrap();
    }
    heap.delete_property(o, "k3").unwrap();
    let k9 = heap.lookup_own(o, "k9").unwrap().unwrap();
    assert_eq!(heap.get_slot(o, k9.slot.unwrap()).unwrap(), Value::Smi(9));
    assert!(heap.lookup_own(o, "k3").unwrap().is_none());
    assert_eq!(heap.own_keys(o).unwrap().len(), 9);
}

#[test]
fn test_shared_shape_branch_is_unaffected_by_divergence() {
    let mut heap = Heap::new();
    let a = object(&mut heap);
    let b = object(&mut heap);
    for o in [a, b] {
        heap.define_property(o, "x".into(), PropertyDef::data(Value::Smi(1), Attrs::ENUMERATE)).unwrap();
    }
    let shared = heap.get(a).unwrap().shape_id();
    heap.define_property(b, "x".into(), PropertyDef::data(Value::Smi(1), Attrs::READONLY)).unwrap();
    assert_eq!(heap.get(a).unwrap().shape_id(), shared);
    let prop = heap.lookup_own(a, "x").unwrap().unwrap();
    assert_eq!(prop.attrs, Attrs::ENUMERATE);
}
