//! Unit tests for Value coercions and equality laws

use core_types::{ObjectId, Value};

#[cfg(test)]
mod coercion_tests {
    use super::*;

    #[test]
    fn test_primitive_to_number() {
        assert!(Value::Undefined.primitive_to_number().unwrap().is_nan());
        assert_eq!(Value::Null.primitive_to_number(), Some(0.0));
        assert_eq!(Value::Boolean(true).primitive_to_number(), Some(1.0));
        assert_eq!(Value::from(" 12 ").primitive_to_number(), Some(12.0));
        assert_eq!(Value::Object(ObjectId::new(0, 0)).primitive_to_number(), None);
    }

    #[test]
    fn test_primitive_to_string() {
        assert_eq!(Value::Smi(-7).primitive_to_string().unwrap().as_str(), "-7");
        assert_eq!(Value::Double(f64::NAN).primitive_to_string().unwrap().as_str(), "NaN");
        assert_eq!(Value::Boolean(false).primitive_to_string().unwrap().as_str(), "false");
        assert!(Value::Object(ObjectId::new(1, 0)).primitive_to_string().is_none());
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Double(1.5).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
    }
}

#[cfg(test)]
mod equality_law_tests {
    use super::*;

    #[test]
    fn test_nan_is_not_strictly_equal_to_itself() {
        let nan = Value::Double(f64::NAN);
        assert!(!nan.strict_equals(&nan));
    }

    #[test]
    fn test_signed_zeros_are_strictly_equal() {
        assert!(Value::Double(0.0).strict_equals(&Value::Double(-0.0)));
        assert!(Value::Smi(0).strict_equals(&Value::Double(-0.0)));
    }

    #[test]
    fn test_string_number_loose_but_not_strict() {
        let s = Value::from("10");
        let n = Value::Smi(10);
        assert!(s.loose_equals_primitive(&n));
        assert!(n.loose_equals_primitive(&s));
        assert!(!s.strict_equals(&n));
    }

    #[test]
    fn test_null_undefined_only_equal_each_other() {
        assert!(Value::Null.loose_equals_primitive(&Value::Undefined));
        assert!(!Value::Null.loose_equals_primitive(&Value::Smi(0)));
        assert!(!Value::Undefined.loose_equals_primitive(&Value::from("")));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Value::Object(ObjectId::new(1, 0));
        let b = Value::Object(ObjectId::new(2, 0));
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
    }

    #[test]
    fn test_unwrap_hook_applies_before_identity() {
        let outer = Value::Object(ObjectId::new(1, 0));
        let inner = Value::Object(ObjectId::new(2, 0));
        let unwrap = |id: ObjectId| if id.index == 1 { ObjectId::new(2, 0) } else { id };
        assert!(outer.strict_equals_by(&inner, unwrap));
    }

    #[test]
    fn test_object_default_value_hook() {
        let obj = Value::Object(ObjectId::new(3, 0));
        let eq: Result<bool, ()> = obj.loose_equals(&Value::from("7"), |_| Ok(Some(Value::Smi(7))), |id| id);
        assert_eq!(eq, Ok(true));
    }

    #[test]
    fn test_default_value_hook_fault_propagates() {
        let obj = Value::Object(ObjectId::new(3, 0));
        let eq: Result<bool, &str> = obj.loose_equals(&Value::Smi(1), |_| Err("no default value"), |id| id);
        assert_eq!(eq, Err("no default value"));
    }

    #[test]
    fn test_object_to_null_never_calls_hook() {
        let obj = Value::Object(ObjectId::new(3, 0));
        let eq: Result<bool, &str> = obj.loose_equals(&Value::Null, |_| Err("called"), |id| id);
        assert_eq!(eq, Ok(false));
    }
}
