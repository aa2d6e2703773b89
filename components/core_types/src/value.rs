//! Tagged runtime values.
//!
//! This module provides the core `Value` enum together with the primitive
//! coercions (ToNumber, ToString, ToBoolean) and the strict and abstract
//! equality algorithms. Conversions that need to call into user code (the
//! default-value hook of objects) are parameterized by a callback so that
//! this crate stays independent of the interpreter.

use crate::number::{as_tagged_int, number_to_string, string_to_number};
use crate::{JsString, ObjectId};
use std::fmt;

/// Represents any runtime value.
///
/// Numbers have two representations: `Smi` for integers that fit in 32 bits
/// and `Double` for everything else (including `-0` and NaN). Constructors
/// go through [`Value::number`], which keeps integral doubles in `Smi` form so
/// that representation never leaks into equality.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let undefined = Value::Undefined;
/// let number = Value::Smi(42);
/// let float = Value::Double(3.14);
///
/// assert!(!undefined.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(float.type_of(), "number");
/// ```
#[derive(Clone)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// Boolean (true or false)
    Boolean(bool),
    /// Small integer (fits in 32 bits, tagged representation)
    Smi(i32),
    /// IEEE 754 double-precision floating point
    Double(f64),
    /// String value
    String(JsString),
    /// Reference to a heap object record
    Object(ObjectId),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Smi(n) => f.debug_tuple("Smi").field(n).finish(),
            Value::Double(n) => f.debug_tuple("Double").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Object(id) => f.debug_tuple("Object").field(id).finish(),
        }
    }
}

/// Representation equality: same variant and same payload.
///
/// This is not a language-level equality; use [`Value::strict_equals`] for
/// `===` semantics.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Smi(a), Value::Smi(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Smi(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::number(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(JsString::from(s))
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl Value {
    /// Builds a number value, preferring the tagged integer representation.
    pub fn number(d: f64) -> Value {
        match as_tagged_int(d) {
            Some(i) => Value::Smi(i),
            None => Value::Double(d),
        }
    }

    /// Returns true for `undefined` and `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns true for either number representation.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Smi(_) | Value::Double(_))
    }

    /// Returns the numeric payload if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Smi(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the object handle if this is an object reference.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the string payload if this is a string.
    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if this value is an object reference.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// ToBoolean.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(!Value::Undefined.is_truthy());
    /// assert!(!Value::Double(f64::NAN).is_truthy());
    /// assert!(!Value::Double(-0.0).is_truthy());
    /// assert!(!Value::from("").is_truthy());
    /// assert!(Value::from("0").is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Smi(n) => *n != 0,
            Value::Double(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Returns the `typeof` result for this value.
    ///
    /// Objects always report `"object"` here; callable objects are told apart
    /// by the interpreter, which knows the object's class.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Smi(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }

    /// ToNumber for primitives. Returns `None` for objects, which need the
    /// default-value hook first.
    pub fn primitive_to_number(&self) -> Option<f64> {
        match self {
            Value::Undefined => Some(f64::NAN),
            Value::Null => Some(0.0),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Smi(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            Value::String(s) => Some(string_to_number(s)),
            Value::Object(_) => None,
        }
    }

    /// ToString for primitives. Returns `None` for objects.
    pub fn primitive_to_string(&self) -> Option<JsString> {
        let s = match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Boolean(true) => "true".into(),
            Value::Boolean(false) => "false".into(),
            Value::Smi(n) => n.to_string().into(),
            Value::Double(d) => number_to_string(*d).into(),
            Value::String(s) => s.clone(),
            Value::Object(_) => return None,
        };
        Some(s)
    }

    /// Strict equality (`===`).
    ///
    /// Types must match; numbers compare numerically (so `NaN !== NaN` and
    /// `+0 === -0`), strings by content, objects by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        self.strict_equals_by(other, |id| id)
    }

    /// Strict equality with a caller-supplied unwrapping of transparent
    /// wrapper objects before the identity comparison.
    pub fn strict_equals_by(&self, other: &Value, unwrap: impl Fn(ObjectId) -> ObjectId) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a.ptr_eq(b) || a == b,
            (Value::Object(a), Value::Object(b)) => unwrap(*a) == unwrap(*b),
            (Value::Smi(a), Value::Smi(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Abstract equality (`==`) between values where no object needs its
    /// default-value hook. Object/primitive pairs compare unequal here; use
    /// [`Value::loose_equals`] when objects may be involved.
    pub fn loose_equals_primitive(&self, other: &Value) -> bool {
        let never: Result<bool, std::convert::Infallible> =
            self.loose_equals(other, |_| Ok(None), |id| id);
        match never {
            Ok(b) => b,
            Err(e) => match e {},
        }
    }

    /// Abstract equality (`==`).
    ///
    /// `to_primitive` is the default-value hook for objects; returning
    /// `Ok(None)` means the object has no usable default value for this
    /// comparison and the pair compares unequal. `unwrap` maps transparent
    /// wrapper objects to the object they stand for.
    pub fn loose_equals<E>(
        &self,
        other: &Value,
        mut to_primitive: impl FnMut(ObjectId) -> Result<Option<Value>, E>,
        unwrap: impl Fn(ObjectId) -> ObjectId + Copy,
    ) -> Result<bool, E> {
        let mut x = self.clone();
        let mut y = other.clone();
        loop {
            match (&x, &y) {
                (Value::Object(_), Value::Object(_)) => return Ok(x.strict_equals_by(&y, unwrap)),
                _ if x.same_type(&y) => return Ok(x.strict_equals_by(&y, unwrap)),
                (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => return Ok(true),
                (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => {
                    return Ok(false)
                }
                (Value::Boolean(b), _) => x = Value::Smi(*b as i32),
                (_, Value::Boolean(b)) => y = Value::Smi(*b as i32),
                (Value::String(s), _) if y.is_number() => x = Value::number(string_to_number(s)),
                (_, Value::String(s)) if x.is_number() => y = Value::number(string_to_number(s)),
                (Value::Object(id), _) => match to_primitive(*id)? {
                    Some(p) => x = p,
                    None => return Ok(false),
                },
                (_, Value::Object(id)) => match to_primitive(*id)? {
                    Some(p) => y = p,
                    None => return Ok(false),
                },
                _ => return Ok(false),
            }
        }
    }

    fn same_type(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => true,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// String conversion for primitives; objects render as `[object Object]`.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::Undefined.to_string(), "undefined");
/// assert_eq!(Value::Double(0.5).to_string(), "0.5");
/// assert_eq!(Value::Smi(42).to_string(), "42");
/// ```
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primitive_to_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("[object Object]"),
        }
    }
}
