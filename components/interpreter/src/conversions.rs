//! Type conversions and the comparison operators.

use crate::error::{VmError, VmResult};
use crate::vm::Vm;
use core_types::number;
use core_types::{JsString, ObjectId, Value};
use std::cmp::Ordering;

/// Preferred type for [`Vm::to_primitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    /// No preference (`==`, `+`)
    Default,
    /// Numeric context
    Number,
    /// String context
    String,
}

impl Vm {
    /// DefaultValue: asks `valueOf` then `toString` (the reverse for a
    /// string hint) for a primitive.
    pub(crate) fn to_primitive(&mut self, value: &Value, hint: Hint) -> VmResult<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default | Hint::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get_property(value, name)?;
            if self.is_callable(&method) {
                let result = self.invoke(method, Value::Object(*obj), &[], false)?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(VmError::Type(format!(
            "can't convert {} to primitive type",
            self.describe(value)
        )))
    }

    pub(crate) fn to_number(&mut self, value: &Value) -> VmResult<f64> {
        if let Some(n) = value.primitive_to_number() {
            return Ok(n);
        }
        let primitive = self.to_primitive(value, Hint::Number)?;
        Ok(primitive.primitive_to_number().unwrap_or(f64::NAN))
    }

    pub(crate) fn to_js_string(&mut self, value: &Value) -> VmResult<JsString> {
        if let Some(s) = value.primitive_to_string() {
            return Ok(s);
        }
        let primitive = self.to_primitive(value, Hint::String)?;
        Ok(primitive.primitive_to_string().unwrap_or_else(|| "".into()))
    }

    pub(crate) fn to_int32(&mut self, value: &Value) -> VmResult<i32> {
        match value {
            Value::Smi(n) => Ok(*n),
            other => Ok(number::to_int32(self.to_number(other)?)),
        }
    }

    pub(crate) fn to_uint32(&mut self, value: &Value) -> VmResult<u32> {
        match value {
            Value::Smi(n) => Ok(*n as u32),
            other => Ok(number::to_uint32(self.to_number(other)?)),
        }
    }

    /// Property key for element access.
    pub(crate) fn to_property_key(&mut self, value: &Value) -> VmResult<JsString> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Smi(n) => Ok(n.to_string().into()),
            other => self.to_js_string(other),
        }
    }

    pub(crate) fn is_callable(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.heap.get(*id).map_or(false, |r| r.is_callable()),
            _ => false,
        }
    }

    /// `===`, seeing through host wrapper objects.
    pub(crate) fn strict_equals(&self, a: &Value, b: &Value) -> bool {
        a.strict_equals_by(b, |id| self.heap.unwrap_identity(id))
    }

    /// `==`
    pub(crate) fn loose_equals(&mut self, a: &Value, b: &Value) -> VmResult<bool> {
        match (a, b) {
            (Value::Object(_), Value::Object(_)) => Ok(self.strict_equals(a, b)),
            (Value::Object(_), other) | (other, Value::Object(_)) if other.is_nullish() => Ok(false),
            (Value::Object(_), _) => {
                let pa = self.to_primitive(a, Hint::Default)?;
                Ok(pa.loose_equals_primitive(b))
            }
            (_, Value::Object(_)) => {
                let pb = self.to_primitive(b, Hint::Default)?;
                Ok(a.loose_equals_primitive(&pb))
            }
            _ => Ok(a.loose_equals_primitive(b)),
        }
    }

    /// Relational comparison. `None` when either side is NaN.
    pub(crate) fn compare(&mut self, a: &Value, b: &Value) -> VmResult<Option<Ordering>> {
        if let (Value::Smi(x), Value::Smi(y)) = (a, b) {
            return Ok(Some(x.cmp(y)));
        }
        let pa = self.to_primitive(a, Hint::Number)?;
        let pb = self.to_primitive(b, Hint::Number)?;
        if let (Value::String(x), Value::String(y)) = (&pa, &pb) {
            return Ok(Some(x.cmp_code_units(y)));
        }
        let x = pa.primitive_to_number().unwrap_or(f64::NAN);
        let y = pb.primitive_to_number().unwrap_or(f64::NAN);
        Ok(x.partial_cmp(&y))
    }

    /// `+` on values that are not both tagged integers.
    pub(crate) fn add_values(&mut self, a: &Value, b: &Value) -> VmResult<Value> {
        let pa = self.to_primitive(a, Hint::Default)?;
        let pb = self.to_primitive(b, Hint::Default)?;
        if pa.as_string().is_some() || pb.as_string().is_some() {
            let x = self.to_js_string(&pa)?;
            let y = self.to_js_string(&pb)?;
            return Ok(Value::String(x.concat(&y)));
        }
        let x = pa.primitive_to_number().unwrap_or(f64::NAN);
        let y = pb.primitive_to_number().unwrap_or(f64::NAN);
        Ok(Value::number(x + y))
    }

    /// Converts both operands left to right.
    pub(crate) fn to_numbers(&mut self, a: &Value, b: &Value) -> VmResult<(f64, f64)> {
        let x = self.to_number(a)?;
        let y = self.to_number(b)?;
        Ok((x, y))
    }

    /// `typeof`, telling callable objects apart.
    pub(crate) fn type_of(&self, value: &Value) -> &'static str {
        if self.is_callable(value) {
            "function"
        } else {
            value.type_of()
        }
    }

    /// `value instanceof ctor`
    pub(crate) fn instance_of(&mut self, value: &Value, ctor: &Value) -> VmResult<bool> {
        if !self.is_callable(ctor) {
            return Err(VmError::Type(format!(
                "invalid 'instanceof' operand {}",
                self.describe(ctor)
            )));
        }
        let Value::Object(proto) = self.get_property(ctor, "prototype")? else {
            return Err(VmError::Type(format!(
                "'prototype' property of {} is not an object",
                self.describe(ctor)
            )));
        };
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let target = self.heap.unwrap_identity(proto);
        let mut current = self.heap.object(*obj)?.proto;
        while let Some(p) = current {
            if self.heap.unwrap_identity(p) == target {
                return Ok(true);
            }
            current = self.heap.object(p)?.proto;
        }
        Ok(false)
    }

    /// `key in obj`
    pub(crate) fn has_in(&mut self, key: &Value, obj: &Value) -> VmResult<bool> {
        let Value::Object(id) = obj else {
            return Err(VmError::Type(format!("invalid 'in' operand {}", self.describe(obj))));
        };
        let key = self.to_property_key(key)?;
        Ok(self.heap.has_property(*id, &key)?)
    }

    /// Unwraps a value that must be an object for a property write.
    pub(crate) fn object_operand(&self, value: &Value) -> VmResult<Option<ObjectId>> {
        match value {
            Value::Object(id) => Ok(Some(*id)),
            v if v.is_nullish() => Err(VmError::Type(format!("{} has no properties", v))),
            _ => Ok(None),
        }
    }
}
