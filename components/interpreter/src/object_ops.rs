//! Property access.
//!
//! Every read and write goes through [`Vm::read_property`] and
//! [`Vm::write_property`], which dispatch on the property's accessors:
//! stub accessors touch the holder's slot, scripted accessors are called,
//! and frame bindings alias the live frame's storage. The `_site` variants
//! consult the property cache first.

use crate::error::{VmError, VmResult};
use crate::property_cache::{CachedValue, Site, Walk};
use crate::vm::Vm;
use core_types::{JsString, ObjectId, Value};
use memory_manager::{Accessor, Attrs, DefineOutcome, Found, PropertyDef, PropertySpec};

impl Vm {
    /// Reads `base[key]`, running getters.
    ///
    /// # Arguments
    ///
    /// * `base` - Object or primitive; primitives read from the object prototype
    /// * `key` - Property name
    ///
    /// # Returns
    ///
    /// The property value, undefined when absent, or a type fault for
    /// `undefined` and `null` bases.
    pub fn get_property(&mut self, base: &Value, key: &str) -> VmResult<Value> {
        self.get_value(base, &JsString::from(key))
    }

    /// Writes `obj[key] = value`, running setters and honoring read-only
    /// attributes.
    pub fn set_property(&mut self, obj: ObjectId, key: &str, value: Value) -> VmResult<()> {
        self.put_value(obj, &JsString::from(key), value)
    }

    /// Defines an own data property.
    ///
    /// Redefining a permanent property with different attributes is
    /// `DefineOutcome::Rejected` under the warning policy and a type fault
    /// under the error policy.
    pub fn define_property(
        &mut self,
        obj: ObjectId,
        key: &str,
        value: Value,
        attrs: Attrs,
    ) -> VmResult<DefineOutcome> {
        self.define_checked(obj, key.into(), PropertyDef::data(value, attrs))
    }

    /// Defines a property, applying the redeclaration policy when the heap
    /// rejects it.
    pub(crate) fn define_checked(
        &mut self,
        obj: ObjectId,
        key: JsString,
        def: PropertyDef,
    ) -> VmResult<DefineOutcome> {
        let outcome = self.heap.define_property(obj, key.clone(), def)?;
        if outcome == DefineOutcome::Rejected {
            self.redeclaration("property", &key)?;
        }
        Ok(outcome)
    }

    /// Deletes an own property. Returns false for permanent properties.
    pub fn delete_property(&mut self, obj: ObjectId, key: &str) -> VmResult<bool> {
        Ok(self.heap.delete_property(obj, key)?)
    }

    /// Replaces the prototype of `obj`. Cached resolutions through the old
    /// chain are dropped.
    pub fn set_prototype(&mut self, obj: ObjectId, proto: Option<ObjectId>) -> VmResult<()> {
        self.heap.set_prototype(obj, proto)?;
        self.cache.flush();
        Ok(())
    }

    /// Reads a resolved property of `holder` on behalf of `receiver`.
    pub(crate) fn read_property(
        &mut self,
        receiver: &Value,
        holder: ObjectId,
        prop: &PropertySpec,
    ) -> VmResult<Value> {
        match prop.getter {
            Accessor::Object(f) => self.invoke(Value::Object(f), receiver.clone(), &[], false),
            Accessor::Binding(binding) => self.read_binding(holder, binding, prop.slot),
            Accessor::Default => match prop.slot {
                Some(slot) => Ok(self.heap.get_slot(holder, slot)?),
                None => Ok(Value::Undefined),
            },
        }
    }

    /// Writes a resolved property. A plain data property found on a
    /// prototype is shadowed by a new own property of the receiver.
    pub(crate) fn write_property(
        &mut self,
        receiver: ObjectId,
        holder: ObjectId,
        prop: &PropertySpec,
        value: Value,
    ) -> VmResult<()> {
        if let Accessor::Object(f) = prop.setter {
            self.invoke(Value::Object(f), Value::Object(receiver), &[value], false)?;
            return Ok(());
        }
        if prop.attrs.contains(Attrs::READONLY) || prop.attrs.contains(Attrs::GETTER) {
            tracing::trace!(target: "vm::cache", key = %prop.key, "write to read-only property ignored");
            return Ok(());
        }
        if let Accessor::Binding(binding) = prop.setter {
            return self.write_binding(holder, binding, prop.slot, value);
        }
        if holder != receiver {
            if prop.is_shared_permanent() {
                return Ok(());
            }
            self.heap.define_property(
                receiver,
                prop.key.clone(),
                PropertyDef::data(value, Attrs::ENUMERATE),
            )?;
            return Ok(());
        }
        if let Some(slot) = prop.slot {
            self.heap.set_slot(holder, slot, value)?;
        }
        Ok(())
    }

    /// Uncached `base[key]`.
    pub(crate) fn get_value(&mut self, base: &Value, key: &JsString) -> VmResult<Value> {
        let (lookup_on, receiver) = match base {
            Value::Object(id) => (*id, base.clone()),
            _ => match self.primitive_property(base, key)? {
                Some(value) => return Ok(value),
                None => (self.realm.object_prototype, base.clone()),
            },
        };
        match self.heap.lookup(lookup_on, key)? {
            Some(found) => self.read_property(&receiver, found.holder, &found.prop),
            None => Ok(Value::Undefined),
        }
    }

    /// Uncached `obj[key] = value`.
    pub(crate) fn put_value(&mut self, obj: ObjectId, key: &JsString, value: Value) -> VmResult<()> {
        match self.heap.lookup(obj, key)? {
            Some(found) => self.write_property(obj, found.holder, &found.prop, value),
            None => {
                self.heap.define_property(obj, key.clone(), PropertyDef::data(value, Attrs::ENUMERATE))?;
                Ok(())
            }
        }
    }

    /// Properties primitives answer themselves: a string's length and
    /// indexed characters. Faults for `undefined` and `null`.
    fn primitive_property(&self, base: &Value, key: &JsString) -> VmResult<Option<Value>> {
        match base {
            Value::Undefined | Value::Null => {
                Err(VmError::Type(format!("{} has no properties", base)))
            }
            Value::String(s) => {
                if key.as_str() == "length" {
                    return Ok(Some(Value::Smi(s.encode_utf16().count() as i32)));
                }
                Ok(key.as_index().and_then(|i| {
                    s.encode_utf16()
                        .nth(i as usize)
                        .map(|unit| Value::String(String::from_utf16_lossy(&[unit]).into()))
                }))
            }
            _ => Ok(None),
        }
    }

    /// True if the property cache may record resolutions made now.
    pub(crate) fn cache_fills_allowed(&self) -> bool {
        self.cache.fills_allowed() && !self.frames.last().map_or(false, |f| f.flags.eval)
    }

    /// Records a full lookup's result for `site`. A method read by a call
    /// opcode brands its holder and caches the function itself.
    pub(crate) fn fill_after_lookup(
        &mut self,
        site: Site,
        receiver: ObjectId,
        scope_hops: u32,
        found: &Found,
        value: &Value,
        call: bool,
    ) -> VmResult<()> {
        if !self.cache_fills_allowed() {
            return Ok(());
        }
        let prop = &found.prop;
        let cached = if call && prop.getter.is_default() && prop.slot.is_some() && self.heap.is_function(value) {
            self.heap.brand(found.holder)?;
            CachedValue::Callee(value.clone())
        } else if let (true, Some(slot)) = (prop.is_plain_data(), prop.slot) {
            CachedValue::Slot(slot)
        } else {
            CachedValue::Prop(prop.clone())
        };
        let walk = Walk { scope_hops, proto_hops: found.proto_hops, holder: found.holder };
        self.cache.fill(&self.heap, site, receiver, walk, cached);
        Ok(())
    }

    /// Resolves a cache hit into a value.
    pub(crate) fn read_cached(
        &mut self,
        receiver: &Value,
        holder: ObjectId,
        cached: CachedValue,
    ) -> VmResult<Value> {
        match cached {
            CachedValue::Slot(slot) => Ok(self.heap.get_slot(holder, slot)?),
            CachedValue::Prop(prop) => self.read_property(receiver, holder, &prop),
            CachedValue::Callee(value) => Ok(value),
        }
    }

    /// `base.key` at a bytecode site. `call` is set for method reads that
    /// feed a call.
    pub(crate) fn get_prop_site(
        &mut self,
        site: Site,
        base: &Value,
        key: &JsString,
        call: bool,
    ) -> VmResult<Value> {
        let Value::Object(obj) = base else {
            return self.get_value(base, key);
        };
        if let Some(hit) = self.cache.probe(&self.heap, site, *obj) {
            return self.read_cached(base, hit.holder, hit.value);
        }
        let Some(found) = self.heap.lookup(*obj, key)? else {
            return Ok(Value::Undefined);
        };
        let value = self.read_property(base, found.holder, &found.prop)?;
        self.fill_after_lookup(site, *obj, 0, &found, &value, call)?;
        Ok(value)
    }

    /// `obj.key = value` at a bytecode site. Only writes to an existing own
    /// data slot are cached.
    pub(crate) fn set_prop_site(
        &mut self,
        site: Site,
        obj: ObjectId,
        key: &JsString,
        value: Value,
    ) -> VmResult<()> {
        if let Some(hit) = self.cache.probe(&self.heap, site, obj) {
            match hit.value {
                CachedValue::Slot(slot) if hit.holder == obj => {
                    self.heap.set_slot(obj, slot, value)?;
                    return Ok(());
                }
                CachedValue::Prop(prop) => return self.write_property(obj, hit.holder, &prop, value),
                _ => {}
            }
        }
        match self.heap.lookup(obj, key)? {
            Some(found) => {
                let prop = &found.prop;
                let cacheable = found.holder == obj
                    && prop.is_plain_data()
                    && !prop.attrs.contains(Attrs::READONLY)
                    && self.cache_fills_allowed();
                self.write_property(obj, found.holder, prop, value)?;
                if let (true, Some(slot)) = (cacheable, prop.slot) {
                    let walk = Walk { scope_hops: 0, proto_hops: 0, holder: obj };
                    self.cache.fill(&self.heap, site, obj, walk, CachedValue::Slot(slot));
                }
                Ok(())
            }
            None => {
                self.heap.define_property(obj, key.clone(), PropertyDef::data(value, Attrs::ENUMERATE))?;
                Ok(())
            }
        }
    }

    /// `delete base[key]`
    pub(crate) fn delete_value(&mut self, base: &Value, key: &JsString) -> VmResult<bool> {
        match self.object_operand(base)? {
            Some(obj) => Ok(self.heap.delete_property(obj, key)?),
            None => Ok(true),
        }
    }
}
