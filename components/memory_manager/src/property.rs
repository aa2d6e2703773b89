//! Property definition, lookup and removal.
//!
//! All shape mutation funnels through this module. An object whose shape is
//! still shared with other objects moves to a child node of the shared tree;
//! removals and attribute changes rebuild a private branch and mint a fresh
//! id. Either way the object's shape id strictly changes.

use crate::class::Class;
use crate::heap::Heap;
use crate::object::{FunctionData, ObjectPayload};
use crate::shape::{Accessor, Attrs, Binding, PropertySpec, ShapeNode};
use core_types::{JsError, JsString, ObjectId, Value};
use std::rc::Rc;

/// A property found by [`Heap::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct Found {
    /// Object that owns the property
    pub holder: ObjectId,
    /// The property
    pub prop: PropertySpec,
    /// Prototype links walked from the starting object
    pub proto_hops: u32,
}

/// What [`Heap::define_property`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineOutcome {
    /// A new property was added
    Added,
    /// An existing non-permanent property was replaced
    Replaced,
    /// The missing half of an accessor pair was filled in
    Merged,
    /// Attributes were identical; only the value was written
    Updated,
    /// The existing property is permanent and the new attributes are
    /// incompatible; nothing changed
    Rejected,
}

/// A property definition request.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// Initial value (ignored for scripted accessors)
    pub value: Value,
    /// Read accessor
    pub getter: Accessor,
    /// Write accessor
    pub setter: Accessor,
    /// Attributes; accessor bits are derived from the accessors
    pub attrs: Attrs,
}

impl PropertyDef {
    /// A data property.
    pub fn data(value: Value, attrs: Attrs) -> Self {
        PropertyDef { value, getter: Accessor::Default, setter: Accessor::Default, attrs }
    }

    /// The getter half of an accessor property.
    pub fn getter(f: ObjectId, attrs: Attrs) -> Self {
        PropertyDef {
            value: Value::Undefined,
            getter: Accessor::Object(f),
            setter: Accessor::Default,
            attrs,
        }
    }

    /// The setter half of an accessor property.
    pub fn setter(f: ObjectId, attrs: Attrs) -> Self {
        PropertyDef {
            value: Value::Undefined,
            getter: Accessor::Default,
            setter: Accessor::Object(f),
            attrs,
        }
    }

    /// A binding that aliases frame storage.
    pub fn binding(binding: Binding, value: Value, attrs: Attrs) -> Self {
        PropertyDef {
            value,
            getter: Accessor::Binding(binding),
            setter: Accessor::Binding(binding),
            attrs,
        }
    }

    fn normalized_attrs(&self) -> Attrs {
        let mut attrs = self.attrs.without(Attrs::GETTER).without(Attrs::SETTER);
        if matches!(self.getter, Accessor::Object(_)) {
            attrs = attrs | Attrs::GETTER;
        }
        if matches!(self.setter, Accessor::Object(_)) {
            attrs = attrs | Attrs::SETTER;
        }
        if attrs.is_accessor() {
            attrs = attrs | Attrs::SHARED;
        }
        attrs
    }
}

impl Heap {
    /// Finds an own property without running resolve hooks.
    pub fn lookup_own(&self, obj: ObjectId, key: &str) -> Result<Option<PropertySpec>, JsError> {
        Ok(self.object(obj)?.shape.search(key))
    }

    /// Walks `obj` and its prototype chain for `key`.
    ///
    /// A miss on an object whose class has a resolve hook gives the hook one
    /// chance to define the property. A `(object, key)` pair already being
    /// resolved is treated as not found.
    pub fn lookup(&mut self, obj: ObjectId, key: &JsString) -> Result<Option<Found>, JsError> {
        let mut current = obj;
        let mut proto_hops = 0;
        loop {
            if let Some(prop) = self.lookup_own(current, key)? {
                return Ok(Some(Found { holder: current, prop, proto_hops }));
            }
            if self.resolve(current, key)? {
                if let Some(prop) = self.lookup_own(current, key)? {
                    return Ok(Some(Found { holder: current, prop, proto_hops }));
                }
            }
            match self.object(current)?.proto {
                Some(p) => {
                    current = p;
                    proto_hops += 1;
                }
                None => return Ok(None),
            }
        }
    }

    /// True if `key` is found on `obj` or its prototype chain.
    pub fn has_property(&mut self, obj: ObjectId, key: &JsString) -> Result<bool, JsError> {
        Ok(self.lookup(obj, key)?.is_some())
    }

    fn resolve(&mut self, obj: ObjectId, key: &JsString) -> Result<bool, JsError> {
        let class = self.object(obj)?.class.clone();
        let wanted = match &class {
            Class::Function => key.as_str() == "prototype",
            Class::Host(_) => true,
            _ => false,
        };
        if !wanted {
            return Ok(false);
        }
        let guard = (obj, key.clone());
        if !self.resolving.insert(guard.clone()) {
            return Ok(false);
        }
        let result = match &class {
            Class::Function => self.resolve_function_prototype(obj),
            Class::Host(hooks) => hooks.resolve(self, obj, key),
            _ => Ok(false),
        };
        self.resolving.remove(&guard);
        result
    }

    /// Materializes `f.prototype` with a `constructor` back-reference.
    fn resolve_function_prototype(&mut self, f: ObjectId) -> Result<bool, JsError> {
        if !matches!(self.object(f)?.payload, ObjectPayload::Function(FunctionData { .. })) {
            return Ok(false);
        }
        let proto_proto = self.intrinsics.object_prototype;
        let proto = self.allocate(Class::Object, proto_proto, None, ObjectPayload::None)?;
        self.define_property(proto, "constructor".into(), PropertyDef::data(Value::Object(f), Attrs::NONE))?;
        self.define_property(
            f,
            "prototype".into(),
            PropertyDef::data(Value::Object(proto), Attrs::PERMANENT),
        )?;
        Ok(true)
    }

    /// Reads slot `slot` of `obj`.
    pub fn get_slot(&self, obj: ObjectId, slot: u32) -> Result<Value, JsError> {
        Ok(self.object(obj)?.slot(slot))
    }

    /// Writes slot `slot` of `obj`.
    ///
    /// On a branded object, overwriting a function value or storing one
    /// regenerates the shape id, so cached callees read through the old id
    /// miss.
    pub fn set_slot(&mut self, obj: ObjectId, slot: u32, value: Value) -> Result<(), JsError> {
        let rec = self.object(obj)?;
        if rec.flags.branded {
            let old = rec.slot(slot);
            let changes_method = (self.is_function(&old) || self.is_function(&value))
                && !old.strict_equals(&value);
            if changes_method {
                self.regenerate_shape(obj)?;
            }
        }
        self.object_mut(obj)?.write_slot(slot, value);
        Ok(())
    }

    /// True if `value` refers to a function object.
    pub fn is_function(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => self.get(*id).map_or(false, |r| matches!(r.class, Class::Function)),
            _ => false,
        }
    }

    /// Adds or replaces a property.
    pub fn define_property(
        &mut self,
        obj: ObjectId,
        key: JsString,
        def: PropertyDef,
    ) -> Result<DefineOutcome, JsError> {
        let attrs = def.normalized_attrs();
        let existing = self.lookup_own(obj, &key)?;
        let Some(old) = existing else {
            self.purge_shadowed(obj, &key)?;
            self.add_property(obj, key, &def, attrs)?;
            return Ok(DefineOutcome::Added);
        };

        if attrs.is_accessor() && old.attrs.is_accessor() {
            let adds_getter = matches!(def.getter, Accessor::Object(_))
                && def.setter.is_default()
                && !old.attrs.contains(Attrs::GETTER);
            let adds_setter = matches!(def.setter, Accessor::Object(_))
                && def.getter.is_default()
                && !old.attrs.contains(Attrs::SETTER);
            if adds_getter || adds_setter {
                let mut merged = old.clone();
                if adds_getter {
                    merged.getter = def.getter;
                    merged.attrs = merged.attrs | Attrs::GETTER;
                } else {
                    merged.setter = def.setter;
                    merged.attrs = merged.attrs | Attrs::SETTER;
                }
                self.replace_property(obj, &key, merged)?;
                return Ok(DefineOutcome::Merged);
            }
        }

        if old.attrs == attrs && old.getter == def.getter && old.setter == def.setter {
            if let (Some(slot), false) = (old.slot, attrs.contains(Attrs::READONLY)) {
                self.set_slot(obj, slot, def.value)?;
            }
            return Ok(DefineOutcome::Updated);
        }

        if old.attrs.contains(Attrs::PERMANENT) {
            tracing::debug!(target: "heap::shape", key = %key, "incompatible redefinition of permanent property");
            return Ok(DefineOutcome::Rejected);
        }

        let span = self.object(obj)?.shape.slot_span();
        let slot = if attrs.contains(Attrs::SHARED) { None } else { Some(old.slot.unwrap_or(span)) };
        if let (Some(dropped), None) = (old.slot, slot) {
            self.object_mut(obj)?.write_slot(dropped, Value::Undefined);
        }
        let spec = PropertySpec { key: key.clone(), slot, attrs, getter: def.getter, setter: def.setter };
        self.replace_property(obj, &key, spec)?;
        if let Some(slot) = slot {
            self.set_slot(obj, slot, def.value)?;
        }
        Ok(DefineOutcome::Replaced)
    }

    fn add_property(&mut self, obj: ObjectId, key: JsString, def: &PropertyDef, attrs: Attrs) -> Result<(), JsError> {
        let shape = Rc::clone(&self.object(obj)?.shape);
        let slot = if attrs.contains(Attrs::SHARED) { None } else { Some(shape.slot_span()) };
        let spec = PropertySpec { key, slot, attrs, getter: def.getter, setter: def.setter };
        let node = shape.child(spec, self.shape_id_source());
        self.install_shape(obj, node, false)?;
        if let Some(slot) = slot {
            self.set_slot(obj, slot, def.value.clone())?;
        }
        Ok(())
    }

    /// Points `obj` at `node`. The object keeps the node's shared id unless
    /// it already diverged or `force_fresh` is set.
    fn install_shape(&mut self, obj: ObjectId, node: Rc<ShapeNode>, force_fresh: bool) -> Result<(), JsError> {
        let unique = force_fresh || self.object(obj)?.flags.unique_shape;
        let id = if unique { self.fresh_shape_id() } else { node.id() };
        let rec = self.object_mut(obj)?;
        rec.shape = node;
        rec.shape_id = id;
        rec.flags.unique_shape = unique;
        Ok(())
    }

    /// Rebuilds the shape chain of `obj` with `key` replaced by `spec`, or
    /// dropped when `spec` is `None`.
    fn rebuild_without(&mut self, obj: ObjectId, key: &str, spec: Option<PropertySpec>) -> Result<(), JsError> {
        let shape = Rc::clone(&self.object(obj)?.shape);
        let mut node = shape.root_of();
        for prop in shape.properties() {
            let next = if prop.key.as_str() == key { spec.clone() } else { Some(prop) };
            if let Some(next) = next {
                node = node.child(next, self.shape_id_source());
            }
        }
        self.install_shape(obj, node, true)
    }

    fn replace_property(&mut self, obj: ObjectId, key: &str, spec: PropertySpec) -> Result<(), JsError> {
        self.rebuild_without(obj, key, Some(spec))
    }

    /// Deletes an own property. Returns false for permanent properties; a
    /// missing property counts as deleted.
    pub fn delete_property(&mut self, obj: ObjectId, key: &str) -> Result<bool, JsError> {
        let Some(old) = self.lookup_own(obj, key)? else {
            return Ok(true);
        };
        if old.attrs.contains(Attrs::PERMANENT) {
            return Ok(false);
        }
        self.rebuild_without(obj, key, None)?;
        if let Some(slot) = old.slot {
            self.object_mut(obj)?.write_slot(slot, Value::Undefined);
        }
        Ok(true)
    }

    /// Gives `obj` a fresh private shape id.
    pub fn regenerate_shape(&mut self, obj: ObjectId) -> Result<(), JsError> {
        let id = self.fresh_shape_id();
        let rec = self.object_mut(obj)?;
        rec.shape_id = id;
        rec.flags.unique_shape = true;
        Ok(())
    }

    /// Marks `obj` as relied upon by a cached method call. The first
    /// branding mints a fresh id.
    pub fn brand(&mut self, obj: ObjectId) -> Result<bool, JsError> {
        if self.object(obj)?.flags.branded {
            return Ok(false);
        }
        self.regenerate_shape(obj)?;
        self.object_mut(obj)?.flags.branded = true;
        tracing::trace!(target: "vm::cache", ?obj, "branded");
        Ok(true)
    }

    /// When `obj` gains `key`, cache entries that resolved `key` to an object
    /// further along its prototype chain (or, for activation records, its
    /// scope chain) must miss. Gives the nearest such holder a fresh id.
    fn purge_shadowed(&mut self, obj: ObjectId, key: &str) -> Result<(), JsError> {
        let rec = self.object(obj)?;
        let (delegate, proto) = (rec.flags.delegate, rec.proto);
        let call_parent = match rec.class {
            Class::Call => rec.parent,
            _ => None,
        };
        if delegate {
            if let Some(p) = proto {
                self.purge_proto_chain(p, key)?;
            }
        }
        let mut scope = call_parent;
        while let Some(s) = scope {
            if self.purge_proto_chain(s, key)? {
                break;
            }
            scope = self.object(s)?.parent;
        }
        Ok(())
    }

    fn purge_proto_chain(&mut self, start: ObjectId, key: &str) -> Result<bool, JsError> {
        let mut current = Some(start);
        while let Some(obj) = current {
            if self.lookup_own(obj, key)?.is_some() {
                self.regenerate_shape(obj)?;
                tracing::trace!(target: "heap::shape", ?obj, key, "purged shadowed holder");
                return Ok(true);
            }
            current = self.object(obj)?.proto;
        }
        Ok(false)
    }

    /// Changes the prototype of `obj`, rebuilding its shape from the new
    /// initial shape. Cached entries keyed to the old chain must be flushed
    /// by the caller.
    pub fn set_prototype(&mut self, obj: ObjectId, proto: Option<ObjectId>) -> Result<(), JsError> {
        let mut walk = proto;
        while let Some(p) = walk {
            if p == obj {
                return Err(JsError::type_error("cyclic prototype value"));
            }
            walk = self.object(p)?.proto;
        }
        if let Some(p) = proto {
            self.object_mut(p)?.flags.delegate = true;
        }
        let rec = self.object(obj)?;
        let (class, parent, props) = (rec.class.clone(), rec.parent, rec.shape.properties());
        let mut node = self.initial_shape(&class, proto, parent);
        for prop in props {
            node = node.child(prop, self.shape_id_source());
        }
        let rec = self.object_mut(obj)?;
        rec.proto = proto;
        rec.shape_id = node.id();
        rec.shape = node;
        rec.flags.unique_shape = false;
        Ok(())
    }

    /// Re-parents a scope object. Its shape is rebuilt from the initial shape
    /// of the new parent so cached scope walks through it miss.
    pub fn set_parent(&mut self, obj: ObjectId, parent: Option<ObjectId>) -> Result<(), JsError> {
        let rec = self.object(obj)?;
        let (class, proto, props) = (rec.class.clone(), rec.proto, rec.shape.properties());
        let mut node = self.initial_shape(&class, proto, parent);
        for prop in props {
            node = node.child(prop, self.shape_id_source());
        }
        let unique = self.object(obj)?.flags.unique_shape;
        let id = if unique { self.fresh_shape_id() } else { node.id() };
        let rec = self.object_mut(obj)?;
        rec.parent = parent;
        rec.shape_id = id;
        rec.shape = node;
        Ok(())
    }

    /// Own property keys in declaration order.
    pub fn own_keys(&self, obj: ObjectId) -> Result<Vec<JsString>, JsError> {
        Ok(self.object(obj)?.shape.properties().into_iter().map(|p| p.key).collect())
    }
}
