//! Scope chain: compile-time blocks, `with`, name resolution and
//! declarations.
//!
//! Block locals live on the operand stack. A block only gets an object on
//! the scope chain (a clone) once something needs to capture it; from then
//! on every block entered in that frame is cloned eagerly so the chain
//! stays in lexical order.

use crate::call_frame::{FastGlobal, OpenBlock};
use crate::config::RedeclarationPolicy;
use crate::dispatch::Flow;
use crate::error::{VmError, VmResult};
use crate::property_cache::Site;
use crate::vm::Vm;
use bytecode_system::{IncDec, Script};
use core_types::{JsString, ObjectId, Value};
use memory_manager::{Attrs, Binding, Class, FrameLink, ObjectPayload, PropertyDef, PropertySpec, ScopeData};
use std::rc::Rc;

/// Where a name resolved.
#[derive(Debug, Clone)]
pub(crate) struct NameRef {
    /// Scope object the name was found through
    pub scope: ObjectId,
    /// Object owning the property
    pub holder: ObjectId,
    /// The property
    pub prop: PropertySpec,
    pub scope_hops: u32,
    pub proto_hops: u32,
    /// The walk went through a `with` scope
    pub via_with: bool,
}

impl Vm {
    /// Head of the current frame's scope chain with every open block
    /// reflected onto it.
    pub(crate) fn scope_chain(&mut self) -> VmResult<ObjectId> {
        let fi = self.top_index()?;
        self.reflect_blocks(fi)
    }

    fn reflect_blocks(&mut self, fi: usize) -> VmResult<ObjectId> {
        if self.frames[fi].blocks.iter().all(|b| b.clone.is_some()) {
            return Ok(self.frames[fi].scope_chain);
        }
        if self.frames[fi].is_function() {
            self.materialize_call_object(fi)?;
        }
        let script = Rc::clone(&self.frames[fi].script);
        let nfixed = script.nfixed();
        for i in 0..self.frames[fi].blocks.len() {
            let open = self.frames[fi].blocks[i];
            if open.clone.is_some() {
                continue;
            }
            let block = script
                .block(open.index)
                .ok_or_else(|| VmError::MalformedBytecode(format!("block {} out of range", open.index)))?;
            let data = ScopeData {
                frame: Some(FrameLink(fi as u32)),
                block: Some(open.index),
                depth: open.depth,
            };
            let parent = self.frames[fi].scope_chain;
            let clone = self.heap.allocate(Class::Block, None, Some(parent), ObjectPayload::Scope(data))?;
            for (j, name) in block.names.iter().enumerate() {
                let binding = Binding::Local((nfixed + open.depth as usize + j) as u16);
                let index = self.frames[fi].vars() + nfixed + open.depth as usize + j;
                let value = self.frame_value(fi, index)?;
                self.heap.define_property(
                    clone,
                    name.clone(),
                    PropertyDef::binding(binding, value, Attrs::ENUMERATE | Attrs::PERMANENT),
                )?;
            }
            let frame = &mut self.frames[fi];
            frame.blocks[i].clone = Some(clone);
            frame.scope_chain = clone;
            tracing::trace!(target: "vm::frame", block = open.index, "cloned block");
        }
        Ok(self.frames[fi].scope_chain)
    }

    /// `EnterBlock`
    pub(crate) fn enter_block(&mut self, script: &Script, index: u32) -> VmResult<()> {
        let block = script
            .block(index)
            .ok_or_else(|| VmError::MalformedBytecode(format!("block {} out of range", index)))?;
        for _ in 0..block.names.len() {
            self.push(Value::Undefined)?;
        }
        let fi = self.top_index()?;
        let frame = &mut self.frames[fi];
        let eager = frame.with_count > 0 || frame.blocks.iter().any(|b| b.clone.is_some());
        frame.blocks.push(OpenBlock { index, depth: block.depth, clone: None });
        if eager {
            self.reflect_blocks(fi)?;
        }
        Ok(())
    }

    /// `LeaveBlock`
    pub(crate) fn leave_block(&mut self, script: &Script, index: u32) -> VmResult<()> {
        let count = script
            .block(index)
            .map(|b| b.names.len())
            .ok_or_else(|| VmError::MalformedBytecode(format!("block {} out of range", index)))?;
        let fi = self.top_index()?;
        self.pop_block(fi)?;
        self.pop_n(count)
    }

    fn pop_block(&mut self, fi: usize) -> VmResult<()> {
        let open = self.frames[fi]
            .blocks
            .pop()
            .ok_or_else(|| VmError::MalformedBytecode("no open block to leave".into()))?;
        if let Some(clone) = open.clone {
            self.detach_scopes(fi, &[clone])?;
            let parent = self.heap.object(clone)?.parent;
            if let Some(parent) = parent {
                self.frames[fi].scope_chain = parent;
            }
        }
        Ok(())
    }

    /// `EnterWith`: `[obj] -> [with scope]`
    pub(crate) fn enter_with(&mut self) -> VmResult<()> {
        let target = self.peek(0)?;
        let Value::Object(target) = target else {
            return Err(VmError::Type(format!("{} has no properties", self.describe(&target))));
        };
        let fi = self.top_index()?;
        if self.frames[fi].is_function() {
            self.materialize_call_object(fi)?;
        }
        let parent = self.reflect_blocks(fi)?;
        let depth = self.stack_depth()?.saturating_sub(1) as u32;
        let data = ScopeData { frame: Some(FrameLink(fi as u32)), block: None, depth };
        let with = self.heap.allocate(Class::With, Some(target), Some(parent), ObjectPayload::Scope(data))?;
        self.poke(0, Value::Object(with))?;
        let frame = &mut self.frames[fi];
        frame.scope_chain = with;
        frame.with_count += 1;
        self.cache.disable();
        Ok(())
    }

    /// `LeaveWith`
    pub(crate) fn leave_with(&mut self) -> VmResult<()> {
        self.pop()?;
        let fi = self.top_index()?;
        self.pop_with(fi)
    }

    fn pop_with(&mut self, fi: usize) -> VmResult<()> {
        let head = self.frames[fi].scope_chain;
        let record = self.heap.object(head)?;
        if !matches!(record.class, Class::With) {
            return Err(VmError::MalformedBytecode("no open with scope to leave".into()));
        }
        let parent = record.parent.unwrap_or(self.realm.global);
        let frame = &mut self.frames[fi];
        frame.scope_chain = parent;
        frame.with_count = frame.with_count.saturating_sub(1);
        self.cache.enable();
        if let Some(scope) = self.heap.object_mut(head)?.scope_mut() {
            scope.frame = None;
        }
        Ok(())
    }

    /// Closes the blocks and `with` scopes frame `fi` opened at operand
    /// depth `depth` or above.
    pub(crate) fn unwind_scope(&mut self, fi: usize, depth: u32) -> VmResult<()> {
        let link = Some(FrameLink(fi as u32));
        loop {
            let head = self.frames[fi].scope_chain;
            let record = self.heap.object(head)?;
            let owned = record.scope().map_or(false, |s| s.frame == link && s.depth >= depth);
            match record.class {
                Class::With if owned => self.pop_with(fi)?,
                Class::Block if owned => self.pop_block(fi)?,
                _ => break,
            }
        }
        while let Some(open) = self.frames[fi].blocks.last() {
            if open.depth < depth {
                break;
            }
            self.pop_block(fi)?;
        }
        Ok(())
    }

    /// Object receiving declarations made by the current frame.
    pub(crate) fn var_object(&mut self) -> VmResult<ObjectId> {
        let fi = self.top_index()?;
        if let Some(obj) = self.frames[fi].var_obj {
            return Ok(obj);
        }
        if self.frames[fi].is_function() {
            return self.materialize_call_object(fi);
        }
        Ok(self.realm.global)
    }

    /// Walks the scope chain for `key`.
    pub(crate) fn find_name(&mut self, key: &JsString) -> VmResult<Option<NameRef>> {
        let mut scope = Some(self.frame()?.scope_chain);
        let mut scope_hops = 0;
        let mut via_with = false;
        while let Some(obj) = scope {
            via_with |= matches!(self.heap.object(obj)?.class, Class::With);
            if let Some(found) = self.heap.lookup(obj, key)? {
                return Ok(Some(NameRef {
                    scope: obj,
                    holder: found.holder,
                    prop: found.prop,
                    scope_hops,
                    proto_hops: found.proto_hops,
                    via_with,
                }));
            }
            scope = self.heap.object(obj)?.parent;
            scope_hops += 1;
        }
        Ok(None)
    }

    /// Object a name found through `scope` is read on: the target of a
    /// `with`, the scope object itself otherwise.
    fn scope_receiver(&self, scope: ObjectId) -> VmResult<ObjectId> {
        let record = self.heap.object(scope)?;
        Ok(match record.class {
            Class::With => record.proto.unwrap_or(scope),
            _ => scope,
        })
    }

    /// `this` for a function called by name.
    fn implicit_this(&self, scope: ObjectId) -> VmResult<Value> {
        let record = self.heap.object(scope)?;
        Ok(match record.class {
            Class::With => Value::Object(record.proto.unwrap_or(scope)),
            Class::Call | Class::Block | Class::Global => Value::Undefined,
            _ => Value::Object(scope),
        })
    }

    /// Reads a name through the property cache. Returns the value and the
    /// scope object it was found through, or `None` when unresolved.
    pub(crate) fn read_name(
        &mut self,
        site: Site,
        key: &JsString,
        call: bool,
    ) -> VmResult<Option<(Value, ObjectId)>> {
        let head = self.frame()?.scope_chain;
        if let Some(hit) = self.cache.probe(&self.heap, site, head) {
            let receiver = Value::Object(self.scope_receiver(hit.scope)?);
            let value = self.read_cached(&receiver, hit.holder, hit.value)?;
            return Ok(Some((value, hit.scope)));
        }
        let Some(name) = self.find_name(key)? else {
            return Ok(None);
        };
        let receiver = Value::Object(self.scope_receiver(name.scope)?);
        let value = self.read_property(&receiver, name.holder, &name.prop)?;
        // A with target gaining a property shadows outer names without
        // changing any shape on the walk.
        if !name.via_with {
            let found = memory_manager::Found {
                holder: name.holder,
                prop: name.prop,
                proto_hops: name.proto_hops,
            };
            self.fill_after_lookup(site, head, name.scope_hops, &found, &value, call)?;
        }
        Ok(Some((value, name.scope)))
    }

    fn not_defined(key: &JsString) -> VmError {
        VmError::Reference(format!("{} is not defined", key))
    }

    /// `Name`
    pub(crate) fn name_op(&mut self, site: Site, key: &JsString) -> VmResult<()> {
        match self.read_name(site, key, false)? {
            Some((value, _)) => self.push(value),
            None => Err(Self::not_defined(key)),
        }
    }

    /// `TypeofName`: unresolved names are `"undefined"`.
    pub(crate) fn typeof_name_op(&mut self, site: Site, key: &JsString) -> VmResult<()> {
        let t = match self.read_name(site, key, false)? {
            Some((value, _)) => self.type_of(&value),
            None => "undefined",
        };
        self.push(Value::from(t))
    }

    /// `CallName`: pushes `[callee, this]`.
    pub(crate) fn call_name_op(&mut self, site: Site, key: &JsString) -> VmResult<()> {
        let (value, scope) = self.read_name(site, key, true)?.ok_or_else(|| Self::not_defined(key))?;
        let this = self.implicit_this(scope)?;
        self.push(value)?;
        self.push(this)
    }

    /// `BindName`: pushes the scope object `key` resolves through, or the
    /// global object when it does not resolve.
    pub(crate) fn bind_name_op(&mut self, key: &JsString) -> VmResult<()> {
        let scope = match self.find_name(key)? {
            Some(name) => name.scope,
            None => self.realm.global,
        };
        self.push(Value::Object(scope))
    }

    /// `SetName`: `[scope, value] -> [value]`
    pub(crate) fn set_name_op(&mut self, key: &JsString) -> VmResult<()> {
        let value = self.pop()?;
        let scope = self.pop()?;
        let Value::Object(scope) = scope else {
            return Err(VmError::MalformedBytecode("SetName without a bound scope".into()));
        };
        self.assign_through(scope, key, value.clone())?;
        self.push(value)
    }

    fn assign_through(&mut self, scope: ObjectId, key: &JsString, value: Value) -> VmResult<()> {
        let receiver = self.scope_receiver(scope)?;
        match self.heap.lookup(scope, key)? {
            Some(found) => self.write_property(receiver, found.holder, &found.prop, value),
            None => {
                if scope == self.realm.global {
                    if self.config.strict || self.frame()?.script.flags.strict {
                        return Err(Self::not_defined(key));
                    }
                    tracing::warn!(target: "vm::frame", name = %key, "assignment to undeclared variable");
                }
                self.heap.define_property(receiver, key.clone(), PropertyDef::data(value, Attrs::ENUMERATE))?;
                Ok(())
            }
        }
    }

    /// `DelName`
    pub(crate) fn del_name_op(&mut self, key: &JsString) -> VmResult<()> {
        let deleted = match self.find_name(key)? {
            Some(name) => {
                let own = name.proto_hops == 0 || name.holder == self.scope_receiver(name.scope)?;
                if own {
                    self.heap.delete_property(name.holder, key)?
                } else {
                    true
                }
            }
            None => true,
        };
        self.push(Value::Boolean(deleted))
    }

    /// `NameIncDec`
    pub(crate) fn name_inc_dec_op(&mut self, key: &JsString, kind: IncDec) -> VmResult<()> {
        let name = self.find_name(key)?.ok_or_else(|| Self::not_defined(key))?;
        let receiver = self.scope_receiver(name.scope)?;
        let old = self.read_property(&Value::Object(receiver), name.holder, &name.prop)?;
        let (new, result) = self.inc_dec_value(old, kind)?;
        self.write_property(receiver, name.holder, &name.prop, new)?;
        self.push(result)
    }

    // Fast globals.

    fn gvar_atom(script: &Script, slot: u16) -> VmResult<JsString> {
        let atom = script
            .global_names
            .get(slot as usize)
            .copied()
            .ok_or_else(|| VmError::MalformedBytecode(format!("global slot {} out of range", slot)))?;
        Vm::atom(script, atom)
    }

    fn fast_global(&self, slot: u16) -> VmResult<FastGlobal> {
        Ok(self.frame()?.fast_globals.get(slot as usize).copied().unwrap_or(FastGlobal::Name))
    }

    /// `GetGVar`
    pub(crate) fn get_gvar_op(&mut self, site: Site, script: &Script, slot: u16) -> VmResult<()> {
        match self.fast_global(slot)? {
            FastGlobal::Slot(s) => {
                let value = self.heap.get_slot(self.realm.global, s)?;
                self.push(value)
            }
            FastGlobal::Name => self.name_op(site, &Self::gvar_atom(script, slot)?),
        }
    }

    /// `SetGVar`: `[value] -> [value]`
    pub(crate) fn set_gvar_op(&mut self, script: &Script, slot: u16) -> VmResult<()> {
        let value = self.peek(0)?;
        match self.fast_global(slot)? {
            FastGlobal::Slot(s) => {
                let global = self.realm.global;
                self.heap.set_slot(global, s, value)?;
                Ok(())
            }
            FastGlobal::Name => {
                let key = Self::gvar_atom(script, slot)?;
                let scope = match self.find_name(&key)? {
                    Some(name) => name.scope,
                    None => self.realm.global,
                };
                self.assign_through(scope, &key, value)
            }
        }
    }

    /// `GVarIncDec`
    pub(crate) fn gvar_inc_dec_op(&mut self, script: &Script, slot: u16, kind: IncDec) -> VmResult<()> {
        match self.fast_global(slot)? {
            FastGlobal::Slot(s) => {
                let global = self.realm.global;
                let old = self.heap.get_slot(global, s)?;
                let (new, result) = self.inc_dec_value(old, kind)?;
                self.heap.set_slot(global, s, new)?;
                self.push(result)
            }
            FastGlobal::Name => self.name_inc_dec_op(&Self::gvar_atom(script, slot)?, kind),
        }
    }

    // Declarations.

    fn declaration_attrs(&self, readonly: bool) -> VmResult<Attrs> {
        let mut attrs = Attrs::ENUMERATE;
        if !self.frame()?.flags.eval {
            attrs = attrs | Attrs::PERMANENT;
        }
        if readonly {
            attrs = attrs | Attrs::READONLY;
        }
        Ok(attrs)
    }

    pub(crate) fn redeclaration(&self, what: &str, key: &JsString) -> VmResult<()> {
        match self.config.redeclaration {
            RedeclarationPolicy::Warn => {
                tracing::warn!(target: "heap::shape", name = %key, "redeclaration of {}", what);
                Ok(())
            }
            RedeclarationPolicy::Error => {
                Err(VmError::Type(format!("redeclaration of {} {}", what, key)))
            }
        }
    }

    /// Points the frame's fast-global entry for `atom` at the global's
    /// slot when the property can never move.
    fn bind_fast_global(&mut self, script: &Script, atom: u32, var_obj: ObjectId) -> VmResult<()> {
        if var_obj != self.realm.global {
            return Ok(());
        }
        let Some(gslot) = script.global_slot_of(atom) else {
            return Ok(());
        };
        let key = Vm::atom(script, atom)?;
        let Some(prop) = self.heap.lookup_own(var_obj, &key)? else {
            return Ok(());
        };
        if let (true, true, false, Some(slot)) = (
            prop.is_plain_data(),
            prop.attrs.contains(Attrs::PERMANENT),
            prop.attrs.contains(Attrs::READONLY),
            prop.slot,
        ) {
            if let Some(entry) = self.frame_mut()?.fast_globals.get_mut(gslot as usize) {
                *entry = FastGlobal::Slot(slot);
            }
        }
        Ok(())
    }

    /// `DefVar`
    pub(crate) fn def_var_op(&mut self, script: &Script, atom: u32) -> VmResult<()> {
        let key = Vm::atom(script, atom)?;
        let var_obj = self.var_object()?;
        match self.heap.lookup_own(var_obj, &key)? {
            Some(prop) if prop.attrs.contains(Attrs::READONLY) => self.redeclaration("const", &key)?,
            Some(_) => {}
            None => {
                let attrs = self.declaration_attrs(false)?;
                self.heap.define_property(var_obj, key, PropertyDef::data(Value::Undefined, attrs))?;
            }
        }
        self.bind_fast_global(script, atom, var_obj)
    }

    /// `DefConst`
    pub(crate) fn def_const_op(&mut self, script: &Script, atom: u32) -> VmResult<()> {
        let key = Vm::atom(script, atom)?;
        let var_obj = self.var_object()?;
        match self.heap.lookup_own(var_obj, &key)? {
            Some(prop) => {
                let what = if prop.attrs.contains(Attrs::READONLY) { "const" } else { "var" };
                self.redeclaration(what, &key)
            }
            None => {
                let attrs = self.declaration_attrs(true)?;
                self.heap.define_property(var_obj, key, PropertyDef::data(Value::Undefined, attrs))?;
                Ok(())
            }
        }
    }

    /// `InitConst`: `[value] -> []`
    pub(crate) fn init_const_op(&mut self, script: &Script, atom: u32) -> VmResult<()> {
        let value = self.pop()?;
        let key = Vm::atom(script, atom)?;
        let var_obj = self.var_object()?;
        match self.heap.lookup_own(var_obj, &key)? {
            Some(PropertySpec { slot: Some(slot), .. }) => {
                self.heap.set_slot(var_obj, slot, value)?;
            }
            Some(_) => {}
            None => {
                let attrs = self.declaration_attrs(true)?;
                self.heap.define_property(var_obj, key, PropertyDef::data(value, attrs))?;
            }
        }
        Ok(())
    }

    /// `DefFun`
    pub(crate) fn def_fun_op(&mut self, script: &Script, index: u32) -> VmResult<()> {
        let nested = script
            .function(index)
            .cloned()
            .ok_or_else(|| VmError::MalformedBytecode(format!("function {} out of range", index)))?;
        let key = nested
            .name
            .clone()
            .ok_or_else(|| VmError::MalformedBytecode("function declaration without a name".into()))?;
        let parent = self.scope_chain()?;
        let f = Value::Object(self.create_closure(&nested, parent)?);
        let var_obj = self.var_object()?;
        match self.heap.lookup_own(var_obj, &key)? {
            Some(prop) if prop.attrs.contains(Attrs::READONLY) => self.redeclaration("const", &key)?,
            Some(prop) if prop.attrs.contains(Attrs::PERMANENT) => {
                self.write_property(var_obj, var_obj, &prop, f)?;
            }
            _ => {
                let attrs = self.declaration_attrs(false)?;
                self.heap.define_property(var_obj, key.clone(), PropertyDef::data(f, attrs))?;
            }
        }
        if let Some(atom) = script.atoms.iter().position(|a| *a == key) {
            self.bind_fast_global(script, atom as u32, var_obj)?;
        }
        Ok(())
    }

    /// `Lambda`
    pub(crate) fn lambda_op(&mut self, script: &Script, index: u32) -> VmResult<Flow> {
        let nested = script
            .function(index)
            .cloned()
            .ok_or_else(|| VmError::MalformedBytecode(format!("function {} out of range", index)))?;
        let parent = self.scope_chain()?;
        let f = self.create_closure(&nested, parent)?;
        self.push(Value::Object(f))?;
        Ok(Flow::Next)
    }
}
