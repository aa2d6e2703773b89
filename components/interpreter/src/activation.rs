//! Activation records.
//!
//! Lightweight frames keep their arguments and locals in arena slots only.
//! When something needs to see them as properties (a closure, `eval`,
//! `arguments`, a `with` inside the function) the frame gets a `Call`
//! object whose properties are bindings: while the frame is live they read
//! and write the frame's slots, and when it goes away their current values
//! are copied into the object's own slots.

use crate::call_frame::Frame;
use crate::error::{VmError, VmResult};
use crate::vm::Vm;
use core_types::{ObjectId, Value};
use memory_manager::{
    Accessor, Attrs, Binding, Class, FrameLink, ObjectPayload, PropertyDef, ScopeData,
};

fn binding_index(frame: &Frame, binding: Binding) -> usize {
    match binding {
        Binding::Arg(n) => frame.argv() + n as usize,
        Binding::Local(n) => frame.vars() + n as usize,
    }
}

impl Vm {
    /// Forces the activation record of the current frame into existence.
    ///
    /// # Returns
    ///
    /// The frame's `Call` object, or `None` for frames that do not run a
    /// function body (top-level and eval code).
    pub fn materialize_activation(&mut self) -> VmResult<Option<ObjectId>> {
        let fi = self.top_index()?;
        if !self.frames[fi].is_function() {
            return Ok(None);
        }
        self.materialize_call_object(fi).map(Some)
    }

    pub(crate) fn materialize_call_object(&mut self, fi: usize) -> VmResult<ObjectId> {
        let frame = &self.frames[fi];
        if let Some(call) = frame.call_obj {
            return Ok(call);
        }
        let callee = frame
            .callee
            .ok_or_else(|| VmError::Internal("activation record for a frame without callee".into()))?;
        let parent = self.heap.object(callee)?.parent.unwrap_or(self.realm.global);
        let script = std::rc::Rc::clone(&frame.script);

        let data = ScopeData { frame: Some(FrameLink(fi as u32)), block: None, depth: 0 };
        let call = self.heap.allocate(Class::Call, None, Some(parent), ObjectPayload::Scope(data))?;
        let attrs = Attrs::ENUMERATE | Attrs::PERMANENT;
        for (i, name) in script.params.iter().enumerate() {
            let binding = Binding::Arg(i as u16);
            let value = self.frame_value(fi, binding_index(&self.frames[fi], binding))?;
            self.heap.define_property(call, name.clone(), PropertyDef::binding(binding, value, attrs))?;
        }
        for (i, name) in script.vars.iter().enumerate() {
            let binding = Binding::Local(i as u16);
            let value = self.frame_value(fi, binding_index(&self.frames[fi], binding))?;
            self.heap.define_property(call, name.clone(), PropertyDef::binding(binding, value, attrs))?;
        }

        let frame = &mut self.frames[fi];
        frame.call_obj = Some(call);
        if frame.var_obj.is_none() {
            frame.var_obj = Some(call);
        }
        if frame.scope_chain == parent {
            frame.scope_chain = call;
        }
        tracing::trace!(target: "vm::frame", frame = fi, "materialized call object");
        Ok(call)
    }

    /// Reifies `arguments` for a function frame.
    pub(crate) fn arguments_object(&mut self, fi: usize) -> VmResult<ObjectId> {
        let frame = &self.frames[fi];
        if let Some(args) = frame.args_obj {
            return Ok(args);
        }
        let (argc, callee) = (frame.argc, frame.callee);
        let proto = self.realm.object_prototype;
        let data = ScopeData { frame: Some(FrameLink(fi as u32)), block: None, depth: 0 };
        let args = self.heap.allocate(Class::Arguments, Some(proto), None, ObjectPayload::Scope(data))?;
        for i in 0..argc {
            let binding = Binding::Arg(i as u16);
            let value = self.frame_value(fi, binding_index(&self.frames[fi], binding))?;
            self.heap.define_property(
                args,
                i.to_string().into(),
                PropertyDef::binding(binding, value, Attrs::ENUMERATE),
            )?;
        }
        self.heap.define_property(args, "length".into(), PropertyDef::data(Value::Smi(argc as i32), Attrs::NONE))?;
        if let Some(callee) = callee {
            self.heap.define_property(args, "callee".into(), PropertyDef::data(Value::Object(callee), Attrs::NONE))?;
        }
        self.frames[fi].args_obj = Some(args);
        Ok(args)
    }

    fn linked_frame(&self, holder: ObjectId) -> VmResult<Option<usize>> {
        let record = self.heap.object(holder)?;
        Ok(record.scope().and_then(|s| s.frame).map(|FrameLink(fi)| fi as usize))
    }

    pub(crate) fn read_binding(
        &self,
        holder: ObjectId,
        binding: Binding,
        slot: Option<u32>,
    ) -> VmResult<Value> {
        match self.linked_frame(holder)? {
            Some(fi) => {
                let frame = self
                    .frames
                    .get(fi)
                    .ok_or_else(|| VmError::Internal(format!("binding names dead frame {}", fi)))?;
                self.frame_value(fi, binding_index(frame, binding))
            }
            None => match slot {
                Some(slot) => Ok(self.heap.get_slot(holder, slot)?),
                None => Ok(Value::Undefined),
            },
        }
    }

    pub(crate) fn write_binding(
        &mut self,
        holder: ObjectId,
        binding: Binding,
        slot: Option<u32>,
        value: Value,
    ) -> VmResult<()> {
        match self.linked_frame(holder)? {
            Some(fi) => {
                let frame = self
                    .frames
                    .get(fi)
                    .ok_or_else(|| VmError::Internal(format!("binding names dead frame {}", fi)))?;
                let index = binding_index(frame, binding);
                self.set_frame_value(fi, index, value)
            }
            None => {
                if let Some(slot) = slot {
                    self.heap.set_slot(holder, slot, value)?;
                }
                Ok(())
            }
        }
    }

    /// Scope objects whose bindings alias frame `fi`: its activation record,
    /// its `arguments`, and the block and `with` objects it pushed.
    pub(crate) fn frame_scopes(&self, fi: usize) -> VmResult<Vec<ObjectId>> {
        let frame = &self.frames[fi];
        let mut scopes: Vec<ObjectId> = frame.call_obj.into_iter().chain(frame.args_obj).collect();
        let link = Some(FrameLink(fi as u32));
        let mut current = Some(frame.scope_chain);
        while let Some(obj) = current {
            let record = self.heap.object(obj)?;
            let owned = matches!(record.class, Class::Block | Class::With)
                && record.scope().map_or(false, |s| s.frame == link);
            if !owned {
                break;
            }
            scopes.push(obj);
            current = record.parent;
        }
        Ok(scopes)
    }

    /// Copies the current values of the bindings of `scopes` into their own
    /// slots and unlinks them from frame `fi`.
    pub(crate) fn detach_scopes(&mut self, fi: usize, scopes: &[ObjectId]) -> VmResult<()> {
        for &obj in scopes {
            let props = self.heap.object(obj)?.shape().properties();
            for prop in props {
                if let (Accessor::Binding(binding), Some(slot)) = (prop.getter, prop.slot) {
                    let index = binding_index(&self.frames[fi], binding);
                    let value = self.frame_value(fi, index)?;
                    self.heap.set_slot(obj, slot, value)?;
                }
            }
            if let Some(scope) = self.heap.object_mut(obj)?.scope_mut() {
                scope.frame = None;
            }
        }
        Ok(())
    }

    /// Links `scopes` to frame `fi`; their bindings read the frame again.
    ///
    /// Writes made through the objects while they were detached are copied
    /// into the frame first.
    pub(crate) fn attach_scopes(&mut self, fi: usize, scopes: &[ObjectId]) -> VmResult<()> {
        for &obj in scopes {
            let props = self.heap.object(obj)?.shape().properties();
            for prop in props {
                if let (Accessor::Binding(binding), Some(slot)) = (prop.getter, prop.slot) {
                    let value = self.heap.get_slot(obj, slot)?;
                    let index = binding_index(&self.frames[fi], binding);
                    self.set_frame_value(fi, index, value)?;
                }
            }
            if let Some(scope) = self.heap.object_mut(obj)?.scope_mut() {
                scope.frame = Some(FrameLink(fi as u32));
            }
        }
        Ok(())
    }

    /// Unlinks every scope object of frame `fi`.
    pub(crate) fn detach_activation(&mut self, fi: usize) -> VmResult<()> {
        let scopes = self.frame_scopes(fi)?;
        self.detach_scopes(fi, &scopes)
    }
}
