//! Native functions.
//!
//! Natives receive the callee, `this` and the actual arguments and return a
//! value or a fault. The engine only ships the handful of natives its own
//! protocols need; hosts register the rest with
//! [`Vm::define_native`](crate::Vm::define_native).

use crate::error::{VmError, VmResult};
use crate::vm::Vm;
use core_types::{JsString, ObjectId, Value};
use memory_manager::{
    Attrs, Class, FunctionData, FunctionKind, Heap, NativeId, ObjectPayload, PropertyDef,
};
use std::rc::Rc;

/// Signature of a native function body.
pub type NativeFn = Rc<dyn Fn(&mut Vm, &NativeArgs) -> VmResult<Value>>;

/// Arguments passed to a native.
#[derive(Debug, Clone)]
pub struct NativeArgs {
    /// The function object being called
    pub callee: ObjectId,
    /// Receiver (the fresh object when constructing)
    pub this: Value,
    /// Actual arguments
    pub args: Vec<Value>,
    /// Invoked by `new`
    pub constructing: bool,
}

impl NativeArgs {
    /// Argument `i`, or undefined when missing.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).cloned().unwrap_or(Value::Undefined)
    }
}

pub(crate) struct NativeEntry {
    pub name: JsString,
    pub arity: u32,
    pub func: NativeFn,
}

/// Native function bodies, addressed by [`NativeId`].
#[derive(Default)]
pub(crate) struct NativeRegistry {
    entries: Vec<NativeEntry>,
}

impl NativeRegistry {
    pub fn register(&mut self, name: &str, arity: u32, func: NativeFn) -> NativeId {
        self.entries.push(NativeEntry { name: name.into(), arity, func });
        NativeId(self.entries.len() as u32 - 1)
    }

    pub fn get(&self, id: NativeId) -> Option<&NativeEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Registers `func` and allocates a function object for it.
    pub fn create_function(
        &mut self,
        heap: &mut Heap,
        function_prototype: ObjectId,
        name: &str,
        arity: u32,
        func: NativeFn,
    ) -> VmResult<ObjectId> {
        let id = self.register(name, arity, func);
        let data = FunctionData { kind: FunctionKind::Native(id), name: Some(name.into()) };
        let f = heap.allocate(
            Class::Function,
            Some(function_prototype),
            None,
            ObjectPayload::Function(data),
        )?;
        heap.define_property(f, "length".into(), PropertyDef::data(Value::Smi(arity as i32), Attrs::READONLY | Attrs::PERMANENT))?;
        Ok(f)
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| (e.name.as_str(), e.arity))).finish()
    }
}

impl Vm {
    /// Creates a native function object.
    pub fn create_native_function(
        &mut self,
        name: &str,
        arity: u32,
        func: impl Fn(&mut Vm, &NativeArgs) -> VmResult<Value> + 'static,
    ) -> VmResult<ObjectId> {
        let proto = self.realm.function_prototype;
        self.natives.create_function(&mut self.heap, proto, name, arity, Rc::new(func))
    }

    /// Creates a native function and binds it on the global object.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: u32,
        func: impl Fn(&mut Vm, &NativeArgs) -> VmResult<Value> + 'static,
    ) -> VmResult<ObjectId> {
        let f = self.create_native_function(name, arity, func)?;
        let global = self.realm.global;
        self.heap.define_property(global, name.into(), PropertyDef::data(Value::Object(f), Attrs::NONE))?;
        Ok(f)
    }

    /// Runs a native body. Collection is suppressed while native code is on
    /// the Rust stack, since its locals are not traced.
    pub(crate) fn call_native(&mut self, id: NativeId, args: NativeArgs) -> VmResult<Value> {
        let func = match self.natives.get(id) {
            Some(entry) => Rc::clone(&entry.func),
            None => return Err(VmError::Internal(format!("unknown native {}", id.0))),
        };
        self.native_depth += 1;
        let result = func(self, &args);
        self.native_depth -= 1;
        result
    }
}

/// `Object.prototype.toString`
pub(crate) fn object_to_string(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    let class = match &args.this {
        Value::Undefined => "Undefined".to_string(),
        Value::Null => "Null".to_string(),
        Value::Object(id) => vm.heap.object(*id)?.class.name().to_string(),
        other => {
            let t = other.type_of();
            let mut c = t.chars();
            c.next().map(|f| f.to_ascii_uppercase().to_string() + c.as_str()).unwrap_or_default()
        }
    };
    Ok(Value::String(format!("[object {}]", class).into()))
}

/// `Object.prototype.valueOf`
pub(crate) fn object_value_of(_vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    Ok(args.this.clone())
}
