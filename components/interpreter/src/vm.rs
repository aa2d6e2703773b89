//! The virtual machine.
//!
//! A [`Vm`] owns everything one execution context needs: the object heap,
//! the realm's well-known objects, the operand-stack arena, the frame
//! stack, the property cache and the host hooks. There is no global state;
//! two engines never share anything.

use crate::call_frame::{FastGlobal, Frame, FrameFlags, FrameState};
use crate::config::EngineConfig;
use crate::error::{VmError, VmResult};
use crate::generator;
use crate::hooks::{DebugHooks, EvalCompiler, OperationCallback};
use crate::invoke::FrameSetup;
use crate::native::{self, NativeFn, NativeRegistry};
use crate::property_cache::{CacheStats, PropertyCache};
use crate::stack_arena::StackArena;
use bytecode_system::Script;
use core_types::{ErrorKind, JsString, ObjectId, Value};
use memory_manager::{Attrs, Class, Heap, Intrinsics, ObjectPayload, PropertyDef};
use std::rc::Rc;

/// Well-known objects of an engine instance.
#[derive(Debug, Clone, Copy)]
pub struct Realm {
    /// The global object
    pub global: ObjectId,
    /// Prototype of plain objects
    pub object_prototype: ObjectId,
    /// Prototype of function objects
    pub function_prototype: ObjectId,
    /// Prototype of generator objects (`next`, `send`, `throw`, `close`)
    pub generator_prototype: ObjectId,
    /// Prototype of `Error` objects
    pub error_prototype: ObjectId,
    /// Prototype of type faults
    pub type_error_prototype: ObjectId,
    /// Prototype of reference faults
    pub reference_error_prototype: ObjectId,
    /// Prototype of range faults
    pub range_error_prototype: ObjectId,
    /// Prototype of syntax faults
    pub syntax_error_prototype: ObjectId,
    /// The `eval` function
    pub eval: ObjectId,
}

impl Realm {
    fn create(heap: &mut Heap, natives: &mut NativeRegistry) -> VmResult<Realm> {
        let object_prototype = heap.allocate(Class::Object, None, None, ObjectPayload::None)?;
        let function_prototype =
            heap.allocate(Class::Object, Some(object_prototype), None, ObjectPayload::None)?;
        heap.intrinsics = Intrinsics {
            object_prototype: Some(object_prototype),
            function_prototype: Some(function_prototype),
        };
        let global = heap.allocate(Class::Global, Some(object_prototype), None, ObjectPayload::None)?;
        let generator_prototype =
            heap.allocate(Class::Object, Some(object_prototype), None, ObjectPayload::None)?;

        let error_prototype = error_prototype(heap, object_prototype, "Error")?;
        let type_error_prototype = error_prototype_of(heap, error_prototype, "TypeError")?;
        let reference_error_prototype = error_prototype_of(heap, error_prototype, "ReferenceError")?;
        let range_error_prototype = error_prototype_of(heap, error_prototype, "RangeError")?;
        let syntax_error_prototype = error_prototype_of(heap, error_prototype, "SyntaxError")?;

        let mut method = |heap: &mut Heap,
                          target: ObjectId,
                          name: &str,
                          arity: u32,
                          func: NativeFn|
         -> VmResult<ObjectId> {
            let f = natives.create_function(heap, function_prototype, name, arity, func)?;
            heap.define_property(target, name.into(), PropertyDef::data(Value::Object(f), Attrs::NONE))?;
            Ok(f)
        };
        method(heap, object_prototype, "toString", 0, Rc::new(native::object_to_string))?;
        method(heap, object_prototype, "valueOf", 0, Rc::new(native::object_value_of))?;
        method(heap, generator_prototype, "next", 0, Rc::new(generator::generator_next))?;
        method(heap, generator_prototype, "send", 1, Rc::new(generator::generator_send))?;
        method(heap, generator_prototype, "throw", 1, Rc::new(generator::generator_throw))?;
        method(heap, generator_prototype, "close", 0, Rc::new(generator::generator_close))?;
        let eval = method(heap, global, "eval", 1, Rc::new(crate::invoke::eval_native))?;

        let fixed = Attrs::READONLY | Attrs::PERMANENT;
        heap.define_property(global, "undefined".into(), PropertyDef::data(Value::Undefined, fixed))?;
        heap.define_property(global, "NaN".into(), PropertyDef::data(Value::Double(f64::NAN), fixed))?;
        heap.define_property(global, "Infinity".into(), PropertyDef::data(Value::Double(f64::INFINITY), fixed))?;

        Ok(Realm {
            global,
            object_prototype,
            function_prototype,
            generator_prototype,
            error_prototype,
            type_error_prototype,
            reference_error_prototype,
            range_error_prototype,
            syntax_error_prototype,
            eval,
        })
    }

    /// Prototype for error objects of `kind`.
    pub fn error_prototype_for(&self, kind: ErrorKind) -> ObjectId {
        match kind {
            ErrorKind::TypeError => self.type_error_prototype,
            ErrorKind::ReferenceError => self.reference_error_prototype,
            ErrorKind::RangeError => self.range_error_prototype,
            ErrorKind::SyntaxError => self.syntax_error_prototype,
            _ => self.error_prototype,
        }
    }

    pub(crate) fn objects(&self) -> [ObjectId; 10] {
        [
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.generator_prototype,
            self.error_prototype,
            self.type_error_prototype,
            self.reference_error_prototype,
            self.range_error_prototype,
            self.syntax_error_prototype,
            self.eval,
        ]
    }
}

fn error_prototype(heap: &mut Heap, proto: ObjectId, name: &str) -> VmResult<ObjectId> {
    let obj = heap.allocate(Class::Object, Some(proto), None, ObjectPayload::None)?;
    heap.define_property(obj, "name".into(), PropertyDef::data(Value::from(name), Attrs::NONE))?;
    heap.define_property(obj, "message".into(), PropertyDef::data(Value::from(""), Attrs::NONE))?;
    Ok(obj)
}

fn error_prototype_of(heap: &mut Heap, parent: ObjectId, name: &str) -> VmResult<ObjectId> {
    let obj = heap.allocate(Class::Object, Some(parent), None, ObjectPayload::None)?;
    heap.define_property(obj, "name".into(), PropertyDef::data(Value::from(name), Attrs::NONE))?;
    Ok(obj)
}

/// How a run of the dispatch loop ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Completion {
    /// The entry frame returned
    Return(Value),
    /// The entry frame (a generator) yielded
    Yield(Value),
}

/// An abrupt completion travelling through the unwinder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pending {
    /// A thrown value
    Exception(Value),
    /// A generator being closed
    Close,
}

/// The engine.
///
/// # Examples
///
/// ```
/// use bytecode_system::{Opcode, ScriptBuilder};
/// use core_types::Value;
/// use interpreter::{EngineConfig, Vm};
///
/// let mut vm = Vm::new(EngineConfig::default()).unwrap();
/// let mut b = ScriptBuilder::new();
/// b.emit(Opcode::Int(40));
/// b.emit(Opcode::Int(2));
/// b.emit(Opcode::Add);
/// b.emit(Opcode::SetRval);
/// b.emit(Opcode::Stop);
/// let script = b.finish().unwrap();
///
/// assert_eq!(vm.execute(&script).unwrap(), Value::Smi(42));
/// ```
pub struct Vm {
    pub(crate) config: EngineConfig,
    pub(crate) heap: Heap,
    pub(crate) arena: StackArena,
    pub(crate) frames: Vec<Frame>,
    pub(crate) cache: PropertyCache,
    pub(crate) realm: Realm,
    pub(crate) natives: NativeRegistry,
    pub(crate) pending: Option<Pending>,
    pub(crate) hooks: Option<Box<dyn DebugHooks>>,
    pub(crate) operation_callback: Option<OperationCallback>,
    pub(crate) eval_compiler: Option<Box<dyn EvalCompiler>>,
    pub(crate) operations: u32,
    pub(crate) native_depth: u32,
    pub(crate) run_depth: u32,
    pub(crate) roots: Vec<Value>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("frames", &self.frames.len())
            .field("live_objects", &self.heap.len())
            .field("cache", &self.cache.stats())
            .field("has_hooks", &self.hooks.is_some())
            .field("has_eval_compiler", &self.eval_compiler.is_some())
            .finish()
    }
}

impl Vm {
    /// Creates an engine with a fresh realm.
    ///
    /// # Arguments
    ///
    /// * `config` - Limits and policies
    ///
    /// # Returns
    ///
    /// The engine, or an error if the realm could not be allocated (only
    /// possible with a tiny `heap_limit`).
    pub fn new(config: EngineConfig) -> VmResult<Vm> {
        let mut heap = match config.heap_limit {
            Some(limit) => Heap::with_limit(limit),
            None => Heap::new(),
        };
        let mut natives = NativeRegistry::default();
        let realm = Realm::create(&mut heap, &mut natives)?;
        tracing::debug!(target: "vm::frame", objects = heap.len(), "realm created");
        Ok(Vm {
            arena: StackArena::new(config.stack_segment_values, config.max_stack_values),
            cache: PropertyCache::new(config.property_cache_size, config.property_cache),
            operations: config.operation_budget,
            config,
            heap,
            frames: Vec::with_capacity(64),
            realm,
            natives,
            pending: None,
            hooks: None,
            operation_callback: None,
            eval_compiler: None,
            native_depth: 0,
            run_depth: 0,
            roots: Vec::new(),
        })
    }

    /// Runs a top-level script against the global object.
    ///
    /// # Arguments
    ///
    /// * `script` - A verified script image
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The script's completion value (its return value register)
    /// * `Err(VmError)` - An uncaught fault; thrown values arrive as `VmError::Throw`
    pub fn execute(&mut self, script: &Rc<Script>) -> VmResult<Value> {
        let global = self.realm.global;
        let setup = FrameSetup {
            script: Rc::clone(script),
            callee: None,
            argc: 0,
            scope_chain: global,
            var_obj: Some(global),
            flags: FrameFlags { entry: true, ..FrameFlags::default() },
        };
        self.enter_with_prefix(Value::Undefined, Value::Object(global), &[], setup)?;
        self.run_to_value()
    }

    /// Calls `callee` with `this` and `args`.
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
        self.invoke(callee.clone(), this.clone(), args, false)
    }

    /// Constructs a new object with `callee`.
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        self.invoke(callee.clone(), Value::Undefined, args, true)
    }

    /// The global object.
    pub fn global(&self) -> ObjectId {
        self.realm.global
    }

    /// The realm's well-known objects.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The object heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the object heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The configuration the engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of live frames.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Allocates a plain object inheriting from the realm's object prototype.
    pub fn create_object(&mut self) -> VmResult<ObjectId> {
        let proto = self.realm.object_prototype;
        Ok(self.heap.allocate(Class::Object, Some(proto), None, ObjectPayload::None)?)
    }

    /// Creates a function object for a compiled function body whose scope
    /// is the global object.
    pub fn create_function(&mut self, script: &Rc<Script>) -> VmResult<ObjectId> {
        let global = self.realm.global;
        self.create_closure(script, global)
    }

    /// Allocates an error object of `kind` with the given message.
    pub fn create_error(&mut self, kind: ErrorKind, message: &str) -> VmResult<ObjectId> {
        let proto = self.realm.error_prototype_for(kind);
        let obj = self.heap.allocate(Class::Error, Some(proto), None, ObjectPayload::Error(kind))?;
        self.heap.define_property(obj, "message".into(), PropertyDef::data(Value::from(message), Attrs::NONE))?;
        Ok(obj)
    }

    /// Keeps `value` alive across collections until removed.
    pub fn add_root(&mut self, value: Value) {
        self.roots.push(value);
    }

    /// Drops one registration of `value` made by [`add_root`](Self::add_root).
    pub fn remove_root(&mut self, value: &Value) {
        if let Some(i) = self.roots.iter().position(|r| r == value) {
            self.roots.swap_remove(i);
        }
    }

    /// Drops every property cache entry.
    pub fn flush_property_cache(&mut self) {
        self.cache.flush();
    }

    /// Property cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Reads a data property without running any code: the prototype chain
    /// is walked for a slotted property with default accessors. Used for
    /// diagnostics.
    pub fn peek_property(&self, obj: ObjectId, key: &str) -> Option<Value> {
        let mut current = Some(obj);
        while let Some(id) = current {
            let record = self.heap.get(id)?;
            if let Some(prop) = record.shape().search(key) {
                return match (prop.slot, prop.getter.is_default()) {
                    (Some(slot), true) => Some(record.slot(slot)),
                    _ => None,
                };
            }
            current = record.proto;
        }
        None
    }

    // Frame and operand-stack access.

    pub(crate) fn frame(&self) -> VmResult<&Frame> {
        self.frames.last().ok_or_else(|| VmError::Internal("no active frame".into()))
    }

    pub(crate) fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| VmError::Internal("no active frame".into()))
    }

    pub(crate) fn top_index(&self) -> VmResult<usize> {
        self.frames.len().checked_sub(1).ok_or_else(|| VmError::Internal("no active frame".into()))
    }

    /// Number of values on the current frame's operand stack.
    pub(crate) fn stack_depth(&self) -> VmResult<usize> {
        let frame = self.frame()?;
        Ok(self.arena.len(frame.seg).saturating_sub(frame.spbase()))
    }

    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        let seg = self.frame()?.seg;
        self.arena.push(seg, value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        let frame = self.frame()?;
        let (seg, floor) = (frame.seg, frame.spbase());
        if self.arena.len(seg) <= floor {
            return Err(underflow());
        }
        self.arena.pop(seg).ok_or_else(underflow)
    }

    pub(crate) fn pop_n(&mut self, n: usize) -> VmResult<()> {
        let frame = self.frame()?;
        let (seg, floor) = (frame.seg, frame.spbase());
        let len = self.arena.len(seg);
        if len < floor + n {
            return Err(underflow());
        }
        self.arena.truncate(seg, len - n);
        Ok(())
    }

    /// Reads the value `n` entries below the top (0 is the top).
    pub(crate) fn peek(&self, n: usize) -> VmResult<Value> {
        let frame = self.frame()?;
        let len = self.arena.len(frame.seg);
        if len < frame.spbase() + n + 1 {
            return Err(underflow());
        }
        self.arena.get(frame.seg, len - n - 1).cloned().ok_or_else(underflow)
    }

    /// Overwrites the value `n` entries below the top.
    pub(crate) fn poke(&mut self, n: usize, value: Value) -> VmResult<()> {
        let frame = self.frame()?;
        let seg = frame.seg;
        let index = self
            .arena
            .len(seg)
            .checked_sub(n + 1)
            .filter(|&i| i >= frame.spbase())
            .ok_or_else(underflow)?;
        self.arena.set(seg, index, value);
        Ok(())
    }

    /// The top `n` values, bottom first.
    pub(crate) fn top_values(&self, n: usize) -> VmResult<Vec<Value>> {
        let frame = self.frame()?;
        let len = self.arena.len(frame.seg);
        if len < frame.spbase() + n {
            return Err(underflow());
        }
        Ok(self.arena.slice(frame.seg, len - n..len).to_vec())
    }

    /// Drops operand-stack values above `depth`.
    pub(crate) fn truncate_stack(&mut self, depth: usize) -> VmResult<()> {
        let frame = self.frame()?;
        let (seg, at) = (frame.seg, frame.spbase() + depth);
        if at < self.arena.len(seg) {
            self.arena.truncate(seg, at);
        }
        Ok(())
    }

    /// Reads frame storage at an absolute segment index.
    pub(crate) fn frame_value(&self, fi: usize, index: usize) -> VmResult<Value> {
        let frame = self.frames.get(fi).ok_or_else(|| VmError::Internal(format!("no frame {}", fi)))?;
        self.arena
            .get(frame.seg, index)
            .cloned()
            .ok_or_else(|| VmError::Internal(format!("frame slot {} out of range", index)))
    }

    /// Writes frame storage at an absolute segment index.
    pub(crate) fn set_frame_value(&mut self, fi: usize, index: usize, value: Value) -> VmResult<()> {
        let seg = self.frames.get(fi).ok_or_else(|| VmError::Internal(format!("no frame {}", fi)))?.seg;
        if self.arena.set(seg, index, value) {
            Ok(())
        } else {
            Err(VmError::Internal(format!("frame slot {} out of range", index)))
        }
    }

    pub(crate) fn this_value(&self) -> VmResult<Value> {
        let fi = self.top_index()?;
        let index = self.frames[fi].this_index();
        self.frame_value(fi, index)
    }

    /// Pushes `[callee, this, args..]` into a segment with room for the
    /// frame described by `setup`, then enters it.
    pub(crate) fn enter_with_prefix(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
        setup: FrameSetup,
    ) -> VmResult<()> {
        let nslots = setup.script.nargs().max(args.len());
        let needed = 2 + nslots + Frame::extent(&setup.script);
        let (seg, base) = self.arena.reserve(0, needed)?;
        self.arena.push(seg, callee);
        self.arena.push(seg, this);
        self.arena.extend(seg, args.iter().cloned());
        if let Err(err) = self.push_frame(setup) {
            self.arena.truncate(seg, base);
            if self.arena.len(seg) == 0 {
                self.arena.release(seg);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Runs the loop until the frame entered last returns.
    pub(crate) fn run_to_value(&mut self) -> VmResult<Value> {
        match self.run()? {
            Completion::Return(value) => Ok(value),
            Completion::Yield(_) => Err(VmError::Internal("yield escaped a generator".into())),
        }
    }

    /// Fresh fast-global table for a script.
    pub(crate) fn fast_globals_for(script: &Script) -> Vec<FastGlobal> {
        vec![FastGlobal::Name; script.global_names.len()]
    }

    pub(crate) fn mark_running(&mut self) -> VmResult<()> {
        self.frame_mut()?.state = FrameState::Running;
        Ok(())
    }

    pub(crate) fn atom(script: &Script, index: u32) -> VmResult<JsString> {
        script
            .atom(index)
            .cloned()
            .ok_or_else(|| VmError::MalformedBytecode(format!("atom {} out of range", index)))
    }
}

fn underflow() -> VmError {
    VmError::MalformedBytecode("operand stack underflow".into())
}
