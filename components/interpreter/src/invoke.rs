//! Calls, construction and frame lifetime.
//!
//! Interpreted calls made by the dispatch loop push a frame and keep
//! looping; nothing recurses on the Rust stack. Calls from native code or
//! from the host go through [`Vm::invoke`], which pushes an entry frame and
//! runs a nested loop until that frame returns.

use crate::call_frame::{Frame, FrameFlags, FrameState};
use crate::dispatch::Flow;
use crate::error::{VmError, VmResult};
use crate::native::NativeArgs;
use crate::vm::{Completion, Vm};
use bytecode_system::Script;
use core_types::{ObjectId, Value};
use memory_manager::{
    Attrs, Class, FunctionData, FunctionKind, NativeId, ObjectPayload, PropertyDef,
};
use std::rc::Rc;

/// Everything needed to push a frame whose `[callee, this, args..]` prefix
/// is already on top of the arena.
#[derive(Debug, Clone)]
pub(crate) struct FrameSetup {
    pub script: Rc<Script>,
    pub callee: Option<ObjectId>,
    pub argc: usize,
    pub scope_chain: ObjectId,
    pub var_obj: Option<ObjectId>,
    pub flags: FrameFlags,
}

/// What calling an object runs.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Script(Rc<Script>),
    Native(NativeId),
}

impl Vm {
    /// Pushes a frame over the prefix on top of the arena. Padding and
    /// locals are filled with undefined before anything can observe them.
    pub(crate) fn push_frame(&mut self, setup: FrameSetup) -> VmResult<()> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::Range("too much recursion".into()));
        }
        let script = setup.script;
        let nslots = script.nargs().max(setup.argc);
        let needed = 2 + nslots + Frame::extent(&script);
        let (seg, base) = self.arena.reserve(2 + setup.argc, needed)?;
        for _ in setup.argc..nslots + script.nfixed() {
            self.arena.push(seg, Value::Undefined);
        }

        let is_function = setup.callee.is_some() && !setup.flags.eval;
        let heavyweight = is_function && script.flags.heavyweight;
        let strict = script.flags.strict;
        self.frames.push(Frame {
            fast_globals: Vm::fast_globals_for(&script),
            script,
            callee: setup.callee,
            seg,
            base,
            argc: setup.argc,
            nslots,
            pc: 0,
            rval: Value::Undefined,
            scope_chain: setup.scope_chain,
            var_obj: setup.var_obj,
            call_obj: None,
            args_obj: None,
            blocks: Vec::new(),
            flags: setup.flags,
            state: FrameState::Created,
            with_count: 0,
            generator: None,
        });
        let fi = self.frames.len() - 1;

        if is_function && !strict {
            let this = self.frame_value(fi, base + 1)?;
            if this.is_nullish() {
                self.set_frame_value(fi, base + 1, Value::Object(self.realm.global))?;
            }
        }
        if heavyweight {
            if let Err(err) = self.materialize_call_object(fi) {
                if let Err(teardown) = self.pop_frame() {
                    tracing::debug!(target: "vm::unwind", err = %teardown, "discarding half-built frame");
                }
                return Err(err);
            }
        }
        self.hook_call(setup.callee);
        self.mark_running()
    }

    /// Tears down the top frame without delivering a result: closes its
    /// blocks and `with` scopes, copies bindings into its activation
    /// objects and releases its storage. The frame is always popped, even
    /// when the cleanup fails.
    pub(crate) fn pop_frame(&mut self) -> VmResult<Frame> {
        let fi = self.top_index()?;
        let cleanup = self.unwind_scope(fi, 0).and_then(|_| self.detach_activation(fi));
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Internal("frame vanished during teardown".into()))?;
        self.arena.truncate(frame.seg, frame.base);
        if self.arena.len(frame.seg) == 0 {
            self.arena.release(frame.seg);
        }
        cleanup.map(|_| frame)
    }

    /// Returns from the top frame. Yields the value when the frame was an
    /// entry frame; otherwise the caller resumes after its call instruction
    /// with the value pushed.
    pub(crate) fn leave_frame(&mut self, value: Value) -> VmResult<Option<Value>> {
        self.hook_return(&value);
        let fi = self.top_index()?;
        self.frames[fi].state = FrameState::Returning;
        let value = if self.frames[fi].flags.constructing && !value.is_object() {
            self.frame_value(fi, self.frames[fi].this_index())?
        } else {
            value
        };
        let frame = self.pop_frame()?;
        if let Some(generator) = frame.generator {
            self.finish_generator(generator)?;
        }
        if frame.flags.entry {
            return Ok(Some(value));
        }
        self.frame_mut()?.pc += 1;
        self.push(value)?;
        Ok(None)
    }

    /// Flow after a frame returned `value`.
    pub(crate) fn return_flow(&mut self, value: Value) -> VmResult<Flow> {
        Ok(match self.leave_frame(value)? {
            Some(value) => Flow::Done(Completion::Return(value)),
            None => Flow::Continue,
        })
    }

    /// Resolves what calling `callee` runs.
    pub(crate) fn resolve_callee(&self, callee: &Value, constructing: bool) -> VmResult<(ObjectId, Target)> {
        let not_callable = || {
            let what = if constructing { "a constructor" } else { "a function" };
            VmError::Type(format!("{} is not {}", self.describe(callee), what))
        };
        let Value::Object(f) = callee else {
            return Err(not_callable());
        };
        let record = self.heap.object(*f)?;
        let target = match (&record.class, &record.payload) {
            (Class::Function, ObjectPayload::Function(data)) => match &data.kind {
                FunctionKind::Interpreted(script) => Target::Script(Rc::clone(script)),
                FunctionKind::Native(id) => Target::Native(*id),
            },
            (Class::Host(hooks), _) => {
                let native = if constructing { hooks.construct().or_else(|| hooks.call()) } else { hooks.call() };
                Target::Native(native.ok_or_else(not_callable)?)
            }
            _ => return Err(not_callable()),
        };
        Ok((*f, target))
    }

    /// Allocates the receiver for `new callee`, inheriting from
    /// `callee.prototype` when that is an object.
    pub(crate) fn create_this(&mut self, callee: ObjectId) -> VmResult<ObjectId> {
        let proto = match self.get_property(&Value::Object(callee), "prototype")? {
            Value::Object(p) => p,
            _ => self.realm.object_prototype,
        };
        Ok(self.heap.allocate(Class::Object, Some(proto), None, ObjectPayload::None)?)
    }

    /// Creates a function object closing over `parent`.
    pub(crate) fn create_closure(&mut self, script: &Rc<Script>, parent: ObjectId) -> VmResult<ObjectId> {
        let data = FunctionData {
            kind: FunctionKind::Interpreted(Rc::clone(script)),
            name: script.name.clone(),
        };
        let proto = self.realm.function_prototype;
        let f = self
            .heap
            .allocate(Class::Function, Some(proto), Some(parent), ObjectPayload::Function(data))?;
        let length = Value::Smi(script.nargs() as i32);
        self.heap
            .define_property(f, "length".into(), PropertyDef::data(length, Attrs::READONLY | Attrs::PERMANENT))?;
        Ok(f)
    }

    /// Calls from native code or the host. Interpreted callees run in a
    /// nested loop.
    pub(crate) fn invoke(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
        constructing: bool,
    ) -> VmResult<Value> {
        if args.len() > self.config.max_arguments {
            return Err(VmError::Range("too many arguments".into()));
        }
        let (f, target) = self.resolve_callee(&callee, constructing)?;
        let this = if constructing { Value::Object(self.create_this(f)?) } else { this };
        match target {
            Target::Native(id) => {
                let result = self.call_native(
                    id,
                    NativeArgs { callee: f, this: this.clone(), args: args.to_vec(), constructing },
                )?;
                Ok(if constructing && !result.is_object() { this } else { result })
            }
            Target::Script(script) => {
                let scope = self.heap.object(f)?.parent.unwrap_or(self.realm.global);
                let setup = FrameSetup {
                    script,
                    callee: Some(f),
                    argc: args.len(),
                    scope_chain: scope,
                    var_obj: None,
                    flags: FrameFlags { constructing, entry: true, eval: false },
                };
                self.enter_with_prefix(callee, this, args, setup)?;
                self.run_to_value()
            }
        }
    }

    /// `Call`/`New`: `[callee, this, args..] -> [result]`.
    pub(crate) fn call_op(&mut self, argc: usize, constructing: bool) -> VmResult<Flow> {
        if argc > self.config.max_arguments {
            return Err(VmError::Range("too many arguments".into()));
        }
        self.operation_tick()?;
        let callee = self.peek(argc + 1)?;
        let (f, target) = self.resolve_callee(&callee, constructing)?;
        if constructing {
            let obj = self.create_this(f)?;
            self.poke(argc, Value::Object(obj))?;
        }
        match target {
            Target::Script(script) => {
                let scope = self.heap.object(f)?.parent.unwrap_or(self.realm.global);
                self.push_frame(FrameSetup {
                    script,
                    callee: Some(f),
                    argc,
                    scope_chain: scope,
                    var_obj: None,
                    flags: FrameFlags { constructing, ..FrameFlags::default() },
                })?;
                Ok(Flow::Continue)
            }
            Target::Native(id) => {
                let args = self.top_values(argc)?;
                let this = self.peek(argc)?;
                let result = self.call_native(
                    id,
                    NativeArgs { callee: f, this: this.clone(), args, constructing },
                )?;
                let result = if constructing && !result.is_object() { this } else { result };
                self.pop_n(argc + 2)?;
                self.push(result)?;
                Ok(Flow::Next)
            }
        }
    }

    /// `Eval`: a direct eval when the callee is the realm's `eval` and a
    /// compiler is installed, an ordinary call otherwise.
    pub(crate) fn eval_op(&mut self, argc: usize) -> VmResult<Flow> {
        let callee = self.peek(argc + 1)?;
        if callee != Value::Object(self.realm.eval) || self.eval_compiler.is_none() {
            return self.call_op(argc, false);
        }
        self.operation_tick()?;
        let source = if argc > 0 { self.peek(argc - 1)? } else { Value::Undefined };
        let Value::String(text) = source else {
            self.pop_n(argc + 2)?;
            self.push(source)?;
            return Ok(Flow::Next);
        };
        let script = self.compile_eval(text.as_str())?;

        let fi = self.top_index()?;
        if self.frames[fi].is_function() {
            self.materialize_call_object(fi)?;
        }
        let scope = self.scope_chain()?;
        let var_obj = self.var_object()?;
        let this = self.this_value()?;
        tracing::debug!(target: "vm::frame", "direct eval");

        self.pop_n(argc + 2)?;
        self.push(callee)?;
        self.push(this)?;
        self.push_frame(FrameSetup {
            script,
            callee: None,
            argc: 0,
            scope_chain: scope,
            var_obj: Some(var_obj),
            flags: FrameFlags { eval: true, ..FrameFlags::default() },
        })?;
        Ok(Flow::Continue)
    }

    pub(crate) fn compile_eval(&mut self, source: &str) -> VmResult<Rc<Script>> {
        match self.eval_compiler.as_mut() {
            Some(compiler) => Ok(compiler.compile(source)?),
            None => Err(VmError::Type("eval is not available".into())),
        }
    }

    /// Short description of a value for fault messages.
    pub(crate) fn describe(&self, value: &Value) -> String {
        match value {
            Value::Object(id) => match self.heap.get(*id) {
                Some(record) => match record.function().and_then(|f| f.name.clone()) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => format!("[object {}]", record.class.name()),
                },
                None => "[object]".to_string(),
            },
            Value::String(s) => format!("\"{}\"", s.as_str()),
            other => other.to_string(),
        }
    }
}

/// The realm's `eval` called indirectly: the source runs as global code.
pub(crate) fn eval_native(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    let source = args.arg(0);
    let Value::String(text) = source else {
        return Ok(source);
    };
    let script = vm.compile_eval(text.as_str())?;
    let global = vm.realm.global;
    let setup = FrameSetup {
        script,
        callee: None,
        argc: 0,
        scope_chain: global,
        var_obj: Some(global),
        flags: FrameFlags { eval: true, entry: true, constructing: false },
    };
    vm.enter_with_prefix(Value::Object(args.callee), Value::Object(global), &[], setup)?;
    vm.run_to_value()
}
