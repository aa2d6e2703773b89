//! Generators.
//!
//! A generator function starts with a `Generator` instruction that moves
//! its fresh frame, operand values included, into a generator object. Each
//! resume pushes the frame back onto the frame stack as an entry frame and
//! runs it until the next `Yield` (which saves it again) or until it
//! returns. Scope objects that alias the frame are detached while it is
//! suspended and re-attached on resume.

use crate::call_frame::{Frame, FrameState};
use crate::dispatch::Flow;
use crate::error::{VmError, VmResult};
use crate::native::NativeArgs;
use crate::vm::{Completion, Pending, Vm};
use core_types::{ObjectId, Value};
use memory_manager::{Attrs, Class, InternalSlot, ObjectPayload, PropertyDef, Trace, Tracer};
use std::any::Any;

/// Lifecycle of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    /// Created, body not started
    NewBorn,
    /// Suspended at a `yield`
    Open,
    /// Body executing
    Running,
    /// Body executing finally blocks for a close request
    Closing,
    /// Finished; resuming does nothing
    Closed,
}

/// How to resume a generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeMode {
    /// Make the pending `yield` evaluate to this value
    Send(Value),
    /// Throw this value at the pending `yield`
    Throw(Value),
    /// Run finally blocks and finish
    Close,
}

/// Outcome of a resume.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorResult {
    /// Yielded or returned value
    pub value: Value,
    /// True once the generator finished
    pub done: bool,
}

impl GeneratorResult {
    fn finished() -> Self {
        GeneratorResult { value: Value::Undefined, done: true }
    }
}

#[derive(Debug)]
struct SavedFrame {
    frame: Frame,
    values: Vec<Value>,
    scopes: Vec<ObjectId>,
}

#[derive(Debug)]
pub(crate) struct GeneratorState {
    status: GeneratorStatus,
    saved: Option<SavedFrame>,
}

impl InternalSlot for GeneratorState {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(saved) = &self.saved {
            saved.frame.trace(tracer);
            saved.values.trace(tracer);
            saved.scopes.trace(tracer);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Vm {
    fn generator_state(&self, generator: ObjectId) -> VmResult<&GeneratorState> {
        self.heap
            .object(generator)?
            .internal::<GeneratorState>()
            .ok_or_else(|| VmError::Type("not a generator".into()))
    }

    fn generator_state_mut(&mut self, generator: ObjectId) -> VmResult<&mut GeneratorState> {
        self.heap
            .object_mut(generator)?
            .internal_mut::<GeneratorState>()
            .ok_or_else(|| VmError::Type("not a generator".into()))
    }

    fn set_generator_status(&mut self, generator: ObjectId, status: GeneratorStatus) -> VmResult<()> {
        self.generator_state_mut(generator)?.status = status;
        Ok(())
    }

    /// Status of a generator object, or `None` for other values.
    pub fn generator_status(&self, generator: &Value) -> Option<GeneratorStatus> {
        let id = generator.as_object()?;
        self.generator_state(id).ok().map(|s| s.status)
    }

    /// Moves the top frame and its storage into `generator`.
    fn save_generator_frame(&mut self, generator: ObjectId) -> VmResult<bool> {
        let fi = self.top_index()?;
        let scopes = self.frame_scopes(fi)?;
        self.detach_scopes(fi, &scopes)?;
        for _ in 0..self.frames[fi].with_count {
            self.cache.enable();
        }
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Internal("no frame to suspend".into()))?;
        let values = self.arena.split_off(frame.seg, frame.base);
        if self.arena.len(frame.seg) == 0 {
            self.arena.release(frame.seg);
        }
        let entry = frame.flags.entry;
        frame.state = FrameState::Suspended;
        frame.flags.constructing = false;
        frame.flags.entry = false;
        frame.generator = Some(generator);
        self.generator_state_mut(generator)?.saved = Some(SavedFrame { frame, values, scopes });
        Ok(entry)
    }

    /// `Generator`: suspends the fresh frame and returns the generator
    /// object to the caller.
    pub(crate) fn generator_op(&mut self) -> VmResult<Flow> {
        let proto = self.realm.generator_prototype;
        let state = GeneratorState { status: GeneratorStatus::NewBorn, saved: None };
        let generator =
            self.heap.allocate(Class::Generator, Some(proto), None, ObjectPayload::Internal(Box::new(state)))?;
        self.frame_mut()?.pc += 1;
        let entry = self.save_generator_frame(generator)?;
        let value = Value::Object(generator);
        self.hook_return(&value);
        tracing::trace!(target: "vm::gen", ?generator, "created");
        if entry {
            return Ok(Flow::Done(Completion::Return(value)));
        }
        self.frame_mut()?.pc += 1;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    /// `Yield`: suspends the generator frame at this instruction.
    pub(crate) fn yield_op(&mut self) -> VmResult<Flow> {
        let generator = self
            .frame()?
            .generator
            .ok_or_else(|| VmError::Type("yield outside a generator".into()))?;
        if self.generator_state(generator)?.status == GeneratorStatus::Closing {
            return Err(VmError::Type("yield from closing generator".into()));
        }
        let value = self.pop()?;
        self.save_generator_frame(generator)?;
        self.set_generator_status(generator, GeneratorStatus::Open)?;
        Ok(Flow::Done(Completion::Yield(value)))
    }

    /// Marks a generator as finished and drops its saved frame.
    pub(crate) fn finish_generator(&mut self, generator: ObjectId) -> VmResult<()> {
        tracing::trace!(target: "vm::gen", ?generator, "closed");
        let state = self.generator_state_mut(generator)?;
        state.status = GeneratorStatus::Closed;
        state.saved = None;
        Ok(())
    }

    /// Resumes a generator.
    ///
    /// # Arguments
    ///
    /// * `generator` - A generator object
    /// * `mode` - Value to send, value to throw, or a close request
    ///
    /// # Returns
    ///
    /// The yielded value with `done: false`, or the returned value with
    /// `done: true`. A value the generator does not catch is returned as
    /// `VmError::Throw` and leaves the generator closed.
    pub fn resume_generator(&mut self, generator: ObjectId, mode: ResumeMode) -> VmResult<GeneratorResult> {
        let status = self.generator_state(generator)?.status;
        match (status, &mode) {
            (GeneratorStatus::Running | GeneratorStatus::Closing, _) => {
                return Err(VmError::Type("already executing generator".into()));
            }
            (GeneratorStatus::Closed, ResumeMode::Throw(v)) => return Err(VmError::Throw(v.clone())),
            (GeneratorStatus::Closed, _) => return Ok(GeneratorResult::finished()),
            (GeneratorStatus::NewBorn, ResumeMode::Send(v)) if *v != Value::Undefined => {
                return Err(VmError::Type(format!(
                    "attempt to send {} to newborn generator",
                    self.describe(v)
                )));
            }
            (GeneratorStatus::NewBorn, ResumeMode::Throw(v)) => {
                self.finish_generator(generator)?;
                return Err(VmError::Throw(v.clone()));
            }
            (GeneratorStatus::NewBorn, ResumeMode::Close) => {
                self.finish_generator(generator)?;
                return Ok(GeneratorResult::finished());
            }
            _ => {}
        }
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::Range("too much recursion".into()));
        }

        let saved = self
            .generator_state_mut(generator)?
            .saved
            .take()
            .ok_or_else(|| VmError::Internal("generator has no saved frame".into()))?;
        let SavedFrame { mut frame, values, scopes } = saved;
        let needed = values.len().max(2 + frame.nslots + Frame::extent(&frame.script));
        let (seg, base) = match self.arena.reserve(0, needed) {
            Ok(place) => place,
            Err(err) => {
                self.generator_state_mut(generator)?.saved = Some(SavedFrame { frame, values, scopes });
                return Err(err);
            }
        };
        self.arena.extend(seg, values);
        frame.seg = seg;
        frame.base = base;
        frame.flags.entry = true;
        frame.state = FrameState::Running;
        let (callee, with_count) = (frame.callee, frame.with_count);
        self.frames.push(frame);
        let fi = self.frames.len() - 1;
        self.attach_scopes(fi, &scopes)?;
        for _ in 0..with_count {
            self.cache.disable();
        }
        let running = match mode {
            ResumeMode::Close => GeneratorStatus::Closing,
            _ => GeneratorStatus::Running,
        };
        self.set_generator_status(generator, running)?;
        tracing::trace!(target: "vm::gen", ?generator, ?running, "resumed");
        self.hook_call(callee);

        let completion = match mode {
            ResumeMode::Send(value) => {
                if status == GeneratorStatus::Open {
                    self.push(value)?;
                    self.frame_mut()?.pc += 1;
                }
                self.run()
            }
            ResumeMode::Throw(value) => self.run_from(Some(Pending::Exception(value))),
            ResumeMode::Close => self.run_from(Some(Pending::Close)),
        };
        match completion {
            Ok(Completion::Yield(value)) => Ok(GeneratorResult { value, done: false }),
            Ok(Completion::Return(value)) => Ok(GeneratorResult { value, done: true }),
            Err(err) => {
                self.finish_generator(generator)?;
                Err(err)
            }
        }
    }

    /// Builds a `{ value, done }` object.
    pub(crate) fn iterator_result(&mut self, result: GeneratorResult) -> VmResult<Value> {
        let obj = self.create_object()?;
        self.heap.define_property(obj, "value".into(), PropertyDef::data(result.value, Attrs::ENUMERATE))?;
        self.heap.define_property(obj, "done".into(), PropertyDef::data(Value::Boolean(result.done), Attrs::ENUMERATE))?;
        Ok(Value::Object(obj))
    }
}

fn resume_this(vm: &mut Vm, args: &NativeArgs, mode: ResumeMode) -> VmResult<Value> {
    let generator = match &args.this {
        Value::Object(id) if matches!(vm.heap.object(*id)?.class, Class::Generator) => *id,
        other => {
            return Err(VmError::Type(format!("{} is not a generator", vm.describe(other))));
        }
    };
    let result = vm.resume_generator(generator, mode)?;
    vm.iterator_result(result)
}

pub(crate) fn generator_next(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    resume_this(vm, args, ResumeMode::Send(Value::Undefined))
}

pub(crate) fn generator_send(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    resume_this(vm, args, ResumeMode::Send(args.arg(0)))
}

pub(crate) fn generator_throw(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    resume_this(vm, args, ResumeMode::Throw(args.arg(0)))
}

pub(crate) fn generator_close(vm: &mut Vm, args: &NativeArgs) -> VmResult<Value> {
    resume_this(vm, args, ResumeMode::Close)
}
