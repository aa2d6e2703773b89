//! Exception unwinding.
//!
//! A catchable fault becomes a thrown value, then frames are searched
//! innermost first using their try notes. Within a frame the notes are
//! ordered inner-first; `Iter` notes close the iterator they own and the
//! search goes on. A generator being closed unwinds the same way but only
//! stops at finally blocks.

use crate::call_frame::FrameState;
use crate::dispatch::Flow;
use crate::error::{VmError, VmResult};
use crate::hooks::TrapAction;
use crate::vm::{Pending, Vm};
use bytecode_system::TryKind;
use core_types::Value;
use std::rc::Rc;

impl Vm {
    /// Turns a fault into a thrown value and starts unwinding it.
    /// Non-catchable faults are returned as they are.
    pub(crate) fn handle_error(&mut self, err: VmError) -> VmResult<Flow> {
        if !err.is_catchable() {
            return Err(err);
        }
        let mut value = self.fault_value(err);
        match self.hook_throw(&value) {
            TrapAction::Continue => {}
            TrapAction::Return(v) => return self.forced_return(v),
            TrapAction::Throw(v) => value = v,
        }
        self.unwind(Pending::Exception(value))
    }

    /// The value a catch block sees for `err`.
    fn fault_value(&mut self, err: VmError) -> Value {
        match err {
            VmError::Throw(value) => value,
            // allocating an error object is what just failed
            VmError::OutOfMemory => Value::from("out of memory"),
            other => match self.create_error(other.kind(), &other.message()) {
                Ok(obj) => Value::Object(obj),
                Err(_) => Value::from(other.to_string().as_str()),
            },
        }
    }

    /// Unwinds `pending` from the top frame until a handler takes it.
    pub(crate) fn unwind(&mut self, mut pending: Pending) -> VmResult<Flow> {
        loop {
            let fi = self.top_index()?;
            self.frames[fi].state = FrameState::Throwing;
            if let Some(flow) = self.find_handler(fi, &mut pending)? {
                return Ok(flow);
            }
            match pending {
                Pending::Close => return self.return_flow(Value::Undefined),
                Pending::Exception(value) => {
                    let frame = self.pop_frame()?;
                    if let Some(generator) = frame.generator {
                        self.finish_generator(generator)?;
                    }
                    tracing::trace!(
                        target: "vm::unwind",
                        script = frame.script.display_name(),
                        pc = frame.pc,
                        "exception leaves frame"
                    );
                    if frame.flags.entry {
                        return Err(VmError::Throw(value));
                    }
                    pending = Pending::Exception(value);
                }
            }
        }
    }

    /// Searches frame `fi`'s try notes at its current pc.
    fn find_handler(&mut self, fi: usize, pending: &mut Pending) -> VmResult<Option<Flow>> {
        let script = Rc::clone(&self.frames[fi].script);
        let pc = self.frames[fi].pc;
        for note in script.try_notes.iter().filter(|n| n.covers(pc)) {
            let depth = self.stack_depth()? as u32;
            if note.stack_depth > depth {
                continue;
            }
            match note.kind {
                TryKind::Catch => {
                    let Pending::Exception(value) = pending else {
                        continue;
                    };
                    let value = value.clone();
                    self.unwind_scope(fi, note.stack_depth)?;
                    self.truncate_stack(note.stack_depth as usize)?;
                    self.pending = Some(Pending::Exception(value));
                    self.enter_handler(fi, note.handler());
                    tracing::trace!(target: "vm::unwind", pc = note.handler(), "entering catch block");
                    return Ok(Some(Flow::Continue));
                }
                TryKind::Finally => {
                    self.unwind_scope(fi, note.stack_depth)?;
                    self.truncate_stack(note.stack_depth as usize)?;
                    let (flag, value) = match pending {
                        Pending::Exception(v) => (1, v.clone()),
                        Pending::Close => (2, Value::Undefined),
                    };
                    self.push(Value::Smi(flag))?;
                    self.push(value)?;
                    self.enter_handler(fi, note.handler());
                    tracing::trace!(target: "vm::unwind", pc = note.handler(), "entering finally block");
                    return Ok(Some(Flow::Continue));
                }
                TryKind::Iter => {
                    self.unwind_scope(fi, note.stack_depth)?;
                    self.truncate_stack(note.stack_depth as usize)?;
                    let iter = self.pop()?;
                    if let Err(err) = self.close_iterator(&iter) {
                        if !err.is_catchable() {
                            return Err(err);
                        }
                        *pending = Pending::Exception(self.fault_value(err));
                    }
                }
            }
        }
        Ok(None)
    }

    fn enter_handler(&mut self, fi: usize, pc: usize) {
        let frame = &mut self.frames[fi];
        frame.pc = pc;
        frame.state = FrameState::Running;
    }

    /// Leaves the top frame with `value` on a debugger's request. Open
    /// iterators are closed; finally blocks do not run.
    pub(crate) fn forced_return(&mut self, value: Value) -> VmResult<Flow> {
        let fi = self.top_index()?;
        let script = Rc::clone(&self.frames[fi].script);
        let pc = self.frames[fi].pc;
        for note in script.try_notes.iter().filter(|n| n.kind == TryKind::Iter && n.covers(pc)) {
            let depth = self.stack_depth()? as u32;
            if note.stack_depth == 0 || note.stack_depth > depth {
                continue;
            }
            self.unwind_scope(fi, note.stack_depth)?;
            self.truncate_stack(note.stack_depth as usize)?;
            let iter = self.pop()?;
            if let Err(err) = self.close_iterator(&iter) {
                tracing::debug!(target: "vm::unwind", %err, "closing iterator on forced return");
            }
        }
        self.return_flow(value)
    }
}
