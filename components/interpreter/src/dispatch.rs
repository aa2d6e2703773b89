//! Dispatch loop for bytecode execution
//!
//! `step` executes one instruction of the innermost frame and reports what
//! the loop should do next as a [`Flow`]. Calls into scripts push a frame
//! and keep running in the same loop; only host entry points and natives
//! re-enter it recursively.

use crate::dispatch::Flow::{Jump, Next};
use crate::error::{VmError, VmResult};
use crate::hooks::TrapAction;
use crate::property_cache::Site;
use crate::vm::{Completion, Pending, Vm};
use bytecode_system::{IncDec, Opcode, Script};
use core_types::{number, Value};
use memory_manager::{Attrs, PropertyDef};
use std::cmp::Ordering;
use std::rc::Rc;

/// What the loop does after an instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    /// Advance to the next instruction
    Next,
    /// Continue at this pc of the current frame
    Jump(usize),
    /// The frame stack changed and the new top frame's pc is already right
    Continue,
    /// The entry frame finished
    Done(Completion),
    /// Start unwinding with this completion
    Unwind(Pending),
    /// Leave the current frame with this value, skipping handlers
    ForcedReturn(Value),
}

impl Vm {
    /// Runs until the frame on top when called completes.
    pub(crate) fn run(&mut self) -> VmResult<Completion> {
        self.run_from(None)
    }

    /// Like [`Vm::run`], but first unwinds `first` from the top frame's
    /// current pc. Used to resume a generator with a throw or a close.
    pub(crate) fn run_from(&mut self, first: Option<Pending>) -> VmResult<Completion> {
        self.run_depth += 1;
        let result = self.run_loop(first);
        self.run_depth -= 1;
        result
    }

    fn run_loop(&mut self, mut first: Option<Pending>) -> VmResult<Completion> {
        let entry = self.top_index()?;
        loop {
            let outcome = match first.take() {
                Some(pending) => self.unwind(pending),
                None => match self.step() {
                    Ok(Flow::Unwind(pending)) => self.unwind(pending),
                    Ok(Flow::ForcedReturn(value)) => self.forced_return(value),
                    Err(err) => self.handle_error(err),
                    other => other,
                },
            };
            match outcome {
                Ok(Flow::Next) => self.frame_mut()?.pc += 1,
                Ok(Flow::Jump(pc)) => self.frame_mut()?.pc = pc,
                Ok(Flow::Continue) => {}
                Ok(Flow::Done(completion)) => return Ok(completion),
                Ok(flow) => {
                    self.abort_frames(entry);
                    return Err(VmError::Internal(format!("unresolved flow {:?}", flow)));
                }
                Err(err) => {
                    self.abort_frames(entry);
                    return Err(err);
                }
            }
        }
    }

    /// Pops every frame from `entry` up after a fault the frames cannot
    /// handle.
    fn abort_frames(&mut self, entry: usize) {
        while self.frames.len() > entry {
            match self.pop_frame() {
                Ok(frame) => {
                    if let Some(generator) = frame.generator {
                        if let Err(err) = self.finish_generator(generator) {
                            tracing::debug!(target: "vm::unwind", %err, "closing aborted generator");
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(target: "vm::unwind", %err, "discarding frame");
                    self.frames.truncate(entry);
                }
            }
        }
    }

    /// Takes a branch from `pc`. Backward branches count as operations.
    fn branch(&mut self, script: &Script, pc: usize, offset: i32) -> VmResult<Flow> {
        let target = pc as i64 + offset as i64;
        if target < 0 || target as usize >= script.code.len() {
            return Err(VmError::MalformedBytecode(format!(
                "branch from {} to {} leaves {}",
                pc,
                target,
                script.display_name()
            )));
        }
        if offset <= 0 {
            self.operation_tick()?;
            self.hook_branch(script, target as usize);
        }
        Ok(Jump(target as usize))
    }

    /// Increment or decrement, returning (stored value, expression value).
    pub(crate) fn inc_dec_value(&mut self, old: Value, kind: IncDec) -> VmResult<(Value, Value)> {
        if let Value::Smi(n) = old {
            if number::can_fast_inc_dec(n) {
                let new = Value::Smi(n + kind.delta());
                let result = if kind.is_prefix() { new.clone() } else { old };
                return Ok((new, result));
            }
        }
        let n = self.to_number(&old)?;
        let new = Value::number(n + kind.delta() as f64);
        let result = if kind.is_prefix() { new.clone() } else { Value::number(n) };
        Ok((new, result))
    }

    fn pop2(&mut self) -> VmResult<(Value, Value)> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn pop_int32s(&mut self) -> VmResult<(i32, i32)> {
        let (a, b) = self.pop2()?;
        let x = self.to_int32(&a)?;
        let y = self.to_int32(&b)?;
        Ok((x, y))
    }

    fn arith(&mut self, op: &Opcode) -> VmResult<Value> {
        let (a, b) = self.pop2()?;
        if let (Value::Smi(x), Value::Smi(y)) = (&a, &b) {
            let (x, y) = (*x, *y);
            let fast = match op {
                Opcode::Add => x.checked_add(y).map(Value::Smi),
                Opcode::Sub => x.checked_sub(y).map(Value::Smi),
                Opcode::Mul => match x.checked_mul(y) {
                    Some(0) if x < 0 || y < 0 => Some(Value::Double(-0.0)),
                    r => r.map(Value::Smi),
                },
                Opcode::Mod if y != 0 => match x.checked_rem(y) {
                    Some(0) if x < 0 => Some(Value::Double(-0.0)),
                    Some(r) => Some(Value::Smi(r)),
                    None => Some(Value::Double(-0.0)),
                },
                _ => None,
            };
            if let Some(value) = fast {
                return Ok(value);
            }
        }
        if let Opcode::Add = op {
            return self.add_values(&a, &b);
        }
        let (x, y) = self.to_numbers(&a, &b)?;
        let r = match op {
            Opcode::Sub => x - y,
            Opcode::Mul => x * y,
            Opcode::Div => x / y,
            _ => x % y,
        };
        Ok(Value::number(r))
    }

    fn relational(&mut self, op: &Opcode) -> VmResult<bool> {
        let (a, b) = self.pop2()?;
        let ord = self.compare(&a, &b)?;
        Ok(match op {
            Opcode::Lt => ord == Some(Ordering::Less),
            Opcode::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            Opcode::Gt => ord == Some(Ordering::Greater),
            _ => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        })
    }

    fn constant(script: &Script, index: u32) -> VmResult<Value> {
        script
            .constants
            .get(index as usize)
            .map(|c| c.to_value())
            .ok_or_else(|| VmError::MalformedBytecode(format!("constant {} out of range", index)))
    }

    /// Case value of a dense switch: integers, with -0 treated as 0.
    fn switch_index(value: &Value) -> Option<i32> {
        match value {
            Value::Smi(n) => Some(*n),
            Value::Double(d) if *d == 0.0 => Some(0),
            Value::Double(d) => number::as_tagged_int(*d),
            _ => None,
        }
    }

    fn init_target(&self) -> VmResult<core_types::ObjectId> {
        self.peek(0)?
            .as_object()
            .ok_or_else(|| VmError::MalformedBytecode("initializer without an object".into()))
    }

    /// Executes one instruction of the top frame.
    fn step(&mut self) -> VmResult<Flow> {
        let fi = self.top_index()?;
        let script = Rc::clone(&self.frames[fi].script);
        let pc = self.frames[fi].pc;
        let op = script.code.get(pc).ok_or_else(|| {
            VmError::MalformedBytecode(format!("pc {} out of range in {}", pc, script.display_name()))
        })?;
        let site = Site { script: script.id, pc: pc as u32 };

        match op {
            Opcode::Undefined => self.push(Value::Undefined)?,
            Opcode::Null => self.push(Value::Null)?,
            Opcode::True => self.push(Value::Boolean(true))?,
            Opcode::False => self.push(Value::Boolean(false))?,
            Opcode::Int(n) => self.push(Value::Smi(*n))?,
            Opcode::Const(index) => {
                let value = Self::constant(&script, *index)?;
                self.push(value)?;
            }
            Opcode::This => {
                let this = self.this_value()?;
                self.push(this)?;
            }

            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::PopN(n) => self.pop_n(*n as usize)?,
            Opcode::Dup => {
                let v = self.peek(0)?;
                self.push(v)?;
            }
            Opcode::Dup2 => {
                let a = self.peek(1)?;
                let b = self.peek(0)?;
                self.push(a)?;
                self.push(b)?;
            }
            Opcode::Swap => {
                let (a, b) = self.pop2()?;
                self.push(b)?;
                self.push(a)?;
            }
            Opcode::Nop | Opcode::Try | Opcode::Finally => {}

            Opcode::GetArg(n) => {
                let index = self.frames[fi].argv() + *n as usize;
                let v = self.frame_value(fi, index)?;
                self.push(v)?;
            }
            Opcode::SetArg(n) => {
                let index = self.frames[fi].argv() + *n as usize;
                let v = self.peek(0)?;
                self.set_frame_value(fi, index, v)?;
            }
            Opcode::GetLocal(n) => {
                let index = self.frames[fi].vars() + *n as usize;
                let v = self.frame_value(fi, index)?;
                self.push(v)?;
            }
            Opcode::SetLocal(n) => {
                let index = self.frames[fi].vars() + *n as usize;
                let v = self.peek(0)?;
                self.set_frame_value(fi, index, v)?;
            }
            Opcode::ArgIncDec(n, kind) | Opcode::LocalIncDec(n, kind) => {
                let index = match op {
                    Opcode::ArgIncDec(..) => self.frames[fi].argv(),
                    _ => self.frames[fi].vars(),
                } + *n as usize;
                let old = self.frame_value(fi, index)?;
                let (new, result) = self.inc_dec_value(old, *kind)?;
                self.set_frame_value(fi, index, new)?;
                self.push(result)?;
            }
            Opcode::Arguments => {
                let value = if self.frames[fi].is_function() {
                    Value::Object(self.arguments_object(fi)?)
                } else {
                    Value::Undefined
                };
                self.push(value)?;
            }

            Opcode::Name(atom) => self.name_op(site, &Vm::atom(&script, *atom)?)?,
            Opcode::TypeofName(atom) => self.typeof_name_op(site, &Vm::atom(&script, *atom)?)?,
            Opcode::BindName(atom) => self.bind_name_op(&Vm::atom(&script, *atom)?)?,
            Opcode::SetName(atom) => self.set_name_op(&Vm::atom(&script, *atom)?)?,
            Opcode::CallName(atom) => self.call_name_op(site, &Vm::atom(&script, *atom)?)?,
            Opcode::DelName(atom) => self.del_name_op(&Vm::atom(&script, *atom)?)?,
            Opcode::NameIncDec(atom, kind) => self.name_inc_dec_op(&Vm::atom(&script, *atom)?, *kind)?,

            Opcode::GetGVar(slot) => self.get_gvar_op(site, &script, *slot)?,
            Opcode::SetGVar(slot) => self.set_gvar_op(&script, *slot)?,
            Opcode::GVarIncDec(slot, kind) => self.gvar_inc_dec_op(&script, *slot, *kind)?,

            Opcode::DefVar(atom) => self.def_var_op(&script, *atom)?,
            Opcode::DefConst(atom) => self.def_const_op(&script, *atom)?,
            Opcode::InitConst(atom) => self.init_const_op(&script, *atom)?,
            Opcode::DefFun(index) => self.def_fun_op(&script, *index)?,

            Opcode::GetProp(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let base = self.pop()?;
                let v = self.get_prop_site(site, &base, &key, false)?;
                self.push(v)?;
            }
            Opcode::SetProp(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let (base, v) = self.pop2()?;
                if let Some(obj) = self.object_operand(&base)? {
                    self.set_prop_site(site, obj, &key, v.clone())?;
                }
                self.push(v)?;
            }
            Opcode::CallProp(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let base = self.pop()?;
                let f = self.get_prop_site(site, &base, &key, true)?;
                self.push(f)?;
                self.push(base)?;
            }
            Opcode::PropIncDec(atom, kind) => {
                let key = Vm::atom(&script, *atom)?;
                let base = self.pop()?;
                let result = self.element_inc_dec(&base, &key, *kind)?;
                self.push(result)?;
            }
            Opcode::GetElem => {
                let (base, key) = self.pop2()?;
                self.object_operand(&base)?;
                let key = self.to_property_key(&key)?;
                let v = self.get_value(&base, &key)?;
                self.push(v)?;
            }
            Opcode::SetElem => {
                let v = self.pop()?;
                let (base, key) = self.pop2()?;
                let obj = self.object_operand(&base)?;
                let key = self.to_property_key(&key)?;
                if let Some(obj) = obj {
                    self.put_value(obj, &key, v.clone())?;
                }
                self.push(v)?;
            }
            Opcode::CallElem => {
                let (base, key) = self.pop2()?;
                self.object_operand(&base)?;
                let key = self.to_property_key(&key)?;
                let f = self.get_value(&base, &key)?;
                self.push(f)?;
                self.push(base)?;
            }
            Opcode::ElemIncDec(kind) => {
                let (base, key) = self.pop2()?;
                self.object_operand(&base)?;
                let key = self.to_property_key(&key)?;
                let result = self.element_inc_dec(&base, &key, *kind)?;
                self.push(result)?;
            }
            Opcode::DelProp(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let base = self.pop()?;
                let deleted = self.delete_value(&base, &key)?;
                self.push(Value::Boolean(deleted))?;
            }
            Opcode::DelElem => {
                let (base, key) = self.pop2()?;
                let key = self.to_property_key(&key)?;
                let deleted = self.delete_value(&base, &key)?;
                self.push(Value::Boolean(deleted))?;
            }
            Opcode::In => {
                let (key, obj) = self.pop2()?;
                let found = self.has_in(&key, &obj)?;
                self.push(Value::Boolean(found))?;
            }
            Opcode::Instanceof => {
                let (v, ctor) = self.pop2()?;
                let result = self.instance_of(&v, &ctor)?;
                self.push(Value::Boolean(result))?;
            }
            Opcode::NewObject => {
                let obj = self.create_object()?;
                self.push(Value::Object(obj))?;
            }
            Opcode::InitProp(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let v = self.pop()?;
                let obj = self.init_target()?;
                self.define_checked(obj, key, PropertyDef::data(v, Attrs::ENUMERATE))?;
            }
            Opcode::InitElem => {
                let (key, v) = self.pop2()?;
                let key = self.to_property_key(&key)?;
                let obj = self.init_target()?;
                self.define_checked(obj, key, PropertyDef::data(v, Attrs::ENUMERATE))?;
            }
            Opcode::InitGetter(atom) | Opcode::InitSetter(atom) => {
                let key = Vm::atom(&script, *atom)?;
                let f = self.pop()?;
                let Some(fid) = f.as_object().filter(|_| self.is_callable(&f)) else {
                    return Err(VmError::Type(format!("{} is not a function", self.describe(&f))));
                };
                let obj = self.init_target()?;
                let def = match op {
                    Opcode::InitGetter(_) => PropertyDef::getter(fid, Attrs::ENUMERATE),
                    _ => PropertyDef::setter(fid, Attrs::ENUMERATE),
                };
                self.define_checked(obj, key, def)?;
            }

            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                let v = self.arith(op)?;
                self.push(v)?;
            }
            Opcode::Neg => {
                let v = match self.pop()? {
                    Value::Smi(0) => Value::Double(-0.0),
                    Value::Smi(n) => n.checked_neg().map_or(Value::Double(-(n as f64)), Value::Smi),
                    other => Value::number(-self.to_number(&other)?),
                };
                self.push(v)?;
            }
            Opcode::Pos => {
                let v = self.pop()?;
                let v = match v {
                    Value::Smi(_) => v,
                    other => Value::number(self.to_number(&other)?),
                };
                self.push(v)?;
            }
            Opcode::Not => {
                let v = self.pop()?;
                self.push(Value::Boolean(!v.is_truthy()))?;
            }
            Opcode::BitNot => {
                let v = self.pop()?;
                let n = self.to_int32(&v)?;
                self.push(Value::Smi(!n))?;
            }
            Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor | Opcode::Lsh | Opcode::Rsh => {
                let (x, y) = self.pop_int32s()?;
                let shift = (y as u32) & 31;
                let r = match op {
                    Opcode::BitAnd => x & y,
                    Opcode::BitOr => x | y,
                    Opcode::BitXor => x ^ y,
                    Opcode::Lsh => x.wrapping_shl(shift),
                    _ => x >> shift,
                };
                self.push(Value::Smi(r))?;
            }
            Opcode::Ursh => {
                let (a, b) = self.pop2()?;
                let x = self.to_uint32(&a)?;
                let y = self.to_uint32(&b)?;
                self.push(Value::number((x >> (y & 31)) as f64))?;
            }
            Opcode::Typeof => {
                let v = self.pop()?;
                let t = self.type_of(&v);
                self.push(Value::from(t))?;
            }
            Opcode::Void => {
                self.pop()?;
                self.push(Value::Undefined)?;
            }

            Opcode::Eq | Opcode::Ne => {
                let (a, b) = self.pop2()?;
                let eq = self.loose_equals(&a, &b)?;
                self.push(Value::Boolean(eq == matches!(op, Opcode::Eq)))?;
            }
            Opcode::StrictEq | Opcode::StrictNe => {
                let (a, b) = self.pop2()?;
                let eq = self.strict_equals(&a, &b);
                self.push(Value::Boolean(eq == matches!(op, Opcode::StrictEq)))?;
            }
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let result = self.relational(op)?;
                self.push(Value::Boolean(result))?;
            }

            Opcode::Goto(offset) => return self.branch(&script, pc, *offset),
            Opcode::IfEq(offset) | Opcode::IfNe(offset) => {
                let v = self.pop()?;
                if v.is_truthy() == matches!(op, Opcode::IfNe(_)) {
                    return self.branch(&script, pc, *offset);
                }
            }
            Opcode::Or(offset) | Opcode::And(offset) => {
                let v = self.peek(0)?;
                if v.is_truthy() == matches!(op, Opcode::Or(_)) {
                    return self.branch(&script, pc, *offset);
                }
                self.pop()?;
            }
            Opcode::TableSwitch { default, low, high, targets } => {
                let v = self.pop()?;
                let target = Self::switch_index(&v)
                    .filter(|i| (*low..=*high).contains(i))
                    .and_then(|i| targets.get((i as i64 - *low as i64) as usize).copied())
                    .filter(|t| *t != 0)
                    .unwrap_or(*default);
                return self.branch(&script, pc, target);
            }
            Opcode::LookupSwitch { default, cases } => {
                let v = self.pop()?;
                for (index, offset) in cases.iter() {
                    let case = Self::constant(&script, *index)?;
                    if self.strict_equals(&v, &case) {
                        return self.branch(&script, pc, *offset);
                    }
                }
                return self.branch(&script, pc, *default);
            }
            Opcode::Debugger => {
                return match self.hook_trap(&script, pc) {
                    TrapAction::Continue => Ok(Next),
                    TrapAction::Return(v) => Ok(Flow::ForcedReturn(v)),
                    TrapAction::Throw(v) => Err(VmError::Throw(v)),
                };
            }

            Opcode::Call(argc) => return self.call_op(*argc as usize, false),
            Opcode::New(argc) => return self.call_op(*argc as usize, true),
            Opcode::Eval(argc) => return self.eval_op(*argc as usize),
            Opcode::Return => {
                let v = self.pop()?;
                return self.return_flow(v);
            }
            Opcode::SetRval => {
                let v = self.pop()?;
                self.frames[fi].rval = v;
            }
            Opcode::RetRval | Opcode::Stop => {
                let v = self.frames[fi].rval.clone();
                return self.return_flow(v);
            }
            Opcode::Lambda(index) => return self.lambda_op(&script, *index),

            Opcode::Throw => {
                let v = self.pop()?;
                return Err(VmError::Throw(v));
            }
            Opcode::Exception => match self.pending.take() {
                Some(Pending::Exception(v)) => self.push(v)?,
                _ => return Err(VmError::MalformedBytecode("no pending exception".into())),
            },
            Opcode::Gosub(offset) => {
                self.push(Value::Smi(0))?;
                self.push(Value::Smi(pc as i32 + 1))?;
                return self.branch(&script, pc, *offset);
            }
            Opcode::Retsub => {
                let (flag, v) = self.pop2()?;
                return match (flag, v) {
                    (Value::Smi(0), Value::Smi(target)) if target >= 0 => Ok(Jump(target as usize)),
                    (Value::Smi(1), v) => Ok(Flow::Unwind(Pending::Exception(v))),
                    (Value::Smi(2), _) => Ok(Flow::Unwind(Pending::Close)),
                    _ => Err(VmError::MalformedBytecode("bad finally return state".into())),
                };
            }

            Opcode::EnterBlock(index) => self.enter_block(&script, *index)?,
            Opcode::LeaveBlock(index) => self.leave_block(&script, *index)?,
            Opcode::EnterWith => self.enter_with()?,
            Opcode::LeaveWith => self.leave_with()?,

            Opcode::Iter(kind) => self.iter_op(*kind)?,
            Opcode::NextIter => self.next_iter_op()?,
            Opcode::EndIter => self.end_iter_op()?,

            Opcode::Generator => return self.generator_op(),
            Opcode::Yield => return self.yield_op(),
        }
        Ok(Next)
    }

    /// `base[key]++` and friends. Writes to primitives are dropped.
    fn element_inc_dec(
        &mut self,
        base: &Value,
        key: &core_types::JsString,
        kind: IncDec,
    ) -> VmResult<Value> {
        let obj = self.object_operand(base)?;
        let old = self.get_value(base, key)?;
        let (new, result) = self.inc_dec_value(old, kind)?;
        if let Some(obj) = obj {
            self.put_value(obj, key, new)?;
        }
        Ok(result)
    }
}
