//! `for-in` / `for each` iteration.
//!
//! Plain objects are walked by a native enumerator. Objects may supply
//! their own iterator through a callable `__iterator__`; generators are
//! their own iterators. Any other iterator object follows the
//! `next() -> { value, done }` protocol and may have a `return` method
//! called when the loop exits early.

use crate::error::{VmError, VmResult};
use crate::generator::ResumeMode;
use crate::vm::Vm;
use bytecode_system::IterKind;
use core_types::{ObjectId, Value};
use memory_manager::{Class, Enumerator, ObjectPayload};

enum IteratorKind {
    Native { values: bool, target: Option<ObjectId> },
    Generator,
    Object,
}

impl Vm {
    fn iterator_kind(&self, iter: ObjectId) -> VmResult<IteratorKind> {
        let record = self.heap.object(iter)?;
        Ok(match (&record.class, &record.payload) {
            (Class::Iterator, ObjectPayload::Enumerator(e)) => {
                IteratorKind::Native { values: e.yields_values(), target: e.object() }
            }
            (Class::Iterator, _) => IteratorKind::Native { values: false, target: None },
            (Class::Generator, _) => IteratorKind::Generator,
            _ => IteratorKind::Object,
        })
    }

    fn native_iterator(&mut self, enumerator: Enumerator) -> VmResult<ObjectId> {
        Ok(self.heap.allocate(Class::Iterator, None, None, ObjectPayload::Enumerator(enumerator))?)
    }

    /// Iterator for `value`.
    pub(crate) fn create_iterator(&mut self, value: &Value, kind: IterKind) -> VmResult<ObjectId> {
        let Value::Object(obj) = value else {
            return self.native_iterator(Enumerator::empty());
        };
        if let IteratorKind::Generator = self.iterator_kind(*obj)? {
            return Ok(*obj);
        }
        let hook = self.get_property(value, "__iterator__")?;
        if self.is_callable(&hook) {
            let keys_only = Value::Boolean(kind == IterKind::Keys);
            return match self.invoke(hook, value.clone(), &[keys_only], false)? {
                Value::Object(iter) => Ok(iter),
                other => Err(VmError::Type(format!(
                    "__iterator__ returned a primitive value {}",
                    self.describe(&other)
                ))),
            };
        }
        let enumerator = Enumerator::new(&self.heap, Some(*obj))?;
        let enumerator = match kind {
            IterKind::Keys => enumerator,
            IterKind::Values => enumerator.yielding_values(),
        };
        self.native_iterator(enumerator)
    }

    /// Advances `iter`. Returns the next value and whether there was one.
    pub(crate) fn iterator_step(&mut self, iter: ObjectId) -> VmResult<(Value, bool)> {
        match self.iterator_kind(iter)? {
            IteratorKind::Native { values, target } => {
                let Some(key) = self.heap.enumerator_next(iter)? else {
                    return Ok((Value::Undefined, false));
                };
                match (values, target) {
                    (true, Some(target)) => Ok((self.get_value(&Value::Object(target), &key)?, true)),
                    _ => Ok((Value::String(key), true)),
                }
            }
            IteratorKind::Generator => {
                let result = self.resume_generator(iter, ResumeMode::Send(Value::Undefined))?;
                if result.done {
                    Ok((Value::Undefined, false))
                } else {
                    Ok((result.value, true))
                }
            }
            IteratorKind::Object => {
                let receiver = Value::Object(iter);
                let next = self.get_property(&receiver, "next")?;
                let result = self.invoke(next, receiver, &[], false)?;
                if !result.is_object() {
                    return Err(VmError::Type(format!(
                        "iterator result {} is not an object",
                        self.describe(&result)
                    )));
                }
                if self.get_property(&result, "done")?.is_truthy() {
                    return Ok((Value::Undefined, false));
                }
                Ok((self.get_property(&result, "value")?, true))
            }
        }
    }

    /// Releases an iterator when its loop exits.
    pub(crate) fn close_iterator(&mut self, iter: &Value) -> VmResult<()> {
        let Value::Object(id) = iter else {
            return Ok(());
        };
        match self.iterator_kind(*id)? {
            IteratorKind::Native { .. } => Ok(()),
            IteratorKind::Generator => self.resume_generator(*id, ResumeMode::Close).map(|_| ()),
            IteratorKind::Object => {
                let close = self.get_property(iter, "return")?;
                if self.is_callable(&close) {
                    self.invoke(close, iter.clone(), &[], false)?;
                }
                Ok(())
            }
        }
    }

    /// `Iter`: `[obj] -> [iterator]`
    pub(crate) fn iter_op(&mut self, kind: IterKind) -> VmResult<()> {
        let value = self.pop()?;
        let iter = self.create_iterator(&value, kind)?;
        self.push(Value::Object(iter))
    }

    /// `NextIter`: `[iterator] -> [iterator, value, more]`
    pub(crate) fn next_iter_op(&mut self) -> VmResult<()> {
        let iter = self
            .peek(0)?
            .as_object()
            .ok_or_else(|| VmError::MalformedBytecode("NextIter without an iterator".into()))?;
        let (value, more) = self.iterator_step(iter)?;
        self.push(value)?;
        self.push(Value::Boolean(more))
    }

    /// `EndIter`: `[iterator] -> []`
    pub(crate) fn end_iter_op(&mut self) -> VmResult<()> {
        let iter = self.pop()?;
        self.close_iterator(&iter)
    }
}
