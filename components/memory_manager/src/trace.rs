//! Tracing interface between the heap and its roots.
//!
//! The collector only knows object records. Everything else that can hold a
//! value (frames, operand stacks, suspended generators, host data) reports
//! its values through a [`Tracer`].

use core_types::{ObjectId, Value};

/// Receives every live value reachable from a root or an object.
pub trait Tracer {
    /// Marks an object as reachable.
    fn mark_object(&mut self, id: ObjectId);

    /// Marks the object a value refers to, if any.
    fn mark_value(&mut self, value: &Value) {
        if let Value::Object(id) = value {
            self.mark_object(*id);
        }
    }
}

/// Something that can report the values it holds.
pub trait Trace {
    /// Reports every held value to `tracer`.
    fn trace(&self, tracer: &mut dyn Tracer);
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.mark_value(self);
    }
}

impl Trace for ObjectId {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.mark_object(*self);
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(item) = self {
            item.trace(tracer);
        }
    }
}

/// Gray-stack marker used by [`Heap::collect`](crate::Heap::collect).
pub(crate) struct Marker {
    pub(crate) marks: Vec<bool>,
    pub(crate) gray: Vec<ObjectId>,
    pub(crate) generations: Vec<u32>,
}

impl Tracer for Marker {
    fn mark_object(&mut self, id: ObjectId) {
        let i = id.index as usize;
        if i < self.marks.len() && self.generations[i] == id.generation && !self.marks[i] {
            self.marks[i] = true;
            self.gray.push(id);
        }
    }
}
