//! Garbage collector integration
//!
//! The heap only knows object records; the interpreter reports everything
//! else that can hold a value: realm objects, the operand-stack arena, live
//! frames, the pending exception and host roots. Suspended generator frames
//! are reported by their generator objects.

use crate::call_frame::Frame;
use crate::vm::{Pending, Vm};
use memory_manager::{Trace, Tracer};

impl Trace for Frame {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.callee.trace(tracer);
        self.rval.trace(tracer);
        tracer.mark_object(self.scope_chain);
        self.var_obj.trace(tracer);
        self.call_obj.trace(tracer);
        self.args_obj.trace(tracer);
        self.generator.trace(tracer);
        for block in &self.blocks {
            block.clone.trace(tracer);
        }
    }
}

impl Vm {
    /// Runs a full collection.
    ///
    /// # Returns
    ///
    /// The number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        let Vm { heap, realm, arena, frames, pending, roots, cache, .. } = self;
        let freed = heap.collect(|tracer| {
            for obj in realm.objects() {
                tracer.mark_object(obj);
            }
            for value in arena.values() {
                tracer.mark_value(value);
            }
            for frame in frames.iter() {
                frame.trace(tracer);
            }
            if let Some(Pending::Exception(value)) = pending {
                tracer.mark_value(value);
            }
            roots.as_slice().trace(tracer);
        });
        // freed ids may be reused by new objects
        cache.flush();
        freed
    }

    /// Collects when enough has been allocated and no native code holds
    /// values the collector cannot see.
    pub(crate) fn maybe_collect(&mut self) {
        if self.native_depth > 0 || self.run_depth > 1 {
            return;
        }
        if self.heap.stats().allocated_since_gc < self.config.gc_threshold {
            return;
        }
        let freed = self.collect_garbage();
        tracing::trace!(target: "vm::gc", freed, "automatic collection");
    }
}
