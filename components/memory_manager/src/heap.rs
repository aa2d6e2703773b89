//! Generation-indexed object heap.
//!
//! Objects live in a slot arena addressed by [`ObjectId`]. A freed slot bumps
//! its generation so stale handles are detected instead of aliasing the next
//! occupant. Collection is a plain mark/sweep over the arena driven by roots
//! the interpreter reports through the [`Tracer`] interface.

use crate::class::{Class, ClassKey};
use crate::object::{ObjectPayload, ObjectRecord};
use crate::shape::{Accessor, ShapeId, ShapeNode};
use crate::trace::{Marker, Tracer};
use core_types::{ErrorKind, JsError, JsString, ObjectId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Garbage collection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of collections run
    pub collections: u64,
    /// Objects freed by the last collection
    pub last_freed: usize,
    /// Live objects after the last collection
    pub live: usize,
    /// Objects allocated since the last collection
    pub allocated_since_gc: usize,
}

/// Well-known objects the heap needs for lazily materialized properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Intrinsics {
    /// Prototype of plain objects
    pub object_prototype: Option<ObjectId>,
    /// Prototype of function objects
    pub function_prototype: Option<ObjectId>,
}

#[derive(Debug)]
struct HeapSlot {
    generation: u32,
    object: Option<ObjectRecord>,
}

type InitialKey = (ClassKey, Option<ObjectId>, Option<ObjectId>);

/// The object heap.
pub struct Heap {
    slots: Vec<HeapSlot>,
    free: Vec<u32>,
    next_shape: u64,
    initial_shapes: FxHashMap<InitialKey, Rc<ShapeNode>>,
    pub(crate) resolving: FxHashSet<(ObjectId, JsString)>,
    stats: GcStats,
    max_objects: Option<usize>,
    live: usize,
    /// Well-known objects
    pub intrinsics: Intrinsics,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            next_shape: 1,
            initial_shapes: FxHashMap::default(),
            resolving: FxHashSet::default(),
            stats: GcStats::default(),
            max_objects: None,
            live: 0,
            intrinsics: Intrinsics::default(),
        }
    }

    /// Creates a heap that refuses to hold more than `max_objects` objects.
    pub fn with_limit(max_objects: usize) -> Self {
        let mut heap = Self::new();
        heap.max_objects = Some(max_objects);
        heap
    }

    /// Mints a fresh shape id.
    pub fn fresh_shape_id(&mut self) -> ShapeId {
        let id = ShapeId(self.next_shape);
        self.next_shape += 1;
        id
    }

    pub(crate) fn shape_id_source(&mut self) -> impl FnMut() -> ShapeId + '_ {
        move || {
            let id = ShapeId(self.next_shape);
            self.next_shape += 1;
            id
        }
    }

    /// Initial shape shared by fresh objects of one class, prototype and parent.
    pub fn initial_shape(
        &mut self,
        class: &Class,
        proto: Option<ObjectId>,
        parent: Option<ObjectId>,
    ) -> Rc<ShapeNode> {
        let key = (class.key(), proto, parent);
        if let Some(node) = self.initial_shapes.get(&key) {
            return Rc::clone(node);
        }
        let node = ShapeNode::root(self.fresh_shape_id());
        self.initial_shapes.insert(key, Rc::clone(&node));
        node
    }

    /// Allocates an object.
    ///
    /// Allocation fails with an out-of-memory error once the configured
    /// object limit is reached.
    pub fn allocate(
        &mut self,
        class: Class,
        proto: Option<ObjectId>,
        parent: Option<ObjectId>,
        payload: ObjectPayload,
    ) -> Result<ObjectId, JsError> {
        if let Some(max) = self.max_objects {
            if self.live >= max {
                return Err(JsError::new(ErrorKind::OutOfMemory, "out of memory"));
            }
        }
        if let Some(p) = proto {
            self.object_mut(p)?.flags.delegate = true;
        }
        let shape = self.initial_shape(&class, proto, parent);
        let record = ObjectRecord::new(class, proto, parent, shape, payload);

        self.live += 1;
        self.stats.allocated_since_gc += 1;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(record);
                ObjectId::new(index, slot.generation)
            }
            None => {
                self.slots.push(HeapSlot { generation: 0, object: Some(record) });
                ObjectId::new((self.slots.len() - 1) as u32, 0)
            }
        };
        Ok(id)
    }

    /// Returns the record for `id`, or `None` for stale handles.
    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.object.as_ref())
    }

    /// Mutable access to the record for `id`.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.object.as_mut())
    }

    /// Returns the record for `id` or an internal error for stale handles.
    pub fn object(&self, id: ObjectId) -> Result<&ObjectRecord, JsError> {
        self.get(id).ok_or_else(|| stale(id))
    }

    /// Mutable variant of [`Heap::object`].
    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut ObjectRecord, JsError> {
        self.get_mut(id).ok_or_else(|| stale(id))
    }

    /// True if `id` refers to a live object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when no object is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Collection statistics.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Maps transparent wrappers to the object they stand for.
    pub fn unwrap_identity(&self, id: ObjectId) -> ObjectId {
        match self.get(id) {
            Some(rec) => match &rec.class {
                Class::Host(hooks) => hooks.inner_object(rec).unwrap_or(id),
                _ => id,
            },
            None => id,
        }
    }

    /// Runs a full mark/sweep collection.
    ///
    /// `roots` must report every value held outside the heap. Returns the
    /// number of objects freed.
    pub fn collect(&mut self, roots: impl FnOnce(&mut dyn Tracer)) -> usize {
        let mut marker = Marker {
            marks: vec![false; self.slots.len()],
            gray: Vec::new(),
            generations: self.slots.iter().map(|s| s.generation).collect(),
        };
        // Intrinsics are always live.
        if let Some(p) = self.intrinsics.object_prototype {
            marker.mark_object(p);
        }
        if let Some(p) = self.intrinsics.function_prototype {
            marker.mark_object(p);
        }
        roots(&mut marker);

        while let Some(id) = marker.gray.pop() {
            if let Some(record) = self.get(id) {
                trace_record(record, &mut marker);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_some() && !marker.marks[index] {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;

        let slots = &self.slots;
        let alive = |id: &Option<ObjectId>| match id {
            Some(id) => slots
                .get(id.index as usize)
                .map_or(false, |s| s.generation == id.generation && s.object.is_some()),
            None => true,
        };
        self.initial_shapes.retain(|(_, proto, parent), _| alive(proto) && alive(parent));

        self.stats.collections += 1;
        self.stats.last_freed = freed;
        self.stats.live = self.live;
        self.stats.allocated_since_gc = 0;
        tracing::debug!(target: "vm::gc", freed, live = self.live, "collection finished");
        freed
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn stale(id: ObjectId) -> JsError {
    JsError::internal(format!("stale object handle {:?}", id))
}

/// Reports every value an object record holds.
pub(crate) fn trace_record(record: &ObjectRecord, tracer: &mut dyn Tracer) {
    if let Some(p) = record.proto {
        tracer.mark_object(p);
    }
    if let Some(p) = record.parent {
        tracer.mark_object(p);
    }
    for value in record.slots() {
        tracer.mark_value(value);
    }
    for node in record.shape.chain() {
        if let Some(prop) = node.prop() {
            for accessor in [prop.getter, prop.setter] {
                if let Accessor::Object(id) = accessor {
                    tracer.mark_object(id);
                }
            }
        }
    }
    match &record.payload {
        ObjectPayload::Enumerator(e) => e.trace(tracer),
        ObjectPayload::Internal(state) => state.trace(tracer),
        _ => {}
    }
    if let Class::Host(hooks) = &record.class {
        hooks.trace(record, tracer);
    }
}
