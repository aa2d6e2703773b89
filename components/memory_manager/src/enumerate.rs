//! Native for-in enumeration.
//!
//! The key list is snapshotted when the loop starts. Keys deleted before they
//! are reached are skipped; keys added after the snapshot are not visited.

use crate::heap::Heap;
use crate::object::ObjectPayload;
use crate::shape::Attrs;
use core_types::{JsError, JsString, ObjectId};
use rustc_hash::FxHashSet;

/// Enumeration state stored in an iterator object's payload.
#[derive(Debug, Clone)]
pub struct Enumerator {
    object: Option<ObjectId>,
    keys: Vec<JsString>,
    cursor: usize,
    values: bool,
}

impl Enumerator {
    /// Snapshots the enumerable keys of `object` and its prototypes. Own keys
    /// come first; a key seen on a nearer object hides the same key further
    /// out even when the nearer one is not enumerable.
    pub fn new(heap: &Heap, object: Option<ObjectId>) -> Result<Self, JsError> {
        let mut keys = Vec::new();
        let mut seen = FxHashSet::default();
        let mut current = object;
        while let Some(obj) = current {
            let record = heap.object(obj)?;
            for prop in record.shape().properties() {
                if seen.insert(prop.key.clone()) && prop.attrs.contains(Attrs::ENUMERATE) {
                    keys.push(prop.key);
                }
            }
            current = record.proto;
        }
        Ok(Enumerator { object, keys, cursor: 0, values: false })
    }

    /// An enumerator that yields nothing.
    pub fn empty() -> Self {
        Enumerator { object: None, keys: Vec::new(), cursor: 0, values: false }
    }

    /// Makes the consumer fetch property values instead of keys.
    pub fn yielding_values(mut self) -> Self {
        self.values = true;
        self
    }

    /// True for `for each` enumeration.
    pub fn yields_values(&self) -> bool {
        self.values
    }

    /// The object being enumerated.
    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    /// Advances to the next key still present on the object.
    pub fn next(&mut self, heap: &mut Heap) -> Result<Option<JsString>, JsError> {
        let Some(obj) = self.object else {
            return Ok(None);
        };
        while let Some(key) = self.keys.get(self.cursor).cloned() {
            self.cursor += 1;
            if heap.has_property(obj, &key)? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    pub(crate) fn trace(&self, tracer: &mut dyn crate::trace::Tracer) {
        if let Some(obj) = self.object {
            tracer.mark_object(obj);
        }
    }
}

impl Heap {
    /// Steps the enumerator held by `iter`. Objects without enumeration state
    /// are exhausted.
    pub fn enumerator_next(&mut self, iter: ObjectId) -> Result<Option<JsString>, JsError> {
        let payload = std::mem::take(&mut self.object_mut(iter)?.payload);
        let ObjectPayload::Enumerator(mut state) = payload else {
            self.object_mut(iter)?.payload = payload;
            return Ok(None);
        };
        let result = state.next(self);
        self.object_mut(iter)?.payload = ObjectPayload::Enumerator(state);
        result
    }
}
