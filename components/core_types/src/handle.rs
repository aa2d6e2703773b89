//! Object handles.

use std::fmt;

/// Generation-checked handle of an object record owned by the heap.
///
/// The heap reuses slots of collected objects; the generation counter makes
/// a handle to a freed object distinguishable from the new occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Slot index in the heap arena
    pub index: u32,
    /// Generation of the slot when the object was allocated
    pub generation: u32,
}

impl ObjectId {
    /// Creates a handle from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        ObjectId { index, generation }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}
