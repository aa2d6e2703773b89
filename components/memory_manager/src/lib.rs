//! Memory Manager - object heap, shape tree and collector
//!
//! This component provides:
//! - Generation-checked object handles over a slot arena
//! - A hash-consed shape tree with copy-on-write divergence
//! - Property definition, lookup, deletion and shadowing purge
//! - Class hooks for lazily resolved properties
//! - Mark/sweep collection driven by caller-supplied roots

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class;
pub mod enumerate;
pub mod heap;
pub mod object;
pub mod property;
pub mod shape;
pub mod trace;

pub use class::{Class, ClassHooks, ClassKey};
pub use enumerate::Enumerator;
pub use heap::{GcStats, Heap, Intrinsics};
pub use object::{
    FrameLink, FunctionData, FunctionKind, InternalSlot, NativeId, ObjectFlags, ObjectPayload,
    ObjectRecord, ScopeData, FIXED_SLOTS,
};
pub use property::{DefineOutcome, Found, PropertyDef};
pub use shape::{Accessor, Attrs, Binding, PropertySpec, ShapeId, ShapeNode};
pub use trace::{Trace, Tracer};
