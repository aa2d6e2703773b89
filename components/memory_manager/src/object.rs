//! Object records.
//!
//! An object record is a class tag, a prototype link, an optional scope
//! parent, slot storage and a reference into the shape tree. Records live in
//! the [`Heap`](crate::Heap) and are addressed by [`ObjectId`].

use crate::class::Class;
use crate::enumerate::Enumerator;
use crate::shape::{ShapeId, ShapeNode};
use crate::trace::Tracer;
use bytecode_system::Script;
use core_types::{ErrorKind, JsString, ObjectId, Value};
use std::any::Any;
use std::rc::Rc;

/// Slots stored inline in every record before spilling to the overflow array.
pub const FIXED_SLOTS: usize = 4;

/// Index of a registered native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// Position of a live frame on the interpreter's frame stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLink(pub u32);

/// What a function object runs.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// Bytecode executed by the interpreter loop
    Interpreted(Rc<Script>),
    /// Native body taking a raw argument vector
    Native(NativeId),
}

/// Payload of `Class::Function` records.
#[derive(Debug, Clone)]
pub struct FunctionData {
    /// Body
    pub kind: FunctionKind,
    /// Name for diagnostics
    pub name: Option<JsString>,
}

/// Payload of scope objects (`Call`, `Block`, `With`) and `Arguments`.
#[derive(Debug, Clone, Default)]
pub struct ScopeData {
    /// Frame whose storage the bindings alias, while it is live
    pub frame: Option<FrameLink>,
    /// Block index for cloned blocks
    pub block: Option<u32>,
    /// Operand-stack depth the scope was pushed at (blocks and `with`)
    pub depth: u32,
}

/// Interpreter-owned state attached to an object.
pub trait InternalSlot: Any {
    /// Reports every value the state holds.
    fn trace(&self, tracer: &mut dyn Tracer);
    /// Upcast for downcasting by the owner.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting by the owner.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Class-specific state of an object record.
#[derive(Default)]
pub enum ObjectPayload {
    /// No extra state
    #[default]
    None,
    /// Function body
    Function(FunctionData),
    /// Scope bookkeeping
    Scope(ScopeData),
    /// Native for-in enumeration state
    Enumerator(Enumerator),
    /// Kind of a materialized fault
    Error(ErrorKind),
    /// State owned by the interpreter (e.g. a suspended generator frame)
    Internal(Box<dyn InternalSlot>),
}

impl std::fmt::Debug for ObjectPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectPayload::None => write!(f, "None"),
            ObjectPayload::Function(d) => f.debug_tuple("Function").field(d).finish(),
            ObjectPayload::Scope(d) => f.debug_tuple("Scope").field(d).finish(),
            ObjectPayload::Enumerator(_) => write!(f, "Enumerator"),
            ObjectPayload::Error(k) => f.debug_tuple("Error").field(k).finish(),
            ObjectPayload::Internal(_) => write!(f, "Internal"),
        }
    }
}

/// Per-object shape bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    /// A cached method call relies on this object's function-valued slots
    pub branded: bool,
    /// Some object has this one as its prototype
    pub delegate: bool,
    /// The shape id diverged from the shared tree; every later mutation
    /// mints a fresh id
    pub unique_shape: bool,
}

/// A heap object.
#[derive(Debug)]
pub struct ObjectRecord {
    /// Class tag
    pub class: Class,
    /// Prototype link
    pub proto: Option<ObjectId>,
    /// Scope-chain parent (functions and scope objects)
    pub parent: Option<ObjectId>,
    pub(crate) shape: Rc<ShapeNode>,
    pub(crate) shape_id: ShapeId,
    pub(crate) flags: ObjectFlags,
    fixed: [Value; FIXED_SLOTS],
    overflow: Vec<Value>,
    /// Class-specific state
    pub payload: ObjectPayload,
}

impl ObjectRecord {
    pub(crate) fn new(
        class: Class,
        proto: Option<ObjectId>,
        parent: Option<ObjectId>,
        shape: Rc<ShapeNode>,
        payload: ObjectPayload,
    ) -> Self {
        let shape_id = shape.id();
        ObjectRecord {
            class,
            proto,
            parent,
            shape,
            shape_id,
            flags: ObjectFlags::default(),
            fixed: std::array::from_fn(|_| Value::Undefined),
            overflow: Vec::new(),
            payload,
        }
    }

    /// Current shape generation id.
    pub fn shape_id(&self) -> ShapeId {
        self.shape_id
    }

    /// Current shape node.
    pub fn shape(&self) -> &Rc<ShapeNode> {
        &self.shape
    }

    /// Shape bookkeeping flags.
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Reads a slot; slots past the end read as undefined.
    pub fn slot(&self, index: u32) -> Value {
        let i = index as usize;
        if i < FIXED_SLOTS {
            self.fixed[i].clone()
        } else {
            self.overflow.get(i - FIXED_SLOTS).cloned().unwrap_or(Value::Undefined)
        }
    }

    /// Writes a slot, growing the overflow array with undefined as needed.
    pub(crate) fn write_slot(&mut self, index: u32, value: Value) {
        let i = index as usize;
        if i < FIXED_SLOTS {
            self.fixed[i] = value;
        } else {
            let j = i - FIXED_SLOTS;
            if j >= self.overflow.len() {
                self.overflow.resize(j + 1, Value::Undefined);
            }
            self.overflow[j] = value;
        }
    }

    /// Iterates over every slot value.
    pub fn slots(&self) -> impl Iterator<Item = &Value> {
        self.fixed.iter().chain(self.overflow.iter())
    }

    /// Function payload, if this is a function.
    pub fn function(&self) -> Option<&FunctionData> {
        match &self.payload {
            ObjectPayload::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Scope payload, if this is a scope or arguments object.
    pub fn scope(&self) -> Option<&ScopeData> {
        match &self.payload {
            ObjectPayload::Scope(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable scope payload.
    pub fn scope_mut(&mut self) -> Option<&mut ScopeData> {
        match &mut self.payload {
            ObjectPayload::Scope(s) => Some(s),
            _ => None,
        }
    }

    /// Downcasts interpreter-owned state.
    pub fn internal<T: 'static>(&self) -> Option<&T> {
        match &self.payload {
            ObjectPayload::Internal(b) => b.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Mutable downcast of interpreter-owned state.
    pub fn internal_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match &mut self.payload {
            ObjectPayload::Internal(b) => b.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
    }

    /// True if calling this object does something.
    pub fn is_callable(&self) -> bool {
        match &self.class {
            Class::Function => true,
            Class::Host(hooks) => hooks.call().is_some(),
            _ => false,
        }
    }
}
