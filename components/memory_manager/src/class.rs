//! Object classes and their behavior hooks.
//!
//! Built-in classes get their behavior from the heap and the interpreter
//! directly. Host (exotic) classes plug in through [`ClassHooks`], a
//! capability trait whose default methods are the ordinary behavior.

use crate::heap::Heap;
use crate::object::{NativeId, ObjectRecord};
use crate::trace::Tracer;
use core_types::{JsError, JsString, ObjectId};
use std::fmt;
use std::rc::Rc;

/// Override points for exotic objects.
pub trait ClassHooks {
    /// Class name reported by `[object Name]`-style diagnostics.
    fn name(&self) -> &str;

    /// Called when a lookup of `key` on `obj` misses. Returns true if the
    /// hook defined the property.
    fn resolve(&self, _heap: &mut Heap, _obj: ObjectId, _key: &JsString) -> Result<bool, JsError> {
        Ok(false)
    }

    /// Native invoked when an instance is called.
    fn call(&self) -> Option<NativeId> {
        None
    }

    /// Native invoked when an instance is constructed.
    fn construct(&self) -> Option<NativeId> {
        None
    }

    /// Object this instance stands for in identity comparisons.
    fn inner_object(&self, _record: &ObjectRecord) -> Option<ObjectId> {
        None
    }

    /// Reports values held outside the property slots.
    fn trace(&self, _record: &ObjectRecord, _tracer: &mut dyn Tracer) {}
}

/// Class tag of an object record.
#[derive(Clone)]
pub enum Class {
    /// Plain object
    Object,
    /// Function (interpreted or native)
    Function,
    /// Activation record of a heavyweight frame
    Call,
    /// Cloned compile-time block
    Block,
    /// Dynamic scope injected by `with`
    With,
    /// Reified `arguments`
    Arguments,
    /// Native for-in iterator
    Iterator,
    /// Suspended generator
    Generator,
    /// Error object created for a fault
    Error,
    /// The global object
    Global,
    /// Exotic host class
    Host(Rc<dyn ClassHooks>),
}

/// Hashable identity of a class, used to key initial shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKey {
    /// A built-in class, by discriminant
    Builtin(u8),
    /// A host class, by hook table address
    Host(usize),
}

impl Class {
    /// Identity used when looking up the initial shape of new instances.
    pub fn key(&self) -> ClassKey {
        match self {
            Class::Object => ClassKey::Builtin(0),
            Class::Function => ClassKey::Builtin(1),
            Class::Call => ClassKey::Builtin(2),
            Class::Block => ClassKey::Builtin(3),
            Class::With => ClassKey::Builtin(4),
            Class::Arguments => ClassKey::Builtin(5),
            Class::Iterator => ClassKey::Builtin(6),
            Class::Generator => ClassKey::Builtin(7),
            Class::Error => ClassKey::Builtin(8),
            Class::Global => ClassKey::Builtin(9),
            Class::Host(hooks) => ClassKey::Host(Rc::as_ptr(hooks) as *const () as usize),
        }
    }

    /// Class name.
    pub fn name(&self) -> &str {
        match self {
            Class::Object => "Object",
            Class::Function => "Function",
            Class::Call => "Call",
            Class::Block => "Block",
            Class::With => "With",
            Class::Arguments => "Arguments",
            Class::Iterator => "Iterator",
            Class::Generator => "Generator",
            Class::Error => "Error",
            Class::Global => "global",
            Class::Host(hooks) => hooks.name(),
        }
    }

    /// Scope objects whose bindings alias frame storage.
    pub fn is_scope(&self) -> bool {
        matches!(self, Class::Call | Class::Block | Class::With)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
