//! Shape tree: structurally-shared descriptions of own properties.
//!
//! A shape is a node in a transition tree. Each node adds one property to
//! its parent, so the chain from a node to its root lists an object's own
//! properties in reverse declaration order. Objects that added the same
//! properties in the same order from the same initial shape share nodes.
//!
//! Nodes are immutable once published. Children are held weakly so that
//! branches nobody uses any more are freed with their last object.
//!
//! Every node carries an id from the heap's shape-id generator. An object's
//! shape id normally equals its node's id; objects that went through a
//! branding, purge, removal or attribute change carry a private id instead
//! (see [`crate::object::ObjectFlags`]).

use core_types::{JsString, ObjectId};
use rustc_hash::FxHashMap;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Shape generation id.
///
/// Ids are assigned monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u64);

/// Property attribute set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attrs(u8);

impl Attrs {
    /// No attributes: non-enumerable, writable, deletable data property
    pub const NONE: Attrs = Attrs(0);
    /// Visited by enumeration
    pub const ENUMERATE: Attrs = Attrs(1 << 0);
    /// Writes are ignored
    pub const READONLY: Attrs = Attrs(1 << 1);
    /// Cannot be deleted or redefined incompatibly
    pub const PERMANENT: Attrs = Attrs(1 << 2);
    /// Has no slot; every access goes through the accessors
    pub const SHARED: Attrs = Attrs(1 << 3);
    /// Getter is a callable object
    pub const GETTER: Attrs = Attrs(1 << 4);
    /// Setter is a callable object
    pub const SETTER: Attrs = Attrs(1 << 5);

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: Attrs) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both sets.
    pub const fn union(self, other: Attrs) -> Attrs {
        Attrs(self.0 | other.0)
    }

    /// `self` without the bits of `other`.
    pub const fn without(self, other: Attrs) -> Attrs {
        Attrs(self.0 & !other.0)
    }

    /// True for properties with a scripted getter or setter.
    pub const fn is_accessor(self) -> bool {
        self.0 & (Self::GETTER.0 | Self::SETTER.0) != 0
    }
}

impl std::ops::BitOr for Attrs {
    type Output = Attrs;

    fn bitor(self, rhs: Attrs) -> Attrs {
        self.union(rhs)
    }
}

impl fmt::Debug for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Attrs::ENUMERATE, "enumerate"),
            (Attrs::READONLY, "readonly"),
            (Attrs::PERMANENT, "permanent"),
            (Attrs::SHARED, "shared"),
            (Attrs::GETTER, "getter"),
            (Attrs::SETTER, "setter"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(a, _)| self.contains(*a))
            .map(|(_, n)| *n)
            .collect();
        write!(f, "Attrs({})", set.join("|"))
    }
}

/// Frame storage a binding accessor aliases while its frame is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Formal or actual argument n
    Arg(u16),
    /// Frame slot n (declared vars, then block locals on the operand stack)
    Local(u16),
}

/// How a property is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    /// Direct slot access
    Default,
    /// A callable object invoked with the receiver as `this`
    Object(ObjectId),
    /// Aliases frame storage while the owning scope's frame is live, and the
    /// property's slot afterwards
    Binding(Binding),
}

impl Accessor {
    /// Returns true for the stub accessor.
    pub fn is_default(&self) -> bool {
        matches!(self, Accessor::Default)
    }
}

/// One property as recorded in a shape node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertySpec {
    /// Property id
    pub key: JsString,
    /// Slot index, or `None` for shared properties
    pub slot: Option<u32>,
    /// Attributes
    pub attrs: Attrs,
    /// Read accessor
    pub getter: Accessor,
    /// Write accessor
    pub setter: Accessor,
}

impl PropertySpec {
    /// A slotted data property with default accessors.
    pub fn data(key: JsString, slot: u32, attrs: Attrs) -> Self {
        PropertySpec {
            key,
            slot: Some(slot),
            attrs,
            getter: Accessor::Default,
            setter: Accessor::Default,
        }
    }

    /// True for slotted properties with stub accessors.
    pub fn is_plain_data(&self) -> bool {
        self.slot.is_some() && self.getter.is_default() && self.setter.is_default()
    }

    /// The shared+permanent combination: behaves as an own property of every
    /// object that delegates to the holder.
    pub fn is_shared_permanent(&self) -> bool {
        self.attrs.contains(Attrs::SHARED.union(Attrs::PERMANENT))
    }
}

/// Chains longer than this get a lazily built hash index.
const HASH_THRESHOLD: u32 = 8;

/// A node of the shape tree.
pub struct ShapeNode {
    id: ShapeId,
    parent: Option<Rc<ShapeNode>>,
    prop: Option<PropertySpec>,
    count: u32,
    slot_span: u32,
    kids: RefCell<FxHashMap<PropertySpec, Weak<ShapeNode>>>,
    index: OnceCell<FxHashMap<JsString, PropertySpec>>,
}

impl ShapeNode {
    /// Creates an empty root node.
    pub fn root(id: ShapeId) -> Rc<ShapeNode> {
        Rc::new(ShapeNode {
            id,
            parent: None,
            prop: None,
            count: 0,
            slot_span: 0,
            kids: RefCell::new(FxHashMap::default()),
            index: OnceCell::new(),
        })
    }

    /// Returns the child adding `spec`, creating it with `fresh` if the tree
    /// has no live node for that transition yet.
    pub fn child(self: &Rc<Self>, spec: PropertySpec, fresh: impl FnOnce() -> ShapeId) -> Rc<ShapeNode> {
        if let Some(kid) = self.kids.borrow().get(&spec).and_then(Weak::upgrade) {
            return kid;
        }
        let slot_span = match spec.slot {
            Some(s) => self.slot_span.max(s + 1),
            None => self.slot_span,
        };
        let node = Rc::new(ShapeNode {
            id: fresh(),
            parent: Some(Rc::clone(self)),
            prop: Some(spec.clone()),
            count: self.count + 1,
            slot_span,
            kids: RefCell::new(FxHashMap::default()),
            index: OnceCell::new(),
        });
        let mut kids = self.kids.borrow_mut();
        kids.retain(|_, w| w.strong_count() > 0);
        kids.insert(spec, Rc::downgrade(&node));
        node
    }

    /// The node's generation id.
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// The parent node, `None` for roots.
    pub fn parent(&self) -> Option<&Rc<ShapeNode>> {
        self.parent.as_ref()
    }

    /// The property this node adds, `None` for roots.
    pub fn prop(&self) -> Option<&PropertySpec> {
        self.prop.as_ref()
    }

    /// Number of properties on the chain.
    pub fn len(&self) -> u32 {
        self.count
    }

    /// True for roots.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// One past the highest slot used by the chain.
    pub fn slot_span(&self) -> u32 {
        self.slot_span
    }

    /// The root of this node's chain.
    pub fn root_of(self: &Rc<Self>) -> Rc<ShapeNode> {
        let mut node = Rc::clone(self);
        while let Some(parent) = node.parent.clone() {
            node = parent;
        }
        node
    }

    /// Finds the own property `key` on this chain.
    pub fn search(self: &Rc<Self>, key: &str) -> Option<PropertySpec> {
        if self.count > HASH_THRESHOLD {
            let index = self.index.get_or_init(|| {
                let mut map = FxHashMap::default();
                for node in self.chain() {
                    if let Some(prop) = &node.prop {
                        map.entry(prop.key.clone()).or_insert_with(|| prop.clone());
                    }
                }
                map
            });
            return index.get(key).cloned();
        }
        self.chain()
            .find(|node| node.prop.as_ref().map_or(false, |p| p.key.as_str() == key))
            .and_then(|node| node.prop.clone())
    }

    /// Iterates from this node towards the root (newest property first).
    pub fn chain(self: &Rc<Self>) -> impl Iterator<Item = Rc<ShapeNode>> {
        let mut next = Some(Rc::clone(self));
        std::iter::from_fn(move || {
            let node = next.take()?;
            next = node.parent.clone();
            Some(node)
        })
    }

    /// Own properties in declaration order.
    pub fn properties(self: &Rc<Self>) -> Vec<PropertySpec> {
        let mut props: Vec<PropertySpec> = self.chain().filter_map(|n| n.prop.clone()).collect();
        props.reverse();
        props
    }
}

impl fmt::Debug for ShapeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeNode")
            .field("id", &self.id)
            .field("prop", &self.prop.as_ref().map(|p| &p.key))
            .field("count", &self.count)
            .finish()
    }
}
