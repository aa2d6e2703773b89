//! Property cache.
//!
//! A direct-mapped table memoizing property and name resolution per bytecode
//! site. An entry is keyed by `(script, pc, receiver shape id)` and records
//! how many scope-parent and prototype links were walked to reach the
//! holder, plus the holder's shape id at fill time. A probe re-walks those
//! links and compares the holder's current shape id, so any structural
//! change along the way turns the probe into a miss.
//!
//! The cache never changes results: every miss falls back to a full lookup.

use bytecode_system::ScriptId;
use core_types::{ObjectId, Value};
use memory_manager::{Heap, PropertySpec, ShapeId};

/// Longest prototype or scope walk an entry can record.
pub const MAX_HOPS: u32 = 15;

/// What a hit yields.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// Read or write this slot of the holder
    Slot(u32),
    /// Dispatch through the property's accessors
    Prop(PropertySpec),
    /// A method found on a branded holder
    Callee(Value),
}

/// A successful probe.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// Object reached after the scope hops (the receiver for property ops)
    pub scope: ObjectId,
    /// Object owning the property
    pub holder: ObjectId,
    /// Cached resolution
    pub value: CachedValue,
}

/// Identity of a bytecode site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    /// Script
    pub script: ScriptId,
    /// Instruction
    pub pc: u32,
}

/// Where a full lookup found a property, relative to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walk {
    /// Scope-parent links walked
    pub scope_hops: u32,
    /// Prototype links walked after the scope hops
    pub proto_hops: u32,
    /// Object owning the property
    pub holder: ObjectId,
}

/// Counters exposed to hosts and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Probes made
    pub probes: u64,
    /// Probes that hit
    pub hits: u64,
    /// Probes that missed
    pub misses: u64,
    /// Entries written
    pub fills: u64,
    /// Global flushes
    pub flushes: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    site: Site,
    shape: ShapeId,
    scope_hops: u8,
    proto_hops: u8,
    holder_shape: ShapeId,
    value: CachedValue,
}

/// The cache table.
#[derive(Debug)]
pub struct PropertyCache {
    table: Vec<Option<Entry>>,
    mask: usize,
    enabled: bool,
    disabled: u32,
    stats: CacheStats,
}

impl PropertyCache {
    /// Creates a table with at least `size` entries.
    pub fn new(size: usize, enabled: bool) -> Self {
        let size = size.max(1).next_power_of_two();
        PropertyCache {
            table: vec![None; size],
            mask: size - 1,
            enabled,
            disabled: 0,
            stats: CacheStats::default(),
        }
    }

    fn index(&self, site: Site, shape: ShapeId) -> usize {
        let h = site.script.get().wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ (site.pc as u64).wrapping_mul(31)
            ^ shape.0.rotate_left(17);
        (h as usize ^ (h >> 32) as usize) & self.mask
    }

    /// Suppresses fills until a matching [`enable`](Self::enable).
    pub fn disable(&mut self) {
        self.disabled += 1;
        tracing::trace!(target: "vm::cache", depth = self.disabled, "disabled");
    }

    /// Undoes one [`disable`](Self::disable).
    pub fn enable(&mut self) {
        self.disabled = self.disabled.saturating_sub(1);
        tracing::trace!(target: "vm::cache", depth = self.disabled, "enabled");
    }

    /// Current disable nesting.
    pub fn disable_depth(&self) -> u32 {
        self.disabled
    }

    /// True if fills are currently allowed.
    pub fn fills_allowed(&self) -> bool {
        self.enabled && self.disabled == 0
    }

    /// Drops every entry.
    pub fn flush(&mut self) {
        self.table.iter_mut().for_each(|e| *e = None);
        self.stats.flushes += 1;
        tracing::debug!(target: "vm::cache", "flushed");
    }

    /// Counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Looks up the entry for `site` and `receiver` and validates it.
    pub fn probe(&mut self, heap: &Heap, site: Site, receiver: ObjectId) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }
        self.stats.probes += 1;
        let hit = self.validate(heap, site, receiver);
        if hit.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    fn validate(&self, heap: &Heap, site: Site, receiver: ObjectId) -> Option<CacheHit> {
        let shape = heap.get(receiver)?.shape_id();
        let entry = self.table[self.index(site, shape)].as_ref()?;
        if entry.site != site || entry.shape != shape {
            return None;
        }
        let mut scope = receiver;
        for _ in 0..entry.scope_hops {
            scope = heap.get(scope)?.parent?;
        }
        let mut holder = scope;
        for _ in 0..entry.proto_hops {
            holder = heap.get(holder)?.proto?;
        }
        if heap.get(holder)?.shape_id() != entry.holder_shape {
            return None;
        }
        Some(CacheHit { scope, holder, value: entry.value.clone() })
    }

    /// Records a resolution. Ignored while disabled or when a walk is too
    /// long to encode.
    pub fn fill(
        &mut self,
        heap: &Heap,
        site: Site,
        receiver: ObjectId,
        walk: Walk,
        value: CachedValue,
    ) {
        if !self.fills_allowed() || walk.scope_hops > MAX_HOPS || walk.proto_hops > MAX_HOPS {
            return;
        }
        let (Some(r), Some(h)) = (heap.get(receiver), heap.get(walk.holder)) else {
            return;
        };
        let shape = r.shape_id();
        let index = self.index(site, shape);
        self.table[index] = Some(Entry {
            site,
            shape,
            scope_hops: walk.scope_hops as u8,
            proto_hops: walk.proto_hops as u8,
            holder_shape: h.shape_id(),
            value,
        });
        self.stats.fills += 1;
    }
}
