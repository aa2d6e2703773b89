//! Segmented operand-stack arena.
//!
//! Frames carve their storage (callee, `this`, arguments, locals, operand
//! stack) out of the top segment. When the top segment cannot hold a new
//! frame, the frame moves to a fresh segment and the values already pushed
//! for it (callee, `this`, arguments) are copied over. Segments are used
//! strictly LIFO and are recycled once released.

use crate::error::{VmError, VmResult};
use core_types::Value;
use std::ops::Range;

#[derive(Debug)]
struct Segment {
    values: Vec<Value>,
    capacity: usize,
}

/// The arena.
#[derive(Debug)]
pub struct StackArena {
    segments: Vec<Segment>,
    active: usize,
    segment_values: usize,
    max_values: usize,
}

impl StackArena {
    /// Creates an empty arena.
    pub fn new(segment_values: usize, max_values: usize) -> Self {
        StackArena {
            segments: Vec::new(),
            active: 0,
            segment_values: segment_values.max(16),
            max_values,
        }
    }

    /// Index of the segment new values go to, if any is in use.
    pub fn top_segment(&self) -> Option<usize> {
        self.active.checked_sub(1)
    }

    /// Number of segments in use.
    pub fn active_segments(&self) -> usize {
        self.active
    }

    /// Total capacity held by the arena, including recycled segments.
    pub fn capacity(&self) -> usize {
        self.segments.iter().map(|s| s.capacity).sum()
    }

    /// Finds room for a frame of `needed` values whose first `prefix` values
    /// are already on top of the top segment. Returns the segment and the
    /// index of the frame's first value.
    pub fn reserve(&mut self, prefix: usize, needed: usize) -> VmResult<(usize, usize)> {
        if let Some(top) = self.top_segment() {
            let seg = &self.segments[top];
            let base = seg
                .values
                .len()
                .checked_sub(prefix)
                .ok_or_else(|| VmError::Internal("frame prefix exceeds segment".into()))?;
            if base + needed <= seg.capacity {
                return Ok((top, base));
            }
        }

        let index = self.active;
        let capacity = needed.max(self.segment_values);
        let reusable = self.segments.get(index).map_or(false, |s| s.capacity >= needed);
        if !reusable {
            let current = self.segments.get(index).map_or(0, |s| s.capacity);
            if self.capacity() - current + capacity > self.max_values {
                return Err(VmError::StackOverflow);
            }
            let segment = Segment { values: Vec::with_capacity(capacity), capacity };
            if index < self.segments.len() {
                self.segments[index] = segment;
            } else {
                self.segments.push(segment);
            }
            tracing::trace!(target: "vm::frame", index, capacity, "allocated stack segment");
        }

        let moved = match self.top_segment() {
            Some(top) => {
                let values = &mut self.segments[top].values;
                let at = values.len() - prefix.min(values.len());
                values.split_off(at)
            }
            None => Vec::new(),
        };
        self.segments[index].values.clear();
        self.segments[index].values.extend(moved);
        self.active += 1;
        Ok((index, 0))
    }

    /// Releases the top segment once its last frame is gone.
    pub fn release(&mut self, seg: usize) {
        if seg + 1 == self.active {
            self.segments[seg].values.clear();
            self.active -= 1;
        }
    }

    /// Pushes onto a segment.
    pub fn push(&mut self, seg: usize, value: Value) {
        self.segments[seg].values.push(value);
    }

    /// Pops from a segment.
    pub fn pop(&mut self, seg: usize) -> Option<Value> {
        self.segments[seg].values.pop()
    }

    /// Number of values in a segment.
    pub fn len(&self, seg: usize) -> usize {
        self.segments.get(seg).map_or(0, |s| s.values.len())
    }

    /// True if no segment is in use.
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Reads a value.
    pub fn get(&self, seg: usize, index: usize) -> Option<&Value> {
        self.segments.get(seg).and_then(|s| s.values.get(index))
    }

    /// Overwrites a value. Returns false when out of range.
    pub fn set(&mut self, seg: usize, index: usize, value: Value) -> bool {
        match self.segments.get_mut(seg).and_then(|s| s.values.get_mut(index)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Drops every value from `len` on.
    pub fn truncate(&mut self, seg: usize, len: usize) {
        if let Some(s) = self.segments.get_mut(seg) {
            s.values.truncate(len);
        }
    }

    /// Removes and returns every value from `at` on.
    pub fn split_off(&mut self, seg: usize, at: usize) -> Vec<Value> {
        match self.segments.get_mut(seg) {
            Some(s) if at <= s.values.len() => s.values.split_off(at),
            _ => Vec::new(),
        }
    }

    /// Appends values to a segment.
    pub fn extend(&mut self, seg: usize, values: impl IntoIterator<Item = Value>) {
        self.segments[seg].values.extend(values);
    }

    /// A range of a segment.
    pub fn slice(&self, seg: usize, range: Range<usize>) -> &[Value] {
        self.segments
            .get(seg)
            .and_then(|s| s.values.get(range))
            .unwrap_or(&[])
    }

    /// Every value in the segments in use.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.segments[..self.active].iter().flat_map(|s| s.values.iter())
    }
}
