//! Handle table (spec §4.1).
//!
//! A growable dense map from small non-zero integers to `T`. One table per
//! resource kind (vertex buffers, index buffers, textures, stage surfaces,
//! samplers, swap-chain layers, shaders) so that lookups are strongly typed,
//! per the "multiple inheritance of resource kinds" design note (spec §9):
//! tagged-variant per kind, each kind its own table.
//!
//! Grounded on the teacher's per-kind `slotmap::SlotMap` fields
//! (`backend_gl/src/pool.rs`), reimplemented by hand rather than with
//! `slotmap` because the free-list recycling policy here is externally
//! observable (spec §8 "handle round-trip" property: a released handle is
//! reissued before any fresh handle beyond the current high-water mark) and
//! must match spec.md's description exactly rather than `slotmap`'s own
//! generation scheme.

use std::collections::VecDeque;

/// A handle into a [`HandleTable`]. Zero is reserved for "absent" (spec §4.1).
pub type RawHandle = u32;

enum Slot<T> {
    Vacant,
    Occupied(T),
}

/// A generational-by-construction dense map: `Handle` values are recycled
/// through a free-list rather than carrying a generation counter, matching
/// spec.md's description of the table (no generation field is mentioned;
/// re-use is guarded entirely by the host only ever holding handles it was
/// actually given).
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: VecDeque<RawHandle>,
}

impl<T> HandleTable<T> {
    const INITIAL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.push(Slot::Vacant); // index 0 is never handed out
        for _ in 1..=capacity {
            slots.push(Slot::Vacant);
        }
        let free_list = (1..=capacity as RawHandle).collect();
        HandleTable { slots, free_list }
    }

    fn grow(&mut self) {
        let old_len = self.slots.len();
        let new_len = old_len * 2;
        self.slots.resize_with(new_len, || Slot::Vacant);
        // New entries are appended in ascending order, per spec §4.1.
        for h in old_len as RawHandle..new_len as RawHandle {
            self.free_list.push_back(h);
        }
    }

    /// Inserts `value`, returning a freshly drawn (or recycled) non-zero handle.
    pub fn insert(&mut self, value: T) -> RawHandle {
        if self.free_list.is_empty() {
            self.grow();
        }
        let handle = self
            .free_list
            .pop_front()
            .expect("grow() must replenish the free-list");
        self.slots[handle as usize] = Slot::Occupied(value);
        handle
    }

    /// O(1) fallible lookup.
    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        if handle == 0 {
            return None;
        }
        match self.slots.get(handle as usize) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        if handle == 0 {
            return None;
        }
        match self.slots.get_mut(handle as usize) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    /// Overwrites the value at `handle` in place without touching the
    /// free-list. Spec §4.1: "Replace-at-key overwrites in place without
    /// altering the free-list."
    pub fn replace(&mut self, handle: RawHandle, value: T) -> Option<T> {
        if handle == 0 {
            return None;
        }
        match self.slots.get_mut(handle as usize) {
            Some(slot @ Slot::Occupied(_)) => {
                let old = std::mem::replace(slot, Slot::Occupied(value));
                match old {
                    Slot::Occupied(v) => Some(v),
                    Slot::Vacant => unreachable!(),
                }
            }
            _ => None,
        }
    }

    /// Removes and returns the value at `handle`, recycling the handle onto
    /// the tail of the free-list. Removing a handle that is not currently
    /// live is a soft warning, not fatal (spec §4.1) — the caller logs via
    /// [`crate::error::soft`]; this just reports whether anything was removed.
    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        if handle == 0 {
            return None;
        }
        let slot = self.slots.get_mut(handle as usize)?;
        match std::mem::replace(slot, Slot::Vacant) {
            Slot::Occupied(v) => {
                self.free_list.push_back(handle);
                Some(v)
            }
            Slot::Vacant => None,
        }
    }

    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(v) => Some((i as RawHandle, v)),
            Slot::Vacant => None,
        })
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut t: HandleTable<u32> = HandleTable::new();
        let h = t.insert(42);
        assert_ne!(h, 0);
        assert_eq!(t.get(h), Some(&42));
        assert_eq!(t.remove(h), Some(42));
        assert_eq!(t.get(h), None);
    }

    #[test]
    fn zero_is_always_absent() {
        let t: HandleTable<u32> = HandleTable::new();
        assert_eq!(t.get(0), None);
    }

    #[test]
    fn recycled_before_high_water_mark() {
        let mut t: HandleTable<u32> = HandleTable::with_capacity(4);
        let h1 = t.insert(1);
        let _h2 = t.insert(2);
        t.remove(h1);
        let h3 = t.insert(3);
        // h1 must be reissued before any handle beyond the initial capacity.
        assert_eq!(h3, h1);
    }

    #[test]
    fn grows_by_doubling_with_ascending_new_handles() {
        let mut t: HandleTable<u32> = HandleTable::with_capacity(2);
        let handles: Vec<_> = (0..2).map(|i| t.insert(i)).collect();
        assert_eq!(handles, vec![1, 2]);
        // table is now full (capacity 2); the next insert must grow.
        let h3 = t.insert(3);
        assert_eq!(h3, 3);
        assert_eq!(t.get(h3), Some(&3));
    }

    #[test]
    fn double_remove_is_soft() {
        let mut t: HandleTable<u32> = HandleTable::new();
        let h = t.insert(1);
        assert_eq!(t.remove(h), Some(1));
        assert_eq!(t.remove(h), None); // not live; soft no-op, not a panic
    }

    #[test]
    fn replace_does_not_touch_free_list() {
        let mut t: HandleTable<u32> = HandleTable::with_capacity(4);
        let h = t.insert(1);
        let before_free = t.free_list.len();
        assert_eq!(t.replace(h, 2), Some(1));
        assert_eq!(t.get(h), Some(&2));
        assert_eq!(t.free_list.len(), before_free);
    }
}
