// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-capacity, index-stable slot allocation.
//!
//! A slot index is the address of an object in every CPU table *and* in every
//! GPU-mirrored buffer, so slots never move and the pool never grows.
//! Releasing a handle retires it at once (stale handles stop resolving) but the
//! index only becomes allocatable again after [`SlotPool::reclaim`], which the
//! owner calls once the GPU clear of that slot has been recorded.

use std::fmt;

/// A generational reference to a pool slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    /// Slot index, identical on the CPU and GPU sides.
    pub index: u32,
    /// Incremented every time the slot is released.
    pub generation: u32,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// Allocates slot indices in O(1) from a free list backed by a watermark.
#[derive(Debug, Clone)]
pub struct SlotPool {
    capacity: u32,
    generations: Vec<u32>,
    enabled: Vec<bool>,
    free: Vec<u32>,
    pending: Vec<u32>,
    reserved: u32,
    live: u32,
}

impl SlotPool {
    /// Creates a pool with `capacity` slots, all unused.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            generations: vec![0; capacity as usize],
            enabled: vec![false; capacity as usize],
            free: Vec::new(),
            pending: Vec::new(),
            reserved: 0,
            live: 0,
        }
    }

    /// Takes an unused slot. Recently reclaimed slots are reused first.
    ///
    /// # Panics
    ///
    /// Panics when every slot is live or waiting to be reclaimed.
    pub fn allocate(&mut self) -> Handle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                assert!(
                    self.reserved < self.capacity,
                    "SlotPool exhausted: all {} slots are in use",
                    self.capacity
                );
                self.reserved += 1;
                self.reserved - 1
            }
        };
        self.enabled[index as usize] = true;
        self.live += 1;
        Handle {
            index,
            generation: self.generations[index as usize],
        }
    }

    /// Retires `handle`. The slot stays unavailable until [`Self::reclaim`].
    ///
    /// # Panics
    ///
    /// Panics on a stale handle, which covers double frees.
    pub fn release(&mut self, handle: Handle) {
        assert!(
            self.is_alive(handle),
            "SlotPool: release of dead handle {handle:?} (double free or stale handle)"
        );
        let index = handle.index as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.enabled[index] = false;
        self.pending.push(handle.index);
        self.live -= 1;
    }

    /// Makes every released slot allocatable again and returns how many were
    /// reclaimed.
    pub fn reclaim(&mut self) -> usize {
        let count = self.pending.len();
        self.free.append(&mut self.pending);
        count
    }

    /// Whether `handle` still designates a live slot.
    pub fn is_alive(&self, handle: Handle) -> bool {
        let index = handle.index as usize;
        index < self.reserved as usize
            && self.enabled[index]
            && self.generations[index] == handle.generation
    }

    /// The live handle currently stored at `index`, if any.
    pub fn handle_at(&self, index: u32) -> Option<Handle> {
        let i = index as usize;
        (i < self.reserved as usize && self.enabled[i]).then(|| Handle {
            index,
            generation: self.generations[i],
        })
    }

    /// High-water mark: one past the largest index ever handed out.
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Number of live slots.
    pub fn len(&self) -> u32 {
        self.live
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Fixed number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of released slots waiting for [`Self::reclaim`].
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Liveness flag of every slot, indexed by slot.
    pub fn enabled_flags(&self) -> &[bool] {
        &self.enabled
    }

    /// Iterates over the indices of live slots in increasing order.
    pub fn live_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.enabled[..self.reserved as usize]
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i as u32))
    }
}

/// A [`SlotPool`] with a value stored in every live slot.
#[derive(Debug, Clone)]
pub struct ObjectPool<T> {
    slots: SlotPool,
    values: Vec<Option<T>>,
}

impl<T> ObjectPool<T> {
    /// Creates a pool of `capacity` empty slots.
    pub fn new(capacity: u32) -> Self {
        let mut values = Vec::with_capacity(capacity as usize);
        values.resize_with(capacity as usize, || None);
        Self {
            slots: SlotPool::new(capacity),
            values,
        }
    }

    /// Stores `value` in a fresh slot.
    ///
    /// # Panics
    ///
    /// Panics when the pool is full.
    pub fn insert(&mut self, value: T) -> Handle {
        let handle = self.slots.allocate();
        self.values[handle.index as usize] = Some(value);
        handle
    }

    /// Retires `handle` and hands back its value.
    ///
    /// # Panics
    ///
    /// Panics on a stale handle.
    pub fn remove(&mut self, handle: Handle) -> T {
        self.slots.release(handle);
        match self.values[handle.index as usize].take() {
            Some(value) => value,
            None => unreachable!("live slot {} without a value", handle.index),
        }
    }

    /// See [`SlotPool::reclaim`].
    pub fn reclaim(&mut self) -> usize {
        self.slots.reclaim()
    }

    /// The value behind `handle`, if it is still live.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        if self.slots.is_alive(handle) {
            self.values[handle.index as usize].as_ref()
        } else {
            None
        }
    }

    /// Mutable access to the value behind `handle`, if it is still live.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if self.slots.is_alive(handle) {
            self.values[handle.index as usize].as_mut()
        } else {
            None
        }
    }

    /// The value stored at a raw slot index.
    ///
    /// # Panics
    ///
    /// Panics when `index` is outside the pool.
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        assert!(
            index < self.slots.capacity(),
            "ObjectPool: index {index} out of bounds ({})",
            self.slots.capacity()
        );
        self.values[index as usize].as_ref()
    }

    /// Iterates over live `(handle, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.live_indices().filter_map(move |index| {
            let handle = self.slots.handle_at(index)?;
            Some((handle, self.values[index as usize].as_ref()?))
        })
    }

    /// The underlying slot allocator.
    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    /// Number of live values.
    pub fn len(&self) -> u32 {
        self.slots.len()
    }

    /// Whether the pool holds no value.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// High-water mark of the slot allocator.
    pub fn reserved(&self) -> u32 {
        self.slots.reserved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_uses_watermark_then_free_list() {
        let mut pool = SlotPool::new(4);
        let a = pool.allocate();
        let b = pool.allocate();
        assert_eq!((a.index, b.index), (0, 1));
        assert_eq!(pool.reserved(), 2);

        pool.release(a);
        // Not reusable before the safe point.
        assert_eq!(pool.allocate().index, 2);
        assert_eq!(pool.reclaim(), 1);
        let reused = pool.allocate();
        assert_eq!(reused.index, 0);
        assert_eq!(reused.generation, 1);
        assert_eq!(pool.reserved(), 3);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut pool = SlotPool::new(8);
        let handles: Vec<_> = (0..4).map(|_| pool.allocate()).collect();
        pool.release(handles[1]);
        pool.release(handles[3]);
        pool.reclaim();
        assert_eq!(pool.allocate().index, 3);
        assert_eq!(pool.allocate().index, 1);
    }

    #[test]
    fn test_stale_handle_stops_resolving() {
        let mut pool = SlotPool::new(2);
        let h = pool.allocate();
        pool.release(h);
        assert!(!pool.is_alive(h));
        pool.reclaim();
        let h2 = pool.allocate();
        assert_eq!(h.index, h2.index);
        assert!(!pool.is_alive(h));
        assert!(pool.is_alive(h2));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut pool = SlotPool::new(2);
        let h = pool.allocate();
        pool.release(h);
        pool.release(h);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_allocate_beyond_capacity_panics() {
        let mut pool = SlotPool::new(2);
        pool.allocate();
        pool.allocate();
        pool.allocate();
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_pending_slots_count_against_capacity() {
        let mut pool = SlotPool::new(1);
        let h = pool.allocate();
        pool.release(h);
        pool.allocate();
    }

    #[test]
    fn test_live_indices_never_duplicate_under_churn() {
        let mut pool = SlotPool::new(64);
        let mut live: Vec<Handle> = Vec::new();
        for round in 0..200u32 {
            if round % 3 == 2 && !live.is_empty() {
                let victim = live.remove((round as usize * 7) % live.len());
                pool.release(victim);
            } else if pool.len() + (pool.pending_len() as u32) < 64 {
                live.push(pool.allocate());
            }
            if round % 5 == 0 {
                pool.reclaim();
            }
            let unique: HashSet<u32> = live.iter().map(|h| h.index).collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(pool.len() as usize, live.len());
        }
    }

    #[test]
    fn test_enabled_flags_track_liveness() {
        let mut pool = SlotPool::new(3);
        let a = pool.allocate();
        let _b = pool.allocate();
        pool.release(a);
        assert_eq!(pool.enabled_flags(), &[false, true, false]);
        assert_eq!(pool.live_indices().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_object_pool_values() {
        let mut pool = ObjectPool::new(4);
        let a = pool.insert("rock");
        let b = pool.insert("tree");
        assert_eq!(pool.get(a), Some(&"rock"));
        assert_eq!(pool.remove(a), "rock");
        assert_eq!(pool.get(a), None);
        assert_eq!(pool.get_by_index(a.index), None);
        *pool.get_mut(b).unwrap() = "bush";
        let collected: Vec<_> = pool.iter().map(|(h, v)| (h.index, *v)).collect();
        assert_eq!(collected, vec![(1, "bush")]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_object_pool_index_is_bounds_checked() {
        let pool: ObjectPool<u8> = ObjectPool::new(2);
        pool.get_by_index(5);
    }
}
