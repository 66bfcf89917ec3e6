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

//! A pool that records what changed since the GPU mirror was last updated.

use crate::pool::{Handle, ObjectPool};

bitflags::bitflags! {
    /// Which part of a live object changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdateKind: u32 {
        /// World transform.
        const TRANSFORM = 1 << 0;
        /// Material binding.
        const MATERIAL = 1 << 1;
        /// Parameter blob.
        const PARAMETERS = 1 << 2;
    }
}

/// An object removed from the pool, waiting for its GPU slot to be cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct Retired<T> {
    /// Slot the object occupied.
    pub index: u32,
    /// The object as it was when destroyed.
    pub value: T,
}

/// Everything that happened to a [`TrackedPool`] since the last
/// [`TrackedPool::take_changes`].
#[derive(Debug)]
pub struct Changes<T> {
    /// Objects created, still alive.
    pub created: Vec<Handle>,
    /// Objects modified after their creation was processed, still alive.
    pub updated: Vec<(Handle, UpdateKind)>,
    /// Objects destroyed.
    pub destroyed: Vec<Retired<T>>,
}

impl<T> Changes<T> {
    /// No creation, update or destruction.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

impl<T> Default for Changes<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            destroyed: Vec::new(),
        }
    }
}

/// An [`ObjectPool`] plus the create/update/destroy lists of the frame.
///
/// A destroyed slot stays unavailable until [`TrackedPool::late_update`] runs
/// after its destruction has been handed out by `take_changes`, so a slot is
/// never reused before the GPU clear of its previous occupant was recorded.
#[derive(Debug)]
pub struct TrackedPool<T> {
    pool: ObjectPool<T>,
    created: Vec<Handle>,
    updated: Vec<(Handle, UpdateKind)>,
    destroyed: Vec<Retired<T>>,
}

impl<T> TrackedPool<T> {
    /// A pool of `capacity` slots with no pending changes.
    pub fn new(capacity: u32) -> Self {
        Self {
            pool: ObjectPool::new(capacity),
            created: Vec::new(),
            updated: Vec::new(),
            destroyed: Vec::new(),
        }
    }

    /// Stores `value` and records its creation.
    pub fn insert(&mut self, value: T) -> Handle {
        let handle = self.pool.insert(value);
        self.created.push(handle);
        handle
    }

    /// Records a change of `kind` on a live object.
    ///
    /// Changes to an object created in the same frame are folded into its
    /// creation.
    ///
    /// # Panics
    ///
    /// Panics when `handle` is not alive.
    pub fn mark_updated(&mut self, handle: Handle, kind: UpdateKind) {
        assert!(
            self.pool.slots().is_alive(handle),
            "TrackedPool: update of dead handle {handle:?}"
        );
        if self.created.contains(&handle) {
            return;
        }
        match self.updated.iter_mut().find(|(h, _)| *h == handle) {
            Some((_, pending)) => *pending |= kind,
            None => self.updated.push((handle, kind)),
        }
    }

    /// Removes a live object and records its destruction.
    ///
    /// # Panics
    ///
    /// Panics when `handle` is not alive.
    pub fn remove(&mut self, handle: Handle) {
        let value = self.pool.remove(handle);
        self.created.retain(|h| *h != handle);
        self.updated.retain(|(h, _)| *h != handle);
        self.destroyed.push(Retired {
            index: handle.index,
            value,
        });
    }

    /// Hands out and clears the pending changes.
    pub fn take_changes(&mut self) -> Changes<T> {
        Changes {
            created: std::mem::take(&mut self.created),
            updated: std::mem::take(&mut self.updated),
            destroyed: std::mem::take(&mut self.destroyed),
        }
    }

    /// Makes the slots of processed destructions reusable.
    ///
    /// Returns `false`, reclaiming nothing, while a destruction has not been
    /// handed out yet.
    pub fn late_update(&mut self) -> bool {
        if !self.destroyed.is_empty() {
            log::debug!(
                "Deferring slot reclaim: {} destructions not processed yet",
                self.destroyed.len()
            );
            return false;
        }
        self.pool.reclaim();
        true
    }

    /// The object behind `handle`, if alive.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.pool.get(handle)
    }

    /// Mutable access. Does not record an update.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.pool.get_mut(handle)
    }

    /// The live object at `index`, if any.
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        self.pool.get_by_index(index)
    }

    /// Live objects with their handles, by index.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.pool.iter()
    }

    /// Whether `handle` is alive.
    pub fn contains(&self, handle: Handle) -> bool {
        self.pool.slots().is_alive(handle)
    }

    /// Live objects.
    pub fn len(&self) -> u32 {
        self.pool.len()
    }

    /// No live object.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// High-water mark of allocated slots.
    pub fn reserved(&self) -> u32 {
        self.pool.reserved()
    }

    /// Total slots.
    pub fn capacity(&self) -> u32 {
        self.pool.slots().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_of_new_object_folds_into_creation() {
        let mut pool = TrackedPool::new(4);
        let h = pool.insert("a");
        pool.mark_updated(h, UpdateKind::TRANSFORM);
        let changes = pool.take_changes();
        assert_eq!(changes.created, vec![h]);
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn test_updates_merge_kinds() {
        let mut pool = TrackedPool::new(4);
        let h = pool.insert(1);
        let _ = pool.take_changes();
        pool.mark_updated(h, UpdateKind::TRANSFORM);
        pool.mark_updated(h, UpdateKind::MATERIAL);
        let changes = pool.take_changes();
        assert_eq!(
            changes.updated,
            vec![(h, UpdateKind::TRANSFORM | UpdateKind::MATERIAL)]
        );
    }

    #[test]
    fn test_destroy_drops_pending_create_and_update() {
        let mut pool = TrackedPool::new(4);
        let h = pool.insert(7);
        pool.remove(h);
        let changes = pool.take_changes();
        assert!(changes.created.is_empty());
        assert_eq!(changes.destroyed, vec![Retired { index: 0, value: 7 }]);
    }

    #[test]
    fn test_slot_waits_for_processed_destruction() {
        let mut pool = TrackedPool::new(4);
        let a = pool.insert('a');
        let _ = pool.take_changes();
        pool.remove(a);
        assert!(!pool.late_update());
        assert_eq!(pool.insert('b').index, 1);

        let changes = pool.take_changes();
        assert_eq!(changes.destroyed.len(), 1);
        assert!(pool.late_update());
        let c = pool.insert('c');
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
        assert!(pool.get(a).is_none());
    }
}
