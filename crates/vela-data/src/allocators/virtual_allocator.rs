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

//! First-fit allocation of contiguous ranges inside a fixed offset space.
//!
//! Nothing is stored at the offsets; the caller maps them onto a descriptor
//! heap, a vertex buffer or a table of sub-mesh instances.

/// A contiguous range handed out by a [`VirtualAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VirtualAllocation {
    /// First element of the range.
    pub offset: u32,
    /// Number of elements.
    pub size: u32,
}

impl VirtualAllocation {
    /// One past the last element.
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// First-fit allocator with a coalescing free list of `(offset, size)` pairs.
#[derive(Debug, Clone)]
pub struct VirtualAllocator {
    capacity: u32,
    // Sorted by offset, never adjacent (adjacent ranges are merged).
    free_ranges: Vec<VirtualAllocation>,
    allocated: u32,
}

impl VirtualAllocator {
    /// Creates an allocator over `[0, capacity)`.
    pub fn new(capacity: u32) -> Self {
        let free_ranges = if capacity > 0 {
            vec![VirtualAllocation {
                offset: 0,
                size: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            free_ranges,
            allocated: 0,
        }
    }

    /// Reserves `size` contiguous elements at the lowest offset that fits.
    pub fn try_allocate(&mut self, size: u32) -> Option<VirtualAllocation> {
        assert!(size > 0, "VirtualAllocator: zero-sized allocation");
        let slot = self.free_ranges.iter().position(|r| r.size >= size)?;
        let range = &mut self.free_ranges[slot];
        let allocation = VirtualAllocation {
            offset: range.offset,
            size,
        };
        range.offset += size;
        range.size -= size;
        if range.size == 0 {
            self.free_ranges.remove(slot);
        }
        self.allocated += size;
        Some(allocation)
    }

    /// Like [`Self::try_allocate`] but exhaustion is fatal.
    ///
    /// # Panics
    ///
    /// Panics when no free range is large enough.
    pub fn allocate(&mut self, size: u32) -> VirtualAllocation {
        match self.try_allocate(size) {
            Some(allocation) => allocation,
            None => panic!(
                "VirtualAllocator exhausted: {size} requested, {} of {} in use",
                self.allocated, self.capacity
            ),
        }
    }

    /// Returns a range, merging it with free neighbours.
    ///
    /// # Panics
    ///
    /// Panics when the range lies outside the space or overlaps a free range
    /// (double free).
    pub fn free(&mut self, allocation: VirtualAllocation) {
        assert!(
            allocation.size > 0 && allocation.end() <= self.capacity,
            "VirtualAllocator: range {allocation:?} outside [0, {})",
            self.capacity
        );
        let slot = self
            .free_ranges
            .partition_point(|r| r.offset < allocation.offset);
        if let Some(prev) = slot.checked_sub(1).map(|i| self.free_ranges[i]) {
            assert!(
                prev.end() <= allocation.offset,
                "VirtualAllocator: double free of {allocation:?}"
            );
        }
        if let Some(next) = self.free_ranges.get(slot) {
            assert!(
                allocation.end() <= next.offset,
                "VirtualAllocator: double free of {allocation:?}"
            );
        }

        self.allocated -= allocation.size;
        let merges_prev = slot > 0 && self.free_ranges[slot - 1].end() == allocation.offset;
        let merges_next = self
            .free_ranges
            .get(slot)
            .is_some_and(|next| allocation.end() == next.offset);

        match (merges_prev, merges_next) {
            (true, true) => {
                let next = self.free_ranges.remove(slot);
                self.free_ranges[slot - 1].size += allocation.size + next.size;
            }
            (true, false) => self.free_ranges[slot - 1].size += allocation.size,
            (false, true) => {
                let next = &mut self.free_ranges[slot];
                next.offset = allocation.offset;
                next.size += allocation.size;
            }
            (false, false) => self.free_ranges.insert(slot, allocation),
        }
    }

    /// Total size of the space.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Elements currently handed out.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Number of disjoint free ranges.
    pub fn free_range_count(&self) -> usize {
        self.free_ranges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fit_reuses_exact_range() {
        let mut alloc = VirtualAllocator::new(64);
        let a = alloc.allocate(8);
        alloc.free(a);
        assert_eq!(alloc.allocate(8), a);
    }

    #[test]
    fn test_first_fit_picks_lowest_hole() {
        let mut alloc = VirtualAllocator::new(64);
        let a = alloc.allocate(4);
        let _b = alloc.allocate(4);
        let c = alloc.allocate(4);
        alloc.free(c);
        alloc.free(a);
        assert_eq!(alloc.allocate(2).offset, 0);
        assert_eq!(alloc.allocate(2).offset, 2);
        assert_eq!(alloc.allocate(3).offset, 8);
    }

    #[test]
    fn test_frees_coalesce() {
        let mut alloc = VirtualAllocator::new(12);
        let a = alloc.allocate(4);
        let b = alloc.allocate(4);
        let c = alloc.allocate(4);
        alloc.free(a);
        alloc.free(c);
        assert_eq!(alloc.free_range_count(), 2);
        alloc.free(b);
        assert_eq!(alloc.free_range_count(), 1);
        assert_eq!(alloc.allocated(), 0);
        assert_eq!(alloc.allocate(12).offset, 0);
    }

    #[test]
    fn test_try_allocate_reports_exhaustion() {
        let mut alloc = VirtualAllocator::new(4);
        assert!(alloc.try_allocate(5).is_none());
        alloc.allocate(4);
        assert!(alloc.try_allocate(1).is_none());
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_allocate_panics_when_exhausted() {
        let mut alloc = VirtualAllocator::new(4);
        alloc.allocate(3);
        alloc.allocate(2);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut alloc = VirtualAllocator::new(16);
        let a = alloc.allocate(4);
        alloc.allocate(4);
        alloc.free(a);
        alloc.free(a);
    }
}
