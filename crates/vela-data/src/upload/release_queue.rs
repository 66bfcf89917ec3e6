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

use vela_core::renderer::BACK_BUFFER_COUNT;

/// Holds objects until no submitted command list can reference them.
///
/// There is one bucket per back-buffer slot. Objects go into the bucket of
/// the frame being recorded; [`ReleaseQueue::advance`] is called once per
/// frame, after the fence of the next slot has been waited, and hands back
/// the bucket that slot collected a full cycle earlier.
#[derive(Debug)]
pub struct ReleaseQueue<T> {
    buckets: [Vec<T>; BACK_BUFFER_COUNT],
    current: usize,
}

impl<T> Default for ReleaseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReleaseQueue<T> {
    /// An empty queue positioned on slot 0.
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| Vec::new()),
            current: 0,
        }
    }

    /// Defers `item` until its bucket comes around again.
    pub fn push(&mut self, item: T) {
        self.buckets[self.current].push(item);
    }

    /// Moves to the next slot and returns what it held.
    ///
    /// An object pushed while recording frame `N` is returned by the advance
    /// that moves the queue into frame `N + BACK_BUFFER_COUNT`.
    #[must_use = "released objects must be destroyed by the caller"]
    pub fn advance(&mut self) -> Vec<T> {
        self.current = (self.current + 1) % BACK_BUFFER_COUNT;
        std::mem::take(&mut self.buckets[self.current])
    }

    /// Empties every bucket. Only valid once the GPU is idle.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.buckets.iter_mut().flat_map(std::mem::take).collect()
    }

    /// Objects waiting in all buckets.
    pub fn pending_len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Slot receiving new objects.
    pub fn current_slot(&self) -> usize {
        self.current
    }
}
