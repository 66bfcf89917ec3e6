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

//! A buffer handle that remembers its size and resting state.

use super::buffer::{BufferDescriptor, BufferId};
use super::command::{BufferBarrier, ResourceState};
use crate::renderer::error::ResourceError;
use crate::renderer::traits::GraphicsDevice;

/// A device buffer together with the metadata every pass needs.
///
/// Between passes the buffer is always in `resting_state`; a pass that needs
/// another state transitions in and restores it before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    /// The device handle.
    pub id: BufferId,
    /// Size in bytes.
    pub size: u64,
    /// The state the buffer returns to between passes.
    pub resting_state: ResourceState,
}

impl GpuBuffer {
    /// Creates the buffer on `device`.
    pub fn create(
        device: &dyn GraphicsDevice,
        descriptor: &BufferDescriptor,
    ) -> Result<Self, ResourceError> {
        let id = device.create_buffer(descriptor)?;
        Ok(Self {
            id,
            size: descriptor.size,
            resting_state: descriptor.initial_state,
        })
    }

    /// Creates a buffer holding `count` elements of `T`.
    pub fn create_array<T>(
        device: &dyn GraphicsDevice,
        descriptor: BufferDescriptor,
        count: usize,
    ) -> Result<Self, ResourceError> {
        let descriptor = BufferDescriptor {
            size: (std::mem::size_of::<T>() * count) as u64,
            ..descriptor
        };
        Self::create(device, &descriptor)
    }

    /// Barrier from the resting state to `state`.
    pub fn transition_to(&self, state: ResourceState) -> BufferBarrier {
        BufferBarrier::transition(self.id, self.resting_state, state)
    }

    /// Releases the device buffer, logging instead of failing.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_buffer(self.id) {
            log::warn!("Failed to destroy buffer {:?}: {}", self.id, e);
        }
    }
}
