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

//! State transitions that undo themselves.

use std::ops::{Deref, DerefMut};
use vela_core::renderer::{BufferBarrier, CommandEncoder, GpuBuffer, ResourceState};

/// Moves buffers out of their resting state for the lifetime of the guard.
///
/// Creating the guard records one barrier batch; dropping it records the
/// reverse batch. Buffers already resting in the requested state are left
/// alone. The guard dereferences to the encoder so commands can be recorded
/// through it.
pub struct ScopedBarrier<'a> {
    encoder: &'a mut dyn CommandEncoder,
    restore: Vec<BufferBarrier>,
}

impl<'a> ScopedBarrier<'a> {
    /// Transitions each `(buffer, state)` pair.
    pub fn new(encoder: &'a mut dyn CommandEncoder, transitions: &[(GpuBuffer, ResourceState)]) -> Self {
        let barriers: Vec<BufferBarrier> = transitions
            .iter()
            .filter(|(buffer, state)| buffer.resting_state != *state)
            .map(|(buffer, state)| buffer.transition_to(*state))
            .collect();
        encoder.resource_barriers(&barriers);
        let restore = barriers.iter().rev().map(BufferBarrier::reversed).collect();
        Self { encoder, restore }
    }
}

impl<'a> Deref for ScopedBarrier<'a> {
    type Target = dyn CommandEncoder + 'a;

    fn deref(&self) -> &Self::Target {
        self.encoder
    }
}

impl DerefMut for ScopedBarrier<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.encoder
    }
}

impl Drop for ScopedBarrier<'_> {
    fn drop(&mut self) {
        self.encoder.resource_barriers(&self.restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::renderer::{BufferDescriptor, GraphicsDevice};
    use vela_infra::headless::{HeadlessDevice, RecordedCommand};

    #[test]
    fn test_guard_restores_in_reverse_and_skips_noops() {
        let device = HeadlessDevice::new();
        let a = GpuBuffer::create(&device, &BufferDescriptor::structured("a", 16)).unwrap();
        let b = GpuBuffer::create(&device, &BufferDescriptor::unordered_access("b", 16)).unwrap();
        let mut encoder = device.create_command_encoder(Some("scoped"));
        {
            let mut scoped = ScopedBarrier::new(
                encoder.as_mut(),
                &[
                    (a, ResourceState::UnorderedAccess),
                    (b, ResourceState::UnorderedAccess),
                ],
            );
            scoped.clear_buffer_u32(a.id, 0, 16, 7);
            scoped.clear_buffer_u32(b.id, 0, 16, 9);
        }
        let id = encoder.finish();
        device.submit(id).unwrap();

        let commands = device.submitted_commands();
        assert_eq!(
            commands.first(),
            Some(&RecordedCommand::Barriers(vec![BufferBarrier::transition(
                a.id,
                ResourceState::ShaderResource,
                ResourceState::UnorderedAccess
            )]))
        );
        assert_eq!(
            commands.last(),
            Some(&RecordedCommand::Barriers(vec![BufferBarrier::transition(
                a.id,
                ResourceState::UnorderedAccess,
                ResourceState::ShaderResource
            )]))
        );
        assert_eq!(device.buffer_state(a.id), Some(ResourceState::ShaderResource));
        let words: Vec<u32> = bytemuck::cast_slice(&device.buffer_contents(a.id)).to_vec();
        assert_eq!(words, vec![7; 4]);
    }
}
