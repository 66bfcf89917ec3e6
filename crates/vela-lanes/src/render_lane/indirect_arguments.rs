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

//! Per-view indirect draw buffers.

use super::gpu_types::GpuDrawSubInfo;
use std::mem::size_of;
use vela_core::renderer::{
    BufferDescriptor, BufferUsage, DrawIndexedArguments, GpuBuffer, GraphicsDevice, IndirectDraw,
    RendererConfig, ResourceError, ResourceState,
};

/// A buffer written by compute and read as indirect arguments.
fn indirect(label: &str, size: u64) -> BufferDescriptor<'_> {
    BufferDescriptor {
        initial_state: ResourceState::IndirectArgument,
        ..BufferDescriptor::unordered_access(label, size).with_usage(
            BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
        )
    }
}

/// The buffers culling fills and the geometry pass consumes.
///
/// Arguments are partitioned per pipeline set: set `s` owns the rows
/// starting at its pipeline-set draw offset, and its draw count lives in
/// word `s` of the count buffer.
#[derive(Debug)]
pub struct IndirectArgumentBuffers {
    argument_buffer: GpuBuffer,
    count_buffer: GpuBuffer,
    sub_info_buffer: GpuBuffer,
    capacity: u32,
}

impl IndirectArgumentBuffers {
    /// Creates the buffers of view `view_index`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        view_index: usize,
    ) -> Result<Self, ResourceError> {
        let capacity = config.indirect_argument_capacity;

        let label = format!("IndirectArguments[{view_index}]");
        let argument_buffer = GpuBuffer::create(
            device,
            &indirect(&label, (size_of::<DrawIndexedArguments>() as u64) * capacity as u64),
        )?;
        let label = format!("IndirectCounts[{view_index}]");
        let count_buffer = GpuBuffer::create(
            device,
            &indirect(&label, (size_of::<u32>() as u64) * config.max_pipeline_sets as u64),
        )?;
        let label = format!("DrawSubInfo[{view_index}]");
        let sub_info_buffer = GpuBuffer::create_array::<GpuDrawSubInfo>(
            device,
            BufferDescriptor::structured(&label, 0),
            capacity as usize,
        )?;

        Ok(Self {
            argument_buffer,
            count_buffer,
            sub_info_buffer,
            capacity,
        })
    }

    /// The draw of pipeline set `pipeline_set`, whose rows start at
    /// `first_argument` and number at most `max_draw_count`.
    pub fn draw(&self, pipeline_set: u32, first_argument: u32, max_draw_count: u32) -> IndirectDraw {
        assert!(
            first_argument + max_draw_count <= self.capacity,
            "IndirectArgumentBuffers: rows {first_argument}..{} exceed the capacity of {}",
            first_argument + max_draw_count,
            self.capacity
        );
        IndirectDraw {
            argument_buffer: self.argument_buffer.id,
            argument_offset: first_argument as u64 * size_of::<DrawIndexedArguments>() as u64,
            max_draw_count,
            count_buffer: self.count_buffer.id,
            count_offset: pipeline_set as u64 * size_of::<u32>() as u64,
        }
    }

    /// `DrawIndexedArguments` rows.
    pub fn argument_buffer(&self) -> &GpuBuffer {
        &self.argument_buffer
    }

    /// One draw count per pipeline set.
    pub fn count_buffer(&self) -> &GpuBuffer {
        &self.count_buffer
    }

    /// One [`GpuDrawSubInfo`] per argument row.
    pub fn sub_info_buffer(&self) -> &GpuBuffer {
        &self.sub_info_buffer
    }

    /// Rows of the argument buffer.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Releases the buffers.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        self.argument_buffer.destroy(device);
        self.count_buffer.destroy(device);
        self.sub_info_buffer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::small_config;
    use vela_infra::headless::HeadlessDevice;

    #[test]
    fn test_draws_address_their_partition() {
        let device = HeadlessDevice::new();
        let buffers = IndirectArgumentBuffers::new(&device, &small_config(), 2).unwrap();
        assert_eq!(
            device.buffer_by_label("IndirectCounts[2]"),
            Some(buffers.count_buffer().id)
        );
        assert_eq!(
            device.buffer_state(buffers.argument_buffer().id),
            Some(ResourceState::IndirectArgument)
        );

        let draw = buffers.draw(3, 10, 4);
        assert_eq!(draw.argument_offset, 200);
        assert_eq!(draw.count_offset, 12);
        assert_eq!(draw.max_draw_count, 4);
    }

    #[test]
    fn test_each_view_gets_its_own_indirect_buffers() {
        let device = HeadlessDevice::new();
        let first = IndirectArgumentBuffers::new(&device, &small_config(), 0).unwrap();
        let second = IndirectArgumentBuffers::new(&device, &small_config(), 1).unwrap();

        for (view, buffers) in [(0, &first), (1, &second)] {
            let arguments = device.buffer_by_label(&format!("IndirectArguments[{view}]"));
            let counts = device.buffer_by_label(&format!("IndirectCounts[{view}]"));
            assert_eq!(arguments, Some(buffers.argument_buffer().id));
            assert_eq!(counts, Some(buffers.count_buffer().id));
            assert_eq!(
                device.buffer_state(buffers.count_buffer().id),
                Some(ResourceState::IndirectArgument)
            );
        }
        assert_ne!(first.argument_buffer().id, second.argument_buffer().id);
    }

    #[test]
    #[should_panic(expected = "exceed the capacity")]
    fn test_draw_beyond_capacity_panics() {
        let device = HeadlessDevice::new();
        let buffers = IndirectArgumentBuffers::new(&device, &small_config(), 0).unwrap();
        buffers.draw(0, 1020, 10);
    }
}
