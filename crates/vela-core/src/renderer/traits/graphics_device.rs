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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The graphics device and its single command queue.
///
/// Submissions execute in order. Each submission signals a fence value that
/// is strictly greater than the previous one.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to be destroyed.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a CPU-visible (`MAP_WRITE`) buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The offset in the buffer where the data will be written.
    /// * `data` - A slice of bytes containing the data to be written.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Reads data back from a CPU-visible (`MAP_READ`) buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to read from.
    /// * `offset` - The offset in the buffer where reading starts.
    /// * `data` - Destination slice; its length is the number of bytes read.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn read_buffer(&self, id: BufferId, offset: u64, data: &mut [u8]) -> Result<(), ResourceError>;

    /// Creates a descriptor heap.
    /// ## Arguments
    /// * `descriptor` - The heap type, size and visibility.
    /// ## Returns
    /// The heap handle with its first CPU (and GPU, when shader visible) descriptor address.
    fn create_descriptor_heap(
        &self,
        descriptor: &DescriptorHeapDescriptor,
    ) -> Result<DescriptorHeapInfo, ResourceError>;

    /// Destroys a descriptor heap.
    /// ## Arguments
    /// * `id` - The ID of the heap to be destroyed.
    fn destroy_descriptor_heap(&self, id: DescriptorHeapId) -> Result<(), ResourceError>;

    /// Writes a buffer view into the descriptor at `destination`.
    /// ## Arguments
    /// * `descriptor` - The viewed buffer range and view kind.
    /// * `destination` - CPU address of a descriptor owned by a live heap.
    fn create_buffer_view(
        &self,
        descriptor: &BufferViewDescriptor,
        destination: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Copies `count` descriptors between heaps (usually CPU-only to shader visible).
    fn copy_descriptors(
        &self,
        count: u32,
        source: CpuDescriptorHandle,
        destination: CpuDescriptorHandle,
    ) -> Result<(), ResourceError>;

    /// Creates a compute pipeline.
    /// ## Errors
    /// * `ResourceError` - If the shader is unknown or the pipeline cannot be built.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Creates a graphics pipeline.
    /// ## Errors
    /// * `ResourceError` - If a shader is unknown or the pipeline cannot be built.
    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GraphicsPipelineId, ResourceError>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Destroys a graphics pipeline.
    fn destroy_graphics_pipeline(&self, id: GraphicsPipelineId) -> Result<(), ResourceError>;

    /// Creates a new command encoder to record GPU commands.
    /// ## Arguments
    /// * `label` - An optional label for the command encoder.
    /// ## Returns
    /// A `Box` containing the created command encoder.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a recorded command buffer to the queue.
    /// ## Returns
    /// The fence value signalled once the submission has completed.
    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, ResourceError>;

    /// The highest fence value the GPU has reached.
    fn completed_fence_value(&self) -> FenceValue;

    /// Blocks until the GPU reaches `value`.
    fn wait_for_fence(&self, value: FenceValue);

    /// Blocks until every submission has completed.
    fn wait_idle(&self);
}
