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

use crate::renderer::api::{
    BufferBarrier, BufferId, CommandBufferId, ComputePipelineId, CpuDescriptorHandle,
    GpuDescriptorHandle, GraphicsPipelineId, IndirectDraw,
};
use std::any::Any;

/// A trait for an object that records a sequence of GPU commands.
///
/// A `CommandEncoder` is the main tool for building a [`CommandBufferId`].
/// Commands execute in recording order. State transitions are explicit: the
/// caller records a [`BufferBarrier`] before using a buffer in a state other
/// than the one it is in.
pub trait CommandEncoder {
    /// Records a command to copy data from one buffer to another on the GPU.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Fills `size` bytes of `buffer` starting at `offset` with `value`.
    ///
    /// The buffer must be in the `UnorderedAccess` or `CopyDest` state.
    fn clear_buffer_u32(&mut self, buffer: BufferId, offset: u64, size: u64, value: u32);

    /// Records a batch of state transitions.
    fn resource_barriers(&mut self, barriers: &[BufferBarrier]);

    /// Binds a compute pipeline for subsequent dispatches.
    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds a descriptor table to the compute root signature.
    fn set_compute_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle);

    /// Dispatches the bound compute pipeline.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Binds a graphics pipeline for subsequent draws.
    fn set_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId);

    /// Binds a descriptor table to the graphics root signature.
    fn set_graphics_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle);

    /// Binds the color targets and the optional depth target written by
    /// subsequent draws. Handles come from RTV and DSV heaps.
    fn set_render_targets(
        &mut self,
        render_targets: &[CpuDescriptorHandle],
        depth_stencil: Option<CpuDescriptorHandle>,
    );

    /// Records indexed draws whose arguments and count live in GPU buffers.
    fn execute_indirect(&mut self, draw: &IndirectDraw);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    ///
    /// This method consumes the encoder. The returned [`CommandBufferId`] can then
    /// be submitted with [`GraphicsDevice::submit`](super::GraphicsDevice::submit).
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
