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

use super::device::HeadlessDeviceInternal;
use std::any::Any;
use std::sync::Arc;
use vela_core::renderer::{
    BufferBarrier, BufferId, CommandBufferId, CommandEncoder, ComputePipelineId,
    CpuDescriptorHandle, GpuDescriptorHandle, GraphicsPipelineId, IndirectDraw,
};

/// One command as recorded by a [`HeadlessCommandEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// A buffer-to-buffer copy.
    CopyBufferToBuffer {
        /// Buffer read from.
        source: BufferId,
        /// Byte offset in `source`.
        source_offset: u64,
        /// Buffer written to.
        destination: BufferId,
        /// Byte offset in `destination`.
        destination_offset: u64,
        /// Bytes copied.
        size: u64,
    },
    /// A fill of a byte range with a repeated `u32`.
    ClearBufferU32 {
        /// Buffer cleared.
        buffer: BufferId,
        /// First byte cleared.
        offset: u64,
        /// Bytes cleared.
        size: u64,
        /// Fill value.
        value: u32,
    },
    /// A batch of state transitions.
    Barriers(Vec<BufferBarrier>),
    /// Compute pipeline binding.
    SetComputePipeline(ComputePipelineId),
    /// Compute descriptor table binding.
    SetComputeDescriptorTable {
        /// Root slot.
        slot: u32,
        /// First descriptor of the table.
        table: GpuDescriptorHandle,
    },
    /// A compute dispatch.
    Dispatch {
        /// Pipeline bound when the dispatch was recorded.
        pipeline: Option<ComputePipelineId>,
        /// Thread groups per axis.
        groups: [u32; 3],
    },
    /// Graphics pipeline binding.
    SetGraphicsPipeline(GraphicsPipelineId),
    /// Graphics descriptor table binding.
    SetGraphicsDescriptorTable {
        /// Root slot.
        slot: u32,
        /// First descriptor of the table.
        table: GpuDescriptorHandle,
    },
    /// Output binding for subsequent draws.
    SetRenderTargets {
        /// Color target descriptors, in attachment order.
        render_targets: Vec<CpuDescriptorHandle>,
        /// Depth target descriptor.
        depth_stencil: Option<CpuDescriptorHandle>,
    },
    /// An indirect, GPU-counted draw.
    ExecuteIndirect {
        /// Pipeline bound when the draw was recorded.
        pipeline: Option<GraphicsPipelineId>,
        /// The draw.
        draw: IndirectDraw,
    },
}

/// Records commands into a list the [`super::HeadlessDevice`] replays on
/// submit.
pub struct HeadlessCommandEncoder {
    pub(super) device: Arc<HeadlessDeviceInternal>,
    pub(super) label: Option<String>,
    pub(super) commands: Vec<RecordedCommand>,
    compute_pipeline: Option<ComputePipelineId>,
    graphics_pipeline: Option<GraphicsPipelineId>,
}

impl HeadlessCommandEncoder {
    pub(super) fn new(device: Arc<HeadlessDeviceInternal>, label: Option<&str>) -> Self {
        Self {
            device,
            label: label.map(str::to_owned),
            commands: Vec::new(),
            compute_pipeline: None,
            graphics_pipeline: None,
        }
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn clear_buffer_u32(&mut self, buffer: BufferId, offset: u64, size: u64, value: u32) {
        self.commands.push(RecordedCommand::ClearBufferU32 {
            buffer,
            offset,
            size,
            value,
        });
    }

    fn resource_barriers(&mut self, barriers: &[BufferBarrier]) {
        if !barriers.is_empty() {
            self.commands.push(RecordedCommand::Barriers(barriers.to_vec()));
        }
    }

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.compute_pipeline = Some(pipeline);
        self.commands.push(RecordedCommand::SetComputePipeline(pipeline));
    }

    fn set_compute_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.commands
            .push(RecordedCommand::SetComputeDescriptorTable { slot, table });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch {
            pipeline: self.compute_pipeline,
            groups: [x, y, z],
        });
    }

    fn set_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId) {
        self.graphics_pipeline = Some(pipeline);
        self.commands.push(RecordedCommand::SetGraphicsPipeline(pipeline));
    }

    fn set_graphics_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.commands
            .push(RecordedCommand::SetGraphicsDescriptorTable { slot, table });
    }

    fn set_render_targets(
        &mut self,
        render_targets: &[CpuDescriptorHandle],
        depth_stencil: Option<CpuDescriptorHandle>,
    ) {
        self.commands.push(RecordedCommand::SetRenderTargets {
            render_targets: render_targets.to_vec(),
            depth_stencil,
        });
    }

    fn execute_indirect(&mut self, draw: &IndirectDraw) {
        self.commands.push(RecordedCommand::ExecuteIndirect {
            pipeline: self.graphics_pipeline,
            draw: *draw,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let device = Arc::clone(&self.device);
        device.store_command_list(*self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
