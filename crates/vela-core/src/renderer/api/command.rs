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

//! Opaque handles and basic command structures.

use super::buffer::BufferId;
use bytemuck::{Pod, Zeroable};

/// An opaque handle to a recorded command buffer that is ready for submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// A monotonically increasing value signalled by the GPU queue when a
/// submission has completed.
pub type FenceValue = u64;

/// The access state a buffer is in between two commands.
///
/// Transitions are explicit: every pass moves the buffers it touches out of
/// their resting state and back again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// No particular access.
    Common,
    /// Readable by the copy engine, shaders and the input assembler at once.
    /// Upload-heap buffers live here permanently.
    GenericRead,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy or clear.
    CopyDest,
    /// Read/write access from compute shaders.
    UnorderedAccess,
    /// Read-only access from shaders.
    ShaderResource,
    /// Bound as a constant buffer.
    ConstantBuffer,
    /// Consumed by indirect draw or dispatch commands.
    IndirectArgument,
    /// Bound as a vertex or index buffer.
    VertexAndIndex,
}

/// A state transition of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    /// The buffer being transitioned.
    pub buffer: BufferId,
    /// The state the buffer is currently in.
    pub before: ResourceState,
    /// The state the buffer moves to.
    pub after: ResourceState,
}

impl BufferBarrier {
    /// Creates a transition of `buffer` from `before` to `after`.
    pub const fn transition(buffer: BufferId, before: ResourceState, after: ResourceState) -> Self {
        Self {
            buffer,
            before,
            after,
        }
    }

    /// The same transition in the opposite direction.
    pub const fn reversed(&self) -> Self {
        Self {
            buffer: self.buffer,
            before: self.after,
            after: self.before,
        }
    }
}

/// Arguments of one indexed indirect draw, as laid out in the argument buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedArguments {
    /// Number of indices read for each instance.
    pub index_count_per_instance: u32,
    /// Number of instances drawn.
    pub instance_count: u32,
    /// First index read from the index buffer.
    pub start_index_location: u32,
    /// Value added to each index before reading the vertex.
    pub base_vertex_location: i32,
    /// Value added to the instance id before reading per-instance data.
    pub start_instance_location: u32,
}

/// An indirect draw whose argument count is read from a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectDraw {
    /// Buffer holding packed [`DrawIndexedArguments`].
    pub argument_buffer: BufferId,
    /// Byte offset of the first argument.
    pub argument_offset: u64,
    /// Upper bound on the number of draws.
    pub max_draw_count: u32,
    /// Buffer holding the actual draw count as a `u32`.
    pub count_buffer: BufferId,
    /// Byte offset of the count.
    pub count_offset: u64,
}
