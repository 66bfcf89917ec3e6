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

//! Descriptor heaps, descriptor handles and buffer views.

use super::buffer::BufferId;

/// The kind of descriptors a heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    /// Render target views.
    Rtv,
    /// Depth stencil views.
    Dsv,
}

/// Describes a descriptor heap to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// Kind of descriptors stored.
    pub heap_type: DescriptorHeapType,
    /// Number of descriptors in the heap.
    pub descriptor_count: u32,
    /// Whether shaders can address the heap (only meaningful for `CbvSrvUav`).
    pub shader_visible: bool,
}

/// An opaque handle to a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHeapId(pub usize);

/// A CPU address of a descriptor, used to write views into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CpuDescriptorHandle(pub u64);

/// A GPU address of a descriptor, used to bind descriptor tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    /// The handle `count` descriptors further, each `increment` bytes wide.
    pub const fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as u64 * increment as u64)
    }
}

impl GpuDescriptorHandle {
    /// The handle `count` descriptors further, each `increment` bytes wide.
    pub const fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as u64 * increment as u64)
    }
}

/// What the device reports about a heap it created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapInfo {
    /// The heap itself.
    pub id: DescriptorHeapId,
    /// Address of the first descriptor on the CPU timeline.
    pub cpu_start: CpuDescriptorHandle,
    /// Address of the first descriptor for shaders, if the heap is shader visible.
    pub gpu_start: Option<GpuDescriptorHandle>,
    /// Size in bytes of one descriptor.
    pub increment: u32,
}

/// How a buffer view exposes the buffer to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferViewKind {
    /// Read-only structured or typed view.
    ShaderResource,
    /// Read/write structured or typed view.
    UnorderedAccess,
    /// Constant buffer view.
    Constant,
}

/// Describes a view over a range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferViewDescriptor {
    /// The viewed buffer.
    pub buffer: BufferId,
    /// Kind of view written.
    pub kind: BufferViewKind,
    /// First element of the view.
    pub first_element: u64,
    /// Number of elements in the view.
    pub element_count: u32,
    /// Size in bytes of one element.
    pub element_stride: u32,
}
