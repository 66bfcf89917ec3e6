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

//! Defines data structures related to GPU buffer resources.

use super::command::ResourceState;
use bitflags::bitflags;
use std::borrow::Cow;

bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    ///
    /// The backend uses them to choose a memory heap (upload, readback or
    /// device-local) and to validate that the buffer is used correctly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// The buffer can be mapped for reading on the CPU (readback heap).
        const MAP_READ = 1 << 0;
        /// The buffer can be mapped for writing on the CPU (upload heap).
        const MAP_WRITE = 1 << 1;
        /// The buffer can be used as the source of a copy operation.
        const COPY_SRC = 1 << 2;
        /// The buffer can be used as the destination of a copy operation.
        const COPY_DST = 1 << 3;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 4;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 5;
        /// The buffer can be bound as a constant buffer.
        const UNIFORM = 1 << 6;
        /// The buffer can be bound as a structured buffer (SRV or UAV).
        const STORAGE = 1 << 7;
        /// The buffer can feed indirect draw or dispatch commands.
        const INDIRECT = 1 << 8;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// A bitmask of [`BufferUsage`] flags describing how the buffer will be used.
    pub usage: BufferUsage,
    /// The state the buffer is created in and returns to between passes.
    pub initial_state: ResourceState,
}

impl<'a> BufferDescriptor<'a> {
    /// A device-local structured buffer that rests as a shader resource and
    /// receives uploads through copies.
    pub fn structured(label: &'a str, size: u64) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
            initial_state: ResourceState::ShaderResource,
        }
    }

    /// A device-local structured buffer that compute passes write to.
    pub fn unordered_access(label: &'a str, size: u64) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
            initial_state: ResourceState::UnorderedAccess,
        }
    }

    /// A constant buffer updated through the upload queue.
    pub fn constant(label: &'a str, size: u64) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            initial_state: ResourceState::ConstantBuffer,
        }
    }

    /// A CPU-writable upload buffer.
    pub fn upload(label: &'a str, size: u64) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
            initial_state: ResourceState::GenericRead,
        }
    }

    /// A CPU-readable readback buffer.
    pub fn readback(label: &'a str, size: u64) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size,
            usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
            initial_state: ResourceState::CopyDest,
        }
    }

    /// Replaces the usage flags.
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// An opaque handle to a GPU buffer resource.
///
/// This ID is returned by [`GraphicsDevice::create_buffer`](crate::renderer::GraphicsDevice::create_buffer)
/// and is used to reference the buffer in all subsequent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);
