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

//! Pipeline descriptors and handles.
//!
//! Shaders are compiled outside this crate; pipelines reference them by name.

use std::borrow::Cow;

/// An opaque handle to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(pub usize);

/// An opaque handle to a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineId(pub usize);

/// Describes a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Name of the precompiled compute shader.
    pub shader: Cow<'a, str>,
    /// Number of descriptor tables in the root signature.
    pub descriptor_table_count: u32,
}

impl<'a> ComputePipelineDescriptor<'a> {
    /// A pipeline labelled after its shader.
    pub fn new(shader: &'a str, descriptor_table_count: u32) -> Self {
        Self {
            label: Some(Cow::Borrowed(shader)),
            shader: Cow::Borrowed(shader),
            descriptor_table_count,
        }
    }
}

/// Describes a graphics pipeline drawing from the global geometry buffers.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Name of the precompiled vertex shader.
    pub vertex_shader: Cow<'a, str>,
    /// Name of the precompiled pixel shader, if any (depth-only otherwise).
    pub pixel_shader: Option<Cow<'a, str>>,
    /// Number of descriptor tables in the root signature.
    pub descriptor_table_count: u32,
}
