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

//! Rendering lane - the GPU-resident half of the mesh core.
//!
//! Resource managers mirror the CPU scene tables into GPU buffers through the
//! upload queue; lanes record the per-view passes that read them.

use vela_core::renderer::{
    BufferViewDescriptor, BufferViewKind, CommandEncoder, ComputePipelineDescriptor, ComputePipelineId,
    GpuBuffer, GraphicsDevice, ResourceError,
};
use vela_data::descriptor::DescriptorRange;
use vela_data::scene::View;
use vela_data::upload::UploadQueue;

mod build_indirect_arguments_lane;
mod compute_lod_lane;
mod geometry_pass_lane;
mod geometry_resources;
mod gpu_culling_lane;
mod gpu_scene;
pub mod gpu_types;
mod indirect_arguments;
mod lod_streaming;
mod material_resources;
mod mesh_instance_resources;
mod mesh_resources;
mod pipeline_sets;
mod scoped_barrier;
mod setup_view_lane;
mod view_resources;

#[cfg(test)]
pub(crate) mod test_support;

pub use build_indirect_arguments_lane::*;
pub use compute_lod_lane::*;
pub use geometry_pass_lane::*;
pub use geometry_resources::*;
pub use gpu_culling_lane::*;
pub use gpu_scene::*;
pub use indirect_arguments::*;
pub use lod_streaming::*;
pub use material_resources::*;
pub use mesh_instance_resources::*;
pub use mesh_resources::*;
pub use pipeline_sets::*;
pub use scoped_barrier::*;
pub use setup_view_lane::*;
pub use view_resources::*;

/// Descriptor table slot of the per-view table.
pub const VIEW_TABLE_SLOT: u32 = 0;
/// Descriptor table slot of the scene table.
pub const SCENE_TABLE_SLOT: u32 = 1;

/// Work recorded by one lane for one view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    /// Compute dispatches.
    pub dispatches: u32,
    /// `execute_indirect` calls.
    pub indirect_draws: u32,
}

impl std::ops::AddAssign for LaneStats {
    fn add_assign(&mut self, rhs: Self) {
        self.dispatches += rhs.dispatches;
        self.indirect_draws += rhs.indirect_draws;
    }
}

/// What a lane may touch while the frame's uploads are still open.
pub struct PrepareContext<'a> {
    /// The frame's upload queue, resolved after every lane prepared.
    pub uploads: &'a mut UploadQueue,
    /// The GPU scene.
    pub scene: &'a GpuScene,
    /// The view being prepared.
    pub view: &'a View,
    /// Per-view buffers of that view.
    pub view_resources: &'a ViewResources,
}

/// What a lane may touch while recording a view.
pub struct LaneContext<'a> {
    /// The device the encoder belongs to.
    pub device: &'a dyn GraphicsDevice,
    /// The GPU scene.
    pub scene: &'a mut GpuScene,
    /// Per-view buffers of the recorded view.
    pub view_resources: &'a ViewResources,
    /// Index of the recorded view.
    pub view_index: usize,
    /// Whether this is the first enabled view of the frame.
    pub first_view: bool,
    /// Back-buffer slot of the frame.
    pub frame_index: usize,
}

/// A trait defining the behavior of a rendering lane.
///
/// A lane is one pass of the per-view pass list walked by the render
/// director. Each lane owns the pipelines it binds and leaves every buffer it
/// touches in its resting state when [`RenderLane::record`] returns.
///
/// Lanes only see abstractions from `vela-core` (command encoders, buffer
/// handles, descriptor tables) and never a concrete backend.
pub trait RenderLane: Send + Sync {
    /// Returns a human-readable identifier for this lane.
    ///
    /// The director uses it to resolve declared pass dependencies and in
    /// log messages.
    fn strategy_name(&self) -> &'static str;

    /// Enqueues the uploads the lane needs for a view.
    ///
    /// Called for every enabled view before the upload queue is resolved.
    /// The default does nothing.
    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) {
        let _ = ctx;
    }

    /// Records the lane's commands for one view.
    ///
    /// # Errors
    ///
    /// Returns the device error when a command cannot be recorded. The
    /// director treats it as fatal for the frame.
    fn record(
        &mut self,
        ctx: &mut LaneContext<'_>,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError>;

    /// Releases the pipelines the lane created.
    fn destroy(&mut self, device: &dyn GraphicsDevice);
}

/// A view over the whole of `buffer` as an array of `T`.
pub(crate) fn structured_view<T>(buffer: &GpuBuffer, kind: BufferViewKind) -> BufferViewDescriptor {
    let stride = std::mem::size_of::<T>() as u64;
    BufferViewDescriptor {
        buffer: buffer.id,
        kind,
        first_element: 0,
        element_count: (buffer.size / stride) as u32,
        element_stride: stride as u32,
    }
}

/// Writes `views[i]` into descriptor `i` of `range`.
pub(crate) fn write_views(
    device: &dyn GraphicsDevice,
    range: &DescriptorRange,
    views: &[BufferViewDescriptor],
) -> Result<(), ResourceError> {
    assert!(
        views.len() as u32 <= range.count,
        "write_views: {} views for a range of {}",
        views.len(),
        range.count
    );
    for (i, view) in views.iter().enumerate() {
        device.create_buffer_view(view, range.get(i as u32).cpu)?;
    }
    Ok(())
}

/// Creates the compute pipeline of a lane, bound to the view and scene
/// tables.
pub(crate) fn create_compute_pipeline(
    device: &dyn GraphicsDevice,
    shader: &str,
) -> Result<ComputePipelineId, ResourceError> {
    device.create_compute_pipeline(&ComputePipelineDescriptor::new(shader, 2))
}

/// Binds `pipeline` with the view table and the scene table.
pub(crate) fn bind_compute(encoder: &mut dyn CommandEncoder, pipeline: ComputePipelineId, ctx: &LaneContext<'_>) {
    encoder.set_compute_pipeline(pipeline);
    encoder.set_compute_descriptor_table(VIEW_TABLE_SLOT, ctx.view_resources.table().gpu_table());
    encoder.set_compute_descriptor_table(SCENE_TABLE_SLOT, ctx.scene.table().gpu_table());
}

/// Releases a lane's compute pipeline, once.
pub(crate) fn destroy_compute_pipeline(device: &dyn GraphicsDevice, pipeline: &mut Option<ComputePipelineId>) {
    if let Some(pipeline) = pipeline.take() {
        if let Err(e) = device.destroy_compute_pipeline(pipeline) {
            log::warn!("Failed to destroy compute pipeline {pipeline:?}: {e}");
        }
    }
}
