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

use super::scoped_barrier::ScopedBarrier;
use super::{bind_compute, create_compute_pipeline, destroy_compute_pipeline, LaneContext, LaneStats, RenderLane};
use vela_core::renderer::{
    div_round_up, CommandEncoder, ComputePipelineId, GraphicsDevice, ResourceError, ResourceState,
    COMPUTE_GROUP_SIZE,
};

/// Compute shader culling instances against the view frustum.
pub const GPU_CULLING_SHADER: &str = "gpu_culling_cs";

/// Culls every instance slot and emits the view's indirect draws.
///
/// One thread per instance slot up to the reserved count. Visible instances
/// append, for each sub-mesh of their selected LOD level, one
/// `DrawIndexedArguments` row in their pipeline set's partition and bump that
/// set's draw count. The count buffer is cleared first so a view without
/// instances draws nothing.
#[derive(Debug)]
pub struct GpuCullingLane {
    pipeline: Option<ComputePipelineId>,
}

impl GpuCullingLane {
    /// Creates the lane and its pipeline.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        Ok(Self {
            pipeline: Some(create_compute_pipeline(device, GPU_CULLING_SHADER)?),
        })
    }
}

impl RenderLane for GpuCullingLane {
    fn strategy_name(&self) -> &'static str {
        "GpuCulling"
    }

    fn record(
        &mut self,
        ctx: &mut LaneContext<'_>,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError> {
        let pipeline = self.pipeline.ok_or(ResourceError::InvalidHandle)?;
        let indirect = ctx.view_resources.indirect();
        let counts = *indirect.count_buffer();
        let mut scoped = ScopedBarrier::new(
            encoder,
            &[
                (*indirect.argument_buffer(), ResourceState::UnorderedAccess),
                (counts, ResourceState::UnorderedAccess),
                (*indirect.sub_info_buffer(), ResourceState::UnorderedAccess),
                (*ctx.scene.lod_streaming.instance_lod_buffer(), ResourceState::ShaderResource),
            ],
        );
        scoped.clear_buffer_u32(counts.id, 0, counts.size, 0);

        let reserved = ctx.scene.instances.reserved();
        if reserved == 0 {
            return Ok(LaneStats::default());
        }
        bind_compute(&mut *scoped, pipeline, ctx);
        scoped.dispatch(div_round_up(reserved, COMPUTE_GROUP_SIZE), 1, 1);
        Ok(LaneStats {
            dispatches: 1,
            ..LaneStats::default()
        })
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_compute_pipeline(device, &mut self.pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::SceneHarness;
    use vela_infra::headless::RecordedCommand;

    #[test]
    fn test_empty_scene_clears_counts_inside_the_bracket() {
        let mut s = SceneHarness::new();
        let mut lane = GpuCullingLane::new(&s.h.device).unwrap();
        let (stats, commands) = s.record(&mut lane, true);
        assert_eq!(stats.dispatches, 0);
        assert!(matches!(commands.first(), Some(RecordedCommand::Barriers(b)) if b.len() == 4));
        assert!(matches!(commands[1], RecordedCommand::ClearBufferU32 { value: 0, .. }));
        assert!(matches!(commands.last(), Some(RecordedCommand::Barriers(b)) if b.len() == 4));

        let counts = s.view.indirect().count_buffer().id;
        assert_eq!(s.h.device.buffer_state(counts), Some(ResourceState::IndirectArgument));
    }

    #[test]
    fn test_hooked_shader_sees_writable_counts() {
        let mut s = SceneHarness::new();
        let mut lane = GpuCullingLane::new(&s.h.device).unwrap();
        let mesh = s.h.two_lod_mesh("a.mesh");
        let (lit, _) = s.h.two_pipeline_sets();
        s.h.instances.create(mesh, s.h.meshes.get(mesh), 150, lit);
        s.h.uploads.begin_frame(0);
        let changes = s.h.instances.take_changes();
        s.scene
            .instances
            .update(&mut s.h.uploads, &s.h.instances, &s.h.meshes, &s.h.materials, &changes);
        s.h.flush();

        s.h.device.set_dispatch_hook(
            GPU_CULLING_SHADER,
            Box::new(|ctx| {
                if let Some(counts) = ctx.buffer_mut("IndirectCounts[0]") {
                    counts[..4].copy_from_slice(&5u32.to_le_bytes());
                }
            }),
        );
        let (stats, commands) = s.record(&mut lane, true);
        assert_eq!(stats.dispatches, 1);
        assert!(commands
            .iter()
            .any(|c| matches!(c, RecordedCommand::Dispatch { groups: [2, 1, 1], .. })));
        let counts = s.h.device.buffer_contents(s.view.indirect().count_buffer().id);
        assert_eq!(&counts[..4], &5u32.to_le_bytes());
    }
}
