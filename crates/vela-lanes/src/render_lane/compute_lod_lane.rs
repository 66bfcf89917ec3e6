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

use super::{bind_compute, create_compute_pipeline, destroy_compute_pipeline, LaneContext, LaneStats, RenderLane};
use vela_core::renderer::{
    div_round_up, CommandEncoder, ComputePipelineId, GraphicsDevice, ResourceError, COMPUTE_GROUP_SIZE,
};

/// Compute shader selecting a LOD level per instance.
pub const COMPUTE_LOD_SHADER: &str = "compute_lod_cs";

/// Selects the LOD level of every instance and gathers streaming requests.
///
/// For each instance the shader compares its screen coverage against the
/// LOD thresholds, writes the chosen level and coverage, and folds them into
/// the per-mesh min/max LOD and per-material coverage buffers. The first
/// enabled view of a frame first snapshots last frame's requests into the
/// frame slot's readback set and resets them; later views accumulate.
#[derive(Debug)]
pub struct ComputeLodLane {
    pipeline: Option<ComputePipelineId>,
}

impl ComputeLodLane {
    /// Creates the lane and its pipeline.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        Ok(Self {
            pipeline: Some(create_compute_pipeline(device, COMPUTE_LOD_SHADER)?),
        })
    }
}

impl RenderLane for ComputeLodLane {
    fn strategy_name(&self) -> &'static str {
        "ComputeLod"
    }

    fn record(
        &mut self,
        ctx: &mut LaneContext<'_>,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError> {
        let pipeline = self.pipeline.ok_or(ResourceError::InvalidHandle)?;
        if ctx.first_view {
            ctx.scene.lod_streaming.record_readback_and_clear(encoder, ctx.frame_index);
        }

        let reserved = ctx.scene.instances.reserved();
        if reserved == 0 {
            return Ok(LaneStats::default());
        }
        bind_compute(encoder, pipeline, ctx);
        encoder.dispatch(div_round_up(reserved, COMPUTE_GROUP_SIZE), 1, 1);
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

    fn clears(commands: &[RecordedCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::ClearBufferU32 { .. }))
            .count()
    }

    #[test]
    fn test_empty_scene_still_resets_requests() {
        let mut s = SceneHarness::new();
        let mut lane = ComputeLodLane::new(&s.h.device).unwrap();
        let (stats, commands) = s.record(&mut lane, true);
        assert_eq!(stats.dispatches, 0);
        assert_eq!(clears(&commands), 3);
    }

    #[test]
    fn test_dispatch_covers_reserved_instances() {
        let mut s = SceneHarness::new();
        let mut lane = ComputeLodLane::new(&s.h.device).unwrap();
        let mesh = s.h.two_lod_mesh("a.mesh");
        let (lit, _) = s.h.two_pipeline_sets();
        s.h.instances.create(mesh, s.h.meshes.get(mesh), 3, lit);
        s.h.uploads.begin_frame(0);
        let changes = s.h.instances.take_changes();
        s.scene
            .instances
            .update(&mut s.h.uploads, &s.h.instances, &s.h.meshes, &s.h.materials, &changes);
        s.h.flush();

        let (stats, commands) = s.record(&mut lane, false);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(clears(&commands), 0);
        assert!(commands
            .iter()
            .any(|c| matches!(c, RecordedCommand::Dispatch { groups: [1, 1, 1], .. })));

        lane.destroy(&s.h.device);
        lane.destroy(&s.h.device);
    }
}
