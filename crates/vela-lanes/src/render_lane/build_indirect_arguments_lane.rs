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

/// Compute shader turning culling output into draw arguments.
pub const BUILD_INDIRECT_ARGUMENTS_SHADER: &str = "build_indirect_arguments_cs";

/// Expands per-sub-mesh visible counts into instanced draw arguments.
///
/// Optional: enabled by `RendererConfig::build_indirect_arguments`. One
/// thread per sub-mesh instance of the scene.
#[derive(Debug)]
pub struct BuildIndirectArgumentsLane {
    pipeline: Option<ComputePipelineId>,
}

impl BuildIndirectArgumentsLane {
    /// Creates the lane and its pipeline.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        Ok(Self {
            pipeline: Some(create_compute_pipeline(device, BUILD_INDIRECT_ARGUMENTS_SHADER)?),
        })
    }
}

impl RenderLane for BuildIndirectArgumentsLane {
    fn strategy_name(&self) -> &'static str {
        "BuildIndirectArguments"
    }

    fn record(
        &mut self,
        ctx: &mut LaneContext<'_>,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError> {
        let pipeline = self.pipeline.ok_or(ResourceError::InvalidHandle)?;
        let draws = ctx.scene.instances.total_draw_count();
        if draws == 0 {
            return Ok(LaneStats::default());
        }
        let indirect = ctx.view_resources.indirect();
        let mut scoped = ScopedBarrier::new(
            encoder,
            &[
                (*indirect.argument_buffer(), ResourceState::UnorderedAccess),
                (*indirect.count_buffer(), ResourceState::UnorderedAccess),
            ],
        );
        bind_compute(&mut *scoped, pipeline, ctx);
        scoped.dispatch(div_round_up(draws, COMPUTE_GROUP_SIZE), 1, 1);
        Ok(LaneStats {
            dispatches: 1,
            ..LaneStats::default()
        })
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        destroy_compute_pipeline(device, &mut self.pipeline);
    }
}
