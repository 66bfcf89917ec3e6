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

use super::{LaneContext, LaneStats, RenderLane, SCENE_TABLE_SLOT, VIEW_TABLE_SLOT};
use vela_core::renderer::{CommandEncoder, GraphicsDevice, ResourceError};

/// Draws the culled scene into the view's targets: one `execute_indirect`
/// per pipeline set.
///
/// Sets without a built pipeline or without sub-mesh instances are skipped.
/// The draw reads at most the set's instance count of argument rows from the
/// set's partition; the GPU count decides how many are executed.
#[derive(Debug, Default)]
pub struct GeometryPassLane;

impl GeometryPassLane {
    /// Creates the lane. Its pipelines belong to the pipeline sets.
    pub fn new() -> Self {
        Self
    }
}

impl RenderLane for GeometryPassLane {
    fn strategy_name(&self) -> &'static str {
        "GeometryPass"
    }

    fn record(
        &mut self,
        ctx: &mut LaneContext<'_>,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError> {
        let mut stats = LaneStats::default();
        encoder.set_render_targets(
            &[ctx.view_resources.render_target()],
            Some(ctx.view_resources.depth_stencil()),
        );
        let indirect = ctx.view_resources.indirect();
        for (set, pipeline) in ctx.scene.pipeline_sets.iter() {
            let max_draw_count = ctx.scene.instances.pipeline_set_count(set);
            if max_draw_count == 0 {
                continue;
            }
            let first_argument = ctx.scene.instances.pipeline_set_offset(set);
            encoder.set_graphics_pipeline(pipeline);
            encoder.set_graphics_descriptor_table(VIEW_TABLE_SLOT, ctx.view_resources.table().gpu_table());
            encoder.set_graphics_descriptor_table(SCENE_TABLE_SLOT, ctx.scene.table().gpu_table());
            encoder.execute_indirect(&indirect.draw(set, first_argument, max_draw_count));
            stats.indirect_draws += 1;
        }
        log::trace!(
            "View {} geometry pass: {} indirect draws",
            ctx.view_index,
            stats.indirect_draws
        );
        Ok(stats)
    }

    fn destroy(&mut self, _device: &dyn GraphicsDevice) {}
}
