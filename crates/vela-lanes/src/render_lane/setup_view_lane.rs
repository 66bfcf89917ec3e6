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

use super::{LaneContext, LaneStats, PrepareContext, RenderLane};
use vela_core::renderer::{CommandEncoder, GraphicsDevice, ResourceError};

/// Publishes the camera and culling constants of a view.
///
/// All of its work happens in [`RenderLane::prepare`]: the constants travel
/// with the frame's other uploads and are resident before any pass of the
/// frame runs.
#[derive(Debug, Default)]
pub struct SetupViewLane;

impl SetupViewLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }
}

impl RenderLane for SetupViewLane {
    fn strategy_name(&self) -> &'static str {
        "SetupView"
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) {
        ctx.view_resources.upload_constants(ctx.uploads, ctx.view);
        ctx.view_resources.upload_culling_info(
            ctx.uploads,
            ctx.scene.instances.reserved(),
            ctx.scene.pipeline_sets.len(),
        );
    }

    fn record(
        &mut self,
        _ctx: &mut LaneContext<'_>,
        _encoder: &mut dyn CommandEncoder,
    ) -> Result<LaneStats, ResourceError> {
        Ok(LaneStats::default())
    }

    fn destroy(&mut self, _device: &dyn GraphicsDevice) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::gpu_types::GpuCullingInfo;
    use crate::render_lane::test_support::{read_rows, SceneHarness};
    use vela_data::scene::View;

    #[test]
    fn test_prepare_uploads_both_constant_buffers() {
        let mut s = SceneHarness::new();
        let mut lane = SetupViewLane::new();
        let view = View {
            enabled: true,
            ..View::default()
        };
        s.h.uploads.begin_frame(0);
        lane.prepare(&mut PrepareContext {
            uploads: &mut s.h.uploads,
            scene: &s.scene,
            view: &view,
            view_resources: &s.view,
        });
        assert_eq!(s.h.uploads.pending_len(), 2);
        s.h.flush();

        let info: Vec<GpuCullingInfo> = read_rows(&s.h.device, s.view.culling_info_buffer());
        assert_eq!(info[0].indirect_argument_capacity, s.h.config.indirect_argument_capacity);
        let (stats, commands) = s.record(&mut lane, true);
        assert_eq!(stats, LaneStats::default());
        assert!(commands.is_empty());
    }
}
