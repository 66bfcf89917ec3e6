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

//! Defines the RenderDirector, which turns a frame's uploads and views into
//! one submitted command list.

use super::schedule::PassSchedule;
use vela_core::renderer::{FenceValue, GraphicsDevice, RenderError, RendererConfig};
use vela_data::descriptor::DescriptorAllocatorGroup;
use vela_data::scene::ViewScene;
use vela_data::upload::{UploadQueue, UploadStats};
use vela_lanes::render_lane::{
    GpuScene, LaneContext, LaneStats, PrepareContext, ViewHeaps, ViewResources,
};

/// What one call to [`RenderDirector::render`] recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Fence signalled when the GPU is done with the frame.
    pub fence: FenceValue,
    /// Enabled views that were recorded.
    pub rendered_views: u32,
    /// Dispatches and draws over every view.
    pub lanes: LaneStats,
    /// Copies recorded by the upload queue.
    pub uploads: UploadStats,
}

/// Walks the pass schedule once per enabled view.
#[derive(Debug)]
pub struct RenderDirector {
    // Passes shared by every view, in recording order.
    schedule: PassSchedule,
    // One set of per-view buffers and tables per view slot.
    view_resources: Vec<ViewResources>,
}

impl RenderDirector {
    /// Creates the per-view resources of every view slot.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        schedule: PassSchedule,
        descriptors: &mut DescriptorAllocatorGroup,
    ) -> Result<Self, RenderError> {
        let view_resources = (0..config.max_views as usize)
            .map(|view_index| {
                ViewResources::new(device, config, view_index, ViewHeaps::from(&mut *descriptors))
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "Render director ready: {} view slots, passes [{}]",
            view_resources.len(),
            schedule.names().join(", ")
        );
        Ok(Self {
            schedule,
            view_resources,
        })
    }

    /// Records and submits frame slot `frame_index`.
    ///
    /// Every enabled view first prepares its uploads, then the upload queue is
    /// resolved, then each enabled view records its passes. Disabled views
    /// are skipped entirely.
    pub fn render(
        &mut self,
        device: &dyn GraphicsDevice,
        uploads: &mut UploadQueue,
        scene: &mut GpuScene,
        views: &ViewScene,
        frame_index: usize,
    ) -> Result<FrameReport, RenderError> {
        assert_eq!(
            views.len(),
            self.view_resources.len(),
            "RenderDirector: view table and view resources disagree"
        );
        let mut report = FrameReport::default();

        for (view_index, view) in views.iter().filter(|(_, v)| v.enabled) {
            let mut ctx = PrepareContext {
                uploads: &mut *uploads,
                scene: &*scene,
                view,
                view_resources: &self.view_resources[view_index],
            };
            for pass in self.schedule.passes_mut() {
                pass.prepare(&mut ctx);
            }
        }

        let mut encoder = device.create_command_encoder(Some("MeshFrame"));
        report.uploads = uploads.resolve(device, encoder.as_mut())?;

        for (view_index, _) in views.iter().filter(|(_, v)| v.enabled) {
            let mut ctx = LaneContext {
                device,
                scene: &mut *scene,
                view_resources: &self.view_resources[view_index],
                view_index,
                first_view: report.rendered_views == 0,
                frame_index,
            };
            for pass in self.schedule.passes_mut() {
                report.lanes += pass.record(&mut ctx, encoder.as_mut())?;
            }
            report.rendered_views += 1;
        }

        report.fence = device.submit(encoder.finish())?;
        log::debug!(
            "Frame slot {frame_index}: {} views, {} dispatches, {} indirect draws",
            report.rendered_views,
            report.lanes.dispatches,
            report.lanes.indirect_draws
        );
        Ok(report)
    }

    /// The pass list.
    pub fn schedule(&self) -> &PassSchedule {
        &self.schedule
    }

    /// Per-view resources of view `index`.
    pub fn view_resources(&self, index: usize) -> &ViewResources {
        &self.view_resources[index]
    }

    /// Releases the passes and every view's resources.
    pub fn destroy(mut self, device: &dyn GraphicsDevice, descriptors: &mut DescriptorAllocatorGroup) {
        self.schedule.destroy(device);
        for view in self.view_resources {
            view.destroy(device, ViewHeaps::from(&mut *descriptors));
        }
    }
}
