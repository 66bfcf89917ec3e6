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

//! Graphics pipelines, one per pipeline set.

use std::borrow::Cow;
use vela_core::renderer::{
    GraphicsDevice, GraphicsPipelineDescriptor, GraphicsPipelineId, RendererConfig, ResourceError,
};
use vela_data::scene::MaterialScene;

/// The graphics pipeline drawing each pipeline set.
#[derive(Debug)]
pub struct PipelineSets {
    pipelines: Vec<Option<GraphicsPipelineId>>,
}

impl PipelineSets {
    /// No pipeline yet; room for every set `config` allows.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            pipelines: vec![None; config.max_pipeline_sets as usize],
        }
    }

    /// Builds the pipelines of the sets opened since the last call.
    pub fn sync(&mut self, device: &dyn GraphicsDevice, materials: &mut MaterialScene) -> Result<(), ResourceError> {
        for set in materials.take_new_pipeline_sets() {
            let (vertex_shader, pixel_shader) = materials.pipeline_set(set);
            let label = format!("PipelineSet[{set}] {vertex_shader}/{pixel_shader}");
            let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
                label: Some(Cow::Owned(label)),
                vertex_shader: Cow::Borrowed(vertex_shader),
                pixel_shader: Some(Cow::Borrowed(pixel_shader)),
                descriptor_table_count: 2,
            })?;
            log::debug!("Pipeline set {set} uses {vertex_shader}/{pixel_shader}");
            self.pipelines[set as usize] = Some(pipeline);
        }
        Ok(())
    }

    /// The pipeline of `set`, once built.
    pub fn get(&self, set: u32) -> Option<GraphicsPipelineId> {
        self.pipelines.get(set as usize).copied().flatten()
    }

    /// Built pipelines with their set index, in set order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, GraphicsPipelineId)> + '_ {
        self.pipelines
            .iter()
            .enumerate()
            .filter_map(|(set, pipeline)| pipeline.map(|p| (set as u32, p)))
    }

    /// Pipeline sets with a pipeline.
    pub fn len(&self) -> u32 {
        self.pipelines.iter().flatten().count() as u32
    }

    /// No pipeline built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases every pipeline.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.into_iter().flatten() {
            if let Err(e) = device.destroy_graphics_pipeline(pipeline) {
                log::warn!("Failed to destroy graphics pipeline {pipeline:?}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::Harness;

    #[test]
    fn test_new_sets_get_one_pipeline_each() {
        let mut h = Harness::new();
        let mut sets = PipelineSets::new(&h.config);
        h.two_pipeline_sets();
        sets.sync(&h.device, &mut h.materials).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.get(1).is_some());
        assert!(sets.get(2).is_none());

        sets.sync(&h.device, &mut h.materials).unwrap();
        assert_eq!(h.device.live_pipeline_count(), 2);
        sets.destroy(&h.device);
        assert_eq!(h.device.live_pipeline_count(), 0);
    }
}
