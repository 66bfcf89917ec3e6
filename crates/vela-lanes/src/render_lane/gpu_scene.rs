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

//! The GPU mirror of the whole scene.

use super::geometry_resources::{GeometryResources, LodGeometry};
use super::lod_streaming::LodStreaming;
use super::material_resources::MaterialResources;
use super::mesh_instance_resources::MeshInstanceResources;
use super::mesh_resources::MeshResources;
use super::pipeline_sets::PipelineSets;
use vela_core::renderer::{GraphicsDevice, RendererConfig, ResourceError};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::{
    Changes, MaterialInstance, MaterialScene, Mesh, MeshInstance, MeshInstanceScene, MeshScene,
};
use vela_data::upload::{ReleaseQueue, UploadQueue};

/// Descriptors of the scene table.
///
/// Layout: positions, indices, geometry offsets (SRV); meshes, LOD meshes,
/// sub-meshes (SRV); material parameters (SRV); mesh instances, LOD
/// instances, sub-mesh instances, sub-mesh draw offsets, pipeline-set draw
/// offsets (SRV); instance LOD, instance and material screen percentages,
/// mesh min and max LOD (UAV), instance LOD (SRV).
pub const SCENE_TABLE_SIZE: u32 = 18;

/// Scene changes of one frame, as taken from the CPU tables.
#[derive(Debug, Default)]
pub struct SceneChanges {
    /// Mesh creations and destructions.
    pub meshes: Changes<Mesh>,
    /// Material instance creations, edits and destructions.
    pub materials: Changes<MaterialInstance>,
    /// Mesh instance creations, edits and destructions.
    pub instances: Changes<MeshInstance>,
}

/// Every scene-wide GPU table, and the shader-visible table binding them.
#[derive(Debug)]
pub struct GpuScene {
    /// Global vertex and index buffers.
    pub geometry: GeometryResources,
    /// Mesh, LOD-mesh and sub-mesh tables.
    pub meshes: MeshResources,
    /// Material parameters.
    pub materials: MaterialResources,
    /// Instance tables and draw bookkeeping.
    pub instances: MeshInstanceResources,
    /// LOD feedback and streaming state.
    pub lod_streaming: LodStreaming,
    /// Graphics pipelines per pipeline set.
    pub pipeline_sets: PipelineSets,
    table: DescriptorRange,
}

impl GpuScene {
    /// Creates every table and copies their views into one shader-visible
    /// range.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
        gpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let geometry = GeometryResources::new(device, config, cpu_descriptors)?;
        let meshes = MeshResources::new(device, config, cpu_descriptors)?;
        let materials = MaterialResources::new(device, config, cpu_descriptors)?;
        let instances = MeshInstanceResources::new(device, config, cpu_descriptors)?;
        let lod_streaming = LodStreaming::new(device, config, cpu_descriptors)?;

        let table = gpu_descriptors.allocate(SCENE_TABLE_SIZE);
        let mut next = 0;
        for views in [
            geometry.views(),
            meshes.views(),
            materials.views(),
            instances.views(),
            lod_streaming.views(),
        ] {
            device.copy_descriptors(views.count, views.cpu, table.get(next).cpu)?;
            next += views.count;
        }
        debug_assert_eq!(next, SCENE_TABLE_SIZE);
        log::info!("GPU scene created ({SCENE_TABLE_SIZE} scene descriptors)");

        Ok(Self {
            geometry,
            meshes,
            materials,
            instances,
            lod_streaming,
            pipeline_sets: PipelineSets::new(config),
            table,
        })
    }

    /// Mirrors one frame of CPU changes.
    ///
    /// Geometry of destroyed meshes goes to `releases`; everything else is
    /// written through `uploads`.
    pub fn update(
        &mut self,
        device: &dyn GraphicsDevice,
        uploads: &mut UploadQueue,
        scene: SceneRefs<'_>,
        changes: &SceneChanges,
        releases: &mut ReleaseQueue<LodGeometry>,
    ) -> Result<(), ResourceError> {
        self.pipeline_sets.sync(device, &mut *scene.materials)?;

        self.materials.update(uploads, scene.materials, &changes.materials);
        for retired in &changes.materials.destroyed {
            self.lod_streaming.forget_material_instance(retired.index);
        }

        self.meshes.update(uploads, scene.meshes, &changes.meshes);
        for retired in &changes.meshes.destroyed {
            self.geometry.unload_mesh(uploads, &retired.value, releases);
            self.lod_streaming.forget_mesh(retired.index);
        }

        self.instances.update(
            uploads,
            scene.instances,
            scene.meshes,
            scene.materials,
            &changes.instances,
        );
        Ok(())
    }

    /// The shader-visible scene table.
    pub fn table(&self) -> &DescriptorRange {
        &self.table
    }

    /// Releases every table, pipeline and descriptor.
    pub fn destroy(
        self,
        device: &dyn GraphicsDevice,
        cpu_descriptors: &mut DescriptorAllocator,
        gpu_descriptors: &mut DescriptorAllocator,
    ) {
        gpu_descriptors.free(self.table);
        self.geometry.destroy(device, cpu_descriptors);
        self.meshes.destroy(device, cpu_descriptors);
        self.materials.destroy(device, cpu_descriptors);
        self.instances.destroy(device, cpu_descriptors);
        self.lod_streaming.destroy(device, cpu_descriptors);
        self.pipeline_sets.destroy(device);
    }
}

/// The CPU tables [`GpuScene::update`] reads.
pub struct SceneRefs<'a> {
    /// Meshes.
    pub meshes: &'a MeshScene,
    /// Materials; new pipeline sets are taken from it.
    pub materials: &'a mut MaterialScene,
    /// Mesh instances.
    pub instances: &'a MeshInstanceScene,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::Harness;

    #[test]
    fn test_scene_table_concatenates_manager_views() {
        let mut h = Harness::new();
        let scene = GpuScene::new(&h.device, &h.config, &mut h.cpu_descriptors, &mut h.gpu_descriptors).unwrap();
        let table = scene.table();
        let view_at = |i| h.device.buffer_view_at(table.get(i).gpu.unwrap()).unwrap();
        assert_eq!(view_at(0).buffer, scene.geometry.vertex_buffer().id);
        assert_eq!(view_at(3).buffer, scene.meshes.mesh_buffer().id);
        assert_eq!(view_at(6).buffer, scene.materials.parameter_buffer().id);
        assert_eq!(view_at(7).buffer, scene.instances.instance_buffer().id);
        assert_eq!(view_at(17).buffer, scene.lod_streaming.instance_lod_buffer().id);

        let buffers = h.device.live_buffer_count();
        scene.destroy(&h.device, &mut h.cpu_descriptors, &mut h.gpu_descriptors);
        assert!(h.device.live_buffer_count() < buffers);
        assert_eq!(h.cpu_descriptors.allocated(), 0);
        assert_eq!(h.gpu_descriptors.allocated(), 0);
    }

    #[test]
    fn test_update_releases_geometry_of_destroyed_meshes() {
        let mut h = Harness::new();
        let mut scene = GpuScene::new(&h.device, &h.config, &mut h.cpu_descriptors, &mut h.gpu_descriptors).unwrap();
        let mut releases = ReleaseQueue::new();
        let mesh = h.two_lod_mesh("a.mesh");
        let (lit, _) = h.two_pipeline_sets();
        h.instances.create(mesh, h.meshes.get(mesh), 1, lit);

        h.uploads.begin_frame(0);
        let changes = SceneChanges {
            meshes: h.meshes.take_changes(),
            materials: h.materials.take_changes(),
            instances: h.instances.take_changes(),
        };
        let refs = SceneRefs {
            meshes: &h.meshes,
            materials: &mut h.materials,
            instances: &h.instances,
        };
        scene.update(&h.device, &mut h.uploads, refs, &changes, &mut releases).unwrap();
        assert_eq!(scene.pipeline_sets.len(), 2);
        assert_eq!(scene.instances.total_draw_count(), 3);
        let loaded = h.meshes.get(mesh).clone();
        scene.geometry.load_lod_mesh(&mut h.uploads, &loaded, 0, 2);
        h.flush();

        h.uploads.begin_frame(1);
        h.meshes.destroy(mesh);
        let changes = SceneChanges {
            meshes: h.meshes.take_changes(),
            ..SceneChanges::default()
        };
        let refs = SceneRefs {
            meshes: &h.meshes,
            materials: &mut h.materials,
            instances: &h.instances,
        };
        scene.update(&h.device, &mut h.uploads, refs, &changes, &mut releases).unwrap();
        h.flush();
        assert_eq!(scene.geometry.resident_count(), 0);
        assert_eq!(releases.pending_len(), 2);
    }
}
