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

//! Defines the RenderWorld, the owner of every table of the mesh core.

use super::director::{FrameReport, RenderDirector};
use super::schedule::PassSchedule;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use vela_core::math::Mat4;
use vela_core::renderer::{FenceValue, GraphicsDevice, RenderError, RendererConfig, BACK_BUFFER_COUNT};
use vela_core::str_hash64;
use vela_data::assets::MeshAsset;
use vela_data::descriptor::DescriptorAllocatorGroup;
use vela_data::scene::{
    MaterialDescriptor, MaterialHandle, MaterialInstanceHandle, MaterialScene, MeshHandle,
    MeshInstanceHandle, MeshInstanceScene, MeshScene, ViewScene,
};
use vela_data::upload::{ReleaseQueue, UploadQueue};
use vela_lanes::asset_lane::MeshLoaderLane;
use vela_lanes::render_lane::{
    GpuScene, LodGeometry, SceneChanges, SceneRefs, StreamingContext, StreamingStats,
    TextureStreamer,
};
use vela_telemetry::metrics::RenderCounters;

/// The GPU-resident mesh renderer.
///
/// Scene edits only touch the CPU tables; they reach the GPU during
/// [`RenderWorld::update`]. Each frame must call `update`, `render` and
/// `late_update` in that order.
pub struct RenderWorld {
    device: Arc<dyn GraphicsDevice>,
    config: RendererConfig,
    // Heaps every descriptor range is carved from.
    descriptors: DescriptorAllocatorGroup,
    uploads: UploadQueue,
    // Streamed-out geometry ranges, waiting for the frames that may still draw them.
    geometry_releases: ReleaseQueue<LodGeometry>,
    meshes: MeshScene,
    instances: MeshInstanceScene,
    materials: MaterialScene,
    views: ViewScene,
    gpu_scene: GpuScene,
    director: RenderDirector,
    mesh_loader: MeshLoaderLane,
    texture_streamer: Option<Box<dyn TextureStreamer>>,
    counters: RenderCounters,
    // Back-buffer slot of the frame being built.
    frame_index: usize,
    frame_fences: [Option<FenceValue>; BACK_BUFFER_COUNT],
    last_streaming: StreamingStats,
}

impl RenderWorld {
    /// Creates every GPU table sized from `config`, with the standard mesh
    /// pass list.
    pub fn new(device: Arc<dyn GraphicsDevice>, config: RendererConfig) -> Result<Self> {
        config.validate().context("Invalid renderer configuration")?;
        let schedule = PassSchedule::mesh_passes(device.as_ref(), &config)
            .context("Failed to build the mesh pass schedule")?;
        Self::with_schedule(device, config, schedule)
    }

    /// Creates every GPU table sized from `config`, recording `schedule` for
    /// each enabled view.
    pub fn with_schedule(
        device: Arc<dyn GraphicsDevice>,
        config: RendererConfig,
        schedule: PassSchedule,
    ) -> Result<Self> {
        let mut descriptors = DescriptorAllocatorGroup::new(device.as_ref(), &config)
            .context("Failed to create the descriptor heaps")?;
        let uploads = UploadQueue::new(device.as_ref(), &config)
            .context("Failed to create the upload queue")?;
        let gpu_scene = GpuScene::new(
            device.as_ref(),
            &config,
            &mut descriptors.srv_cbv_uav_cpu,
            &mut descriptors.srv_cbv_uav_gpu,
        )
        .context("Failed to create the GPU scene tables")?;
        let director = RenderDirector::new(device.as_ref(), &config, schedule, &mut descriptors)
            .context("Failed to create the per-view resources")?;

        log::info!(
            "RenderWorld created: {} meshes, {} instances, {} views",
            config.max_meshes,
            config.max_mesh_instances,
            config.max_views
        );
        Ok(Self {
            meshes: MeshScene::new(&config),
            instances: MeshInstanceScene::new(&config),
            materials: MaterialScene::new(&config),
            views: ViewScene::new(&config),
            device,
            config,
            descriptors,
            uploads,
            geometry_releases: ReleaseQueue::new(),
            gpu_scene,
            director,
            mesh_loader: MeshLoaderLane::new(),
            texture_streamer: None,
            counters: RenderCounters::default(),
            frame_index: 0,
            frame_fences: [None; BACK_BUFFER_COUNT],
            last_streaming: StreamingStats::default(),
        })
    }

    // --- Meshes ---

    /// Loads the mesh file at `path`. A path that is already loaded returns
    /// the live mesh.
    pub fn create_mesh(&mut self, path: impl AsRef<Path>) -> Result<MeshHandle> {
        let path = path.as_ref();
        let key = path.to_string_lossy();
        if let Some(handle) = self.meshes.find(str_hash64(&key)) {
            return Ok(handle);
        }
        let asset = self
            .mesh_loader
            .load_file(path)
            .with_context(|| format!("Failed to load mesh '{key}'"))?;
        Ok(self.meshes.create(&key, asset))
    }

    /// Adds a mesh decoded elsewhere, registered under `path`.
    ///
    /// # Panics
    ///
    /// Panics when `path` is already loaded or a mesh table is full.
    pub fn create_mesh_from_asset(&mut self, path: &str, asset: MeshAsset) -> MeshHandle {
        self.meshes.create(path, asset)
    }

    /// Removes a mesh with no live instance.
    pub fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.destroy(mesh);
    }

    // --- Mesh instances ---

    /// Places `count` instances of `mesh` at the origin with every material
    /// slot bound to `material_instance`.
    pub fn create_mesh_instances(
        &mut self,
        mesh: MeshHandle,
        count: u32,
        material_instance: MaterialInstanceHandle,
    ) -> Vec<MeshInstanceHandle> {
        assert!(
            self.materials.contains_instance(material_instance),
            "RenderWorld: stale material instance {:?}",
            material_instance.0
        );
        let source = self.meshes.get(mesh);
        let slots = source.material_slot_hashes.len().max(1) as u32;
        let handles = self.instances.create(mesh, source, count, material_instance);
        self.meshes.add_instances(mesh, count);
        for _ in 0..count * slots {
            self.materials.add_reference(material_instance);
        }
        handles
    }

    /// Moves an instance.
    pub fn set_world_matrix(&mut self, instance: MeshInstanceHandle, world_matrix: Mat4) {
        self.instances.set_world_matrix(instance, world_matrix);
    }

    /// Binds `material_instance` to material slot `slot` of an instance.
    pub fn set_material_instance(
        &mut self,
        instance: MeshInstanceHandle,
        slot: u32,
        material_instance: MaterialInstanceHandle,
    ) {
        assert!(
            self.materials.contains_instance(material_instance),
            "RenderWorld: stale material instance {:?}",
            material_instance.0
        );
        let previous = self.instances.set_material_instance(instance, slot, material_instance);
        self.materials.add_reference(material_instance);
        self.materials.remove_reference(previous);
    }

    /// Binds `material_instance` to the slot whose name hashes to
    /// `slot_name_hash`. Returns `false`, binding nothing, when the mesh has
    /// no such slot.
    pub fn set_material_instance_by_name(
        &mut self,
        instance: MeshInstanceHandle,
        slot_name_hash: u64,
        material_instance: MaterialInstanceHandle,
    ) -> bool {
        let mesh = self.meshes.get(self.instances.get(instance).mesh);
        match mesh.material_slot_index(slot_name_hash) {
            Some(slot) => {
                self.set_material_instance(instance, slot, material_instance);
                true
            }
            None => {
                log::warn!(
                    "Mesh '{}' has no material slot with hash {slot_name_hash:#018x}",
                    mesh.path
                );
                false
            }
        }
    }

    /// Removes an instance. Its slot is reused once the frame that cleared
    /// its GPU rows has been recorded.
    pub fn destroy_mesh_instance(&mut self, instance: MeshInstanceHandle) {
        let removed = self.instances.destroy(instance);
        self.meshes.remove_instance(removed.mesh);
        for material_instance in removed.material_instances {
            self.materials.remove_reference(material_instance);
        }
    }

    // --- Materials ---

    /// Registers a material. Materials sharing a shader pair share a
    /// pipeline set.
    pub fn create_material(&mut self, descriptor: &MaterialDescriptor) -> MaterialHandle {
        self.materials.create_material(descriptor)
    }

    /// Adds an instance of `material` with zeroed parameters.
    pub fn create_material_instance(&mut self, material: MaterialHandle) -> MaterialInstanceHandle {
        self.materials.create_instance(material)
    }

    /// Replaces the leading bytes of an instance's parameters.
    pub fn set_material_parameters(&mut self, material_instance: MaterialInstanceHandle, bytes: &[u8]) {
        self.materials.set_parameters(material_instance, bytes);
    }

    /// Removes a material instance no mesh instance is bound to.
    pub fn destroy_material_instance(&mut self, material_instance: MaterialInstanceHandle) {
        self.materials.destroy_instance(material_instance);
    }

    // --- Frame ---

    /// Installs the collaborator receiving texture mip requests.
    pub fn set_texture_streamer(&mut self, streamer: Box<dyn TextureStreamer>) {
        self.texture_streamer = Some(streamer);
    }

    /// Mirrors the scene changes made since the last update into the upload
    /// queue, then acts on the LOD feedback of the current frame slot.
    ///
    /// Mesh rows are written before the streaming pass so that a mesh created
    /// in a reused slot cannot overwrite the stream range streaming publishes
    /// for it in the same frame.
    pub fn update(&mut self) -> Result<(), RenderError> {
        self.uploads.begin_frame(self.frame_index);

        let changes = SceneChanges {
            meshes: self.meshes.take_changes(),
            materials: self.materials.take_changes(),
            instances: self.instances.take_changes(),
        };
        self.gpu_scene.update(
            self.device.as_ref(),
            &mut self.uploads,
            SceneRefs {
                meshes: &self.meshes,
                materials: &mut self.materials,
                instances: &self.instances,
            },
            &changes,
            &mut self.geometry_releases,
        )?;

        let streaming = self.gpu_scene.lod_streaming.update(
            self.frame_index,
            StreamingContext {
                device: self.device.as_ref(),
                uploads: &mut self.uploads,
                meshes: &self.meshes,
                materials: &self.materials,
                geometry: &mut self.gpu_scene.geometry,
                mesh_resources: &self.gpu_scene.meshes,
                releases: &mut self.geometry_releases,
                texture_streamer: self.texture_streamer.as_deref_mut(),
                screen_width: self.views.main().width,
            },
        )?;
        let frame = self.counters.current_mut();
        frame.lod_loads += streaming.lod_loads;
        frame.lod_unloads += streaming.lod_unloads;
        self.last_streaming = streaming;
        Ok(())
    }

    /// Records and submits the frame for every enabled view.
    pub fn render(&mut self) -> Result<FrameReport, RenderError> {
        let report = self.director.render(
            self.device.as_ref(),
            &mut self.uploads,
            &mut self.gpu_scene,
            &self.views,
            self.frame_index,
        )?;
        self.frame_fences[self.frame_index] = Some(report.fence);

        let frame = self.counters.current_mut();
        frame.rendered_views += report.rendered_views;
        frame.dispatches += report.lanes.dispatches;
        frame.indirect_draws += report.lanes.indirect_draws;
        frame.staged_copies += report.uploads.staged_copies;
        frame.buffer_copies += report.uploads.buffer_copies;
        frame.uploaded_bytes += report.uploads.staged_bytes;
        Ok(report)
    }

    /// Reclaims destroyed slots and moves to the next frame slot once the
    /// GPU is done with it.
    pub fn late_update(&mut self) {
        self.meshes.late_update();
        self.instances.late_update();
        self.materials.late_update();

        let next = (self.frame_index + 1) % BACK_BUFFER_COUNT;
        if let Some(fence) = self.frame_fences[next].take() {
            self.device.wait_for_fence(fence);
        }
        for geometry in self.geometry_releases.advance() {
            self.gpu_scene.geometry.free(geometry);
        }
        self.frame_index = next;
        self.counters.end_frame();
    }

    /// Waits for the GPU and releases every buffer, pipeline and heap.
    pub fn shutdown(self) {
        let Self {
            device,
            mut descriptors,
            uploads,
            mut geometry_releases,
            mut gpu_scene,
            director,
            counters,
            ..
        } = self;
        device.wait_idle();
        for geometry in geometry_releases.drain_all() {
            gpu_scene.geometry.free(geometry);
        }
        director.destroy(device.as_ref(), &mut descriptors);
        gpu_scene.destroy(
            device.as_ref(),
            &mut descriptors.srv_cbv_uav_cpu,
            &mut descriptors.srv_cbv_uav_gpu,
        );
        uploads.destroy(device.as_ref());
        descriptors.destroy(device.as_ref());
        log::info!(
            "RenderWorld shut down after {} frames ({} draws, {} dispatches)",
            counters.current().frame,
            counters.total_draws(),
            counters.total_dispatches()
        );
    }

    // --- Accessors ---

    /// The device every table lives on.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The configuration the tables were sized from.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The views.
    pub fn views(&self) -> &ViewScene {
        &self.views
    }

    /// The views, to move cameras or toggle them.
    pub fn views_mut(&mut self) -> &mut ViewScene {
        &mut self.views
    }

    /// The CPU mesh table.
    pub fn meshes(&self) -> &MeshScene {
        &self.meshes
    }

    /// The CPU mesh instance table.
    pub fn instances(&self) -> &MeshInstanceScene {
        &self.instances
    }

    /// The CPU material table.
    pub fn materials(&self) -> &MaterialScene {
        &self.materials
    }

    /// The GPU mirror of the scene.
    pub fn gpu_scene(&self) -> &GpuScene {
        &self.gpu_scene
    }

    /// The frame orchestrator.
    pub fn director(&self) -> &RenderDirector {
        &self.director
    }

    /// Per-frame counters.
    pub fn counters(&self) -> &RenderCounters {
        &self.counters
    }

    /// What the last `update` did with the LOD feedback.
    pub fn last_streaming_stats(&self) -> StreamingStats {
        self.last_streaming
    }

    /// Back-buffer slot of the frame being built.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Geometry ranges still waiting for in-flight frames.
    pub fn pending_geometry_releases(&self) -> usize {
        self.geometry_releases.pending_len()
    }
}

impl std::fmt::Debug for RenderWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorld")
            .field("frame_index", &self.frame_index)
            .field("meshes", &self.meshes.len())
            .field("instances", &self.instances.len())
            .field("material_instances", &self.materials.instance_count())
            .finish_non_exhaustive()
    }
}
