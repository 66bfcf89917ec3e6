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

//! Fixtures shared by the render agent integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use vela_agents::RenderWorld;
use vela_core::math::{Vec3, Mat4};
use vela_core::renderer::{RendererConfig, GraphicsDevice};
use vela_data::assets::{MeshAsset, MeshAssetBuilder};
use vela_data::scene::{MaterialDescriptor, MaterialInstanceHandle};
use vela_infra::headless::HeadlessDevice;

pub fn small_config() -> RendererConfig {
    RendererConfig {
        max_meshes: 16,
        max_lod_meshes: 64,
        max_sub_meshes: 128,
        max_mesh_instances: 64,
        max_lod_mesh_instances: 256,
        max_sub_mesh_instances: 512,
        max_materials: 8,
        max_material_instances: 16,
        material_parameter_buffer_size: 4096,
        max_pipeline_sets: 4,
        max_views: 2,
        max_vertices: 1024,
        max_indices: 4096,
        staging_buffer_size: 1 << 20,
        indirect_argument_capacity: 1024,
        cpu_descriptor_count: 128,
        gpu_descriptor_count: 128,
        rtv_descriptor_count: 4,
        dsv_descriptor_count: 4,
        ..RendererConfig::default()
    }
}

/// A world on a headless device the test keeps a handle to.
pub struct Fixture {
    pub device: Arc<HeadlessDevice>,
    pub world: RenderWorld,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(small_config())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        let device = Arc::new(HeadlessDevice::new());
        let shared: Arc<dyn GraphicsDevice> = device.clone();
        let world = RenderWorld::new(shared, config).expect("world creation");
        Self { device, world }
    }

    /// Runs `update`, `render` and `late_update`.
    pub fn frame(&mut self) -> vela_agents::render_agent::FrameReport {
        self.world.update().expect("update");
        let report = self.world.render().expect("render");
        self.world.late_update();
        report
    }

    /// A material instance in its own pipeline set.
    pub fn material(&mut self, pixel_shader: &str) -> MaterialInstanceHandle {
        let material = self.world.create_material(&MaterialDescriptor {
            name: pixel_shader.into(),
            vertex_shader: "mesh_vs".into(),
            pixel_shader: pixel_shader.into(),
            parameter_size: 16,
        });
        self.world.create_material_instance(material)
    }

    /// Enables view 0, looking at the origin.
    pub fn enable_main_view(&mut self) {
        let view = self.world.views_mut().get_mut(0);
        view.enabled = true;
        view.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
    }

    /// Contents of the buffer created with `label`.
    pub fn buffer(&self, label: &str) -> Vec<u8> {
        let id = self.device.buffer_by_label(label).expect("buffer exists");
        self.device.buffer_contents(id)
    }

    /// Row `index` of a table of `T`.
    pub fn row<T: bytemuck::Pod>(&self, label: &str, index: u32) -> T {
        let bytes = self.buffer(label);
        let size = std::mem::size_of::<T>();
        let start = index as usize * size;
        bytemuck::pod_read_unaligned(&bytes[start..start + size])
    }
}

/// Slots "body" and "trim". LOD 0 is a quad with one triangle per slot,
/// LOD 1 a single "body" triangle.
pub fn two_lod_quad() -> MeshAsset {
    let quad = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
    ];
    MeshAssetBuilder::new()
        .material_slot("body")
        .material_slot("trim")
        .lod(&quad, &[0, 1, 2, 0, 2, 3], &[(0, 3), (1, 3)])
        .lod(&quad[..3], &[0, 1, 2], &[(0, 3)])
        .build()
}

/// Slots "body" and "trim", a single LOD with two sub-meshes.
pub fn single_lod_quad() -> MeshAsset {
    let quad = [
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
    ];
    MeshAssetBuilder::new()
        .material_slot("body")
        .material_slot("trim")
        .lod(&quad, &[0, 1, 2, 0, 2, 3], &[(0, 3), (1, 3)])
        .build()
}

pub fn translation(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}
