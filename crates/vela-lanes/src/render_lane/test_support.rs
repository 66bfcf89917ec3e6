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

//! Shared fixtures for the lane unit tests.

use vela_core::math::Vec3;
use vela_core::renderer::{
    DescriptorHeapDescriptor, DescriptorHeapType, GpuBuffer, GraphicsDevice, RendererConfig,
};
use vela_data::assets::MeshAssetBuilder;
use vela_data::descriptor::DescriptorAllocator;
use vela_data::scene::{
    MaterialDescriptor, MaterialInstanceHandle, MaterialScene, MeshHandle, MeshInstanceScene, MeshScene,
};
use vela_data::upload::UploadQueue;
use super::{GpuScene, LaneContext, LaneStats, RenderLane, ViewHeaps, ViewResources};
use vela_infra::headless::{HeadlessDevice, RecordedCommand};

pub(crate) struct Harness {
    pub device: HeadlessDevice,
    pub config: RendererConfig,
    pub uploads: UploadQueue,
    pub cpu_descriptors: DescriptorAllocator,
    pub gpu_descriptors: DescriptorAllocator,
    pub rtv_descriptors: DescriptorAllocator,
    pub dsv_descriptors: DescriptorAllocator,
    pub meshes: MeshScene,
    pub materials: MaterialScene,
    pub instances: MeshInstanceScene,
}

pub(crate) fn small_config() -> RendererConfig {
    RendererConfig {
        max_meshes: 16,
        max_lod_meshes: 64,
        max_sub_meshes: 128,
        max_mesh_instances: 160,
        max_lod_mesh_instances: 512,
        max_sub_mesh_instances: 1024,
        material_parameter_buffer_size: 4096,
        max_vertices: 1024,
        max_indices: 4096,
        staging_buffer_size: 1 << 20,
        indirect_argument_capacity: 1024,
        cpu_descriptor_count: 128,
        gpu_descriptor_count: 128,
        ..RendererConfig::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        let device = HeadlessDevice::new();
        let config = small_config();
        let uploads = UploadQueue::new(&device, &config).unwrap();
        let allocator = |label: &'static str, heap_type, shader_visible| {
            let heap = DescriptorHeapDescriptor {
                label: Some(label),
                heap_type,
                descriptor_count: 128,
                shader_visible,
            };
            DescriptorAllocator::new(&device, &heap).unwrap()
        };
        let cpu_descriptors = allocator("TestCpuHeap", DescriptorHeapType::CbvSrvUav, false);
        let gpu_descriptors = allocator("TestGpuHeap", DescriptorHeapType::CbvSrvUav, true);
        let rtv_descriptors = allocator("TestRtvHeap", DescriptorHeapType::Rtv, false);
        let dsv_descriptors = allocator("TestDsvHeap", DescriptorHeapType::Dsv, false);
        Self {
            meshes: MeshScene::new(&config),
            materials: MaterialScene::new(&config),
            instances: MeshInstanceScene::new(&config),
            device,
            config,
            uploads,
            cpu_descriptors,
            gpu_descriptors,
            rtv_descriptors,
            dsv_descriptors,
        }
    }

    fn view_heaps(&mut self) -> ViewHeaps<'_> {
        ViewHeaps {
            cpu: &mut self.cpu_descriptors,
            gpu: &mut self.gpu_descriptors,
            rtv: &mut self.rtv_descriptors,
            dsv: &mut self.dsv_descriptors,
        }
    }

    /// Resources of view `view_index`, drawn from the harness heaps.
    pub fn view_resources(&mut self, view_index: usize) -> ViewResources {
        let device = self.device.clone();
        let config = self.config.clone();
        ViewResources::new(&device, &config, view_index, self.view_heaps()).unwrap()
    }

    pub fn destroy_view(&mut self, view: ViewResources) {
        let device = self.device.clone();
        view.destroy(&device, self.view_heaps());
    }

    /// A mesh with slots "body" and "trim": LOD 0 is a quad drawn as one
    /// triangle per slot, LOD 1 a single "body" triangle.
    pub fn two_lod_mesh(&mut self, path: &str) -> MeshHandle {
        let quad = [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let asset = MeshAssetBuilder::new()
            .material_slot("body")
            .material_slot("trim")
            .lod(&quad, &[0, 1, 2, 0, 2, 3], &[(0, 3), (1, 3)])
            .lod(&quad[..3], &[0, 1, 2], &[(0, 3)])
            .build();
        self.meshes.create(path, asset)
    }

    /// One instance each of a "lit" and an "unlit" material, in pipeline
    /// sets 0 and 1.
    pub fn two_pipeline_sets(&mut self) -> (MaterialInstanceHandle, MaterialInstanceHandle) {
        let mut instance = |name: &str, pixel_shader: &str| {
            let material = self.materials.create_material(&MaterialDescriptor {
                name: name.into(),
                vertex_shader: "mesh_vs".into(),
                pixel_shader: pixel_shader.into(),
                parameter_size: 16,
            });
            self.materials.create_instance(material)
        };
        let lit = instance("lit", "lit_ps");
        let unlit = instance("unlit", "unlit_ps");
        (lit, unlit)
    }

    /// Resolves and submits the pending uploads.
    pub fn flush(&mut self) {
        let mut encoder = self.device.create_command_encoder(Some("test uploads"));
        self.uploads.resolve(&self.device, encoder.as_mut()).unwrap();
        self.device.submit(encoder.finish()).unwrap();
    }
}

/// Reads a buffer back as rows of `T`.
pub(crate) fn read_rows<T: bytemuck::Pod>(device: &HeadlessDevice, buffer: &GpuBuffer) -> Vec<T> {
    device
        .buffer_contents(buffer.id)
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// A GPU scene and one view over the harness tables.
pub(crate) struct SceneHarness {
    pub h: Harness,
    pub scene: GpuScene,
    pub view: ViewResources,
}

impl SceneHarness {
    pub fn new() -> Self {
        let mut h = Harness::new();
        let scene = GpuScene::new(&h.device, &h.config, &mut h.cpu_descriptors, &mut h.gpu_descriptors).unwrap();
        let view = h.view_resources(0);
        Self { h, scene, view }
    }

    /// Records `lane` for the view, submits it and returns what reached the
    /// device. Submission fails on any state mismatch.
    pub fn record(&mut self, lane: &mut dyn RenderLane, first_view: bool) -> (LaneStats, Vec<RecordedCommand>) {
        let mut encoder = self.h.device.create_command_encoder(Some("lane test"));
        let mut ctx = LaneContext {
            device: &self.h.device,
            scene: &mut self.scene,
            view_resources: &self.view,
            view_index: 0,
            first_view,
            frame_index: 0,
        };
        let stats = lane.record(&mut ctx, encoder.as_mut()).unwrap();
        self.h.device.take_submitted_commands();
        self.h.device.submit(encoder.finish()).unwrap();
        (stats, self.h.device.take_submitted_commands())
    }
}
