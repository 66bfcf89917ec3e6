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

//! GPU mirrors of the mesh, LOD-mesh and sub-mesh tables.

use super::gpu_types::{GpuLodMesh, GpuMesh, GpuSubMesh, NOTHING_STREAMED, STATE_ENABLED};
use super::{structured_view, write_views};
use std::mem::offset_of;
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, GpuBuffer, GraphicsDevice, RendererConfig, ResourceError,
};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::{Changes, Mesh, MeshScene};
use vela_data::upload::UploadQueue;

/// Keeps the three mesh tables in sync with the [`MeshScene`].
#[derive(Debug)]
pub struct MeshResources {
    mesh_buffer: GpuBuffer,
    lod_mesh_buffer: GpuBuffer,
    sub_mesh_buffer: GpuBuffer,
    views: DescriptorRange,
}

impl MeshResources {
    /// Creates the tables sized from `config`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let mesh_buffer = GpuBuffer::create_array::<GpuMesh>(
            device,
            BufferDescriptor::structured("Meshes", 0),
            config.max_meshes as usize,
        )?;
        let lod_mesh_buffer = GpuBuffer::create_array::<GpuLodMesh>(
            device,
            BufferDescriptor::structured("LodMeshes", 0),
            config.max_lod_meshes as usize,
        )?;
        let sub_mesh_buffer = GpuBuffer::create_array::<GpuSubMesh>(
            device,
            BufferDescriptor::structured("SubMeshes", 0),
            config.max_sub_meshes as usize,
        )?;
        let views = cpu_descriptors.allocate(3);
        write_views(
            device,
            &views,
            &[
                structured_view::<GpuMesh>(&mesh_buffer, BufferViewKind::ShaderResource),
                structured_view::<GpuLodMesh>(&lod_mesh_buffer, BufferViewKind::ShaderResource),
                structured_view::<GpuSubMesh>(&sub_mesh_buffer, BufferViewKind::ShaderResource),
            ],
        )?;
        Ok(Self {
            mesh_buffer,
            lod_mesh_buffer,
            sub_mesh_buffer,
            views,
        })
    }

    /// Uploads the rows of created meshes and zero-fills the rows of
    /// destroyed ones.
    pub fn update(&self, uploads: &mut UploadQueue, scene: &MeshScene, changes: &Changes<Mesh>) {
        for handle in &changes.created {
            let Some(mesh) = scene.get_by_index(handle.index) else {
                continue;
            };
            self.upload_mesh(uploads, handle.index, mesh);
        }
        for retired in &changes.destroyed {
            self.clear_mesh(uploads, retired.index, &retired.value);
        }
    }

    fn upload_mesh(&self, uploads: &mut UploadQueue, index: u32, mesh: &Mesh) {
        uploads.enqueue_update::<GpuMesh>(&self.mesh_buffer, index as u64, 1)[0] = GpuMesh {
            state_flags: STATE_ENABLED,
            lod_mesh_offset: mesh.lod_mesh_range.offset,
            lod_mesh_count: mesh.lod_count(),
            stream_range: NOTHING_STREAMED,
        };

        let lods = uploads.enqueue_update::<GpuLodMesh>(
            &self.lod_mesh_buffer,
            mesh.lod_mesh_range.offset as u64,
            mesh.lod_meshes.len(),
        );
        for (row, lod) in lods.iter_mut().zip(&mesh.lod_meshes) {
            *row = GpuLodMesh {
                vertex_offset: lod.vertex_offset,
                index_offset: lod.index_offset,
                sub_mesh_offset: mesh.sub_mesh_range.offset + lod.sub_mesh_offset,
                sub_mesh_count: lod.sub_mesh_count,
            };
        }

        let subs = uploads.enqueue_update::<GpuSubMesh>(
            &self.sub_mesh_buffer,
            mesh.sub_mesh_range.offset as u64,
            mesh.sub_meshes.len(),
        );
        for (row, sub_mesh) in subs.iter_mut().zip(&mesh.sub_meshes) {
            *row = GpuSubMesh {
                index_count: sub_mesh.index_count,
                index_offset: sub_mesh.index_offset,
                _pad: [0; 2],
            };
        }
        log::trace!("Mesh '{}' mirrored to GPU row {index}", mesh.path);
    }

    fn clear_mesh(&self, uploads: &mut UploadQueue, index: u32, mesh: &Mesh) {
        uploads.enqueue_update::<GpuMesh>(&self.mesh_buffer, index as u64, 1);
        uploads.enqueue_update::<GpuLodMesh>(
            &self.lod_mesh_buffer,
            mesh.lod_mesh_range.offset as u64,
            mesh.lod_mesh_range.size as usize,
        );
        uploads.enqueue_update::<GpuSubMesh>(
            &self.sub_mesh_buffer,
            mesh.sub_mesh_range.offset as u64,
            mesh.sub_mesh_range.size as usize,
        );
    }

    /// Rewrites only the resident LOD range of mesh row `index`.
    pub fn write_stream_range(&self, uploads: &mut UploadQueue, index: u32, stream_range: u32) {
        let offset = index as u64 * std::mem::size_of::<GpuMesh>() as u64
            + offset_of!(GpuMesh, stream_range) as u64;
        uploads
            .enqueue_update_bytes(&self.mesh_buffer, offset, 4)
            .copy_from_slice(&stream_range.to_le_bytes());
    }

    /// The mesh table.
    pub fn mesh_buffer(&self) -> &GpuBuffer {
        &self.mesh_buffer
    }

    /// The LOD-mesh table.
    pub fn lod_mesh_buffer(&self) -> &GpuBuffer {
        &self.lod_mesh_buffer
    }

    /// The sub-mesh table.
    pub fn sub_mesh_buffer(&self) -> &GpuBuffer {
        &self.sub_mesh_buffer
    }

    /// Shader views: meshes, LOD meshes, sub-meshes.
    pub fn views(&self) -> &DescriptorRange {
        &self.views
    }

    /// Releases the tables and views.
    pub fn destroy(self, device: &dyn GraphicsDevice, cpu_descriptors: &mut DescriptorAllocator) {
        cpu_descriptors.free(self.views);
        self.mesh_buffer.destroy(device);
        self.lod_mesh_buffer.destroy(device);
        self.sub_mesh_buffer.destroy(device);
    }
}
