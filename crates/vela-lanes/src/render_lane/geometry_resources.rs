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

//! The global position and index buffers, sub-allocated per LOD level.

use super::gpu_types::GpuGeometryOffset;
use super::{structured_view, write_views};
use std::collections::HashMap;
use vela_core::math::Vec3;
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, GpuBuffer, GraphicsDevice, RendererConfig, ResourceError,
};
use vela_data::allocators::{VirtualAllocation, VirtualAllocator};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::Mesh;
use vela_data::upload::{ReleaseQueue, UploadQueue};

/// Geometry ranges of one resident LOD level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodGeometry {
    /// Range of the position buffer.
    pub vertices: VirtualAllocation,
    /// Range of the index buffer.
    pub indices: VirtualAllocation,
}

/// Owns the vertex position and index buffers shared by every mesh.
///
/// LOD levels are streamed in and out individually. A level streamed out
/// keeps its ranges until the release queue hands them back, since draws
/// recorded in the frames still in flight may read them.
#[derive(Debug)]
pub struct GeometryResources {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    offset_buffer: GpuBuffer,
    vertex_ranges: VirtualAllocator,
    index_ranges: VirtualAllocator,
    resident: HashMap<u32, LodGeometry>,
    views: DescriptorRange,
}

impl GeometryResources {
    /// Creates the buffers sized from `config` and their shader views.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let vertex_buffer = GpuBuffer::create_array::<Vec3>(
            device,
            BufferDescriptor::structured("GeometryPositions", 0),
            config.max_vertices as usize,
        )?;
        let index_buffer = GpuBuffer::create_array::<u32>(
            device,
            BufferDescriptor::structured("GeometryIndices", 0),
            config.max_indices as usize,
        )?;
        let offset_buffer = GpuBuffer::create_array::<GpuGeometryOffset>(
            device,
            BufferDescriptor::structured("GeometryGlobalOffsets", 0),
            config.max_lod_meshes as usize,
        )?;

        let views = cpu_descriptors.allocate(3);
        write_views(
            device,
            &views,
            &[
                structured_view::<Vec3>(&vertex_buffer, BufferViewKind::ShaderResource),
                structured_view::<u32>(&index_buffer, BufferViewKind::ShaderResource),
                structured_view::<GpuGeometryOffset>(&offset_buffer, BufferViewKind::ShaderResource),
            ],
        )?;
        log::info!(
            "Geometry buffers created: {} vertices, {} indices",
            config.max_vertices,
            config.max_indices
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            offset_buffer,
            vertex_ranges: VirtualAllocator::new(config.max_vertices),
            index_ranges: VirtualAllocator::new(config.max_indices),
            resident: HashMap::new(),
            views,
        })
    }

    /// Uploads levels `begin..end` of `mesh` and publishes their offsets.
    /// Levels already resident are skipped.
    ///
    /// # Panics
    ///
    /// Panics when a level is out of range or a geometry buffer is full.
    pub fn load_lod_mesh(&mut self, uploads: &mut UploadQueue, mesh: &Mesh, begin: u32, end: u32) {
        for lod in begin..end {
            let global = mesh.global_lod_mesh_index(lod);
            if self.resident.contains_key(&global) {
                log::debug!("LOD {lod} of '{}' is already resident", mesh.path);
                continue;
            }
            let positions = mesh.lod_positions(lod);
            let indices = mesh.lod_indices(lod);
            let geometry = LodGeometry {
                vertices: self.vertex_ranges.allocate(positions.len() as u32),
                indices: self.index_ranges.allocate(indices.len() as u32),
            };

            uploads
                .enqueue_update::<Vec3>(&self.vertex_buffer, geometry.vertices.offset as u64, positions.len())
                .copy_from_slice(positions);
            uploads
                .enqueue_update::<u32>(&self.index_buffer, geometry.indices.offset as u64, indices.len())
                .copy_from_slice(indices);
            uploads.enqueue_update::<GpuGeometryOffset>(&self.offset_buffer, global as u64, 1)[0] =
                GpuGeometryOffset {
                    vertex_offset: geometry.vertices.offset,
                    index_offset: geometry.indices.offset,
                };
            self.resident.insert(global, geometry);
        }
        log::debug!("Streamed in LOD {begin}..{end} of '{}'", mesh.path);
    }

    /// Streams out levels `begin..end` of `mesh`. Their offsets are zeroed now
    /// and their ranges are parked in `releases`.
    pub fn unload_lod_mesh(
        &mut self,
        uploads: &mut UploadQueue,
        mesh: &Mesh,
        begin: u32,
        end: u32,
        releases: &mut ReleaseQueue<LodGeometry>,
    ) {
        for lod in begin..end {
            let global = mesh.global_lod_mesh_index(lod);
            if let Some(geometry) = self.resident.remove(&global) {
                uploads.enqueue_update::<GpuGeometryOffset>(&self.offset_buffer, global as u64, 1);
                releases.push(geometry);
            }
        }
        log::debug!("Streamed out LOD {begin}..{end} of '{}'", mesh.path);
    }

    /// Streams out every resident level of a destroyed mesh.
    pub fn unload_mesh(
        &mut self,
        uploads: &mut UploadQueue,
        mesh: &Mesh,
        releases: &mut ReleaseQueue<LodGeometry>,
    ) {
        self.unload_lod_mesh(uploads, mesh, 0, mesh.lod_count(), releases);
    }

    /// Returns ranges handed back by the release queue.
    pub fn free(&mut self, geometry: LodGeometry) {
        self.vertex_ranges.free(geometry.vertices);
        self.index_ranges.free(geometry.indices);
    }

    /// Geometry of a resident level, by global LOD-mesh row.
    pub fn resident(&self, global_lod_mesh: u32) -> Option<&LodGeometry> {
        self.resident.get(&global_lod_mesh)
    }

    /// Resident levels across all meshes.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Vertices currently allocated, including ranges awaiting release.
    pub fn allocated_vertices(&self) -> u32 {
        self.vertex_ranges.allocated()
    }

    /// The position buffer.
    pub fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertex_buffer
    }

    /// The index buffer.
    pub fn index_buffer(&self) -> &GpuBuffer {
        &self.index_buffer
    }

    /// The per-LOD-mesh offset table.
    pub fn offset_buffer(&self) -> &GpuBuffer {
        &self.offset_buffer
    }

    /// Shader views: positions, indices, offsets.
    pub fn views(&self) -> &DescriptorRange {
        &self.views
    }

    /// Releases the buffers and views.
    pub fn destroy(self, device: &dyn GraphicsDevice, cpu_descriptors: &mut DescriptorAllocator) {
        cpu_descriptors.free(self.views);
        self.vertex_buffer.destroy(device);
        self.index_buffer.destroy(device);
        self.offset_buffer.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{read_rows, Harness};

    #[test]
    fn test_load_places_levels_and_publishes_offsets() {
        let mut h = Harness::new();
        let mesh_handle = h.two_lod_mesh("a.mesh");
        let mut geometry = GeometryResources::new(&h.device, &h.config, &mut h.cpu_descriptors).unwrap();
        let mesh = h.meshes.get(mesh_handle).clone();

        h.uploads.begin_frame(0);
        geometry.load_lod_mesh(&mut h.uploads, &mesh, 0, 2);
        h.flush();

        let lod1 = *geometry.resident(mesh.global_lod_mesh_index(1)).unwrap();
        assert_eq!(lod1.vertices.offset, 4);
        assert_eq!(lod1.indices.offset, 6);
        let offsets: Vec<GpuGeometryOffset> = read_rows(&h.device, geometry.offset_buffer());
        assert_eq!(
            offsets[mesh.global_lod_mesh_index(1) as usize],
            GpuGeometryOffset {
                vertex_offset: 4,
                index_offset: 6
            }
        );
        let indices: Vec<u32> = read_rows(&h.device, geometry.index_buffer());
        assert_eq!(&indices[6..9], mesh.lod_indices(1));
    }

    #[test]
    fn test_unloaded_ranges_wait_for_release() {
        let mut h = Harness::new();
        let mesh_handle = h.two_lod_mesh("a.mesh");
        let mut geometry = GeometryResources::new(&h.device, &h.config, &mut h.cpu_descriptors).unwrap();
        let mesh = h.meshes.get(mesh_handle).clone();
        let mut releases = ReleaseQueue::new();

        h.uploads.begin_frame(0);
        geometry.load_lod_mesh(&mut h.uploads, &mesh, 0, 2);
        geometry.unload_lod_mesh(&mut h.uploads, &mesh, 0, 1, &mut releases);
        h.flush();

        assert_eq!(geometry.resident_count(), 1);
        assert_eq!(geometry.allocated_vertices(), 7);
        for _ in 0..2 {
            assert!(releases.advance().is_empty());
        }
        for released in releases.advance() {
            geometry.free(released);
        }
        assert_eq!(geometry.allocated_vertices(), 3);

        let offsets: Vec<GpuGeometryOffset> = read_rows(&h.device, geometry.offset_buffer());
        assert_eq!(offsets[mesh.global_lod_mesh_index(0) as usize], GpuGeometryOffset::default());
    }
}
