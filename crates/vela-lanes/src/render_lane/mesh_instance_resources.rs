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

//! GPU mirrors of the mesh instance tables and the draw bookkeeping that
//! partitions indirect arguments per pipeline set.

use super::gpu_types::{
    GpuLodMeshInstance, GpuMeshInstance, GpuMeshInstanceDynamic, GpuSubMeshInstance, STATE_ENABLED,
};
use super::{structured_view, write_views};
use std::mem::{offset_of, size_of};
use vela_core::math::{Aabb, Mat4};
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, GpuBuffer, GraphicsDevice, RendererConfig, ResourceError,
};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::{
    Changes, MaterialScene, Mesh, MeshInstance, MeshInstanceHandle, MeshInstanceScene, MeshScene,
    UpdateKind,
};
use vela_data::upload::UploadQueue;

/// Coverage threshold of level `lod` out of `lod_count`.
pub fn lod_threshold(lod: u32, lod_count: u32) -> f32 {
    (1.0 - (lod + 1) as f32 / lod_count as f32) * 0.01
}

/// The transform-dependent block of an instance row.
pub fn dynamic_block(bounds: &Aabb, world_matrix: &Mat4) -> GpuMeshInstanceDynamic {
    let world_bounds = bounds.transformed(world_matrix);
    GpuMeshInstanceDynamic {
        world_matrix: world_matrix.to_affine3x4(),
        aabb_min: world_bounds.min,
        bounds_radius: world_bounds.size().length() / 2.0,
        aabb_max: world_bounds.max,
        world_scale: world_matrix.max_axis_scale(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubInstanceDraw {
    pipeline_set: u32,
    global_sub_mesh: u32,
}

/// Keeps the instance tables in sync with the [`MeshInstanceScene`] and
/// counts draws per sub-mesh and per pipeline set.
#[derive(Debug)]
pub struct MeshInstanceResources {
    instance_buffer: GpuBuffer,
    lod_instance_buffer: GpuBuffer,
    sub_instance_buffer: GpuBuffer,
    sub_mesh_draw_offset_buffer: GpuBuffer,
    pipeline_set_offset_buffer: GpuBuffer,
    views: DescriptorRange,

    // What each sub-mesh-instance row currently counts toward.
    sub_instance_draws: Vec<Option<SubInstanceDraw>>,
    sub_mesh_draw_counts: Vec<u32>,
    sub_mesh_draw_offsets: Vec<u32>,
    pipeline_set_counts: Vec<u32>,
    pipeline_set_offsets: Vec<u32>,
    indirect_argument_capacity: u32,
    reserved: u32,
    counts_dirty: bool,
}

impl MeshInstanceResources {
    /// Creates the tables sized from `config`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let instance_buffer = GpuBuffer::create_array::<GpuMeshInstance>(
            device,
            BufferDescriptor::structured("MeshInstances", 0),
            config.max_mesh_instances as usize,
        )?;
        let lod_instance_buffer = GpuBuffer::create_array::<GpuLodMeshInstance>(
            device,
            BufferDescriptor::structured("LodMeshInstances", 0),
            config.max_lod_mesh_instances as usize,
        )?;
        let sub_instance_buffer = GpuBuffer::create_array::<GpuSubMeshInstance>(
            device,
            BufferDescriptor::structured("SubMeshInstances", 0),
            config.max_sub_mesh_instances as usize,
        )?;
        let sub_mesh_draw_offset_buffer = GpuBuffer::create_array::<u32>(
            device,
            BufferDescriptor::structured("SubMeshDrawOffsets", 0),
            config.max_sub_meshes as usize,
        )?;
        let pipeline_set_offset_buffer = GpuBuffer::create_array::<u32>(
            device,
            BufferDescriptor::structured("PipelineSetDrawOffsets", 0),
            config.max_pipeline_sets as usize,
        )?;

        let views = cpu_descriptors.allocate(5);
        write_views(
            device,
            &views,
            &[
                structured_view::<GpuMeshInstance>(&instance_buffer, BufferViewKind::ShaderResource),
                structured_view::<GpuLodMeshInstance>(&lod_instance_buffer, BufferViewKind::ShaderResource),
                structured_view::<GpuSubMeshInstance>(&sub_instance_buffer, BufferViewKind::ShaderResource),
                structured_view::<u32>(&sub_mesh_draw_offset_buffer, BufferViewKind::ShaderResource),
                structured_view::<u32>(&pipeline_set_offset_buffer, BufferViewKind::ShaderResource),
            ],
        )?;

        Ok(Self {
            instance_buffer,
            lod_instance_buffer,
            sub_instance_buffer,
            sub_mesh_draw_offset_buffer,
            pipeline_set_offset_buffer,
            views,
            sub_instance_draws: vec![None; config.max_sub_mesh_instances as usize],
            sub_mesh_draw_counts: vec![0; config.max_sub_meshes as usize],
            sub_mesh_draw_offsets: vec![0; config.max_sub_meshes as usize],
            pipeline_set_counts: vec![0; config.max_pipeline_sets as usize],
            pipeline_set_offsets: vec![0; config.max_pipeline_sets as usize],
            indirect_argument_capacity: config.indirect_argument_capacity,
            reserved: 0,
            counts_dirty: false,
        })
    }

    /// Mirrors the instance changes of the frame.
    ///
    /// Destroyed instances are processed first so the counts they release are
    /// available to the instances created in their slots.
    pub fn update(
        &mut self,
        uploads: &mut UploadQueue,
        instances: &MeshInstanceScene,
        meshes: &MeshScene,
        materials: &MaterialScene,
        changes: &Changes<MeshInstance>,
    ) {
        for retired in &changes.destroyed {
            self.clear_instance(uploads, retired.index, &retired.value);
        }
        for handle in &changes.created {
            let instance = instances.get(MeshInstanceHandle(*handle));
            let mesh = meshes.get(instance.mesh);
            self.upload_instance(uploads, handle.index, instance, mesh, materials);
        }
        for (handle, kind) in &changes.updated {
            let instance = instances.get(MeshInstanceHandle(*handle));
            let mesh = meshes.get(instance.mesh);
            if kind.contains(UpdateKind::TRANSFORM) {
                self.upload_transform(uploads, handle.index, instance, mesh);
            }
            if kind.contains(UpdateKind::MATERIAL) {
                self.upload_sub_instances(uploads, instance, mesh, materials);
            }
        }
        if self.counts_dirty {
            self.recompute_offsets(uploads);
        }
    }

    fn upload_instance(
        &mut self,
        uploads: &mut UploadQueue,
        index: u32,
        instance: &MeshInstance,
        mesh: &Mesh,
        materials: &MaterialScene,
    ) {
        uploads.enqueue_update::<GpuMeshInstance>(&self.instance_buffer, index as u64, 1)[0] =
            GpuMeshInstance {
                state_flags: if instance.enabled { STATE_ENABLED } else { 0 },
                mesh_index: instance.mesh.index(),
                lod_mesh_instance_offset: instance.lod_mesh_instance_range.offset,
                sub_mesh_instance_offset: instance.sub_mesh_instance_range.offset,
                dynamic: dynamic_block(&mesh.bounds, &instance.world_matrix),
            };

        let lod_count = mesh.lod_count();
        let lods = uploads.enqueue_update::<GpuLodMeshInstance>(
            &self.lod_instance_buffer,
            instance.lod_mesh_instance_range.offset as u64,
            lod_count as usize,
        );
        for (lod, (row, level)) in lods.iter_mut().zip(&mesh.lod_meshes).enumerate() {
            *row = GpuLodMeshInstance {
                sub_mesh_instance_offset: instance.sub_mesh_instance_range.offset + level.sub_mesh_offset,
                lod_threshold: lod_threshold(lod as u32, lod_count),
            };
        }

        self.upload_sub_instances(uploads, instance, mesh, materials);
        self.reserved = self.reserved.max(index + 1);
    }

    // Writes every sub-mesh-instance row of `instance` and moves the draw
    // counts of rows whose pipeline set changed.
    fn upload_sub_instances(
        &mut self,
        uploads: &mut UploadQueue,
        instance: &MeshInstance,
        mesh: &Mesh,
        materials: &MaterialScene,
    ) {
        let first_row = instance.sub_mesh_instance_range.offset;
        let rows = uploads.enqueue_update::<GpuSubMeshInstance>(
            &self.sub_instance_buffer,
            first_row as u64,
            mesh.sub_meshes.len(),
        );
        for (local, (row, sub_mesh)) in rows.iter_mut().zip(&mesh.sub_meshes).enumerate() {
            let handle = instance.material_instance(sub_mesh.material_slot_index);
            let material = materials.instance(handle);
            *row = GpuSubMeshInstance {
                material_index: handle.index(),
                material_parameter_offset: material.parameter_offset(),
                pipeline_set_index: material.pipeline_set_index,
                _pad: 0,
            };

            let draw = SubInstanceDraw {
                pipeline_set: material.pipeline_set_index,
                global_sub_mesh: mesh.sub_mesh_range.offset + local as u32,
            };
            let slot = &mut self.sub_instance_draws[(first_row + local as u32) as usize];
            if *slot != Some(draw) {
                if let Some(previous) = slot.replace(draw) {
                    self.pipeline_set_counts[previous.pipeline_set as usize] -= 1;
                    self.sub_mesh_draw_counts[previous.global_sub_mesh as usize] -= 1;
                }
                self.pipeline_set_counts[draw.pipeline_set as usize] += 1;
                self.sub_mesh_draw_counts[draw.global_sub_mesh as usize] += 1;
                self.counts_dirty = true;
            }
        }
    }

    fn upload_transform(&self, uploads: &mut UploadQueue, index: u32, instance: &MeshInstance, mesh: &Mesh) {
        let offset =
            index as u64 * size_of::<GpuMeshInstance>() as u64 + offset_of!(GpuMeshInstance, dynamic) as u64;
        let block = dynamic_block(&mesh.bounds, &instance.world_matrix);
        uploads
            .enqueue_update_bytes(&self.instance_buffer, offset, size_of::<GpuMeshInstanceDynamic>() as u64)
            .copy_from_slice(bytemuck::bytes_of(&block));
    }

    fn clear_instance(&mut self, uploads: &mut UploadQueue, index: u32, instance: &MeshInstance) {
        let sub_rows = instance.sub_mesh_instance_range;
        for row in sub_rows.offset..sub_rows.end() {
            if let Some(draw) = self.sub_instance_draws[row as usize].take() {
                self.pipeline_set_counts[draw.pipeline_set as usize] -= 1;
                self.sub_mesh_draw_counts[draw.global_sub_mesh as usize] -= 1;
                self.counts_dirty = true;
            }
        }
        uploads.enqueue_update::<GpuMeshInstance>(&self.instance_buffer, index as u64, 1);
        uploads.enqueue_update::<GpuLodMeshInstance>(
            &self.lod_instance_buffer,
            instance.lod_mesh_instance_range.offset as u64,
            instance.lod_mesh_instance_range.size as usize,
        );
        uploads.enqueue_update::<GpuSubMeshInstance>(
            &self.sub_instance_buffer,
            sub_rows.offset as u64,
            sub_rows.size as usize,
        );
    }

    fn recompute_offsets(&mut self, uploads: &mut UploadQueue) {
        let mut running = 0;
        for (offset, count) in self.sub_mesh_draw_offsets.iter_mut().zip(&self.sub_mesh_draw_counts) {
            *offset = running;
            running += count;
        }
        let mut running = 0;
        for (offset, count) in self.pipeline_set_offsets.iter_mut().zip(&self.pipeline_set_counts) {
            *offset = running;
            running += count;
        }
        assert!(
            running <= self.indirect_argument_capacity,
            "MeshInstanceResources: {running} draws exceed the indirect argument capacity of {}",
            self.indirect_argument_capacity
        );

        uploads
            .enqueue_update::<u32>(&self.sub_mesh_draw_offset_buffer, 0, self.sub_mesh_draw_offsets.len())
            .copy_from_slice(&self.sub_mesh_draw_offsets);
        uploads
            .enqueue_update::<u32>(&self.pipeline_set_offset_buffer, 0, self.pipeline_set_offsets.len())
            .copy_from_slice(&self.pipeline_set_offsets);
        self.counts_dirty = false;
        log::debug!("Draw offsets recomputed: {running} sub-mesh instances");
    }

    /// High-water mark of instance rows. Never shrinks.
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Sub-mesh instances drawn with pipeline set `set`.
    pub fn pipeline_set_count(&self, set: u32) -> u32 {
        self.pipeline_set_counts[set as usize]
    }

    /// First indirect argument of pipeline set `set`.
    pub fn pipeline_set_offset(&self, set: u32) -> u32 {
        self.pipeline_set_offsets[set as usize]
    }

    /// Sub-mesh instances across every pipeline set.
    pub fn total_draw_count(&self) -> u32 {
        self.pipeline_set_counts.iter().sum()
    }

    /// Instances of global sub-mesh `sub_mesh`.
    pub fn sub_mesh_draw_count(&self, sub_mesh: u32) -> u32 {
        self.sub_mesh_draw_counts[sub_mesh as usize]
    }

    /// Prefix sum of [`Self::sub_mesh_draw_count`].
    pub fn sub_mesh_draw_offset(&self, sub_mesh: u32) -> u32 {
        self.sub_mesh_draw_offsets[sub_mesh as usize]
    }

    /// The mesh instance table.
    pub fn instance_buffer(&self) -> &GpuBuffer {
        &self.instance_buffer
    }

    /// The LOD-mesh-instance table.
    pub fn lod_instance_buffer(&self) -> &GpuBuffer {
        &self.lod_instance_buffer
    }

    /// The sub-mesh-instance table.
    pub fn sub_instance_buffer(&self) -> &GpuBuffer {
        &self.sub_instance_buffer
    }

    /// Per-sub-mesh draw offsets.
    pub fn sub_mesh_draw_offset_buffer(&self) -> &GpuBuffer {
        &self.sub_mesh_draw_offset_buffer
    }

    /// Shader views: instances, LOD instances, sub-instances, sub-mesh draw
    /// offsets, pipeline-set draw offsets.
    pub fn views(&self) -> &DescriptorRange {
        &self.views
    }

    /// Releases the tables and views.
    pub fn destroy(self, device: &dyn GraphicsDevice, cpu_descriptors: &mut DescriptorAllocator) {
        cpu_descriptors.free(self.views);
        self.instance_buffer.destroy(device);
        self.lod_instance_buffer.destroy(device);
        self.sub_instance_buffer.destroy(device);
        self.sub_mesh_draw_offset_buffer.destroy(device);
        self.pipeline_set_offset_buffer.destroy(device);
    }
}
