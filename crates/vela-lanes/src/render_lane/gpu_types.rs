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

//! Row layouts of the GPU tables, shared with the shaders.
//!
//! Every type is `#[repr(C)]` and [`Pod`] so it can be written straight into
//! a staging slice. Row `i` of a table always mirrors slot `i` of the CPU
//! table it comes from.

use bytemuck::{Pod, Zeroable};
use vela_core::math::{Affine3x4, Mat4, Vec3, Vec4};

/// `state_flags` bit of a live mesh or mesh instance row.
pub const STATE_ENABLED: u32 = 1;

/// `stream_range` of a mesh with no LOD level resident.
pub const NOTHING_STREAMED: u32 = 0xFFFF_FFFF;

/// Packs an inclusive range of resident LOD levels.
#[inline]
pub const fn pack_stream_range(begin_level: u16, end_level: u16) -> u32 {
    begin_level as u32 | (end_level as u32) << 16
}

/// One row of the mesh table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuMesh {
    /// [`STATE_ENABLED`] while the mesh is alive.
    pub state_flags: u32,
    /// First row of the mesh in the LOD-mesh table.
    pub lod_mesh_offset: u32,
    /// LOD levels of the mesh.
    pub lod_mesh_count: u32,
    /// Resident levels, see [`pack_stream_range`].
    pub stream_range: u32,
}

/// One row of the LOD-mesh table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuLodMesh {
    /// First vertex of the level inside its mesh.
    pub vertex_offset: u32,
    /// First index of the level inside its mesh.
    pub index_offset: u32,
    /// First row of the level in the sub-mesh table.
    pub sub_mesh_offset: u32,
    /// Sub-meshes of the level.
    pub sub_mesh_count: u32,
}

/// One row of the sub-mesh table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuSubMesh {
    /// Indices drawn.
    pub index_count: u32,
    /// First index, relative to the level.
    pub index_offset: u32,
    /// Keeps rows 16 bytes wide.
    pub _pad: [u32; 2],
}

/// The part of a mesh instance row rewritten when the instance moves.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMeshInstanceDynamic {
    /// Object to world transform.
    pub world_matrix: Affine3x4,
    /// World-space bounds, min corner.
    pub aabb_min: Vec3,
    /// Half the diagonal of the world-space bounds.
    pub bounds_radius: f32,
    /// World-space bounds, max corner.
    pub aabb_max: Vec3,
    /// Largest axis scale of the transform.
    pub world_scale: f32,
}

/// One row of the mesh instance table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMeshInstance {
    /// [`STATE_ENABLED`] while the instance is alive and enabled.
    pub state_flags: u32,
    /// Slot of the instanced mesh.
    pub mesh_index: u32,
    /// First row of the instance in the LOD-mesh-instance table.
    pub lod_mesh_instance_offset: u32,
    /// First row of the instance in the sub-mesh-instance table.
    pub sub_mesh_instance_offset: u32,
    /// Transform-dependent data.
    pub dynamic: GpuMeshInstanceDynamic,
}

/// One row of the LOD-mesh-instance table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLodMeshInstance {
    /// First sub-mesh instance of the level.
    pub sub_mesh_instance_offset: u32,
    /// Screen coverage below which the next coarser level is picked.
    pub lod_threshold: f32,
}

/// One row of the sub-mesh-instance table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuSubMeshInstance {
    /// Slot of the bound material instance.
    pub material_index: u32,
    /// Byte offset of its parameters.
    pub material_parameter_offset: u32,
    /// Draw bucket.
    pub pipeline_set_index: u32,
    /// Keeps rows 16 bytes wide.
    pub _pad: u32,
}

/// Where a resident LOD level sits in the global geometry buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuGeometryOffset {
    /// First vertex in the position buffer.
    pub vertex_offset: u32,
    /// First index in the index buffer.
    pub index_offset: u32,
}

/// Per-draw data written by culling next to each indirect argument.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuDrawSubInfo {
    /// Instance the draw belongs to.
    pub mesh_instance_index: u32,
    /// Material instance of the draw.
    pub material_index: u32,
    /// Byte offset of the material parameters.
    pub material_parameter_offset: u32,
    /// First triangle of the draw in the index buffer.
    pub triangle_offset: u32,
}

/// Culling constants, uploaded every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuCullingInfo {
    /// High-water mark of mesh instance slots.
    pub mesh_instance_reserved_count: u32,
    /// Pipeline sets opened so far.
    pub pipeline_set_count: u32,
    /// Rows of the indirect argument buffer.
    pub indirect_argument_capacity: u32,
    /// Keeps the header 16 bytes wide.
    pub _pad0: u32,
    /// Pads the buffer to 256 bytes.
    pub _pad: [[u32; 4]; 15],
}

impl Default for GpuCullingInfo {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Camera constants of one view.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuViewConstants {
    /// Projection times view.
    pub view_projection: Mat4,
    /// Frustum planes as `(normal, d)`.
    pub frustum_planes: [Vec4; 6],
    /// Eye position.
    pub camera_position: Vec3,
    /// Scale applied to screen coverage before the LOD thresholds.
    pub lod_scale: f32,
    /// Viewport width.
    pub width: u32,
    /// Viewport height.
    pub height: u32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Pads the buffer to 256 bytes.
    pub _pad: [u32; 16],
}

impl Default for GpuViewConstants {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_row_sizes_match_shader_layouts() {
        assert_eq!(size_of::<GpuMesh>(), 16);
        assert_eq!(size_of::<GpuLodMesh>(), 16);
        assert_eq!(size_of::<GpuSubMesh>(), 16);
        assert_eq!(size_of::<GpuMeshInstance>(), 96);
        assert_eq!(offset_of!(GpuMeshInstance, dynamic), 16);
        assert_eq!(size_of::<GpuMeshInstanceDynamic>(), 80);
        assert_eq!(size_of::<GpuLodMeshInstance>(), 8);
        assert_eq!(size_of::<GpuSubMeshInstance>(), 16);
        assert_eq!(size_of::<GpuDrawSubInfo>(), 16);
        assert_eq!(size_of::<GpuCullingInfo>(), 256);
        assert_eq!(size_of::<GpuViewConstants>(), 256);
    }

    #[test]
    fn test_stream_range_packing() {
        assert_eq!(pack_stream_range(1, 3), 0x0003_0001);
        assert_ne!(pack_stream_range(0, 0), NOTHING_STREAMED);
    }
}
