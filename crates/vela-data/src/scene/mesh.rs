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

use super::{Changes, MeshHandle, TrackedPool};
use crate::allocators::{VirtualAllocation, VirtualAllocator};
use crate::assets::MeshAsset;
use std::collections::HashMap;
use vela_core::math::{Aabb, Vec3};
use vela_core::renderer::RendererConfig;

/// Most LOD levels one mesh may have.
pub const MAX_LODS_PER_MESH: u32 = 8;
/// Most sub-meshes one mesh may have, across its levels.
pub const MAX_SUB_MESHES_PER_MESH: u32 = 64;
/// Most material slots one mesh may have.
pub const MAX_MATERIAL_SLOTS_PER_MESH: u32 = 16;

/// A LOD level, with offsets local to its mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodMesh {
    /// First vertex in the mesh's positions.
    pub vertex_offset: u32,
    /// Vertices of the level.
    pub vertex_count: u32,
    /// First index in the mesh's indices.
    pub index_offset: u32,
    /// Indices of the level.
    pub index_count: u32,
    /// First sub-mesh in the mesh's sub-mesh table.
    pub sub_mesh_offset: u32,
    /// Sub-meshes of the level.
    pub sub_mesh_count: u32,
}

/// A draw range inside a LOD level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    /// Material slot drawing this range.
    pub material_slot_index: u32,
    /// Indices of the range.
    pub index_count: u32,
    /// First index, relative to the level's first index.
    pub index_offset: u32,
}

/// An immutable mesh and its place in the global LOD-mesh and sub-mesh tables.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Path the mesh was created from.
    pub path: String,
    /// Identity of `path`.
    pub path_hash: u64,
    /// Material slot name hashes.
    pub material_slot_hashes: Vec<u64>,
    /// LOD levels, finest first.
    pub lod_meshes: Vec<LodMesh>,
    /// Sub-meshes of all levels.
    pub sub_meshes: Vec<SubMesh>,
    /// Object-space bounds.
    pub bounds: Aabb,
    /// Rows of the global LOD-mesh table owned by this mesh.
    pub lod_mesh_range: VirtualAllocation,
    /// Rows of the global sub-mesh table owned by this mesh.
    pub sub_mesh_range: VirtualAllocation,
    /// CPU copy of the positions, kept to stream levels in and out.
    pub positions: Vec<Vec3>,
    /// CPU copy of the indices.
    pub indices: Vec<u32>,
    /// Live instances of this mesh.
    pub instance_count: u32,
}

impl Mesh {
    /// LOD levels of the mesh.
    pub fn lod_count(&self) -> u32 {
        self.lod_meshes.len() as u32
    }

    /// Sub-meshes of the mesh.
    pub fn sub_mesh_count(&self) -> u32 {
        self.sub_meshes.len() as u32
    }

    /// Row of level `lod` in the global LOD-mesh table.
    pub fn global_lod_mesh_index(&self, lod: u32) -> u32 {
        assert!(lod < self.lod_count(), "Mesh: LOD {lod} out of range");
        self.lod_mesh_range.offset + lod
    }

    /// Row of local sub-mesh `sub_mesh` in the global sub-mesh table.
    pub fn global_sub_mesh_index(&self, sub_mesh: u32) -> u32 {
        assert!(
            sub_mesh < self.sub_mesh_count(),
            "Mesh: sub-mesh {sub_mesh} out of range"
        );
        self.sub_mesh_range.offset + sub_mesh
    }

    /// Slot whose name hashes to `name_hash`.
    pub fn material_slot_index(&self, name_hash: u64) -> Option<u32> {
        self.material_slot_hashes
            .iter()
            .position(|h| *h == name_hash)
            .map(|i| i as u32)
    }

    /// Positions of level `lod`.
    pub fn lod_positions(&self, lod: u32) -> &[Vec3] {
        let level = &self.lod_meshes[lod as usize];
        let start = level.vertex_offset as usize;
        &self.positions[start..start + level.vertex_count as usize]
    }

    /// Indices of level `lod`.
    pub fn lod_indices(&self, lod: u32) -> &[u32] {
        let level = &self.lod_meshes[lod as usize];
        let start = level.index_offset as usize;
        &self.indices[start..start + level.index_count as usize]
    }
}

/// The mesh table.
#[derive(Debug)]
pub struct MeshScene {
    meshes: TrackedPool<Mesh>,
    lod_mesh_ranges: VirtualAllocator,
    sub_mesh_ranges: VirtualAllocator,
    by_path: HashMap<u64, MeshHandle>,
    retired_ranges: Vec<(VirtualAllocation, VirtualAllocation)>,
}

impl MeshScene {
    /// An empty table sized from `config`.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            meshes: TrackedPool::new(config.max_meshes),
            lod_mesh_ranges: VirtualAllocator::new(config.max_lod_meshes),
            sub_mesh_ranges: VirtualAllocator::new(config.max_sub_meshes),
            by_path: HashMap::new(),
            retired_ranges: Vec::new(),
        }
    }

    /// Adds a mesh built from `asset`.
    ///
    /// # Panics
    ///
    /// Panics when the asset exceeds the per-mesh limits, when a table is
    /// full or when a live mesh was already created from `path`.
    pub fn create(&mut self, path: &str, asset: MeshAsset) -> MeshHandle {
        let lod_count = asset.lod_count();
        let sub_mesh_count = asset.sub_mesh_count();
        assert!(
            (1..=MAX_LODS_PER_MESH).contains(&lod_count),
            "MeshScene: '{path}' has {lod_count} LOD levels (1 to {MAX_LODS_PER_MESH} allowed)"
        );
        assert!(
            (1..=MAX_SUB_MESHES_PER_MESH).contains(&sub_mesh_count),
            "MeshScene: '{path}' has {sub_mesh_count} sub-meshes (1 to {MAX_SUB_MESHES_PER_MESH} allowed)"
        );
        assert!(
            asset.material_slot_hashes.len() as u32 <= MAX_MATERIAL_SLOTS_PER_MESH,
            "MeshScene: '{path}' has {} material slots ({MAX_MATERIAL_SLOTS_PER_MESH} allowed)",
            asset.material_slot_hashes.len()
        );
        let path_hash = vela_core::str_hash64(path);
        assert!(
            !self.by_path.contains_key(&path_hash),
            "MeshScene: '{path}' is already loaded"
        );

        let mesh = Mesh {
            path: path.to_owned(),
            path_hash,
            material_slot_hashes: asset.material_slot_hashes,
            lod_meshes: asset
                .lods
                .iter()
                .map(|lod| LodMesh {
                    vertex_offset: lod.vertex_offset,
                    vertex_count: lod.vertex_count,
                    index_offset: lod.index_offset,
                    index_count: lod.index_count,
                    sub_mesh_offset: lod.sub_mesh_offset,
                    sub_mesh_count: lod.sub_mesh_count,
                })
                .collect(),
            sub_meshes: asset
                .sub_meshes
                .iter()
                .map(|s| SubMesh {
                    material_slot_index: s.material_slot_index,
                    index_count: s.index_count,
                    index_offset: s.index_offset,
                })
                .collect(),
            bounds: asset.bounds,
            lod_mesh_range: self.lod_mesh_ranges.allocate(lod_count),
            sub_mesh_range: self.sub_mesh_ranges.allocate(sub_mesh_count),
            positions: asset.positions,
            indices: asset.indices,
            instance_count: 0,
        };
        let handle = MeshHandle(self.meshes.insert(mesh));
        self.by_path.insert(path_hash, handle);
        log::debug!(
            "Mesh '{path}' created in slot {} ({lod_count} LODs, {sub_mesh_count} sub-meshes)",
            handle.index()
        );
        handle
    }

    /// Removes a mesh.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead or instances of the mesh are alive.
    pub fn destroy(&mut self, handle: MeshHandle) {
        let mesh = self.get(handle);
        assert!(
            mesh.instance_count == 0,
            "MeshScene: '{}' destroyed with {} live instances",
            mesh.path,
            mesh.instance_count
        );
        let (path_hash, ranges) = (mesh.path_hash, (mesh.lod_mesh_range, mesh.sub_mesh_range));
        self.by_path.remove(&path_hash);
        self.retired_ranges.push(ranges);
        self.meshes.remove(handle.0);
    }

    /// The live mesh created from the path hashing to `path_hash`.
    pub fn find(&self, path_hash: u64) -> Option<MeshHandle> {
        self.by_path.get(&path_hash).copied()
    }

    /// The mesh behind a live handle.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead.
    pub fn get(&self, handle: MeshHandle) -> &Mesh {
        match self.meshes.get(handle.0) {
            Some(mesh) => mesh,
            None => panic!("MeshScene: stale handle {:?}", handle.0),
        }
    }

    /// The live mesh in slot `index`.
    pub fn get_by_index(&self, index: u32) -> Option<&Mesh> {
        self.meshes.get_by_index(index)
    }

    /// Whether `handle` is alive.
    pub fn contains(&self, handle: MeshHandle) -> bool {
        self.meshes.contains(handle.0)
    }

    /// Counts one more live instance of the mesh.
    pub fn add_instances(&mut self, handle: MeshHandle, count: u32) {
        match self.meshes.get_mut(handle.0) {
            Some(mesh) => mesh.instance_count += count,
            None => panic!("MeshScene: stale handle {:?}", handle.0),
        }
    }

    /// Counts one instance of the mesh less.
    pub fn remove_instance(&mut self, handle: MeshHandle) {
        match self.meshes.get_mut(handle.0) {
            Some(mesh) => mesh.instance_count -= 1,
            None => panic!("MeshScene: stale handle {:?}", handle.0),
        }
    }

    /// Live meshes.
    pub fn iter(&self) -> impl Iterator<Item = (MeshHandle, &Mesh)> + '_ {
        self.meshes.iter().map(|(h, m)| (MeshHandle(h), m))
    }

    /// Hands out creations and destructions since the last call.
    pub fn take_changes(&mut self) -> Changes<Mesh> {
        self.meshes.take_changes()
    }

    /// Frees the slots and table rows of processed destructions.
    pub fn late_update(&mut self) {
        if self.meshes.late_update() {
            for (lod_meshes, sub_meshes) in self.retired_ranges.drain(..) {
                self.lod_mesh_ranges.free(lod_meshes);
                self.sub_mesh_ranges.free(sub_meshes);
            }
        }
    }

    /// Live meshes.
    pub fn len(&self) -> u32 {
        self.meshes.len()
    }

    /// No live mesh.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// High-water mark of mesh slots.
    pub fn reserved(&self) -> u32 {
        self.meshes.reserved()
    }
}
