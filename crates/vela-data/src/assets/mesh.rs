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

use vela_core::math::{Aabb, Vec3};

/// One draw range of a LOD level, bound to a material slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMeshInfo {
    /// Index into the mesh's material slot table.
    pub material_slot_index: u32,
    /// Number of meshlets of the sub-mesh.
    pub meshlet_count: u32,
    /// First meshlet of the sub-mesh.
    pub meshlet_start_index: u32,
    /// Indices drawn by the sub-mesh.
    pub index_count: u32,
    /// First index, relative to the start of its LOD level.
    pub index_offset: u32,
}

/// One level of detail of a mesh.
///
/// Offsets are relative to the mesh's own vertex, index and sub-mesh arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LodInfo {
    /// First vertex of the level.
    pub vertex_offset: u32,
    /// Number of vertices of the level.
    pub vertex_count: u32,
    /// First index of the level.
    pub index_offset: u32,
    /// Number of indices of the level.
    pub index_count: u32,
    /// First sub-mesh of the level.
    pub sub_mesh_offset: u32,
    /// Number of sub-meshes of the level.
    pub sub_mesh_count: u32,
}

/// Decoded mesh geometry and metadata, as produced by the mesh loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshAsset {
    /// Hashed material slot names, in slot order.
    pub material_slot_hashes: Vec<u64>,
    /// Sub-meshes of every LOD level, level after level.
    pub sub_meshes: Vec<SubMeshInfo>,
    /// LOD levels, finest first.
    pub lods: Vec<LodInfo>,
    /// Vertex positions of every level.
    pub positions: Vec<Vec3>,
    /// Triangle indices of every level, relative to the level's first vertex.
    pub indices: Vec<u32>,
    /// Object-space bounds.
    pub bounds: Aabb,
}

impl MeshAsset {
    /// Number of LOD levels.
    pub fn lod_count(&self) -> u32 {
        self.lods.len() as u32
    }

    /// Number of sub-meshes across all levels.
    pub fn sub_mesh_count(&self) -> u32 {
        self.sub_meshes.len() as u32
    }

    /// Checks that every offset stays inside the arrays it points into.
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_ranges(&self) -> Result<(), String> {
        for (level, lod) in self.lods.iter().enumerate() {
            let vertex_end = lod.vertex_offset as u64 + lod.vertex_count as u64;
            if vertex_end > self.positions.len() as u64 {
                return Err(format!(
                    "LOD {level} vertices end at {vertex_end}, mesh has {}",
                    self.positions.len()
                ));
            }
            let index_end = lod.index_offset as u64 + lod.index_count as u64;
            if index_end > self.indices.len() as u64 {
                return Err(format!(
                    "LOD {level} indices end at {index_end}, mesh has {}",
                    self.indices.len()
                ));
            }
            let sub_mesh_end = lod.sub_mesh_offset as u64 + lod.sub_mesh_count as u64;
            if sub_mesh_end > self.sub_meshes.len() as u64 {
                return Err(format!(
                    "LOD {level} sub-meshes end at {sub_mesh_end}, mesh has {}",
                    self.sub_meshes.len()
                ));
            }
            let sub_meshes = &self.sub_meshes[lod.sub_mesh_offset as usize..sub_mesh_end as usize];
            for sub_mesh in sub_meshes {
                if sub_mesh.index_offset as u64 + sub_mesh.index_count as u64 > lod.index_count as u64 {
                    return Err(format!("LOD {level} has a sub-mesh outside its index range"));
                }
                if sub_mesh.material_slot_index as usize >= self.material_slot_hashes.len() {
                    return Err(format!(
                        "LOD {level} references material slot {} of {}",
                        sub_mesh.material_slot_index,
                        self.material_slot_hashes.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Assembles a [`MeshAsset`] level by level.
///
/// ```
/// use vela_core::math::Vec3;
/// use vela_data::assets::MeshAssetBuilder;
///
/// let triangle = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
/// let asset = MeshAssetBuilder::new()
///     .material_slot("body")
///     .lod(&triangle, &[0, 1, 2], &[(0, 3)])
///     .build();
/// assert_eq!(asset.lod_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MeshAssetBuilder {
    asset: MeshAsset,
}

impl MeshAssetBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a material slot named `name`.
    pub fn material_slot(mut self, name: &str) -> Self {
        self.asset
            .material_slot_hashes
            .push(vela_core::str_hash64(name));
        self
    }

    /// Appends the next coarser LOD level.
    ///
    /// `sub_meshes` lists `(material_slot_index, index_count)` pairs whose
    /// index ranges follow each other inside `indices`.
    pub fn lod(mut self, positions: &[Vec3], indices: &[u32], sub_meshes: &[(u32, u32)]) -> Self {
        let lod = LodInfo {
            vertex_offset: self.asset.positions.len() as u32,
            vertex_count: positions.len() as u32,
            index_offset: self.asset.indices.len() as u32,
            index_count: indices.len() as u32,
            sub_mesh_offset: self.asset.sub_meshes.len() as u32,
            sub_mesh_count: sub_meshes.len() as u32,
        };
        let mut index_offset = 0;
        for &(material_slot_index, index_count) in sub_meshes {
            self.asset.sub_meshes.push(SubMeshInfo {
                material_slot_index,
                index_count,
                index_offset,
                ..SubMeshInfo::default()
            });
            index_offset += index_count;
        }
        self.asset.positions.extend_from_slice(positions);
        self.asset.indices.extend_from_slice(indices);
        self.asset.lods.push(lod);
        self
    }

    /// Finishes the asset, computing its bounds from every position.
    pub fn build(mut self) -> MeshAsset {
        if let Some(first) = self.asset.positions.first().copied() {
            self.asset.bounds = self
                .asset
                .positions
                .iter()
                .fold(Aabb::from_min_max(first, first), |bounds, p| Aabb {
                    min: bounds.min.min(*p),
                    max: bounds.max.max(*p),
                });
        }
        self.asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> [Vec3; 4] {
        [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 2.0, 1.0),
        ]
    }

    #[test]
    fn test_builder_chains_levels() {
        let asset = MeshAssetBuilder::new()
            .material_slot("a")
            .material_slot("b")
            .lod(&quad(), &[0, 1, 2, 0, 2, 3], &[(0, 3), (1, 3)])
            .lod(&quad()[..3], &[0, 1, 2], &[(0, 3)])
            .build();

        assert_eq!(asset.lod_count(), 2);
        assert_eq!(asset.sub_mesh_count(), 3);
        assert_eq!(asset.lods[1].vertex_offset, 4);
        assert_eq!(asset.lods[1].index_offset, 6);
        assert_eq!(asset.lods[1].sub_mesh_offset, 2);
        assert_eq!(asset.sub_meshes[1].index_offset, 3);
        assert_eq!(asset.bounds.min, Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(asset.bounds.max, Vec3::new(1.0, 2.0, 1.0));
        assert!(asset.check_ranges().is_ok());
    }

    #[test]
    fn test_check_ranges_rejects_bad_slot() {
        let asset = MeshAssetBuilder::new()
            .material_slot("a")
            .lod(&quad(), &[0, 1, 2], &[(1, 3)])
            .build();
        let err = asset.check_ranges().unwrap_err();
        assert!(err.contains("material slot"));
    }

    #[test]
    fn test_check_ranges_rejects_overlong_lod() {
        let mut asset = MeshAssetBuilder::new()
            .material_slot("a")
            .lod(&quad(), &[0, 1, 2], &[(0, 3)])
            .build();
        asset.lods[0].index_count = 9;
        assert!(asset.check_ranges().unwrap_err().contains("indices"));
    }
}
