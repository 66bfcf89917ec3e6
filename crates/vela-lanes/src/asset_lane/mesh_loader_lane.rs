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

//! Defines a lane for loading binary mesh files.
//!
//! A mesh file is little-endian and laid out as:
//!
//! | Section           | Contents                                                          |
//! |-------------------|-------------------------------------------------------------------|
//! | header            | slot, sub-mesh, LOD, vertex and index counts (`u32`), bounds min and max (`[f32; 3]`) |
//! | material slots    | one `u64` name hash per slot                                      |
//! | sub-meshes        | slot index, meshlet count, first meshlet, index count, index offset (`u32`) |
//! | LOD levels        | vertex offset and count, index offset and count, sub-mesh offset and count (`u32`) |
//! | positions         | `[f32; 3]` per vertex                                             |
//! | indices           | `u32` per index, relative to the first vertex of its level        |

use super::AssetLoaderLane;
use std::error::Error;
use std::path::Path;
use thiserror::Error;
use vela_core::math::{Aabb, Vec3};
use vela_data::assets::{LodInfo, MeshAsset, SubMeshInfo};

const HEADER_SIZE: usize = 5 * 4 + 6 * 4;
const SUB_MESH_INFO_SIZE: usize = 5 * 4;
const LOD_INFO_SIZE: usize = 6 * 4;

/// Why a mesh file could not be decoded.
#[derive(Debug, Error)]
pub enum MeshLoadError {
    /// The file ends before a section it announces.
    #[error("mesh data truncated: {needed} bytes needed at offset {offset}")]
    Truncated {
        /// Offset of the section that does not fit.
        offset: usize,
        /// Bytes the section needs.
        needed: usize,
    },
    /// The sections are complete but inconsistent with each other.
    #[error("invalid mesh layout: {0}")]
    InvalidLayout(String),
    /// The file could not be read.
    #[error("failed to read mesh file")]
    Io(#[from] std::io::Error),
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MeshLoadError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(MeshLoadError::Truncated {
                offset: self.offset,
                needed: len,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn section(&mut self, count: u32, stride: usize) -> Result<&'a [u8], MeshLoadError> {
        let len = (count as usize)
            .checked_mul(stride)
            .ok_or(MeshLoadError::Truncated {
                offset: self.offset,
                needed: usize::MAX,
            })?;
        self.take(len)
    }

    fn u32(&mut self) -> Result<u32, MeshLoadError> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(word))
    }

    fn vec3(&mut self) -> Result<Vec3, MeshLoadError> {
        let bytes = self.take(12)?;
        Ok(vec3_from_le(bytes))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

fn u32_from_le(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

fn f32_from_le(bytes: &[u8]) -> f32 {
    f32::from_bits(u32_from_le(bytes))
}

fn vec3_from_le(bytes: &[u8]) -> Vec3 {
    Vec3::new(
        f32_from_le(&bytes[0..4]),
        f32_from_le(&bytes[4..8]),
        f32_from_le(&bytes[8..12]),
    )
}

/// Lane for loading binary mesh files into [`MeshAsset`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshLoaderLane;

impl MeshLoaderLane {
    /// Creates a new `MeshLoaderLane`.
    pub fn new() -> Self {
        Self
    }

    /// Decodes and validates a mesh from its file bytes.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<MeshAsset, MeshLoadError> {
        let mut reader = ByteReader::new(bytes);
        let material_slot_count = reader.u32()?;
        let sub_mesh_count = reader.u32()?;
        let lod_count = reader.u32()?;
        let vertex_count = reader.u32()?;
        let index_count = reader.u32()?;
        let bounds = Aabb::from_min_max(reader.vec3()?, reader.vec3()?);

        let material_slot_hashes = reader
            .section(material_slot_count, 8)?
            .chunks_exact(8)
            .map(|c| {
                let mut word = [0u8; 8];
                word.copy_from_slice(c);
                u64::from_le_bytes(word)
            })
            .collect();

        let sub_meshes = reader
            .section(sub_mesh_count, SUB_MESH_INFO_SIZE)?
            .chunks_exact(SUB_MESH_INFO_SIZE)
            .map(|c| SubMeshInfo {
                material_slot_index: u32_from_le(&c[0..]),
                meshlet_count: u32_from_le(&c[4..]),
                meshlet_start_index: u32_from_le(&c[8..]),
                index_count: u32_from_le(&c[12..]),
                index_offset: u32_from_le(&c[16..]),
            })
            .collect();

        let lods = reader
            .section(lod_count, LOD_INFO_SIZE)?
            .chunks_exact(LOD_INFO_SIZE)
            .map(|c| LodInfo {
                vertex_offset: u32_from_le(&c[0..]),
                vertex_count: u32_from_le(&c[4..]),
                index_offset: u32_from_le(&c[8..]),
                index_count: u32_from_le(&c[12..]),
                sub_mesh_offset: u32_from_le(&c[16..]),
                sub_mesh_count: u32_from_le(&c[20..]),
            })
            .collect();

        let positions = reader
            .section(vertex_count, 12)?
            .chunks_exact(12)
            .map(vec3_from_le)
            .collect();
        let indices = reader
            .section(index_count, 4)?
            .chunks_exact(4)
            .map(u32_from_le)
            .collect();

        if reader.remaining() != 0 {
            return Err(MeshLoadError::InvalidLayout(format!(
                "{} unexpected bytes after the index section",
                reader.remaining()
            )));
        }

        let asset = MeshAsset {
            material_slot_hashes,
            sub_meshes,
            lods,
            positions,
            indices,
            bounds,
        };
        validate(&asset)?;
        Ok(asset)
    }

    /// Reads and decodes the mesh file at `path`.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<MeshAsset, MeshLoadError> {
        let bytes = std::fs::read(path.as_ref())?;
        log::debug!(
            "Decoding mesh file '{}' ({} bytes)",
            path.as_ref().display(),
            bytes.len()
        );
        self.load_bytes(&bytes)
    }
}

impl AssetLoaderLane<MeshAsset> for MeshLoaderLane {
    fn load(&self, bytes: &[u8]) -> Result<MeshAsset, Box<dyn Error + Send + Sync>> {
        Ok(self.load_bytes(bytes)?)
    }
}

fn validate(asset: &MeshAsset) -> Result<(), MeshLoadError> {
    if asset.lods.is_empty() {
        return Err(MeshLoadError::InvalidLayout("mesh has no LOD level".into()));
    }
    asset.check_ranges().map_err(MeshLoadError::InvalidLayout)?;
    for (level, lod) in asset.lods.iter().enumerate() {
        if lod.vertex_count == 0 || lod.index_count == 0 || lod.sub_mesh_count == 0 {
            return Err(MeshLoadError::InvalidLayout(format!("LOD {level} is empty")));
        }
        let start = lod.index_offset as usize;
        let indices = &asset.indices[start..start + lod.index_count as usize];
        if let Some(index) = indices.iter().find(|i| **i >= lod.vertex_count) {
            return Err(MeshLoadError::InvalidLayout(format!(
                "LOD {level} index {index} exceeds its {} vertices",
                lod.vertex_count
            )));
        }
    }
    Ok(())
}

fn put_words(out: &mut Vec<u8>, words: &[u32]) {
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
}

/// Encodes `asset` in the mesh file layout read by [`MeshLoaderLane`].
pub fn write_mesh_asset(asset: &MeshAsset) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        HEADER_SIZE
            + asset.material_slot_hashes.len() * 8
            + asset.sub_meshes.len() * SUB_MESH_INFO_SIZE
            + asset.lods.len() * LOD_INFO_SIZE
            + asset.positions.len() * 12
            + asset.indices.len() * 4,
    );
    put_words(
        &mut out,
        &[
            asset.material_slot_hashes.len() as u32,
            asset.sub_meshes.len() as u32,
            asset.lods.len() as u32,
            asset.positions.len() as u32,
            asset.indices.len() as u32,
        ],
    );
    for corner in [asset.bounds.min, asset.bounds.max] {
        put_words(&mut out, &corner.to_array().map(f32::to_bits));
    }
    for hash in &asset.material_slot_hashes {
        out.extend_from_slice(&hash.to_le_bytes());
    }
    for s in &asset.sub_meshes {
        put_words(
            &mut out,
            &[
                s.material_slot_index,
                s.meshlet_count,
                s.meshlet_start_index,
                s.index_count,
                s.index_offset,
            ],
        );
    }
    for l in &asset.lods {
        put_words(
            &mut out,
            &[
                l.vertex_offset,
                l.vertex_count,
                l.index_offset,
                l.index_count,
                l.sub_mesh_offset,
                l.sub_mesh_count,
            ],
        );
    }
    for p in &asset.positions {
        put_words(&mut out, &p.to_array().map(f32::to_bits));
    }
    put_words(&mut out, &asset.indices);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_data::assets::MeshAssetBuilder;

    fn two_lod_asset() -> MeshAsset {
        let quad = [
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 1.0),
        ];
        MeshAssetBuilder::new()
            .material_slot("body")
            .material_slot("trim")
            .lod(&quad, &[0, 1, 2, 0, 2, 3], &[(0, 3), (1, 3)])
            .lod(&quad[..3], &[0, 1, 2], &[(0, 3)])
            .build()
    }

    #[test]
    fn test_written_mesh_decodes_to_the_same_asset() {
        let asset = two_lod_asset();
        let decoded = MeshLoaderLane::new()
            .load_bytes(&write_mesh_asset(&asset))
            .unwrap();
        assert_eq!(decoded, asset);
        assert_eq!(decoded.lods[1].index_offset, 6);
        assert_eq!(decoded.sub_meshes[1].index_offset, 3);
    }

    #[test]
    fn test_truncated_file_reports_the_missing_section() {
        let bytes = write_mesh_asset(&two_lod_asset());
        let err = MeshLoaderLane::new()
            .load_bytes(&bytes[..bytes.len() - 2])
            .unwrap_err();
        match err {
            MeshLoadError::Truncated { offset, needed } => {
                // The index section starts 9 indices before the end.
                assert_eq!(offset, bytes.len() - 9 * 4);
                assert_eq!(needed, 9 * 4);
            }
            other => panic!("expected truncation, got {other}"),
        }

        let err = MeshLoaderLane::new().load_bytes(&bytes[..10]).unwrap_err();
        assert!(matches!(err, MeshLoadError::Truncated { .. }));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut asset = two_lod_asset();
        asset.indices[7] = 3;
        let err = MeshLoaderLane::new()
            .load_bytes(&write_mesh_asset(&asset))
            .unwrap_err();
        assert!(err.to_string().contains("LOD 1 index 3"));
    }

    #[test]
    fn test_bad_material_slot_is_rejected() {
        let mut asset = two_lod_asset();
        asset.sub_meshes[0].material_slot_index = 5;
        let err = MeshLoaderLane::new()
            .load_bytes(&write_mesh_asset(&asset))
            .unwrap_err();
        assert!(matches!(err, MeshLoadError::InvalidLayout(_)));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = write_mesh_asset(&two_lod_asset());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let err = MeshLoaderLane::new().load_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("4 unexpected bytes"));
    }

    #[test]
    fn test_load_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.mesh");
        std::fs::write(&path, write_mesh_asset(&two_lod_asset())).unwrap();
        let lane = MeshLoaderLane::new();
        assert_eq!(lane.load_file(&path).unwrap().lod_count(), 2);

        let err = lane.load_file(dir.path().join("missing.mesh")).unwrap_err();
        assert!(matches!(err, MeshLoadError::Io(_)));
    }

    #[test]
    fn test_loader_trait_boxes_the_error() {
        let lane: &dyn AssetLoaderLane<MeshAsset> = &MeshLoaderLane;
        let err = lane.load(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().starts_with("mesh data truncated"));
    }
}
