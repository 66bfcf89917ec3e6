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

mod common;

use anyhow::Result;
use common::{two_lod_quad, Fixture};
use vela_lanes::asset_lane::write_mesh_asset;

#[test]
fn test_mesh_file_is_loaded_once_per_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("quad.mesh");
    std::fs::write(&path, write_mesh_asset(&two_lod_quad()))?;

    let mut f = Fixture::new();
    let first = f.world.create_mesh(&path)?;
    let second = f.world.create_mesh(&path)?;

    assert_eq!(first, second);
    assert_eq!(f.world.meshes().len(), 1);
    let mesh = f.world.meshes().get(first);
    assert_eq!(mesh.lod_count(), 2);
    assert_eq!(mesh.sub_mesh_count(), 3);
    assert_eq!(mesh.material_slot_index(vela_core::str_hash64("trim")), Some(1));
    Ok(())
}

#[test]
fn test_truncated_mesh_file_is_a_recoverable_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.mesh");
    let bytes = write_mesh_asset(&two_lod_quad());
    std::fs::write(&path, &bytes[..bytes.len() / 2])?;

    let mut f = Fixture::new();
    let err = f.world.create_mesh(&path).unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Failed to load mesh"), "{message}");
    assert!(message.contains("truncated"), "{message}");
    assert!(f.world.meshes().is_empty());
    Ok(())
}

#[test]
fn test_missing_mesh_file_reports_the_path() {
    let mut f = Fixture::new();
    let err = f.world.create_mesh("does/not/exist.mesh").unwrap_err();
    assert!(format!("{err:#}").contains("does/not/exist.mesh"));
}
