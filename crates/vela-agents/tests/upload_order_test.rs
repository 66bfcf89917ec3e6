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

use common::{single_lod_quad, translation, Fixture};
use vela_data::scene::MeshInstanceHandle;

/// Two identical scenes, three instances each.
fn twin_worlds() -> [(Fixture, Vec<MeshInstanceHandle>); 2] {
    std::array::from_fn(|_| {
        let mut f = Fixture::new();
        let material = f.material("lit_ps");
        let mesh = f.world.create_mesh_from_asset("quad.mesh", single_lod_quad());
        let instances = f.world.create_mesh_instances(mesh, 3, material);
        f.frame();
        (f, instances)
    })
}

#[test]
fn test_non_overlapping_edits_do_not_depend_on_their_order() {
    // --- 1. ARRANGE ---
    let [(mut a, a_instances), (mut b, b_instances)] = twin_worlds();
    let moves = [(0usize, 4.0f32), (2, -3.0), (1, 7.5)];

    // --- 2. ACT ---
    for &(i, x) in &moves {
        a.world.set_world_matrix(a_instances[i], translation(x));
    }
    for &(i, x) in moves.iter().rev() {
        b.world.set_world_matrix(b_instances[i], translation(x));
    }
    a.frame();
    b.frame();

    // --- 3. ASSERT ---
    for label in ["MeshInstances", "SubMeshInstances", "LodMeshInstances"] {
        assert_eq!(a.buffer(label), b.buffer(label), "'{label}' differs");
    }
}

#[test]
fn test_material_parameters_reach_their_block() {
    let mut f = Fixture::new();
    let first = f.material("lit_ps");
    let second = f.material("lit_ps");
    f.world.set_material_parameters(second, &7.5f32.to_le_bytes());
    f.world.set_material_parameters(first, &1.5f32.to_le_bytes());
    f.frame();

    let offset = f.world.materials().instance(second).parameter_offset() as usize;
    let parameters = f.buffer("MaterialParameters");
    let value = f32::from_le_bytes(parameters[offset..offset + 4].try_into().unwrap());
    approx::assert_relative_eq!(value, 7.5);
    let offset = f.world.materials().instance(first).parameter_offset() as usize;
    let value = f32::from_le_bytes(parameters[offset..offset + 4].try_into().unwrap());
    approx::assert_relative_eq!(value, 1.5);
}
