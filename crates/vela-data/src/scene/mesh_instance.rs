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

use super::{Changes, MaterialInstanceHandle, Mesh, MeshHandle, MeshInstanceHandle, TrackedPool, UpdateKind};
use crate::allocators::{VirtualAllocation, VirtualAllocator};
use vela_core::math::Mat4;
use vela_core::renderer::RendererConfig;

/// A mesh placed in the world.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    /// The instanced mesh.
    pub mesh: MeshHandle,
    /// Current world transform.
    pub world_matrix: Mat4,
    /// Transform before the last [`MeshInstanceScene::set_world_matrix`].
    pub previous_world_matrix: Mat4,
    /// Rows of the global LOD-mesh-instance table, one per LOD level.
    pub lod_mesh_instance_range: VirtualAllocation,
    /// Rows of the global sub-mesh-instance table, one per sub-mesh.
    pub sub_mesh_instance_range: VirtualAllocation,
    /// Material instance bound to each material slot of the mesh.
    pub material_instances: Vec<MaterialInstanceHandle>,
    /// Whether culling considers the instance.
    pub enabled: bool,
}

impl MeshInstance {
    /// Material instance drawing sub-meshes of slot `slot`.
    pub fn material_instance(&self, slot: u32) -> MaterialInstanceHandle {
        self.material_instances[slot as usize]
    }
}

/// The mesh instance table.
#[derive(Debug)]
pub struct MeshInstanceScene {
    instances: TrackedPool<MeshInstance>,
    lod_mesh_instance_ranges: VirtualAllocator,
    sub_mesh_instance_ranges: VirtualAllocator,
    retired_ranges: Vec<(VirtualAllocation, VirtualAllocation)>,
}

impl MeshInstanceScene {
    /// An empty table sized from `config`.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            instances: TrackedPool::new(config.max_mesh_instances),
            lod_mesh_instance_ranges: VirtualAllocator::new(config.max_lod_mesh_instances),
            sub_mesh_instance_ranges: VirtualAllocator::new(config.max_sub_mesh_instances),
            retired_ranges: Vec::new(),
        }
    }

    /// Places `count` instances of `mesh` at the origin, every material slot
    /// bound to `material`.
    ///
    /// # Panics
    ///
    /// Panics when a table is full.
    pub fn create(
        &mut self,
        mesh_handle: MeshHandle,
        mesh: &Mesh,
        count: u32,
        material: MaterialInstanceHandle,
    ) -> Vec<MeshInstanceHandle> {
        (0..count)
            .map(|_| {
                let instance = MeshInstance {
                    mesh: mesh_handle,
                    world_matrix: Mat4::IDENTITY,
                    previous_world_matrix: Mat4::IDENTITY,
                    lod_mesh_instance_range: self.lod_mesh_instance_ranges.allocate(mesh.lod_count()),
                    sub_mesh_instance_range: self
                        .sub_mesh_instance_ranges
                        .allocate(mesh.sub_mesh_count()),
                    material_instances: vec![material; mesh.material_slot_hashes.len().max(1)],
                    enabled: true,
                };
                MeshInstanceHandle(self.instances.insert(instance))
            })
            .collect()
    }

    /// Moves an instance. The old transform becomes the previous one.
    pub fn set_world_matrix(&mut self, handle: MeshInstanceHandle, world_matrix: Mat4) {
        let instance = self.get_mut(handle);
        instance.previous_world_matrix = instance.world_matrix;
        instance.world_matrix = world_matrix;
        self.instances.mark_updated(handle.0, UpdateKind::TRANSFORM);
    }

    /// Binds `material` to `slot` and returns the material it replaces.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead or `slot` is not a slot of the mesh.
    pub fn set_material_instance(
        &mut self,
        handle: MeshInstanceHandle,
        slot: u32,
        material: MaterialInstanceHandle,
    ) -> MaterialInstanceHandle {
        let instance = self.get_mut(handle);
        assert!(
            (slot as usize) < instance.material_instances.len(),
            "MeshInstanceScene: slot {slot} out of range ({} slots)",
            instance.material_instances.len()
        );
        let previous = std::mem::replace(&mut instance.material_instances[slot as usize], material);
        self.instances.mark_updated(handle.0, UpdateKind::MATERIAL);
        previous
    }

    /// Removes an instance and returns it.
    pub fn destroy(&mut self, handle: MeshInstanceHandle) -> MeshInstance {
        let instance = self.get(handle).clone();
        self.retired_ranges.push((
            instance.lod_mesh_instance_range,
            instance.sub_mesh_instance_range,
        ));
        self.instances.remove(handle.0);
        instance
    }

    /// The instance behind a live handle.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead.
    pub fn get(&self, handle: MeshInstanceHandle) -> &MeshInstance {
        match self.instances.get(handle.0) {
            Some(instance) => instance,
            None => panic!("MeshInstanceScene: stale handle {:?}", handle.0),
        }
    }

    fn get_mut(&mut self, handle: MeshInstanceHandle) -> &mut MeshInstance {
        match self.instances.get_mut(handle.0) {
            Some(instance) => instance,
            None => panic!("MeshInstanceScene: stale handle {:?}", handle.0),
        }
    }

    /// Whether `handle` is alive.
    pub fn contains(&self, handle: MeshInstanceHandle) -> bool {
        self.instances.contains(handle.0)
    }

    /// Live instances.
    pub fn iter(&self) -> impl Iterator<Item = (MeshInstanceHandle, &MeshInstance)> + '_ {
        self.instances.iter().map(|(h, i)| (MeshInstanceHandle(h), i))
    }

    /// Hands out the changes since the last call.
    pub fn take_changes(&mut self) -> Changes<MeshInstance> {
        self.instances.take_changes()
    }

    /// Frees the slots and table rows of processed destructions.
    pub fn late_update(&mut self) {
        if self.instances.late_update() {
            for (lod_rows, sub_rows) in self.retired_ranges.drain(..) {
                self.lod_mesh_instance_ranges.free(lod_rows);
                self.sub_mesh_instance_ranges.free(sub_rows);
            }
        }
    }

    /// Live instances.
    pub fn len(&self) -> u32 {
        self.instances.len()
    }

    /// No live instance.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// High-water mark of instance slots.
    pub fn reserved(&self) -> u32 {
        self.instances.reserved()
    }
}
