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

use super::{Changes, MaterialHandle, MaterialInstanceHandle, TrackedPool, UpdateKind};
use crate::allocators::{VirtualAllocation, VirtualAllocator};
use crate::pool::ObjectPool;
use vela_core::renderer::RendererConfig;

/// Granularity of the material parameter buffer, in bytes.
pub const PARAMETER_BLOCK_SIZE: u32 = 16;

/// What [`MaterialScene::create_material`] needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialDescriptor {
    /// Debug name.
    pub name: String,
    /// Vertex shader entry.
    pub vertex_shader: String,
    /// Pixel shader entry.
    pub pixel_shader: String,
    /// Size of one instance's parameter blob, in bytes.
    pub parameter_size: u32,
}

/// A shader pair. Materials sharing a pair share a pipeline set, which is
/// the unit of indirect draw batching.
#[derive(Debug, Clone)]
pub struct Material {
    /// Debug name.
    pub name: String,
    /// Draw bucket of the material.
    pub pipeline_set_index: u32,
    /// Bytes of parameters per instance.
    pub parameter_size: u32,
}

/// Parameters for one use of a material.
#[derive(Debug, Clone)]
pub struct MaterialInstance {
    /// The instanced material.
    pub material: MaterialHandle,
    /// Draw bucket, copied from the material.
    pub pipeline_set_index: u32,
    /// Parameter bytes, padded to whole blocks.
    pub parameters: Vec<u8>,
    /// Blocks of the GPU parameter buffer owned by the instance.
    pub parameter_range: VirtualAllocation,
    /// Material slots of mesh instances bound to this instance.
    pub reference_count: u32,
}

impl MaterialInstance {
    /// Byte offset of the parameters in the GPU parameter buffer.
    pub fn parameter_offset(&self) -> u32 {
        self.parameter_range.offset * PARAMETER_BLOCK_SIZE
    }
}

/// Materials, their instances and the pipeline sets they map to.
#[derive(Debug)]
pub struct MaterialScene {
    materials: ObjectPool<Material>,
    instances: TrackedPool<MaterialInstance>,
    parameter_blocks: VirtualAllocator,
    pipeline_sets: Vec<(String, String)>,
    new_pipeline_sets: Vec<u32>,
    max_pipeline_sets: u32,
    retired_blocks: Vec<VirtualAllocation>,
}

impl MaterialScene {
    /// An empty table sized from `config`.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            materials: ObjectPool::new(config.max_materials),
            instances: TrackedPool::new(config.max_material_instances),
            parameter_blocks: VirtualAllocator::new(
                (config.material_parameter_buffer_size / PARAMETER_BLOCK_SIZE as u64) as u32,
            ),
            pipeline_sets: Vec::new(),
            new_pipeline_sets: Vec::new(),
            max_pipeline_sets: config.max_pipeline_sets,
            retired_blocks: Vec::new(),
        }
    }

    /// Registers a material, opening a new pipeline set for an unseen
    /// shader pair.
    ///
    /// # Panics
    ///
    /// Panics when the material table or the pipeline sets are full.
    pub fn create_material(&mut self, descriptor: &MaterialDescriptor) -> MaterialHandle {
        let shaders = (descriptor.vertex_shader.clone(), descriptor.pixel_shader.clone());
        let pipeline_set_index = match self.pipeline_sets.iter().position(|s| *s == shaders) {
            Some(index) => index as u32,
            None => {
                let index = self.pipeline_sets.len() as u32;
                assert!(
                    index < self.max_pipeline_sets,
                    "MaterialScene: pipeline sets exhausted ({} allowed)",
                    self.max_pipeline_sets
                );
                self.pipeline_sets.push(shaders);
                self.new_pipeline_sets.push(index);
                index
            }
        };
        let handle = MaterialHandle(self.materials.insert(Material {
            name: descriptor.name.clone(),
            pipeline_set_index,
            parameter_size: descriptor.parameter_size,
        }));
        log::debug!(
            "Material '{}' created in slot {} (pipeline set {pipeline_set_index})",
            descriptor.name,
            handle.index()
        );
        handle
    }

    /// Adds an instance of `material` with zeroed parameters.
    ///
    /// # Panics
    ///
    /// Panics when the material is dead or a table is full.
    pub fn create_instance(&mut self, material: MaterialHandle) -> MaterialInstanceHandle {
        let source = self.material(material);
        let blocks = source.parameter_size.div_ceil(PARAMETER_BLOCK_SIZE).max(1);
        let pipeline_set_index = source.pipeline_set_index;
        let instance = MaterialInstance {
            material,
            pipeline_set_index,
            parameters: vec![0; (blocks * PARAMETER_BLOCK_SIZE) as usize],
            parameter_range: self.parameter_blocks.allocate(blocks),
            reference_count: 0,
        };
        MaterialInstanceHandle(self.instances.insert(instance))
    }

    /// Replaces the leading bytes of an instance's parameters.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead or `bytes` is longer than the blob.
    pub fn set_parameters(&mut self, handle: MaterialInstanceHandle, bytes: &[u8]) {
        let instance = self.instance_mut(handle);
        assert!(
            bytes.len() <= instance.parameters.len(),
            "MaterialScene: {} parameter bytes for a blob of {}",
            bytes.len(),
            instance.parameters.len()
        );
        instance.parameters[..bytes.len()].copy_from_slice(bytes);
        self.instances.mark_updated(handle.0, UpdateKind::PARAMETERS);
    }

    /// Counts one more binding of the instance.
    pub fn add_reference(&mut self, handle: MaterialInstanceHandle) {
        self.instance_mut(handle).reference_count += 1;
    }

    /// Counts one binding of the instance less.
    pub fn remove_reference(&mut self, handle: MaterialInstanceHandle) {
        let instance = self.instance_mut(handle);
        assert!(
            instance.reference_count > 0,
            "MaterialScene: unbalanced reference release on {:?}",
            handle.0
        );
        instance.reference_count -= 1;
    }

    /// Removes an instance.
    ///
    /// # Panics
    ///
    /// Panics when the handle is dead or the instance is still bound.
    pub fn destroy_instance(&mut self, handle: MaterialInstanceHandle) {
        let instance = self.instance(handle);
        assert!(
            instance.reference_count == 0,
            "MaterialScene: instance {:?} destroyed while bound {} times",
            handle.0,
            instance.reference_count
        );
        let blocks = instance.parameter_range;
        self.retired_blocks.push(blocks);
        self.instances.remove(handle.0);
    }

    /// The material behind a live handle.
    pub fn material(&self, handle: MaterialHandle) -> &Material {
        match self.materials.get(handle.0) {
            Some(material) => material,
            None => panic!("MaterialScene: stale material {:?}", handle.0),
        }
    }

    /// The instance behind a live handle.
    pub fn instance(&self, handle: MaterialInstanceHandle) -> &MaterialInstance {
        match self.instances.get(handle.0) {
            Some(instance) => instance,
            None => panic!("MaterialScene: stale material instance {:?}", handle.0),
        }
    }

    /// The live instance in slot `index`, the way the GPU tables address it.
    pub fn instance_by_index(&self, index: u32) -> Option<&MaterialInstance> {
        self.instances.get_by_index(index)
    }

    fn instance_mut(&mut self, handle: MaterialInstanceHandle) -> &mut MaterialInstance {
        match self.instances.get_mut(handle.0) {
            Some(instance) => instance,
            None => panic!("MaterialScene: stale material instance {:?}", handle.0),
        }
    }

    /// Whether `handle` is alive.
    pub fn contains_instance(&self, handle: MaterialInstanceHandle) -> bool {
        self.instances.contains(handle.0)
    }

    /// Shader pair of pipeline set `index`.
    pub fn pipeline_set(&self, index: u32) -> (&str, &str) {
        let (vertex, pixel) = &self.pipeline_sets[index as usize];
        (vertex, pixel)
    }

    /// Pipeline sets opened so far.
    pub fn pipeline_set_count(&self) -> u32 {
        self.pipeline_sets.len() as u32
    }

    /// Pipeline sets opened since the last call.
    pub fn take_new_pipeline_sets(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.new_pipeline_sets)
    }

    /// Hands out instance changes since the last call.
    pub fn take_changes(&mut self) -> Changes<MaterialInstance> {
        self.instances.take_changes()
    }

    /// Frees slots and parameter blocks of processed destructions.
    pub fn late_update(&mut self) {
        if self.instances.late_update() {
            for blocks in self.retired_blocks.drain(..) {
                self.parameter_blocks.free(blocks);
            }
        }
    }

    /// Live material instances.
    pub fn instance_count(&self) -> u32 {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, pixel: &str, parameter_size: u32) -> MaterialDescriptor {
        MaterialDescriptor {
            name: name.into(),
            vertex_shader: "mesh_vs".into(),
            pixel_shader: pixel.into(),
            parameter_size,
        }
    }

    #[test]
    fn test_shader_pairs_map_to_pipeline_sets() {
        let mut scene = MaterialScene::new(&RendererConfig::default());
        let a = scene.create_material(&descriptor("a", "lit_ps", 16));
        let b = scene.create_material(&descriptor("b", "lit_ps", 32));
        let c = scene.create_material(&descriptor("c", "unlit_ps", 16));
        assert_eq!(scene.material(a).pipeline_set_index, 0);
        assert_eq!(scene.material(b).pipeline_set_index, 0);
        assert_eq!(scene.material(c).pipeline_set_index, 1);
        assert_eq!(scene.take_new_pipeline_sets(), vec![0, 1]);
        assert!(scene.take_new_pipeline_sets().is_empty());
        assert_eq!(scene.pipeline_set(1), ("mesh_vs", "unlit_ps"));
    }

    #[test]
    fn test_instances_get_block_aligned_parameters() {
        let mut scene = MaterialScene::new(&RendererConfig::default());
        let material = scene.create_material(&descriptor("a", "lit_ps", 20));
        let first = scene.create_instance(material);
        let second = scene.create_instance(material);
        assert_eq!(scene.instance(first).parameters.len(), 32);
        assert_eq!(scene.instance(second).parameter_offset(), 32);

        let _ = scene.take_changes();
        scene.set_parameters(second, &[1, 2, 3]);
        assert_eq!(&scene.instance(second).parameters[..4], &[1, 2, 3, 0]);
        let changes = scene.take_changes();
        assert_eq!(changes.updated, vec![(second.0, UpdateKind::PARAMETERS)]);
    }

    #[test]
    #[should_panic(expected = "while bound")]
    fn test_bound_instance_cannot_be_destroyed() {
        let mut scene = MaterialScene::new(&RendererConfig::default());
        let material = scene.create_material(&descriptor("a", "lit_ps", 16));
        let instance = scene.create_instance(material);
        scene.add_reference(instance);
        scene.destroy_instance(instance);
    }
}
