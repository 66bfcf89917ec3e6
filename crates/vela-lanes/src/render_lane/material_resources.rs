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

//! The material parameter buffer.

use super::{structured_view, write_views};
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, GpuBuffer, GraphicsDevice, RendererConfig, ResourceError,
};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::{Changes, MaterialInstance, MaterialScene, UpdateKind};
use vela_data::upload::UploadQueue;

/// Holds the parameter blobs of every material instance, each at the
/// offset its instance was given by the [`MaterialScene`].
#[derive(Debug)]
pub struct MaterialResources {
    parameter_buffer: GpuBuffer,
    views: DescriptorRange,
}

impl MaterialResources {
    /// Creates the parameter buffer sized from `config`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let parameter_buffer = GpuBuffer::create(
            device,
            &BufferDescriptor::structured("MaterialParameters", config.material_parameter_buffer_size),
        )?;
        let views = cpu_descriptors.allocate(1);
        write_views(
            device,
            &views,
            &[structured_view::<u32>(&parameter_buffer, BufferViewKind::ShaderResource)],
        )?;
        Ok(Self {
            parameter_buffer,
            views,
        })
    }

    /// Uploads the blobs of new and edited instances and zero-fills the
    /// blobs of destroyed ones.
    pub fn update(
        &self,
        uploads: &mut UploadQueue,
        scene: &MaterialScene,
        changes: &Changes<MaterialInstance>,
    ) {
        let edited = changes
            .updated
            .iter()
            .filter(|(_, kind)| kind.contains(UpdateKind::PARAMETERS))
            .map(|(handle, _)| handle);
        for handle in changes.created.iter().chain(edited) {
            if let Some(instance) = scene.instance_by_index(handle.index) {
                uploads
                    .enqueue_update_bytes(
                        &self.parameter_buffer,
                        instance.parameter_offset() as u64,
                        instance.parameters.len() as u64,
                    )
                    .copy_from_slice(&instance.parameters);
            }
        }
        for retired in &changes.destroyed {
            uploads.enqueue_update_bytes(
                &self.parameter_buffer,
                retired.value.parameter_offset() as u64,
                retired.value.parameters.len() as u64,
            );
        }
    }

    /// The parameter buffer.
    pub fn parameter_buffer(&self) -> &GpuBuffer {
        &self.parameter_buffer
    }

    /// Shader view of the parameter buffer.
    pub fn views(&self) -> &DescriptorRange {
        &self.views
    }

    /// Releases the buffer and view.
    pub fn destroy(self, device: &dyn GraphicsDevice, cpu_descriptors: &mut DescriptorAllocator) {
        cpu_descriptors.free(self.views);
        self.parameter_buffer.destroy(device);
    }
}
