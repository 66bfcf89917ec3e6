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

//! Buffers and the descriptor table owned by one view.

use super::gpu_types::{GpuCullingInfo, GpuDrawSubInfo, GpuViewConstants};
use super::indirect_arguments::IndirectArgumentBuffers;
use super::{structured_view, write_views};
use vela_core::math::Plane;
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, CpuDescriptorHandle, GpuBuffer, GraphicsDevice, RendererConfig,
    ResourceError,
};
use vela_data::descriptor::{DescriptorAllocator, DescriptorAllocatorGroup, DescriptorRange};
use vela_data::scene::View;
use vela_data::upload::UploadQueue;

/// Descriptors of the per-view table, in binding order.
pub const VIEW_TABLE_SIZE: u32 = 5;

/// The heaps a view takes its descriptors from.
pub struct ViewHeaps<'a> {
    /// CBV/SRV/UAV staging heap.
    pub cpu: &'a mut DescriptorAllocator,
    /// Shader-visible CBV/SRV/UAV heap.
    pub gpu: &'a mut DescriptorAllocator,
    /// Render target heap.
    pub rtv: &'a mut DescriptorAllocator,
    /// Depth stencil heap.
    pub dsv: &'a mut DescriptorAllocator,
}

impl<'a> From<&'a mut DescriptorAllocatorGroup> for ViewHeaps<'a> {
    fn from(group: &'a mut DescriptorAllocatorGroup) -> Self {
        Self {
            cpu: &mut group.srv_cbv_uav_cpu,
            gpu: &mut group.srv_cbv_uav_gpu,
            rtv: &mut group.rtv,
            dsv: &mut group.dsv,
        }
    }
}

/// Constant buffers, indirect buffers, render target slots and the per-view
/// descriptor table.
///
/// The table holds, in order: view constants (CBV), culling info (CBV),
/// indirect arguments (UAV), indirect counts (UAV), draw sub-info (UAV).
/// The color and depth descriptors are written by whoever owns the view's
/// textures; the geometry pass binds them before drawing.
#[derive(Debug)]
pub struct ViewResources {
    view_index: usize,
    constant_buffer: GpuBuffer,
    culling_info_buffer: GpuBuffer,
    indirect: IndirectArgumentBuffers,
    cpu_views: DescriptorRange,
    table: DescriptorRange,
    render_target: DescriptorRange,
    depth_stencil: DescriptorRange,
}

/// Constants of `view`.
pub fn view_constants(view: &View) -> GpuViewConstants {
    let view_projection = view.view_projection();
    GpuViewConstants {
        view_projection,
        frustum_planes: Plane::frustum_planes(&view_projection).map(Plane::to_vec4),
        camera_position: view.camera_position,
        lod_scale: 1.0 / (view.fov_y_radians * 0.5).tan(),
        width: view.width,
        height: view.height,
        near: view.near,
        far: view.far,
        ..GpuViewConstants::default()
    }
}

impl ViewResources {
    /// Creates the resources of view `view_index` and fills its table in
    /// the shader-visible heap.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        view_index: usize,
        heaps: ViewHeaps<'_>,
    ) -> Result<Self, ResourceError> {
        let label = format!("ViewConstants[{view_index}]");
        let constant_buffer = GpuBuffer::create_array::<GpuViewConstants>(
            device,
            BufferDescriptor::constant(&label, 0),
            1,
        )?;
        let label = format!("CullingInfo[{view_index}]");
        let culling_info_buffer = GpuBuffer::create_array::<GpuCullingInfo>(
            device,
            BufferDescriptor::constant(&label, 0),
            1,
        )?;
        let indirect = IndirectArgumentBuffers::new(device, config, view_index)?;

        let cpu_views = heaps.cpu.allocate(VIEW_TABLE_SIZE);
        write_views(
            device,
            &cpu_views,
            &[
                structured_view::<GpuViewConstants>(&constant_buffer, BufferViewKind::Constant),
                structured_view::<GpuCullingInfo>(&culling_info_buffer, BufferViewKind::Constant),
                structured_view::<u32>(indirect.argument_buffer(), BufferViewKind::UnorderedAccess),
                structured_view::<u32>(indirect.count_buffer(), BufferViewKind::UnorderedAccess),
                structured_view::<GpuDrawSubInfo>(indirect.sub_info_buffer(), BufferViewKind::UnorderedAccess),
            ],
        )?;
        let table = heaps.gpu.allocate(VIEW_TABLE_SIZE);
        device.copy_descriptors(VIEW_TABLE_SIZE, cpu_views.cpu, table.cpu)?;

        Ok(Self {
            view_index,
            constant_buffer,
            culling_info_buffer,
            indirect,
            cpu_views,
            table,
            render_target: heaps.rtv.allocate(1),
            depth_stencil: heaps.dsv.allocate(1),
        })
    }

    /// Enqueues this frame's camera constants.
    pub fn upload_constants(&self, uploads: &mut UploadQueue, view: &View) {
        uploads.enqueue_update::<GpuViewConstants>(&self.constant_buffer, 0, 1)[0] = view_constants(view);
    }

    /// Enqueues this frame's culling constants.
    pub fn upload_culling_info(&self, uploads: &mut UploadQueue, reserved: u32, pipeline_set_count: u32) {
        uploads.enqueue_update::<GpuCullingInfo>(&self.culling_info_buffer, 0, 1)[0] = GpuCullingInfo {
            mesh_instance_reserved_count: reserved,
            pipeline_set_count,
            indirect_argument_capacity: self.indirect.capacity(),
            ..GpuCullingInfo::default()
        };
    }

    /// Index of the view.
    pub fn view_index(&self) -> usize {
        self.view_index
    }

    /// The camera constant buffer.
    pub fn constant_buffer(&self) -> &GpuBuffer {
        &self.constant_buffer
    }

    /// The culling constant buffer.
    pub fn culling_info_buffer(&self) -> &GpuBuffer {
        &self.culling_info_buffer
    }

    /// The indirect draw buffers.
    pub fn indirect(&self) -> &IndirectArgumentBuffers {
        &self.indirect
    }

    /// The shader-visible table.
    pub fn table(&self) -> &DescriptorRange {
        &self.table
    }

    /// Color target descriptor of the view.
    pub fn render_target(&self) -> CpuDescriptorHandle {
        self.render_target.cpu
    }

    /// Depth target descriptor of the view.
    pub fn depth_stencil(&self) -> CpuDescriptorHandle {
        self.depth_stencil.cpu
    }

    /// Releases the buffers and every descriptor range.
    pub fn destroy(self, device: &dyn GraphicsDevice, heaps: ViewHeaps<'_>) {
        heaps.cpu.free(self.cpu_views);
        heaps.gpu.free(self.table);
        heaps.rtv.free(self.render_target);
        heaps.dsv.free(self.depth_stencil);
        self.constant_buffer.destroy(device);
        self.culling_info_buffer.destroy(device);
        self.indirect.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{read_rows, Harness};
    use approx::assert_relative_eq;
    use vela_core::math::Vec3;

    #[test]
    fn test_table_exposes_constants_then_indirect_buffers() {
        let mut h = Harness::new();
        let view = h.view_resources(0);
        let table = view.table();
        let constants = h.device.buffer_view_at(table.get(0).gpu.unwrap()).unwrap();
        assert_eq!(constants.buffer, view.constant_buffer().id);
        assert_eq!(constants.kind, BufferViewKind::Constant);
        let counts = h.device.buffer_view_at(table.get(3).gpu.unwrap()).unwrap();
        assert_eq!(counts.buffer, view.indirect().count_buffer().id);
        assert_eq!(counts.element_count, h.config.max_pipeline_sets);
    }

    #[test]
    fn test_constants_follow_the_camera() {
        let mut h = Harness::new();
        let resources = h.view_resources(1);
        let mut view = View {
            enabled: true,
            width: 640,
            height: 480,
            camera_position: Vec3::new(0.0, 0.0, 5.0),
            ..View::default()
        };
        view.look_at(view.camera_position, Vec3::ZERO);

        h.uploads.begin_frame(0);
        resources.upload_constants(&mut h.uploads, &view);
        resources.upload_culling_info(&mut h.uploads, 7, 2);
        h.flush();

        let constants: Vec<GpuViewConstants> = read_rows(&h.device, resources.constant_buffer());
        assert_eq!(constants[0].width, 640);
        assert_relative_eq!(constants[0].camera_position.z, 5.0);
        assert_relative_eq!(constants[0].lod_scale, 1.0 / (std::f32::consts::FRAC_PI_8).tan());
        let info: Vec<GpuCullingInfo> = read_rows(&h.device, resources.culling_info_buffer());
        assert_eq!(info[0].mesh_instance_reserved_count, 7);
        assert_eq!(info[0].indirect_argument_capacity, h.config.indirect_argument_capacity);
    }

    #[test]
    fn test_each_view_owns_its_render_target_slots() {
        let mut h = Harness::new();
        let first = h.view_resources(0);
        let second = h.view_resources(1);
        assert_ne!(first.render_target(), second.render_target());
        assert_ne!(first.depth_stencil(), second.depth_stencil());
        assert_eq!(first.render_target(), h.rtv_descriptors.heap().cpu_start);
        assert_eq!(h.rtv_descriptors.allocated(), 2);

        h.destroy_view(second);
        h.destroy_view(first);
        assert_eq!(h.rtv_descriptors.allocated(), 0);
        assert_eq!(h.dsv_descriptors.allocated(), 0);
        assert_eq!(h.cpu_descriptors.allocated(), 0);
        assert_eq!(h.gpu_descriptors.allocated(), 0);
    }
}
