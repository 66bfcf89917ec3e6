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

//! Arena allocation of descriptor ranges inside fixed-size heaps.

use crate::allocators::{VirtualAllocation, VirtualAllocator};
use vela_core::renderer::{
    CpuDescriptorHandle, DescriptorHeapDescriptor, DescriptorHeapId, DescriptorHeapInfo,
    DescriptorHeapType, GpuDescriptorHandle, GraphicsDevice, RendererConfig, ResourceError,
};

/// One descriptor inside a [`DescriptorRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// Address used to write the view.
    pub cpu: CpuDescriptorHandle,
    /// Address used to bind the view, for shader-visible heaps.
    pub gpu: Option<GpuDescriptorHandle>,
}

/// A contiguous block of descriptors. Freed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    /// First descriptor, CPU side.
    pub cpu: CpuDescriptorHandle,
    /// First descriptor, GPU side (shader-visible heaps only).
    pub gpu: Option<GpuDescriptorHandle>,
    /// Number of descriptors.
    pub count: u32,
    /// Byte stride between two descriptors.
    pub increment: u32,
    allocation: VirtualAllocation,
}

impl DescriptorRange {
    /// The `index`-th descriptor of the range.
    ///
    /// # Panics
    ///
    /// Panics when `index >= count`.
    pub fn get(&self, index: u32) -> DescriptorHandle {
        assert!(
            index < self.count,
            "DescriptorRange: index {index} out of range (count {})",
            self.count
        );
        DescriptorHandle {
            cpu: self.cpu.offset(index, self.increment),
            gpu: self.gpu.map(|gpu| gpu.offset(index, self.increment)),
        }
    }

    /// GPU address of the first descriptor, used to bind the range as a table.
    ///
    /// # Panics
    ///
    /// Panics when the range comes from a CPU-only heap.
    pub fn gpu_table(&self) -> GpuDescriptorHandle {
        match self.gpu {
            Some(gpu) => gpu,
            None => panic!("DescriptorRange: range at {:?} is not shader visible", self.cpu),
        }
    }

    /// Offset of the first descriptor inside its heap.
    pub fn heap_offset(&self) -> u32 {
        self.allocation.offset
    }
}

/// Hands out descriptor ranges from one heap.
#[derive(Debug)]
pub struct DescriptorAllocator {
    heap: DescriptorHeapInfo,
    ranges: VirtualAllocator,
}

impl DescriptorAllocator {
    /// Creates the heap on `device` and an empty arena over it.
    pub fn new(
        device: &dyn GraphicsDevice,
        descriptor: &DescriptorHeapDescriptor,
    ) -> Result<Self, ResourceError> {
        let heap = device.create_descriptor_heap(descriptor)?;
        log::debug!(
            "Descriptor heap {:?} ({:?}) created with {} descriptors",
            descriptor.label,
            descriptor.heap_type,
            descriptor.descriptor_count
        );
        Ok(Self {
            heap,
            ranges: VirtualAllocator::new(descriptor.descriptor_count),
        })
    }

    /// Reserves `count` contiguous descriptors (first fit).
    ///
    /// # Panics
    ///
    /// Panics when the heap has no free block of `count` descriptors.
    pub fn allocate(&mut self, count: u32) -> DescriptorRange {
        let allocation = self.ranges.allocate(count);
        DescriptorRange {
            cpu: self.heap.cpu_start.offset(allocation.offset, self.heap.increment),
            gpu: self
                .heap
                .gpu_start
                .map(|gpu| gpu.offset(allocation.offset, self.heap.increment)),
            count,
            increment: self.heap.increment,
            allocation,
        }
    }

    /// Returns a whole range to the arena.
    pub fn free(&mut self, range: DescriptorRange) {
        self.ranges.free(range.allocation);
    }

    /// Descriptors currently handed out.
    pub fn allocated(&self) -> u32 {
        self.ranges.allocated()
    }

    /// The heap backing this allocator.
    pub fn heap(&self) -> &DescriptorHeapInfo {
        &self.heap
    }

    /// Destroys the heap. Outstanding ranges become dangling.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_descriptor_heap(self.heap.id) {
            log::warn!("Failed to destroy descriptor heap {:?}: {}", self.heap.id, e);
        }
    }

    /// Identifier of the backing heap.
    pub fn heap_id(&self) -> DescriptorHeapId {
        self.heap.id
    }
}

/// The four heaps the renderer uses.
#[derive(Debug)]
pub struct DescriptorAllocatorGroup {
    /// CBV/SRV/UAV staging heap, not shader visible.
    pub srv_cbv_uav_cpu: DescriptorAllocator,
    /// CBV/SRV/UAV heap bound to shaders.
    pub srv_cbv_uav_gpu: DescriptorAllocator,
    /// Render target views.
    pub rtv: DescriptorAllocator,
    /// Depth stencil views.
    pub dsv: DescriptorAllocator,
}

impl DescriptorAllocatorGroup {
    /// Creates every heap with the sizes from `config`.
    pub fn new(device: &dyn GraphicsDevice, config: &RendererConfig) -> Result<Self, ResourceError> {
        let heap = |label, heap_type, descriptor_count, shader_visible| DescriptorHeapDescriptor {
            label: Some(label),
            heap_type,
            descriptor_count,
            shader_visible,
        };
        Ok(Self {
            rtv: DescriptorAllocator::new(
                device,
                &heap("DescriptorHeapRtv", DescriptorHeapType::Rtv, config.rtv_descriptor_count, false),
            )?,
            dsv: DescriptorAllocator::new(
                device,
                &heap("DescriptorHeapDsv", DescriptorHeapType::Dsv, config.dsv_descriptor_count, false),
            )?,
            srv_cbv_uav_cpu: DescriptorAllocator::new(
                device,
                &heap(
                    "DescriptorHeapSrvCbvUavCpu",
                    DescriptorHeapType::CbvSrvUav,
                    config.cpu_descriptor_count,
                    false,
                ),
            )?,
            srv_cbv_uav_gpu: DescriptorAllocator::new(
                device,
                &heap(
                    "DescriptorHeapSrvCbvUavGpu",
                    DescriptorHeapType::CbvSrvUav,
                    config.gpu_descriptor_count,
                    true,
                ),
            )?,
        })
    }

    /// Destroys every heap.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        self.srv_cbv_uav_cpu.destroy(device);
        self.srv_cbv_uav_gpu.destroy(device);
        self.rtv.destroy(device);
        self.dsv.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_infra::headless::HeadlessDevice;

    fn gpu_heap(device: &HeadlessDevice, count: u32) -> DescriptorAllocator {
        DescriptorAllocator::new(
            device,
            &DescriptorHeapDescriptor {
                label: Some("test"),
                heap_type: DescriptorHeapType::CbvSrvUav,
                descriptor_count: count,
                shader_visible: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_allocate_free_allocate_returns_same_range() {
        let device = HeadlessDevice::new();
        let mut allocator = gpu_heap(&device, 32);
        let first = allocator.allocate(4);
        allocator.free(first);
        let second = allocator.allocate(4);
        assert_eq!(first, second);
        assert_eq!(second.heap_offset(), 0);
    }

    #[test]
    fn test_range_handles_are_strided() {
        let device = HeadlessDevice::new();
        let mut allocator = gpu_heap(&device, 32);
        let _pad = allocator.allocate(1);
        let range = allocator.allocate(3);
        let increment = allocator.heap().increment;
        let start = allocator.heap().cpu_start;
        assert_eq!(range.get(0).cpu, start.offset(1, increment));
        assert_eq!(range.get(2).cpu, start.offset(3, increment));
        assert!(range.get(2).gpu.is_some());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_range_index_is_checked() {
        let device = HeadlessDevice::new();
        let mut allocator = gpu_heap(&device, 8);
        allocator.allocate(2).get(2);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_exhaustion_is_fatal() {
        let device = HeadlessDevice::new();
        let mut allocator = gpu_heap(&device, 4);
        allocator.allocate(3);
        allocator.allocate(2);
    }

    #[test]
    fn test_group_creates_and_destroys_four_heaps() {
        let device = HeadlessDevice::new();
        let group = DescriptorAllocatorGroup::new(&device, &RendererConfig::default()).unwrap();
        assert!(group.srv_cbv_uav_gpu.heap().gpu_start.is_some());
        assert!(group.srv_cbv_uav_cpu.heap().gpu_start.is_none());
        assert_eq!(device.live_descriptor_heap_count(), 4);
        group.destroy(&device);
        assert_eq!(device.live_descriptor_heap_count(), 0);
    }
}
