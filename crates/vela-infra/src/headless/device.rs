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

use super::command::{HeadlessCommandEncoder, RecordedCommand};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vela_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, BufferViewDescriptor, CommandBufferId,
    CommandEncoder, ComputePipelineDescriptor, ComputePipelineId, CpuDescriptorHandle,
    DescriptorHeapDescriptor, DescriptorHeapId, DescriptorHeapInfo, DescriptorHeapType, FenceValue,
    GpuDescriptorHandle, GraphicsDevice, GraphicsPipelineDescriptor, GraphicsPipelineId,
    ResourceError, ResourceState,
};

/// Byte distance between two descriptors of a headless heap.
const DESCRIPTOR_INCREMENT: u32 = 32;

/// Callback run in place of a compute shader.
pub type DispatchHook = Box<dyn FnMut(&mut DispatchContext<'_>) + Send>;

#[derive(Debug)]
pub(crate) struct HeadlessBufferEntry {
    label: String,
    usage: BufferUsage,
    state: ResourceState,
    data: Vec<u8>,
}

#[derive(Debug)]
struct HeadlessHeapEntry {
    heap_type: DescriptorHeapType,
    base: u64,
    descriptor_count: u32,
}

impl HeadlessHeapEntry {
    fn contains(&self, address: u64) -> bool {
        let end = self.base + self.descriptor_count as u64 * DESCRIPTOR_INCREMENT as u64;
        (self.base..end).contains(&address)
    }
}

/// Buffers reachable from a [`DispatchHook`].
pub struct DispatchContext<'a> {
    groups: [u32; 3],
    buffers: &'a mut HashMap<BufferId, HeadlessBufferEntry>,
}

impl DispatchContext<'_> {
    /// Thread groups of the dispatch.
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }

    /// Contents of the buffer created with `label`.
    pub fn buffer_mut(&mut self, label: &str) -> Option<&mut [u8]> {
        self.buffers
            .values_mut()
            .find(|entry| entry.label == label)
            .map(|entry| entry.data.as_mut_slice())
    }
}

/// Shared state of a [`HeadlessDevice`].
pub struct HeadlessDeviceInternal {
    buffers: Mutex<HashMap<BufferId, HeadlessBufferEntry>>,
    heaps: Mutex<HashMap<DescriptorHeapId, HeadlessHeapEntry>>,
    views: Mutex<HashMap<u64, BufferViewDescriptor>>,
    compute_pipelines: Mutex<HashMap<ComputePipelineId, String>>,
    graphics_pipelines: Mutex<HashMap<GraphicsPipelineId, String>>,
    pending_command_lists: Mutex<HashMap<CommandBufferId, Vec<RecordedCommand>>>,
    submitted: Mutex<Vec<RecordedCommand>>,
    hooks: Mutex<HashMap<String, DispatchHook>>,

    next_buffer_id: AtomicUsize,
    next_heap_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_command_list_id: AtomicU64,
    last_fence_value: AtomicU64,
}

impl fmt::Debug for HeadlessDeviceInternal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDeviceInternal")
            .field("next_buffer_id", &self.next_buffer_id)
            .field("last_fence_value", &self.last_fence_value)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn backend_error(message: String) -> ResourceError {
    log::error!("{message}");
    ResourceError::BackendError(message)
}

impl HeadlessDeviceInternal {
    pub(super) fn store_command_list(&self, encoder: HeadlessCommandEncoder) -> CommandBufferId {
        let id = CommandBufferId(self.next_command_list_id.fetch_add(1, Ordering::Relaxed));
        log::trace!(
            "Command list {:?} ({}) closed with {} commands",
            id,
            encoder.label.as_deref().unwrap_or("unlabeled"),
            encoder.commands.len()
        );
        lock(&self.pending_command_lists).insert(id, encoder.commands);
        id
    }

    fn execute(&self, command: &RecordedCommand) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.buffers);
        match command {
            RecordedCommand::CopyBufferToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let (src_start, dst_start) = (*source_offset as usize, *destination_offset as usize);
                let len = *size as usize;
                let bytes = {
                    let src = buffers.get(source).ok_or(ResourceError::NotFound)?;
                    if !matches!(src.state, ResourceState::CopySource | ResourceState::GenericRead) {
                        return Err(backend_error(format!(
                            "copy from '{}' in state {:?}",
                            src.label, src.state
                        )));
                    }
                    src.data
                        .get(src_start..src_start + len)
                        .ok_or(ResourceError::OutOfBounds)?
                        .to_vec()
                };
                let dst = buffers.get_mut(destination).ok_or(ResourceError::NotFound)?;
                if dst.state != ResourceState::CopyDest {
                    return Err(backend_error(format!(
                        "copy into '{}' in state {:?}",
                        dst.label, dst.state
                    )));
                }
                dst.data
                    .get_mut(dst_start..dst_start + len)
                    .ok_or(ResourceError::OutOfBounds)?
                    .copy_from_slice(&bytes);
            }
            RecordedCommand::ClearBufferU32 {
                buffer,
                offset,
                size,
                value,
            } => {
                let entry = buffers.get_mut(buffer).ok_or(ResourceError::NotFound)?;
                if !matches!(entry.state, ResourceState::UnorderedAccess | ResourceState::CopyDest) {
                    return Err(backend_error(format!(
                        "clear of '{}' in state {:?}",
                        entry.label, entry.state
                    )));
                }
                let start = *offset as usize;
                let range = entry
                    .data
                    .get_mut(start..start + *size as usize)
                    .ok_or(ResourceError::OutOfBounds)?;
                for word in range.chunks_mut(4) {
                    word.copy_from_slice(&value.to_le_bytes()[..word.len()]);
                }
            }
            RecordedCommand::Barriers(barriers) => {
                for barrier in barriers {
                    let entry = buffers.get_mut(&barrier.buffer).ok_or(ResourceError::NotFound)?;
                    if entry.state != barrier.before {
                        return Err(backend_error(format!(
                            "barrier {:?} -> {:?} on '{}' which is in state {:?}",
                            barrier.before, barrier.after, entry.label, entry.state
                        )));
                    }
                    entry.state = barrier.after;
                }
            }
            RecordedCommand::Dispatch {
                pipeline: Some(pipeline),
                groups,
            } => {
                let shader = lock(&self.compute_pipelines).get(pipeline).cloned();
                if let Some(shader) = shader {
                    if let Some(hook) = lock(&self.hooks).get_mut(&shader) {
                        hook(&mut DispatchContext {
                            groups: *groups,
                            buffers: &mut buffers,
                        });
                    }
                }
            }
            RecordedCommand::SetRenderTargets {
                render_targets,
                depth_stencil,
            } => {
                let heaps = lock(&self.heaps);
                let targets = render_targets
                    .iter()
                    .map(|handle| (handle, DescriptorHeapType::Rtv))
                    .chain(depth_stencil.iter().map(|handle| (handle, DescriptorHeapType::Dsv)));
                for (handle, heap_type) in targets {
                    if !heaps
                        .values()
                        .any(|heap| heap.heap_type == heap_type && heap.contains(handle.0))
                    {
                        return Err(backend_error(format!(
                            "render target {handle:?} is not in a live {heap_type:?} heap"
                        )));
                    }
                }
            }
            RecordedCommand::ExecuteIndirect { draw, .. } => {
                for id in [draw.argument_buffer, draw.count_buffer] {
                    let entry = buffers.get(&id).ok_or(ResourceError::NotFound)?;
                    if entry.state != ResourceState::IndirectArgument {
                        return Err(backend_error(format!(
                            "indirect draw reads '{}' in state {:?}",
                            entry.label, entry.state
                        )));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The headless [`GraphicsDevice`]. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// A device with no resources.
    pub fn new() -> Self {
        log::info!("Headless graphics device created");
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                buffers: Mutex::new(HashMap::new()),
                heaps: Mutex::new(HashMap::new()),
                views: Mutex::new(HashMap::new()),
                compute_pipelines: Mutex::new(HashMap::new()),
                graphics_pipelines: Mutex::new(HashMap::new()),
                pending_command_lists: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
                hooks: Mutex::new(HashMap::new()),
                next_buffer_id: AtomicUsize::new(0),
                next_heap_id: AtomicUsize::new(0),
                next_pipeline_id: AtomicUsize::new(0),
                next_command_list_id: AtomicU64::new(0),
                last_fence_value: AtomicU64::new(0),
            }),
        }
    }

    /// Runs `hook` in place of every dispatch of compute shader `shader`.
    pub fn set_dispatch_hook(&self, shader: &str, hook: DispatchHook) {
        lock(&self.internal.hooks).insert(shader.to_owned(), hook);
    }

    /// Current bytes of a buffer. Empty for an unknown id.
    pub fn buffer_contents(&self, id: BufferId) -> Vec<u8> {
        lock(&self.internal.buffers)
            .get(&id)
            .map(|entry| entry.data.clone())
            .unwrap_or_default()
    }

    /// Tracked state of a buffer.
    pub fn buffer_state(&self, id: BufferId) -> Option<ResourceState> {
        lock(&self.internal.buffers).get(&id).map(|entry| entry.state)
    }

    /// The live buffer created with `label`.
    pub fn buffer_by_label(&self, label: &str) -> Option<BufferId> {
        lock(&self.internal.buffers)
            .iter()
            .find(|(_, entry)| entry.label == label)
            .map(|(id, _)| *id)
    }

    /// Live buffers.
    pub fn live_buffer_count(&self) -> usize {
        lock(&self.internal.buffers).len()
    }

    /// Live descriptor heaps.
    pub fn live_descriptor_heap_count(&self) -> usize {
        lock(&self.internal.heaps).len()
    }

    /// Live compute and graphics pipelines.
    pub fn live_pipeline_count(&self) -> usize {
        lock(&self.internal.compute_pipelines).len() + lock(&self.internal.graphics_pipelines).len()
    }

    /// The buffer view written at `handle`, directly or by a copy.
    pub fn buffer_view_at(&self, handle: GpuDescriptorHandle) -> Option<BufferViewDescriptor> {
        lock(&self.internal.views).get(&handle.0).copied()
    }

    /// Every command submitted so far, in execution order.
    pub fn submitted_commands(&self) -> Vec<RecordedCommand> {
        lock(&self.internal.submitted).clone()
    }

    /// Like [`Self::submitted_commands`], forgetting them.
    pub fn take_submitted_commands(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut *lock(&self.internal.submitted))
    }

    fn next_pipeline_id(&self) -> usize {
        self.internal.next_pipeline_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        let label = descriptor
            .label
            .as_deref()
            .unwrap_or("unlabeled")
            .to_owned();
        log::trace!("Buffer {id:?} '{label}' created with {} bytes", descriptor.size);
        lock(&self.internal.buffers).insert(
            id,
            HeadlessBufferEntry {
                label,
                usage: descriptor.usage,
                state: descriptor.initial_state,
                data: vec![0; descriptor.size as usize],
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        lock(&self.internal.buffers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers);
        let entry = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        if !entry.usage.contains(BufferUsage::MAP_WRITE) {
            return Err(backend_error(format!("'{}' is not CPU writable", entry.label)));
        }
        let start = offset as usize;
        entry
            .data
            .get_mut(start..start + data.len())
            .ok_or(ResourceError::OutOfBounds)?
            .copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, data: &mut [u8]) -> Result<(), ResourceError> {
        let buffers = lock(&self.internal.buffers);
        let entry = buffers.get(&id).ok_or(ResourceError::NotFound)?;
        if !entry.usage.contains(BufferUsage::MAP_READ) {
            return Err(backend_error(format!("'{}' is not CPU readable", entry.label)));
        }
        let start = offset as usize;
        data.copy_from_slice(
            entry
                .data
                .get(start..start + data.len())
                .ok_or(ResourceError::OutOfBounds)?,
        );
        Ok(())
    }

    fn create_descriptor_heap(
        &self,
        descriptor: &DescriptorHeapDescriptor,
    ) -> Result<DescriptorHeapInfo, ResourceError> {
        let id = DescriptorHeapId(self.internal.next_heap_id.fetch_add(1, Ordering::Relaxed));
        // Heaps get disjoint address ranges so a handle identifies its heap.
        let base = (id.0 as u64 + 1) << 32;
        lock(&self.internal.heaps).insert(
            id,
            HeadlessHeapEntry {
                heap_type: descriptor.heap_type,
                base,
                descriptor_count: descriptor.descriptor_count,
            },
        );
        Ok(DescriptorHeapInfo {
            id,
            cpu_start: CpuDescriptorHandle(base),
            gpu_start: descriptor.shader_visible.then_some(GpuDescriptorHandle(base)),
            increment: DESCRIPTOR_INCREMENT,
        })
    }

    fn destroy_descriptor_heap(&self, id: DescriptorHeapId) -> Result<(), ResourceError> {
        let heap = lock(&self.internal.heaps)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        lock(&self.internal.views).retain(|address, _| !heap.contains(*address));
        Ok(())
    }

    fn create_buffer_view(
        &self,
        descriptor: &BufferViewDescriptor,
        destination: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        if !lock(&self.internal.buffers).contains_key(&descriptor.buffer) {
            return Err(ResourceError::NotFound);
        }
        lock(&self.internal.views).insert(destination.0, *descriptor);
        Ok(())
    }

    fn copy_descriptors(
        &self,
        count: u32,
        source: CpuDescriptorHandle,
        destination: CpuDescriptorHandle,
    ) -> Result<(), ResourceError> {
        let mut views = lock(&self.internal.views);
        for i in 0..count {
            let from = source.offset(i, DESCRIPTOR_INCREMENT).0;
            let to = destination.offset(i, DESCRIPTOR_INCREMENT).0;
            match views.get(&from).copied() {
                Some(view) => {
                    views.insert(to, view);
                }
                None => {
                    views.remove(&to);
                }
            }
        }
        Ok(())
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let id = ComputePipelineId(self.next_pipeline_id());
        lock(&self.internal.compute_pipelines).insert(id, descriptor.shader.to_string());
        Ok(id)
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GraphicsPipelineId, ResourceError> {
        let id = GraphicsPipelineId(self.next_pipeline_id());
        lock(&self.internal.graphics_pipelines).insert(id, descriptor.vertex_shader.to_string());
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        lock(&self.internal.compute_pipelines)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn destroy_graphics_pipeline(&self, id: GraphicsPipelineId) -> Result<(), ResourceError> {
        lock(&self.internal.graphics_pipelines)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder::new(Arc::clone(&self.internal), label))
    }

    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, ResourceError> {
        let commands = lock(&self.internal.pending_command_lists)
            .remove(&command_buffer)
            .ok_or(ResourceError::InvalidHandle)?;
        for command in &commands {
            self.internal.execute(command)?;
        }
        lock(&self.internal.submitted).extend(commands);
        // Execution is synchronous, so the fence is complete on return.
        Ok(self.internal.last_fence_value.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn completed_fence_value(&self) -> FenceValue {
        self.internal.last_fence_value.load(Ordering::Acquire)
    }

    fn wait_for_fence(&self, value: FenceValue) {
        debug_assert!(value <= self.completed_fence_value());
    }

    fn wait_idle(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::renderer::{BufferBarrier, BufferViewKind, ComputePipelineDescriptor};

    #[test]
    fn test_copy_requires_copy_states() {
        let device = HeadlessDevice::new();
        let upload = device.create_buffer(&BufferDescriptor::upload("up", 16)).unwrap();
        let target = device
            .create_buffer(&BufferDescriptor::structured("target", 16))
            .unwrap();
        device.write_buffer(upload, 0, &[9; 16]).unwrap();

        let mut encoder = device.create_command_encoder(None);
        encoder.copy_buffer_to_buffer(upload, 0, target, 0, 16);
        let err = device.submit(encoder.finish()).unwrap_err();
        assert!(err.to_string().contains("in state ShaderResource"));

        let mut encoder = device.create_command_encoder(None);
        let enter = BufferBarrier::transition(target, ResourceState::ShaderResource, ResourceState::CopyDest);
        encoder.resource_barriers(&[enter]);
        encoder.copy_buffer_to_buffer(upload, 0, target, 0, 16);
        encoder.resource_barriers(&[enter.reversed()]);
        let fence = device.submit(encoder.finish()).unwrap();
        assert_eq!(device.completed_fence_value(), fence);
        assert_eq!(device.buffer_contents(target), vec![9; 16]);
        assert_eq!(device.buffer_state(target), Some(ResourceState::ShaderResource));
    }

    #[test]
    fn test_barrier_from_wrong_state_fails() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::structured("b", 4))
            .unwrap();
        let mut encoder = device.create_command_encoder(None);
        encoder.resource_barriers(&[BufferBarrier::transition(
            buffer,
            ResourceState::UnorderedAccess,
            ResourceState::ShaderResource,
        )]);
        assert!(device.submit(encoder.finish()).is_err());
    }

    #[test]
    fn test_clear_fills_words() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::unordered_access("counts", 12))
            .unwrap();
        let mut encoder = device.create_command_encoder(None);
        encoder.clear_buffer_u32(buffer, 4, 8, u32::MAX);
        device.submit(encoder.finish()).unwrap();
        assert_eq!(
            device.buffer_contents(buffer),
            [vec![0; 4], vec![0xFF; 8]].concat()
        );
    }

    #[test]
    fn test_dispatch_runs_hook_for_its_shader() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::unordered_access("out", 4))
            .unwrap();
        let pipeline = device
            .create_compute_pipeline(&ComputePipelineDescriptor::new("write_groups", 1))
            .unwrap();
        device.set_dispatch_hook(
            "write_groups",
            Box::new(|ctx: &mut DispatchContext<'_>| {
                let groups = ctx.groups()[0];
                if let Some(out) = ctx.buffer_mut("out") {
                    out.copy_from_slice(&groups.to_le_bytes());
                }
            }),
        );
        let mut encoder = device.create_command_encoder(None);
        encoder.set_compute_pipeline(pipeline);
        encoder.dispatch(7, 1, 1);
        device.submit(encoder.finish()).unwrap();
        assert_eq!(device.buffer_contents(buffer), 7u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_copied_descriptors_resolve_to_views() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor::structured("table", 64))
            .unwrap();
        let cpu = device
            .create_descriptor_heap(&DescriptorHeapDescriptor {
                label: None,
                heap_type: vela_core::renderer::DescriptorHeapType::CbvSrvUav,
                descriptor_count: 4,
                shader_visible: false,
            })
            .unwrap();
        let gpu = device
            .create_descriptor_heap(&DescriptorHeapDescriptor {
                label: None,
                heap_type: vela_core::renderer::DescriptorHeapType::CbvSrvUav,
                descriptor_count: 4,
                shader_visible: true,
            })
            .unwrap();
        let view = BufferViewDescriptor {
            buffer,
            kind: BufferViewKind::ShaderResource,
            first_element: 0,
            element_count: 16,
            element_stride: 4,
        };
        device.create_buffer_view(&view, cpu.cpu_start).unwrap();
        device.copy_descriptors(1, cpu.cpu_start, gpu.cpu_start).unwrap();
        let table = gpu.gpu_start.unwrap();
        assert_eq!(device.buffer_view_at(table), Some(view));

        device.destroy_descriptor_heap(gpu.id).unwrap();
        assert_eq!(device.buffer_view_at(table), None);
    }

    #[test]
    fn test_render_targets_must_come_from_target_heaps() {
        let device = HeadlessDevice::new();
        let heap = |heap_type| {
            device
                .create_descriptor_heap(&DescriptorHeapDescriptor {
                    label: None,
                    heap_type,
                    descriptor_count: 2,
                    shader_visible: false,
                })
                .unwrap()
        };
        let rtv = heap(DescriptorHeapType::Rtv);
        let dsv = heap(DescriptorHeapType::Dsv);

        let mut encoder = device.create_command_encoder(None);
        encoder.set_render_targets(&[rtv.cpu_start], Some(dsv.cpu_start));
        device.submit(encoder.finish()).unwrap();
        assert_eq!(
            device.take_submitted_commands(),
            vec![RecordedCommand::SetRenderTargets {
                render_targets: vec![rtv.cpu_start],
                depth_stencil: Some(dsv.cpu_start),
            }]
        );

        // A depth descriptor bound as a color target.
        let mut encoder = device.create_command_encoder(None);
        encoder.set_render_targets(&[dsv.cpu_start], None);
        let err = device.submit(encoder.finish()).unwrap_err();
        assert!(err.to_string().contains("Rtv"));
    }
}
