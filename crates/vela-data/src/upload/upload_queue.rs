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

//! Batches CPU writes into device-local buffers.
//!
//! Writes are staged in a ring over one upload buffer and turned into copy
//! commands once per frame by [`UploadQueue::resolve`]. The ring never
//! overwrites bytes of a frame the GPU may still be copying from.

use bytemuck::Pod;
use vela_core::renderer::{
    align_up, BufferBarrier, BufferDescriptor, CommandEncoder, GpuBuffer, GraphicsDevice,
    RendererConfig, ResourceError, ResourceState, BACK_BUFFER_COUNT,
};

/// Alignment of every staging allocation, in bytes.
pub const STAGING_ALIGNMENT: u64 = 16;

#[derive(Debug, Clone, Copy)]
struct StagingHeader {
    destination: GpuBuffer,
    destination_offset: u64,
    size: u64,
    staging_offset: u64,
}

#[derive(Debug, Clone, Copy)]
struct CopyHeader {
    source: GpuBuffer,
    source_offset: u64,
    destination: GpuBuffer,
    destination_offset: u64,
    size: u64,
}

/// What a [`UploadQueue::resolve`] recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Copies from the staging ring.
    pub staged_copies: u32,
    /// Buffer-to-buffer copies.
    pub buffer_copies: u32,
    /// Bytes moved through the staging ring.
    pub staged_bytes: u64,
}

/// Tracks the state of every buffer touched by one resolve.
#[derive(Default)]
struct BufferStates {
    tracked: Vec<(GpuBuffer, ResourceState)>,
    pending: Vec<BufferBarrier>,
}

impl BufferStates {
    fn require(&mut self, buffer: &GpuBuffer, state: ResourceState) {
        let slot = match self.tracked.iter().position(|(b, _)| b.id == buffer.id) {
            Some(slot) => slot,
            None => {
                self.tracked.push((*buffer, buffer.resting_state));
                self.tracked.len() - 1
            }
        };
        let current = self.tracked[slot].1;
        if current != state {
            self.pending
                .push(BufferBarrier::transition(buffer.id, current, state));
            self.tracked[slot].1 = state;
        }
    }

    fn flush(&mut self, encoder: &mut dyn CommandEncoder) {
        if !self.pending.is_empty() {
            encoder.resource_barriers(&self.pending);
            self.pending.clear();
        }
    }

    fn restore(&mut self, encoder: &mut dyn CommandEncoder) {
        for (buffer, current) in &mut self.tracked {
            if *current != buffer.resting_state {
                self.pending.push(BufferBarrier::transition(
                    buffer.id,
                    *current,
                    buffer.resting_state,
                ));
                *current = buffer.resting_state;
            }
        }
        self.flush(encoder);
    }
}

/// The per-frame upload batcher.
#[derive(Debug)]
pub struct UploadQueue {
    staging: GpuBuffer,
    // CPU image of the upload buffer. u64 storage keeps every 16-byte aligned
    // offset suitably aligned for the Pod types written through it.
    shadow: Vec<u64>,
    head: u64,
    tail: u64,
    frame_starts: [u64; BACK_BUFFER_COUNT],
    staging_headers: Vec<StagingHeader>,
    copy_headers: Vec<CopyHeader>,
    max_headers: usize,
}

impl UploadQueue {
    /// Creates the upload buffer sized from `config`.
    pub fn new(device: &dyn GraphicsDevice, config: &RendererConfig) -> Result<Self, ResourceError> {
        let size = align_up(config.staging_buffer_size, STAGING_ALIGNMENT);
        let staging = GpuBuffer::create(device, &BufferDescriptor::upload("UploadQueueStaging", size))?;
        log::info!("Upload queue created with a {} KiB staging ring", size / 1024);
        Ok(Self {
            staging,
            shadow: vec![0; (size / 8) as usize],
            head: 0,
            tail: 0,
            frame_starts: [0; BACK_BUFFER_COUNT],
            staging_headers: Vec::with_capacity(config.max_upload_headers as usize),
            copy_headers: Vec::new(),
            max_headers: config.max_upload_headers as usize,
        })
    }

    /// Marks the start of frame slot `frame_index`.
    ///
    /// Staging bytes of the oldest frame still in flight, slot
    /// `frame_index + 1`, are protected until that slot begins again.
    pub fn begin_frame(&mut self, frame_index: usize) {
        self.frame_starts[frame_index] = self.head;
        self.tail = self.frame_starts[(frame_index + 1) % BACK_BUFFER_COUNT];
    }

    /// Stages a write of `count` elements of `T` starting at element
    /// `first_element` of `destination`, and returns the zeroed staging slice
    /// to fill in.
    ///
    /// # Panics
    ///
    /// Panics when the write leaves the buffer, when the ring is full or when
    /// the frame already holds the maximum number of writes.
    pub fn enqueue_update<T: Pod>(
        &mut self,
        destination: &GpuBuffer,
        first_element: u64,
        count: usize,
    ) -> &mut [T] {
        assert!(
            std::mem::align_of::<T>() <= 8,
            "UploadQueue: element alignment above 8 bytes is not supported"
        );
        let stride = std::mem::size_of::<T>() as u64;
        let bytes = self.enqueue_update_bytes(destination, first_element * stride, count as u64 * stride);
        bytemuck::cast_slice_mut(bytes)
    }

    /// Stages a write of `size` raw bytes at `byte_offset` of `destination`.
    /// Used for partial updates of a larger element.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Self::enqueue_update`].
    pub fn enqueue_update_bytes(
        &mut self,
        destination: &GpuBuffer,
        byte_offset: u64,
        size: u64,
    ) -> &mut [u8] {
        assert!(size > 0, "UploadQueue: empty write to {:?}", destination.id);
        assert!(
            byte_offset + size <= destination.size,
            "UploadQueue: write [{byte_offset}, {}) outside buffer {:?} of {} bytes",
            byte_offset + size,
            destination.id,
            destination.size
        );
        assert!(
            self.staging_headers.len() < self.max_headers,
            "UploadQueue: more than {} writes in one frame",
            self.max_headers
        );

        let staging_offset = self.allocate_staging(size);
        self.staging_headers.push(StagingHeader {
            destination: *destination,
            destination_offset: byte_offset,
            size,
            staging_offset,
        });
        log::trace!(
            "Staged {size} bytes for {:?}+{byte_offset} at ring offset {staging_offset}",
            destination.id
        );

        let start = staging_offset as usize;
        let bytes = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.shadow)[start..start + size as usize];
        bytes.fill(0);
        bytes
    }

    /// Records a GPU-side copy of `size` bytes between two buffers.
    ///
    /// # Panics
    ///
    /// Panics when either range leaves its buffer or the frame is full.
    pub fn enqueue_copy(
        &mut self,
        source: &GpuBuffer,
        source_offset: u64,
        destination: &GpuBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        assert!(size > 0, "UploadQueue: empty copy");
        assert_ne!(
            source.id, destination.id,
            "UploadQueue: copy within one buffer"
        );
        assert!(
            source_offset + size <= source.size && destination_offset + size <= destination.size,
            "UploadQueue: copy of {size} bytes leaves {:?} or {:?}",
            source.id,
            destination.id
        );
        assert!(
            self.copy_headers.len() < self.max_headers,
            "UploadQueue: more than {} copies in one frame",
            self.max_headers
        );
        self.copy_headers.push(CopyHeader {
            source: *source,
            source_offset,
            destination: *destination,
            destination_offset,
            size,
        });
    }

    /// Flushes the staged bytes to the upload buffer and records every copy
    /// of the frame, bracketed by transitions into and out of the copy
    /// states. Resets the frame's writes.
    pub fn resolve(
        &mut self,
        device: &dyn GraphicsDevice,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<UploadStats, ResourceError> {
        let shadow = bytemuck::cast_slice::<u64, u8>(&self.shadow);
        for header in &self.staging_headers {
            let start = header.staging_offset as usize;
            device.write_buffer(
                self.staging.id,
                header.staging_offset,
                &shadow[start..start + header.size as usize],
            )?;
        }

        let mut states = BufferStates::default();
        for header in &self.staging_headers {
            states.require(&header.destination, ResourceState::CopyDest);
        }
        states.flush(encoder);
        for header in &self.staging_headers {
            encoder.copy_buffer_to_buffer(
                self.staging.id,
                header.staging_offset,
                header.destination.id,
                header.destination_offset,
                header.size,
            );
        }

        for header in &self.copy_headers {
            states.require(&header.source, ResourceState::CopySource);
            states.require(&header.destination, ResourceState::CopyDest);
        }
        states.flush(encoder);
        for header in &self.copy_headers {
            encoder.copy_buffer_to_buffer(
                header.source.id,
                header.source_offset,
                header.destination.id,
                header.destination_offset,
                header.size,
            );
        }
        states.restore(encoder);

        let stats = UploadStats {
            staged_copies: self.staging_headers.len() as u32,
            buffer_copies: self.copy_headers.len() as u32,
            staged_bytes: self.staging_headers.iter().map(|h| h.size).sum(),
        };
        if stats.staged_copies + stats.buffer_copies > 0 {
            log::debug!(
                "Upload queue resolved {} staged copies ({} bytes) and {} buffer copies",
                stats.staged_copies,
                stats.staged_bytes,
                stats.buffer_copies
            );
        }
        self.staging_headers.clear();
        self.copy_headers.clear();
        Ok(stats)
    }

    /// Writes staged this frame and not yet resolved.
    pub fn pending_len(&self) -> usize {
        self.staging_headers.len() + self.copy_headers.len()
    }

    /// The upload buffer.
    pub fn staging_buffer(&self) -> &GpuBuffer {
        &self.staging
    }

    /// Releases the upload buffer.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        self.staging.destroy(device);
    }

    fn allocate_staging(&mut self, size: u64) -> u64 {
        let capacity = self.staging.size;
        let aligned = align_up(self.head, STAGING_ALIGNMENT);
        let size_aligned = align_up(size, STAGING_ALIGNMENT);
        let offset = if aligned >= self.tail {
            if aligned + size_aligned <= capacity {
                aligned
            } else if size_aligned < self.tail {
                0
            } else {
                panic!(
                    "UploadQueue: staging ring overflow ({size} bytes requested, ring of {capacity} bytes)"
                );
            }
        } else {
            assert!(
                aligned + size_aligned < self.tail,
                "UploadQueue: staging ring overflow ({size} bytes would overrun a frame in flight)"
            );
            aligned
        };
        self.head = offset + size_aligned;
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_infra::headless::{HeadlessDevice, RecordedCommand};

    fn small_config(staging: u64) -> RendererConfig {
        RendererConfig {
            staging_buffer_size: staging,
            max_upload_headers: 16,
            ..RendererConfig::default()
        }
    }

    fn target(device: &HeadlessDevice, size: u64) -> GpuBuffer {
        GpuBuffer::create(device, &BufferDescriptor::structured("target", size)).unwrap()
    }

    fn flush(queue: &mut UploadQueue, device: &HeadlessDevice) -> UploadStats {
        let mut encoder = device.create_command_encoder(Some("upload"));
        let stats = queue.resolve(device, encoder.as_mut()).unwrap();
        let fence = device.submit(encoder.finish()).unwrap();
        device.wait_for_fence(fence);
        stats
    }

    #[test]
    fn test_typed_update_lands_in_destination() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(4096)).unwrap();
        let buffer = target(&device, 64);
        queue.begin_frame(0);
        queue
            .enqueue_update::<u32>(&buffer, 2, 3)
            .copy_from_slice(&[7, 8, 9]);
        let stats = flush(&mut queue, &device);
        assert_eq!(stats.staged_copies, 1);
        assert_eq!(stats.staged_bytes, 12);

        let words: Vec<u32> = bytemuck::cast_slice(&device.buffer_contents(buffer.id)).to_vec();
        assert_eq!(&words[..6], &[0, 0, 7, 8, 9, 0]);
    }

    #[test]
    fn test_non_overlapping_writes_are_order_independent() {
        let writes: [(u64, u32); 4] = [(0, 1), (5, 2), (9, 3), (15, 4)];
        let mut images = Vec::new();
        for order in [[0, 1, 2, 3], [3, 1, 0, 2], [2, 3, 1, 0]] {
            let device = HeadlessDevice::new();
            let mut queue = UploadQueue::new(&device, &small_config(4096)).unwrap();
            let buffer = target(&device, 64);
            queue.begin_frame(0);
            for i in order {
                let (element, value) = writes[i];
                queue.enqueue_update::<u32>(&buffer, element, 1)[0] = value;
            }
            flush(&mut queue, &device);
            images.push(device.buffer_contents(buffer.id));
        }
        assert_eq!(images[0], images[1]);
        assert_eq!(images[1], images[2]);
    }

    #[test]
    fn test_copies_are_bracketed_by_consistent_barriers() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(4096)).unwrap();
        let a = target(&device, 32);
        let b = target(&device, 32);
        queue.begin_frame(0);
        queue.enqueue_update::<u32>(&a, 0, 1)[0] = 5;
        queue.enqueue_update::<u32>(&a, 4, 1)[0] = 6;
        queue.enqueue_copy(&a, 0, &b, 0, 16);
        flush(&mut queue, &device);

        let barriers: Vec<BufferBarrier> = device
            .submitted_commands()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCommand::Barriers(b) => Some(b),
                _ => None,
            })
            .flatten()
            .collect();
        for buffer in [a.id, b.id] {
            let chain: Vec<_> = barriers.iter().filter(|b| b.buffer == buffer).collect();
            assert!(!chain.is_empty());
            assert_eq!(chain[0].before, ResourceState::ShaderResource);
            assert_eq!(chain[chain.len() - 1].after, ResourceState::ShaderResource);
            for pair in chain.windows(2) {
                assert_eq!(pair[0].after, pair[1].before);
            }
        }
        assert_eq!(device.buffer_state(a.id), Some(ResourceState::ShaderResource));
        assert_eq!(device.buffer_state(b.id), Some(ResourceState::ShaderResource));

        let words: Vec<u32> = bytemuck::cast_slice(&device.buffer_contents(b.id)).to_vec();
        assert_eq!(&words[..4], &[5, 0, 0, 0]);
    }

    #[test]
    fn test_ring_wraps_when_tail_has_room() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(1024)).unwrap();
        let buffer = target(&device, 1024);
        for frame in 0..8usize {
            queue.begin_frame(frame % BACK_BUFFER_COUNT);
            queue.enqueue_update::<u8>(&buffer, 0, 200).fill(frame as u8);
            flush(&mut queue, &device);
            assert_eq!(device.buffer_contents(buffer.id)[0], frame as u8);
        }
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_ring_overflow_is_fatal() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(1024)).unwrap();
        let buffer = target(&device, 4096);
        queue.begin_frame(0);
        queue.enqueue_update::<u8>(&buffer, 0, 1000);
        queue.enqueue_update::<u8>(&buffer, 0, 100);
    }

    #[test]
    #[should_panic(expected = "in flight")]
    fn test_ring_never_overruns_oldest_frame() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(1024)).unwrap();
        let buffer = target(&device, 4096);
        queue.begin_frame(0);
        queue.enqueue_update::<u8>(&buffer, 0, 600);
        queue.begin_frame(1);
        queue.enqueue_update::<u8>(&buffer, 0, 16);
        queue.begin_frame(2);
        queue.enqueue_update::<u8>(&buffer, 0, 16);
        // Slot 1 is now the oldest frame in flight; its bytes start at 608.
        queue.begin_frame(0);
        queue.enqueue_update::<u8>(&buffer, 0, 400);
        queue.enqueue_update::<u8>(&buffer, 0, 300);
    }

    #[test]
    #[should_panic(expected = "writes in one frame")]
    fn test_header_count_is_bounded() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(4096)).unwrap();
        let buffer = target(&device, 64);
        queue.begin_frame(0);
        for _ in 0..17 {
            queue.enqueue_update::<u32>(&buffer, 0, 1);
        }
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn test_write_outside_destination_panics() {
        let device = HeadlessDevice::new();
        let mut queue = UploadQueue::new(&device, &small_config(4096)).unwrap();
        let buffer = target(&device, 16);
        queue.enqueue_update::<u32>(&buffer, 3, 2);
    }
}
