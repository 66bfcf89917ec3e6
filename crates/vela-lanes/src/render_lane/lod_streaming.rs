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

//! LOD and texture streaming driven by GPU feedback.
//!
//! The compute-LOD pass writes, per mesh, the finest and coarsest level any
//! instance wants this frame and, per material instance, the largest screen
//! coverage it was drawn at. Those values are copied into a readback set
//! owned by the frame slot and read on the CPU when the slot comes around
//! again, once its fence has retired.

use super::geometry_resources::{GeometryResources, LodGeometry};
use super::gpu_types::pack_stream_range;
use super::mesh_resources::MeshResources;
use super::scoped_barrier::ScopedBarrier;
use super::{structured_view, write_views};
use vela_core::renderer::{
    BufferDescriptor, BufferViewKind, CommandEncoder, GpuBuffer, GraphicsDevice, RendererConfig,
    ResourceError, ResourceState, BACK_BUFFER_COUNT,
};
use vela_data::descriptor::{DescriptorAllocator, DescriptorRange};
use vela_data::scene::{MaterialScene, MeshScene};
use vela_data::upload::{ReleaseQueue, UploadQueue};

/// Readback value of a mesh no instance asked a level for.
const NO_REQUEST: u32 = u16::MAX as u32;

/// Finest mip level ever requested from a [`TextureStreamer`].
pub const MIN_REQUESTED_MIP_LEVEL: u32 = 4;

/// Receives the mip level each material instance should have resident.
pub trait TextureStreamer: Send {
    /// Material instance `material_instance` is drawn at a size that needs
    /// mip levels up to `mip_level`.
    fn request_mip_level(&mut self, material_instance: u32, mip_level: u32);
}

/// Where a mesh stands in the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodStreamState {
    /// The last readback held no request for the mesh.
    NoRequest,
    /// The requested level is resident.
    LodComputed(u32),
    /// No readback has been read since the mesh appeared.
    ReadbackPending,
    /// Levels were loaded or unloaded by the last update; the copies are
    /// part of the frame's uploads.
    StreamingInFlight,
}

/// Mip level for a material covering `screen_percentage` of a viewport
/// `screen_width` pixels wide.
pub fn requested_mip_level(screen_percentage: f32, screen_width: u32) -> u32 {
    let pixels = screen_percentage * screen_width as f32;
    let level = 1.0 + pixels.log2().ceil();
    if level.is_finite() {
        (level.max(0.0) as u32).max(MIN_REQUESTED_MIP_LEVEL)
    } else {
        MIN_REQUESTED_MIP_LEVEL
    }
}

/// Level and screen-percentage requests of one frame slot.
#[derive(Debug)]
struct ReadbackSet {
    buffer: GpuBuffer,
    written: bool,
}

/// Everything [`LodStreaming::update`] acts on.
pub struct StreamingContext<'a> {
    /// The device owning the readback buffers.
    pub device: &'a dyn GraphicsDevice,
    /// Uploads of the frame being built.
    pub uploads: &'a mut UploadQueue,
    /// The CPU mesh table.
    pub meshes: &'a MeshScene,
    /// The CPU material table.
    pub materials: &'a MaterialScene,
    /// Owner of the vertex and index ranges.
    pub geometry: &'a mut GeometryResources,
    /// Owner of the mirrored stream ranges.
    pub mesh_resources: &'a MeshResources,
    /// Deferred release of unloaded levels.
    pub releases: &'a mut ReleaseQueue<LodGeometry>,
    /// Optional texture collaborator.
    pub texture_streamer: Option<&'a mut (dyn TextureStreamer + 'static)>,
    /// Width of the main view, in pixels.
    pub screen_width: u32,
}

/// What one [`LodStreaming::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingStats {
    /// Whether a readback set was consumed.
    pub readback_consumed: bool,
    /// LOD levels streamed in.
    pub lod_loads: u32,
    /// LOD levels streamed out.
    pub lod_unloads: u32,
    /// Mip requests sent to the texture streamer.
    pub mip_requests: u32,
}

/// The GPU feedback buffers and the CPU streaming state they drive.
#[derive(Debug)]
pub struct LodStreaming {
    instance_lod_buffer: GpuBuffer,
    instance_screen_percentage_buffer: GpuBuffer,
    material_screen_percentage_buffer: GpuBuffer,
    mesh_min_lod_buffer: GpuBuffer,
    mesh_max_lod_buffer: GpuBuffer,
    readbacks: Vec<ReadbackSet>,
    views: DescriptorRange,

    stream_ranges: Vec<Option<(u32, u32)>>,
    states: Vec<LodStreamState>,
    mip_levels: Vec<Option<u32>>,
    frames_seen: u64,
    requests_cleared: bool,
}

impl LodStreaming {
    /// Creates the feedback buffers and one readback set per frame slot.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        cpu_descriptors: &mut DescriptorAllocator,
    ) -> Result<Self, ResourceError> {
        let uav_array = |label: &str, count: u32| {
            GpuBuffer::create_array::<u32>(
                device,
                BufferDescriptor::unordered_access(label, 0),
                count as usize,
            )
        };
        let instance_lod_buffer = uav_array("LodStreamingInstanceLod", config.max_mesh_instances)?;
        let instance_screen_percentage_buffer =
            uav_array("LodStreamingInstanceScreenPercentage", config.max_mesh_instances)?;
        let material_screen_percentage_buffer =
            uav_array("LodStreamingMaterialScreenPercentage", config.max_material_instances)?;
        let mesh_min_lod_buffer = uav_array("LodStreamingMeshMinLod", config.max_meshes)?;
        let mesh_max_lod_buffer = uav_array("LodStreamingMeshMaxLod", config.max_meshes)?;

        let readback_size = mesh_min_lod_buffer.size
            + mesh_max_lod_buffer.size
            + material_screen_percentage_buffer.size;
        let readbacks = (0..BACK_BUFFER_COUNT)
            .map(|slot| {
                let label = format!("LodStreamingReadback[{slot}]");
                GpuBuffer::create(device, &BufferDescriptor::readback(&label, readback_size))
                    .map(|buffer| ReadbackSet { buffer, written: false })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let views = cpu_descriptors.allocate(6);
        write_views(
            device,
            &views,
            &[
                structured_view::<u32>(&instance_lod_buffer, BufferViewKind::UnorderedAccess),
                structured_view::<u32>(&instance_screen_percentage_buffer, BufferViewKind::UnorderedAccess),
                structured_view::<u32>(&material_screen_percentage_buffer, BufferViewKind::UnorderedAccess),
                structured_view::<u32>(&mesh_min_lod_buffer, BufferViewKind::UnorderedAccess),
                structured_view::<u32>(&mesh_max_lod_buffer, BufferViewKind::UnorderedAccess),
                structured_view::<u32>(&instance_lod_buffer, BufferViewKind::ShaderResource),
            ],
        )?;

        Ok(Self {
            instance_lod_buffer,
            instance_screen_percentage_buffer,
            material_screen_percentage_buffer,
            mesh_min_lod_buffer,
            mesh_max_lod_buffer,
            readbacks,
            views,
            stream_ranges: vec![None; config.max_meshes as usize],
            states: vec![LodStreamState::ReadbackPending; config.max_meshes as usize],
            mip_levels: vec![None; config.max_material_instances as usize],
            frames_seen: 0,
            requests_cleared: false,
        })
    }

    /// Copies the requests of the previous frame into the readback set of
    /// `frame_index`, then resets the request buffers for the coming
    /// dispatches.
    ///
    /// The very first call only clears: the buffers hold no requests yet.
    pub fn record_readback_and_clear(&mut self, encoder: &mut dyn CommandEncoder, frame_index: usize) {
        let readback = &mut self.readbacks[frame_index];
        let sources = [
            self.mesh_min_lod_buffer,
            self.mesh_max_lod_buffer,
            self.material_screen_percentage_buffer,
        ];
        if self.requests_cleared {
            let transitions: Vec<_> = sources.iter().map(|b| (*b, ResourceState::CopySource)).collect();
            let mut scoped = ScopedBarrier::new(encoder, &transitions);
            let mut offset = 0;
            for source in &sources {
                scoped.copy_buffer_to_buffer(source.id, 0, readback.buffer.id, offset, source.size);
                offset += source.size;
            }
        }
        readback.written = self.requests_cleared;
        self.requests_cleared = true;

        let min = &self.mesh_min_lod_buffer;
        encoder.clear_buffer_u32(min.id, 0, min.size, u32::MAX);
        let max = &self.mesh_max_lod_buffer;
        encoder.clear_buffer_u32(max.id, 0, max.size, 0);
        let percentages = &self.material_screen_percentage_buffer;
        encoder.clear_buffer_u32(percentages.id, 0, percentages.size, 0);
    }

    /// Acts on the readback set of `frame_index`.
    ///
    /// Nothing happens during the first [`BACK_BUFFER_COUNT`] frames, or when
    /// no pass wrote the set (no view was enabled that frame).
    pub fn update(
        &mut self,
        frame_index: usize,
        ctx: StreamingContext<'_>,
    ) -> Result<StreamingStats, ResourceError> {
        self.frames_seen += 1;
        let mut stats = StreamingStats::default();
        if self.frames_seen <= BACK_BUFFER_COUNT as u64 || !self.readbacks[frame_index].written {
            return Ok(stats);
        }

        let readback = &mut self.readbacks[frame_index];
        let mut bytes = vec![0u8; readback.buffer.size as usize];
        ctx.device.read_buffer(readback.buffer.id, 0, &mut bytes)?;
        readback.written = false;
        stats.readback_consumed = true;

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        let mesh_count = self.stream_ranges.len();
        let (min_lods, rest) = words.split_at(mesh_count);
        let (max_lods, screen_percentages) = rest.split_at(mesh_count);

        let StreamingContext {
            uploads,
            meshes,
            materials,
            geometry,
            mesh_resources,
            releases,
            texture_streamer,
            screen_width,
            ..
        } = ctx;

        for (index, (&requested_min, &requested_max)) in min_lods.iter().zip(max_lods).enumerate() {
            let Some(mesh) = meshes.get_by_index(index as u32) else {
                continue;
            };
            if requested_min >= NO_REQUEST {
                self.states[index] = LodStreamState::NoRequest;
                continue;
            }
            let last = mesh.lod_count() - 1;
            let min = requested_min.min(last);
            let max = requested_max.min(last).max(min);

            // Levels leaving the range are queued for release before the
            // levels entering it are allocated. Their space returns to the
            // geometry allocator BACK_BUFFER_COUNT frames later.
            let (loads, unloads) = match self.stream_ranges[index] {
                None => {
                    geometry.load_lod_mesh(uploads, mesh, min, max + 1);
                    (max + 1 - min, 0)
                }
                Some((begin, end)) => {
                    let mut unloads = 0;
                    if begin < min {
                        let stop = min.min(end + 1);
                        geometry.unload_lod_mesh(uploads, mesh, begin, stop, releases);
                        unloads += stop - begin;
                    }
                    if end > max {
                        let start = (max + 1).max(begin);
                        geometry.unload_lod_mesh(uploads, mesh, start, end + 1, releases);
                        unloads += end + 1 - start;
                    }
                    let mut loads = 0;
                    if min < begin {
                        let stop = begin.min(max + 1);
                        geometry.load_lod_mesh(uploads, mesh, min, stop);
                        loads += stop - min;
                    }
                    if max > end {
                        let start = (end + 1).max(min);
                        geometry.load_lod_mesh(uploads, mesh, start, max + 1);
                        loads += max + 1 - start;
                    }
                    (loads, unloads)
                }
            };

            let range = Some((min, max));
            if range != self.stream_ranges[index] {
                self.stream_ranges[index] = range;
                mesh_resources.write_stream_range(uploads, index as u32, pack_stream_range(min as u16, max as u16));
                log::debug!("'{}' streams LOD {min} to {max}", mesh.path);
            }
            self.states[index] = if loads + unloads > 0 {
                LodStreamState::StreamingInFlight
            } else {
                LodStreamState::LodComputed(min)
            };
            stats.lod_loads += loads;
            stats.lod_unloads += unloads;
        }

        if let Some(streamer) = texture_streamer {
            for (index, &scaled) in screen_percentages.iter().enumerate() {
                if scaled == 0 || materials.instance_by_index(index as u32).is_none() {
                    continue;
                }
                let percentage = scaled as f32 / u16::MAX as f32;
                let level = requested_mip_level(percentage, screen_width);
                if self.mip_levels[index] != Some(level) {
                    self.mip_levels[index] = Some(level);
                    streamer.request_mip_level(index as u32, level);
                    stats.mip_requests += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Drops the streaming state of a destroyed mesh. Its geometry is
    /// released by the caller.
    pub fn forget_mesh(&mut self, index: u32) {
        self.stream_ranges[index as usize] = None;
        self.states[index as usize] = LodStreamState::ReadbackPending;
    }

    /// Drops the cached mip request of a destroyed material instance.
    pub fn forget_material_instance(&mut self, index: u32) {
        self.mip_levels[index as usize] = None;
    }

    /// Streaming state of mesh slot `index`.
    pub fn mesh_state(&self, index: u32) -> LodStreamState {
        self.states[index as usize]
    }

    /// Resident levels of mesh slot `index`, inclusive.
    pub fn stream_range(&self, index: u32) -> Option<(u32, u32)> {
        self.stream_ranges[index as usize]
    }

    /// Per-instance selected level.
    pub fn instance_lod_buffer(&self) -> &GpuBuffer {
        &self.instance_lod_buffer
    }

    /// Per-instance screen coverage.
    pub fn instance_screen_percentage_buffer(&self) -> &GpuBuffer {
        &self.instance_screen_percentage_buffer
    }

    /// Per-material-instance screen coverage, scaled by `u16::MAX`.
    pub fn material_screen_percentage_buffer(&self) -> &GpuBuffer {
        &self.material_screen_percentage_buffer
    }

    /// Per-mesh finest requested level.
    pub fn mesh_min_lod_buffer(&self) -> &GpuBuffer {
        &self.mesh_min_lod_buffer
    }

    /// Per-mesh coarsest requested level.
    pub fn mesh_max_lod_buffer(&self) -> &GpuBuffer {
        &self.mesh_max_lod_buffer
    }

    /// Shader views: instance LOD, instance and material screen
    /// percentages, mesh min and max LOD (all UAV), then instance LOD as SRV.
    pub fn views(&self) -> &DescriptorRange {
        &self.views
    }

    /// Releases every buffer and view.
    pub fn destroy(self, device: &dyn GraphicsDevice, cpu_descriptors: &mut DescriptorAllocator) {
        cpu_descriptors.free(self.views);
        for buffer in [
            self.instance_lod_buffer,
            self.instance_screen_percentage_buffer,
            self.material_screen_percentage_buffer,
            self.mesh_min_lod_buffer,
            self.mesh_max_lod_buffer,
        ] {
            buffer.destroy(device);
        }
        for readback in self.readbacks {
            readback.buffer.destroy(device);
        }
    }
}
