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

//! The render agent: everything between scene edits and a submitted frame.
//!
//! [`RenderWorld`] is the public face. It owns the CPU scene tables (meshes,
//! mesh instances, materials, views), their GPU mirror
//! ([`GpuScene`](vela_lanes::render_lane::GpuScene)), the upload and release
//! queues, and a [`RenderDirector`] walking the per-view pass list.
//!
//! A frame goes through three calls:
//!
//! 1. `update()` mirrors the scene changes into the upload queue, then
//!    consumes the LOD feedback of the frame slot that is about to be reused.
//! 2. `render()` lets every enabled view prepare its uploads, resolves the
//!    queue and records each view's passes in their scheduled order.
//! 3. `late_update()` reclaims destroyed slots, waits for the GPU to finish
//!    the next frame slot and releases what that slot was holding.

mod director;
mod schedule;
mod world;

pub use director::*;
pub use schedule::*;
pub use world::*;
