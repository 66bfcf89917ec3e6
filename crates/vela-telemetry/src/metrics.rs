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

//! Per-frame counters recorded by the render director.

use serde::Serialize;

/// What one frame asked of the GPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounters {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Views that received GPU work.
    pub rendered_views: u32,
    /// Compute dispatches recorded.
    pub dispatches: u32,
    /// Indirect draws recorded.
    pub indirect_draws: u32,
    /// Staged copies recorded by the upload queue.
    pub staged_copies: u32,
    /// Buffer-to-buffer copies recorded by the upload queue.
    pub buffer_copies: u32,
    /// Bytes moved through the staging ring.
    pub uploaded_bytes: u64,
    /// LOD levels streamed in.
    pub lod_loads: u32,
    /// LOD levels streamed out.
    pub lod_unloads: u32,
}

/// Accumulates the current frame and keeps the last finished one.
#[derive(Debug, Clone, Default)]
pub struct RenderCounters {
    current: FrameCounters,
    last: FrameCounters,
    total_draws: u64,
    total_dispatches: u64,
}

impl RenderCounters {
    /// Counters of the frame being recorded.
    pub fn current_mut(&mut self) -> &mut FrameCounters {
        &mut self.current
    }

    /// Counters of the frame being recorded.
    pub fn current(&self) -> &FrameCounters {
        &self.current
    }

    /// Closes the current frame and starts the next one.
    pub fn end_frame(&mut self) {
        self.total_draws += self.current.indirect_draws as u64;
        self.total_dispatches += self.current.dispatches as u64;
        log::trace!(
            "Frame {}: {} views, {} dispatches, {} draws, {} bytes uploaded",
            self.current.frame,
            self.current.rendered_views,
            self.current.dispatches,
            self.current.indirect_draws,
            self.current.uploaded_bytes
        );
        self.last = self.current;
        self.current = FrameCounters {
            frame: self.last.frame + 1,
            ..FrameCounters::default()
        };
    }

    /// The last finished frame.
    pub fn last_frame(&self) -> &FrameCounters {
        &self.last
    }

    /// Indirect draws since start-up.
    pub fn total_draws(&self) -> u64 {
        self.total_draws
    }

    /// Dispatches since start-up.
    pub fn total_dispatches(&self) -> u64 {
        self.total_dispatches
    }

    /// The last finished frame as a JSON object.
    pub fn last_frame_json(&self) -> String {
        serde_json::to_string(&self.last).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_frame_rotates_and_accumulates() {
        let mut counters = RenderCounters::default();
        counters.current_mut().indirect_draws = 3;
        counters.current_mut().dispatches = 2;
        counters.end_frame();
        counters.current_mut().indirect_draws = 1;
        counters.end_frame();

        assert_eq!(counters.last_frame().frame, 1);
        assert_eq!(counters.last_frame().indirect_draws, 1);
        assert_eq!(counters.current().frame, 2);
        assert_eq!(counters.total_draws(), 4);
        assert_eq!(counters.total_dispatches(), 2);
    }

    #[test]
    fn test_json_names_every_counter() {
        let mut counters = RenderCounters::default();
        counters.current_mut().uploaded_bytes = 64;
        counters.end_frame();
        let json: serde_json::Value = serde_json::from_str(&counters.last_frame_json()).unwrap();
        assert_eq!(json["uploaded_bytes"], 64);
        assert_eq!(json["frame"], 0);
    }
}
