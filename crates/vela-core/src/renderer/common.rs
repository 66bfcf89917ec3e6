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

//! Constants and helpers shared by every frame-pipelined component.

/// Number of frames the CPU may record ahead of the GPU.
///
/// Every per-frame ring (staging memory, readback buffers, deferred release
/// buckets, fence values) has exactly this many slots.
pub const BACK_BUFFER_COUNT: usize = 3;

/// Thread-group width shared by the compute-LOD and culling kernels.
pub const COMPUTE_GROUP_SIZE: u32 = 128;

/// Integer division rounding up. Used to size compute dispatches.
#[inline]
pub const fn div_round_up(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor)
}

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Returns the frame slot following `frame_index`.
#[inline]
pub const fn next_frame_index(frame_index: usize) -> usize {
    (frame_index + 1) % BACK_BUFFER_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_sizing_rounds_up() {
        assert_eq!(div_round_up(0, COMPUTE_GROUP_SIZE), 0);
        assert_eq!(div_round_up(1, COMPUTE_GROUP_SIZE), 1);
        assert_eq!(div_round_up(128, COMPUTE_GROUP_SIZE), 1);
        assert_eq!(div_round_up(129, COMPUTE_GROUP_SIZE), 2);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(32, 16), 32);
    }

    #[test]
    fn test_frame_index_wraps() {
        assert_eq!(next_frame_index(BACK_BUFFER_COUNT - 1), 0);
    }
}
