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

//! A graphics device without a GPU.
//!
//! Buffers live in host memory. At submit time the device replays the
//! recorded command list: copies and clears move bytes, barriers are checked
//! against the tracked state of each buffer, and compute dispatches run the
//! hook registered for their shader, if any. Draws are only recorded.

mod command;
mod device;

pub use command::{HeadlessCommandEncoder, RecordedCommand};
pub use device::{DispatchContext, DispatchHook, HeadlessDevice};
