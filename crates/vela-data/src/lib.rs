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

//! Data layouts and allocators for the GPU mesh core.
//!
//! Everything in this crate is CPU-side bookkeeping: index-stable pools,
//! offset allocators, the descriptor arena, the staging ring that feeds GPU
//! buffers, the deferred release queue and the scene tables whose indices
//! are mirrored one-to-one on the GPU.

#![warn(missing_docs)]

pub mod allocators;
pub mod assets;
pub mod descriptor;
pub mod pool;
pub mod scene;
pub mod upload;

pub use pool::{Handle, ObjectPool, SlotPool};
