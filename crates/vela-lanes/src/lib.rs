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

//! # Vela Lanes
//!
//! The hot paths of the GPU mesh core.
//!
//! [`asset_lane`] decodes mesh files into [`vela_data::assets::MeshAsset`]s.
//! [`render_lane`] owns the GPU mirrors of the scene tables, keeps them in
//! sync with the CPU tables through the upload queue, streams LOD geometry
//! from the compute-LOD readback and records the per-view compute and draw
//! passes.

#![warn(missing_docs)]

pub mod asset_lane;
pub mod render_lane;
