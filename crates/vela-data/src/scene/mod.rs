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

//! CPU scene tables whose slot indices are mirrored one-to-one by the GPU
//! tables of the render lanes.

mod material;
mod mesh;
mod mesh_instance;
mod tracked;
mod view;

pub use material::{Material, MaterialDescriptor, MaterialInstance, MaterialScene, PARAMETER_BLOCK_SIZE};
pub use mesh::{
    LodMesh, Mesh, MeshScene, SubMesh, MAX_LODS_PER_MESH, MAX_MATERIAL_SLOTS_PER_MESH,
    MAX_SUB_MESHES_PER_MESH,
};
pub use mesh_instance::{MeshInstance, MeshInstanceScene};
pub use tracked::{Changes, Retired, TrackedPool, UpdateKind};
pub use view::{View, ViewScene};

use crate::pool::Handle;

macro_rules! typed_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Handle);

        impl $name {
            /// Slot index, shared by the CPU and GPU tables.
            #[inline]
            pub fn index(&self) -> u32 {
                self.0.index
            }
        }
    };
}

typed_handle!(
    /// Identifies a mesh.
    MeshHandle
);
typed_handle!(
    /// Identifies a placed mesh instance.
    MeshInstanceHandle
);
typed_handle!(
    /// Identifies a material.
    MaterialHandle
);
typed_handle!(
    /// Identifies a material instance.
    MaterialInstanceHandle
);
