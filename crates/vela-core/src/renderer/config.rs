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

//! Capacities and toggles of the renderer.

use crate::renderer::error::RenderError;
use serde::{Deserialize, Serialize};

/// Fixed capacities of every pool, table and buffer the renderer owns.
///
/// All tables are allocated once at start-up; exceeding a capacity at runtime
/// is a programming error and panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Meshes alive at once.
    pub max_meshes: u32,
    /// LOD meshes across all meshes.
    pub max_lod_meshes: u32,
    /// Sub-meshes across all meshes.
    pub max_sub_meshes: u32,
    /// Mesh instances alive at once.
    pub max_mesh_instances: u32,
    /// LOD mesh instances across all instances.
    pub max_lod_mesh_instances: u32,
    /// Sub-mesh instances across all instances.
    pub max_sub_mesh_instances: u32,
    /// Materials alive at once.
    pub max_materials: u32,
    /// Material instances alive at once.
    pub max_material_instances: u32,
    /// Size of the material parameter buffer, in bytes.
    pub material_parameter_buffer_size: u64,
    /// Pipeline sets (draw buckets).
    pub max_pipeline_sets: u32,
    /// Views rendered per frame.
    pub max_views: u32,
    /// Vertices in the global position buffer.
    pub max_vertices: u32,
    /// Indices in the global index buffer.
    pub max_indices: u32,
    /// Size of the staging ring, in bytes.
    pub staging_buffer_size: u64,
    /// Upload headers recorded in one frame.
    pub max_upload_headers: u32,
    /// Indexed indirect draws written by culling per view.
    pub indirect_argument_capacity: u32,
    /// Descriptors in the CPU-only CBV/SRV/UAV heap.
    pub cpu_descriptor_count: u32,
    /// Descriptors in the shader-visible CBV/SRV/UAV heap.
    pub gpu_descriptor_count: u32,
    /// Descriptors in the render-target heap.
    pub rtv_descriptor_count: u32,
    /// Descriptors in the depth-stencil heap.
    pub dsv_descriptor_count: u32,
    /// Whether the build-indirect-arguments pass runs after culling.
    pub build_indirect_arguments: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_meshes: 1024,
            max_lod_meshes: 2048,
            max_sub_meshes: 4096,
            max_mesh_instances: 1024,
            max_lod_mesh_instances: 4096,
            max_sub_mesh_instances: 8192,
            max_materials: 128,
            max_material_instances: 1024,
            material_parameter_buffer_size: 256 * 1024,
            max_pipeline_sets: 16,
            max_views: 8,
            max_vertices: 128 * 1024,
            max_indices: 256 * 1024,
            staging_buffer_size: 128 * 1024 * 1024,
            max_upload_headers: 4096,
            indirect_argument_capacity: 65536,
            cpu_descriptor_count: 1024,
            gpu_descriptor_count: 1024,
            rtv_descriptor_count: 64,
            dsv_descriptor_count: 64,
            build_indirect_arguments: true,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from RON text. Missing fields keep their
    /// default value.
    pub fn from_ron_str(text: &str) -> Result<Self, RenderError> {
        let config: Self =
            ron::from_str(text).map_err(|e| RenderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every capacity is usable.
    pub fn validate(&self) -> Result<(), RenderError> {
        let non_zero = [
            ("max_meshes", self.max_meshes),
            ("max_lod_meshes", self.max_lod_meshes),
            ("max_sub_meshes", self.max_sub_meshes),
            ("max_mesh_instances", self.max_mesh_instances),
            ("max_lod_mesh_instances", self.max_lod_mesh_instances),
            ("max_sub_mesh_instances", self.max_sub_mesh_instances),
            ("max_materials", self.max_materials),
            ("max_material_instances", self.max_material_instances),
            ("max_pipeline_sets", self.max_pipeline_sets),
            ("max_views", self.max_views),
            ("max_vertices", self.max_vertices),
            ("max_indices", self.max_indices),
            ("max_upload_headers", self.max_upload_headers),
            ("indirect_argument_capacity", self.indirect_argument_capacity),
            ("gpu_descriptor_count", self.gpu_descriptor_count),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(RenderError::InvalidConfig(format!("{name} must be non-zero")));
        }
        if self.staging_buffer_size < 1024 {
            return Err(RenderError::InvalidConfig(
                "staging_buffer_size must be at least 1 KiB".to_owned(),
            ));
        }
        if self.rtv_descriptor_count < self.max_views || self.dsv_descriptor_count < self.max_views {
            return Err(RenderError::InvalidConfig(
                "rtv and dsv heaps need one descriptor per view".to_owned(),
            ));
        }
        if self.max_lod_meshes < self.max_meshes || self.max_sub_meshes < self.max_lod_meshes {
            return Err(RenderError::InvalidConfig(
                "mesh tables must satisfy meshes <= lod meshes <= sub-meshes".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacities() {
        let config = RendererConfig::default();
        assert_eq!(config.max_meshes, 1024);
        assert_eq!(config.max_sub_mesh_instances, 8192);
        assert_eq!(config.staging_buffer_size, 128 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config =
            RendererConfig::from_ron_str("(max_meshes: 16, build_indirect_arguments: false)")
                .unwrap();
        assert_eq!(config.max_meshes, 16);
        assert!(!config.build_indirect_arguments);
        assert_eq!(config.max_views, 8);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = RendererConfig::from_ron_str("(max_views: 0)").unwrap_err();
        assert!(err.to_string().contains("max_views"));
    }

    #[test]
    fn test_malformed_ron_is_rejected() {
        assert!(RendererConfig::from_ron_str("(max_meshes: \"lots\")").is_err());
    }

    #[test]
    fn test_target_heaps_must_cover_every_view() {
        let err = RendererConfig::from_ron_str("(max_views: 4, dsv_descriptor_count: 3)").unwrap_err();
        assert!(err.to_string().contains("one descriptor per view"));
    }
}
