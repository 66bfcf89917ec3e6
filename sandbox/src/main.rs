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

// Vela sandbox
// Builds a small scene and runs it for a few frames on the headless device.
// An optional first argument names a RON renderer configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use vela_agents::RenderWorld;
use vela_core::math::{Mat4, Vec3};
use vela_core::renderer::{GraphicsDevice, RendererConfig};
use vela_data::assets::{MeshAsset, MeshAssetBuilder};
use vela_data::scene::MaterialDescriptor;
use vela_infra::headless::HeadlessDevice;
use vela_lanes::render_lane::{TextureStreamer, COMPUTE_LOD_SHADER};
use vela_telemetry::logging::init_logging;

const FRAME_COUNT: u32 = 12;
const GRID_SIZE: u32 = 6;

/// Logs what a texture system would be asked to stream.
struct LoggingTextureStreamer;

impl TextureStreamer for LoggingTextureStreamer {
    fn request_mip_level(&mut self, material_instance: u32, mip_level: u32) {
        log::info!("Material instance {material_instance} wants mip level {mip_level}");
    }
}

fn load_config() -> Result<RendererConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read configuration '{path}'"))?;
            RendererConfig::from_ron_str(&text)
                .with_context(|| format!("Failed to parse configuration '{path}'"))
        }
        None => Ok(RendererConfig {
            staging_buffer_size: 16 * 1024 * 1024,
            ..RendererConfig::default()
        }),
    }
}

/// A pyramid and its coarser tetrahedron.
fn pyramid() -> MeshAsset {
    let base = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(-1.0, 0.0, 1.0),
        Vec3::new(0.0, 1.5, 0.0),
    ];
    MeshAssetBuilder::new()
        .material_slot("stone")
        .material_slot("base")
        .lod(
            &base,
            &[0, 1, 4, 1, 2, 4, 2, 3, 4, 3, 0, 4, 0, 2, 1, 0, 3, 2],
            &[(0, 12), (1, 6)],
        )
        .lod(&[base[0], base[1], base[2], base[4]], &[0, 1, 3, 1, 2, 3, 2, 0, 3, 0, 2, 1], &[(0, 12)])
        .build()
}

fn main() -> Result<()> {
    init_logging("info");
    let config = load_config()?;

    // Stand-in for the LOD compute shader: mesh 0 asks for its finest level
    // and material instance 0 covers an eighth of the screen.
    let device = Arc::new(HeadlessDevice::new());
    device.set_dispatch_hook(
        COMPUTE_LOD_SHADER,
        Box::new(move |ctx| {
            if let Some(min_lods) = ctx.buffer_mut("LodStreamingMeshMinLod") {
                min_lods[..4].fill(0);
            }
            if let Some(percentages) = ctx.buffer_mut("LodStreamingMaterialScreenPercentage") {
                percentages[..4].copy_from_slice(&(u16::MAX as u32 / 8).to_le_bytes());
            }
        }),
    );
    let shared: Arc<dyn GraphicsDevice> = device.clone();
    let mut world = RenderWorld::new(shared, config).context("Failed to create the render world")?;
    world.set_texture_streamer(Box::new(LoggingTextureStreamer));

    let stone = world.create_material(&MaterialDescriptor {
        name: "stone".into(),
        vertex_shader: "mesh_vs".into(),
        pixel_shader: "lit_ps".into(),
        parameter_size: 16,
    });
    let glow = world.create_material(&MaterialDescriptor {
        name: "glow".into(),
        vertex_shader: "mesh_vs".into(),
        pixel_shader: "unlit_ps".into(),
        parameter_size: 16,
    });
    let stone = world.create_material_instance(stone);
    let glow = world.create_material_instance(glow);
    world.set_material_parameters(glow, &[1.0f32, 0.6, 0.2, 1.0].map(f32::to_le_bytes).concat());

    let mesh = world.create_mesh_from_asset("sandbox/pyramid.mesh", pyramid());
    let instances = world.create_mesh_instances(mesh, GRID_SIZE * GRID_SIZE, stone);
    for (i, instance) in instances.iter().enumerate() {
        let (x, z) = ((i as u32 % GRID_SIZE) as f32, (i as u32 / GRID_SIZE) as f32);
        let placement = Mat4::from_translation(Vec3::new(x * 3.0, 0.0, z * 3.0))
            * Mat4::from_rotation_y(i as f32 * 0.4)
            * Mat4::from_scale(Vec3::new(1.0, 1.0 + (i % 4) as f32 * 0.25, 1.0));
        world.set_world_matrix(*instance, placement);
        if i % 3 == 0 {
            world.set_material_instance_by_name(*instance, vela_core::str_hash64("base"), glow);
        }
    }

    let view = world.views_mut().get_mut(0);
    view.enabled = true;
    view.look_at(Vec3::new(8.0, 12.0, -10.0), Vec3::new(8.0, 0.0, 8.0));

    for frame in 0..FRAME_COUNT {
        if frame == FRAME_COUNT / 2 {
            if let Some(last) = instances.last() {
                world.destroy_mesh_instance(*last);
            }
        }
        world.update()?;
        world.render()?;
        world.late_update();
        log::info!("Frame {frame}: {}", world.counters().last_frame_json());
    }

    log::info!(
        "{} LOD levels resident after {FRAME_COUNT} frames",
        world.gpu_scene().geometry.resident_count()
    );
    world.shutdown();
    Ok(())
}
