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

mod common;

use common::{single_lod_quad, Fixture};
use vela_infra::headless::RecordedCommand;

fn count_work(commands: &[RecordedCommand]) -> (usize, usize) {
    let dispatches = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::Dispatch { .. }))
        .count();
    let draws = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::ExecuteIndirect { .. }))
        .count();
    (dispatches, draws)
}

fn populated() -> Fixture {
    let mut f = Fixture::new();
    let material = f.material("lit_ps");
    let mesh = f.world.create_mesh_from_asset("quad.mesh", single_lod_quad());
    let _ = f.world.create_mesh_instances(mesh, 2, material);
    f
}

#[test]
fn test_disabled_views_receive_no_gpu_work() {
    // --- 1. ARRANGE ---
    let mut f = populated();
    assert_eq!(f.world.views().enabled_count(), 0);

    // --- 2. ACT ---
    let report = f.frame();

    // --- 3. ASSERT ---
    assert_eq!(report.rendered_views, 0);
    assert_eq!(report.lanes.dispatches, 0);
    assert_eq!(report.lanes.indirect_draws, 0);
    // Uploads are still resolved.
    assert!(report.uploads.staged_copies > 0);
    let commands = f.device.take_submitted_commands();
    assert_eq!(count_work(&commands), (0, 0));
}

#[test]
fn test_enabled_view_runs_every_pass() {
    let mut f = populated();
    f.enable_main_view();
    f.device.take_submitted_commands();

    let report = f.frame();

    // LOD selection, culling and argument build, then one draw for the
    // single pipeline set.
    assert_eq!(report.rendered_views, 1);
    assert_eq!(report.lanes.dispatches, 3);
    assert_eq!(report.lanes.indirect_draws, 1);
    assert_eq!(count_work(&f.device.take_submitted_commands()), (3, 1));
    let counters = f.world.counters().last_frame();
    assert_eq!(counters.dispatches, 3);
    assert_eq!(counters.indirect_draws, 1);
}

#[test]
fn test_each_view_draws_from_its_own_arguments() {
    let mut f = populated();
    f.enable_main_view();
    f.world.views_mut().get_mut(1).enabled = true;
    f.device.take_submitted_commands();

    let report = f.frame();
    assert_eq!(report.rendered_views, 2);
    assert_eq!(report.lanes.indirect_draws, 2);

    let commands = f.device.take_submitted_commands();
    let argument_buffers: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::ExecuteIndirect { draw, .. } => Some(draw.argument_buffer),
            _ => None,
        })
        .collect();
    assert_eq!(
        argument_buffers,
        vec![
            f.device.buffer_by_label("IndirectArguments[0]").unwrap(),
            f.device.buffer_by_label("IndirectArguments[1]").unwrap(),
        ]
    );

    // Each geometry pass writes the targets of its own view.
    let targets: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::SetRenderTargets {
                render_targets,
                depth_stencil,
            } => Some((render_targets.clone(), *depth_stencil)),
            _ => None,
        })
        .collect();
    let director = f.world.director();
    let expected: Vec<_> = (0..2)
        .map(|i| {
            let view = director.view_resources(i);
            (vec![view.render_target()], Some(view.depth_stencil()))
        })
        .collect();
    assert_eq!(targets, expected);
    assert_ne!(targets[0], targets[1]);
}

#[test]
fn test_disabling_a_view_stops_its_work_next_frame() {
    let mut f = populated();
    f.enable_main_view();
    assert_eq!(f.frame().rendered_views, 1);

    f.world.views_mut().get_mut(0).enabled = false;
    let report = f.frame();
    assert_eq!(report.rendered_views, 0);
    assert_eq!(report.lanes.dispatches + report.lanes.indirect_draws, 0);
}
