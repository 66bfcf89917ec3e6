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

//! The per-view pass list and its ordering.

use vela_core::graph::topological_sort;
use vela_core::renderer::{GraphicsDevice, RenderError, RendererConfig, ResourceError};
use vela_lanes::render_lane::{
    BuildIndirectArgumentsLane, ComputeLodLane, GeometryPassLane, GpuCullingLane, RenderLane,
    SetupViewLane,
};

/// A lane and the passes it must run after.
///
/// Dependencies name passes by [`RenderLane::strategy_name`]. A dependency on
/// a pass that is not part of the schedule is ignored, which lets optional
/// passes drop out without editing the declarations of the others.
pub struct PassDeclaration {
    /// The pass.
    pub lane: Box<dyn RenderLane>,
    /// Names of the passes recorded before this one.
    pub after: Vec<&'static str>,
}

impl PassDeclaration {
    /// Declares `lane` with its predecessors.
    pub fn new(lane: Box<dyn RenderLane>, after: &[&'static str]) -> Self {
        Self {
            lane,
            after: after.to_vec(),
        }
    }
}

/// The passes of one view, in recording order.
pub struct PassSchedule {
    passes: Vec<Box<dyn RenderLane>>,
}

impl PassSchedule {
    /// Orders `declarations` by their dependencies.
    ///
    /// Passes without an ordering constraint between them keep their
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::PassCycle`] when the dependencies form a cycle.
    ///
    /// # Panics
    ///
    /// Panics when two passes share a name.
    pub fn new(declarations: Vec<PassDeclaration>) -> Result<Self, RenderError> {
        let names: Vec<&'static str> = declarations.iter().map(|d| d.lane.strategy_name()).collect();
        for (i, name) in names.iter().enumerate() {
            assert!(
                !names[..i].contains(name),
                "PassSchedule: pass '{name}' declared twice"
            );
        }
        let edges: Vec<(&'static str, &'static str)> = declarations
            .iter()
            .flat_map(|d| {
                let name = d.lane.strategy_name();
                d.after.iter().map(move |before| (*before, name))
            })
            .collect();
        let order = topological_sort(names.iter().copied(), edges)?;

        let mut slots: Vec<Option<Box<dyn RenderLane>>> =
            declarations.into_iter().map(|d| Some(d.lane)).collect();
        let passes = order
            .iter()
            .filter_map(|name| {
                let index = names.iter().position(|n| n == name)?;
                slots[index].take()
            })
            .collect::<Vec<_>>();
        log::debug!("Pass schedule: {}", order.join(" -> "));
        Ok(Self { passes })
    }

    /// The standard mesh pipeline: view setup, LOD selection, culling,
    /// optionally the indirect argument build, then the geometry pass.
    ///
    /// # Errors
    ///
    /// Fails when a compute pipeline cannot be created, or on a dependency
    /// cycle.
    pub fn mesh_passes(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
    ) -> Result<Self, RenderError> {
        Self::new(Self::mesh_pass_declarations(device, config)?)
    }

    /// The declarations behind [`PassSchedule::mesh_passes`].
    pub fn mesh_pass_declarations(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
    ) -> Result<Vec<PassDeclaration>, ResourceError> {
        let mut declarations = vec![
            PassDeclaration::new(Box::new(SetupViewLane::new()), &[]),
            PassDeclaration::new(Box::new(ComputeLodLane::new(device)?), &["SetupView"]),
            PassDeclaration::new(Box::new(GpuCullingLane::new(device)?), &["ComputeLod"]),
        ];
        if config.build_indirect_arguments {
            declarations.push(PassDeclaration::new(
                Box::new(BuildIndirectArgumentsLane::new(device)?),
                &["GpuCulling"],
            ));
        }
        declarations.push(PassDeclaration::new(
            Box::new(GeometryPassLane::new()),
            &["GpuCulling", "BuildIndirectArguments"],
        ));
        Ok(declarations)
    }

    /// Pass names in recording order.
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.strategy_name()).collect()
    }

    /// The passes in recording order.
    pub fn passes_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn RenderLane>> + '_ {
        self.passes.iter_mut()
    }

    /// Number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// No pass at all.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Releases the pipelines of every pass.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for pass in &mut self.passes {
            pass.destroy(device);
        }
    }
}

impl std::fmt::Debug for PassSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassSchedule").field("passes", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::renderer::CommandEncoder;
    use vela_infra::headless::HeadlessDevice;
    use vela_lanes::render_lane::{LaneContext, LaneStats};

    struct NamedLane(&'static str);

    impl RenderLane for NamedLane {
        fn strategy_name(&self) -> &'static str {
            self.0
        }

        fn record(
            &mut self,
            _ctx: &mut LaneContext<'_>,
            _encoder: &mut dyn CommandEncoder,
        ) -> Result<LaneStats, ResourceError> {
            Ok(LaneStats::default())
        }

        fn destroy(&mut self, _device: &dyn GraphicsDevice) {}
    }

    fn declare(name: &'static str, after: &[&'static str]) -> PassDeclaration {
        PassDeclaration::new(Box::new(NamedLane(name)), after)
    }

    #[test]
    fn test_dependencies_reorder_declarations() {
        let schedule = PassSchedule::new(vec![
            declare("Draw", &["Cull"]),
            declare("Cull", &["Setup"]),
            declare("Setup", &[]),
        ])
        .unwrap();
        assert_eq!(schedule.names(), vec!["Setup", "Cull", "Draw"]);
    }

    #[test]
    fn test_unknown_dependency_is_ignored() {
        let schedule =
            PassSchedule::new(vec![declare("Setup", &[]), declare("Draw", &["Missing", "Setup"])])
                .unwrap();
        assert_eq!(schedule.names(), vec!["Setup", "Draw"]);
    }

    #[test]
    fn test_cycle_is_a_construction_error() {
        let result = PassSchedule::new(vec![
            declare("Setup", &[]),
            declare("Cull", &["Draw"]),
            declare("Draw", &["Cull"]),
        ]);
        assert!(matches!(result, Err(RenderError::PassCycle(_))));
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn test_duplicate_names_are_rejected() {
        let _ = PassSchedule::new(vec![declare("Setup", &[]), declare("Setup", &[])]);
    }

    #[test]
    fn test_mesh_passes_follow_the_config_flag() {
        let device = HeadlessDevice::new();
        let mut config = RendererConfig::default();

        config.build_indirect_arguments = false;
        let mut schedule = PassSchedule::mesh_passes(&device, &config).unwrap();
        assert_eq!(
            schedule.names(),
            vec!["SetupView", "ComputeLod", "GpuCulling", "GeometryPass"]
        );
        schedule.destroy(&device);

        config.build_indirect_arguments = true;
        let mut schedule = PassSchedule::mesh_passes(&device, &config).unwrap();
        assert_eq!(
            schedule.names(),
            vec!["SetupView", "ComputeLod", "GpuCulling", "BuildIndirectArguments", "GeometryPass"]
        );
        schedule.destroy(&device);
        assert_eq!(device.live_pipeline_count(), 0);
    }
}
