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

use vela_core::math::{Mat4, Vec3};
use vela_core::renderer::RendererConfig;

/// A camera the director renders the scene through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    /// Disabled views get no GPU work at all.
    pub enabled: bool,
    /// World to view transform.
    pub view_matrix: Mat4,
    /// Eye position in world space.
    pub camera_position: Vec3,
    /// Vertical field of view, in radians.
    pub fov_y_radians: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            enabled: false,
            view_matrix: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            fov_y_radians: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
            width: 1280,
            height: 720,
        }
    }
}

impl View {
    /// Points the view from `eye` at `target`, Y up. A degenerate direction
    /// leaves the view matrix unchanged.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        if let Some(view_matrix) = Mat4::look_at_rh(eye, target, Vec3::Y) {
            self.view_matrix = view_matrix;
            self.camera_position = eye;
        }
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    /// Perspective projection, depth in [0, 1].
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_zo(self.fov_y_radians, self.aspect_ratio(), self.near, self.far)
    }

    /// Projection times view.
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view_matrix
    }
}

/// The fixed set of views. View 0 is the main view.
#[derive(Debug, Clone)]
pub struct ViewScene {
    views: Vec<View>,
}

impl ViewScene {
    /// `config.max_views` disabled views.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            views: vec![View::default(); config.max_views as usize],
        }
    }

    /// View `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is not below the view count.
    pub fn get(&self, index: usize) -> &View {
        &self.views[index]
    }

    /// Mutable view `index`.
    pub fn get_mut(&mut self, index: usize) -> &mut View {
        &mut self.views[index]
    }

    /// The main view, whose viewport drives texture streaming.
    pub fn main(&self) -> &View {
        &self.views[0]
    }

    /// Every view with its index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &View)> + '_ {
        self.views.iter().enumerate()
    }

    /// Views flagged enabled.
    pub fn enabled_count(&self) -> usize {
        self.views.iter().filter(|v| v.enabled).count()
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// No view at all.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_views_start_disabled() {
        let views = ViewScene::new(&RendererConfig::default());
        assert_eq!(views.len(), 8);
        assert_eq!(views.enabled_count(), 0);
    }

    #[test]
    fn test_look_at_moves_camera() {
        let mut view = View {
            width: 200,
            height: 100,
            ..View::default()
        };
        view.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        assert_eq!(view.camera_position, Vec3::new(0.0, 0.0, 5.0));
        assert_relative_eq!(view.aspect_ratio(), 2.0);
        let origin = view.view_matrix.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_look_at_is_ignored() {
        let mut view = View::default();
        view.look_at(Vec3::ZERO, Vec3::ZERO);
        assert_eq!(view.view_matrix, Mat4::IDENTITY);
    }
}
