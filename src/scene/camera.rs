//! Viewer camera and the per-frame transforms derived from it

use glam::{Mat4, Vec3};

/// Perspective lens; the aspect ratio always comes from the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
        }
    }

    /// Pixels covered by one view-space unit at unit depth, for a viewport
    /// `viewport_height` pixels tall
    pub fn projection_scale(&self, viewport_height: u32) -> f32 {
        viewport_height as f32 / (2.0 * (self.fov_y * 0.5).tan())
    }
}

/// Camera looking from `position` at `target`
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Transforms for a `width` x `height` viewport
    pub fn frame(&self, width: u32, height: u32) -> CameraFrame {
        let view = self.view_matrix();
        let lens = self.projection;
        let aspect = width as f32 / height.max(1) as f32;
        CameraFrame {
            view,
            projection: Mat4::perspective_rh(lens.fov_y, aspect, lens.near, lens.far),
            inverse_view: view.inverse(),
            near: lens.near,
            far: lens.far,
            projection_scale: lens.projection_scale(height),
        }
    }
}

/// What the passes need from the camera for one frame.
///
/// `inverse_view` takes view-space G-buffer positions back to world space for
/// the shadow transform; `far` normalizes legacy AO depth and
/// `projection_scale` turns the AO world radius into pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_view: Mat4,
    pub near: f32,
    pub far: f32,
    pub projection_scale: f32,
}
