//! Object transforms

use glam::{Mat3, Mat4, Quat, Vec3};

/// Position, rotation and scale of an object in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create transform from position, rotation (euler angles in radians), and scale
    pub fn from_components(position: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(
                glam::EulerRot::XYZ,
                rotation_euler.x,
                rotation_euler.y,
                rotation_euler.z,
            ),
            scale,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of the upper 3x3 of `view * model`, for view-space normals
    pub fn normal_matrix(&self, view: Mat4) -> Mat3 {
        Mat3::from_mat4(view * self.matrix()).inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_matrix_keeps_normals_perpendicular() {
        let transform = Transform::from_position(Vec3::new(1.0, 0.0, -2.0))
            .with_scale(Vec3::new(2.0, 1.0, 1.0))
            .with_rotation(Quat::from_rotation_y(0.3));
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.0, 4.0), Vec3::ZERO, Vec3::Y);

        // Plane x + y = 0 in object space: tangent (1,-1,0), normal (1,1,0)
        let model_view = view * transform.matrix();
        let tangent = model_view.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        let normal = transform.normal_matrix(view) * Vec3::new(1.0, 1.0, 0.0);
        assert!(tangent.dot(normal).abs() < 1e-4);
    }
}
