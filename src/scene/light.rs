//! Light types for the scene

use glam::{Mat4, Vec3};

/// Light-space camera used to render a shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCaster {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ShadowCaster {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Perspective light camera with a 90 degree vertical field of view and square aspect
    pub fn perspective(position: Vec3, direction: Vec3, up: Vec3, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_to_rh(position, direction.normalize(), up),
            projection: Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far),
        }
    }

    /// Orthographic light camera covering a box of `half_extent` around `center`
    pub fn orthographic(center: Vec3, direction: Vec3, up: Vec3, half_extent: f32, depth: f32) -> Self {
        let direction = direction.normalize();
        let eye = center - direction * depth * 0.5;
        Self {
            view: Mat4::look_to_rh(eye, direction, up),
            projection: Mat4::orthographic_rh(
                -half_extent,
                half_extent,
                -half_extent,
                half_extent,
                0.0,
                depth,
            ),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Point light
#[derive(Debug, Clone)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: Option<ShadowCaster>,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            shadow: None,
        }
    }

    /// Cast shadows through a light camera looking along `direction`
    pub fn with_shadow(mut self, direction: Vec3, near: f32, far: f32) -> Self {
        self.shadow = Some(ShadowCaster::perspective(
            self.position,
            direction,
            Vec3::Y,
            near,
            far,
        ));
        self
    }
}

/// Directional light (like the sun); `direction` is the way the light travels
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: Option<ShadowCaster>,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, caster: ShadowCaster) -> Self {
        self.shadow = Some(caster);
        self
    }
}

/// Scene light
#[derive(Debug, Clone)]
pub enum Light {
    Point(PointLight),
    Directional(DirectionalLight),
}

impl Light {
    pub fn shadow(&self) -> Option<&ShadowCaster> {
        match self {
            Light::Point(l) => l.shadow.as_ref(),
            Light::Directional(l) => l.shadow.as_ref(),
        }
    }

    /// Convert to view space for the lighting pass
    pub fn to_view_light(&self, view: Mat4, casts_shadow: bool) -> ViewLight {
        match self {
            Light::Point(l) => ViewLight {
                kind: ViewLightKind::Point {
                    position: view.transform_point3(l.position),
                },
                color: l.color * l.intensity,
                casts_shadow,
            },
            Light::Directional(l) => ViewLight {
                kind: ViewLightKind::Directional {
                    to_light: (-view.transform_vector3(l.direction)).normalize(),
                },
                color: l.color * l.intensity,
                casts_shadow,
            },
        }
    }
}

/// Where a view-space light comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewLightKind {
    Point { position: Vec3 },
    /// Unit vector pointing toward the light
    Directional { to_light: Vec3 },
}

/// A light expressed in camera view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewLight {
    pub kind: ViewLightKind,
    /// Color premultiplied by intensity
    pub color: Vec3,
    /// Whether the shadow factor applies to this light
    pub casts_shadow: bool,
}

impl ViewLight {
    /// Unit vector from a view-space point toward the light
    pub fn direction_from(&self, point: Vec3) -> Vec3 {
        match self.kind {
            ViewLightKind::Point { position } => (position - point).normalize_or_zero(),
            ViewLightKind::Directional { to_light } => to_light,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_light_points_back_along_travel() {
        let light = Light::Directional(DirectionalLight::new(-Vec3::Z, Vec3::ONE, 2.0));
        let view_light = light.to_view_light(Mat4::IDENTITY, false);
        assert_eq!(view_light.direction_from(Vec3::new(5.0, 1.0, -3.0)), Vec3::Z);
        assert_eq!(view_light.color, Vec3::splat(2.0));
    }

    #[test]
    fn test_point_light_direction() {
        let light = Light::Point(PointLight::new(Vec3::new(0.0, 4.0, 0.0), Vec3::ONE, 1.0));
        let view_light = light.to_view_light(Mat4::IDENTITY, true);
        assert!(view_light.casts_shadow);
        assert_eq!(view_light.direction_from(Vec3::ZERO), Vec3::Y);
    }

    #[test]
    fn test_perspective_caster_projects_forward_point_inside() {
        let caster = ShadowCaster::perspective(Vec3::ZERO, Vec3::Z, Vec3::Y, 0.5, 50.0);
        let clip = caster.view_projection() * Vec3::new(0.5, -0.5, 10.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1.0 && ndc.y.abs() < 1.0);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
