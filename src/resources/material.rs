//! Material definitions for the G-buffer and transparents passes

use crate::render_graph::params::ParameterBlock;
use glam::{Vec2, Vec3, Vec4};

/// Surface description read by the geometry stage
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub diffuse_color: Vec4,
    pub specular_color: Vec3,
    /// Values below 1 route the drawable through the transparents pass
    pub opacity: f32,

    /// Texture ids into [`crate::scene::Scene::textures`]
    pub diffuse_texture: Option<usize>,
    /// The diffuse texture is sampled at `uv / texture_scale`
    pub texture_scale: Vec2,
    pub detail_texture: Option<usize>,
    pub detail_strength: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse_color: Vec4::ONE,
            specular_color: Vec3::ZERO,
            opacity: 1.0,
            diffuse_texture: None,
            texture_scale: Vec2::ONE,
            detail_texture: None,
            detail_strength: 1.0,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_diffuse_color(mut self, color: Vec4) -> Self {
        self.diffuse_color = color;
        self
    }

    pub fn with_specular_color(mut self, color: Vec3) -> Self {
        self.specular_color = color;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_diffuse_texture(mut self, texture: usize) -> Self {
        self.diffuse_texture = Some(texture);
        self
    }

    pub fn with_texture_scale(mut self, scale: Vec2) -> Self {
        self.texture_scale = scale;
        self
    }

    pub fn with_detail_texture(mut self, texture: usize, strength: f32) -> Self {
        self.detail_texture = Some(texture);
        self.detail_strength = strength;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }

    /// Scalar specular intensity stored in the albedo alpha channel
    pub fn specular_intensity(&self) -> f32 {
        self.specular_color.max_element().clamp(0.0, 1.0)
    }

    /// Per-material values bound for each draw
    pub fn parameters(&self) -> ParameterBlock {
        let scale = Vec2::new(
            nonzero_or_one(self.texture_scale.x),
            nonzero_or_one(self.texture_scale.y),
        );
        ParameterBlock::new()
            .with("diffuse", self.diffuse_color)
            .with("texture_scale", scale)
            .with("specular", self.specular_color)
            .with("opacity", self.opacity.clamp(0.0, 1.0))
            .with("detail_strength", self.detail_strength)
    }

    // Preset materials

    pub fn matte(color: Vec3) -> Self {
        Self::new("matte").with_diffuse_color(color.extend(1.0))
    }

    pub fn glossy(color: Vec3) -> Self {
        Self::new("glossy")
            .with_diffuse_color(color.extend(1.0))
            .with_specular_color(Vec3::ONE)
    }

    pub fn glass(opacity: f32) -> Self {
        Self::new("glass")
            .with_diffuse_color(Vec4::new(0.8, 0.9, 1.0, 1.0))
            .with_specular_color(Vec3::ONE)
            .with_opacity(opacity)
    }
}

fn nonzero_or_one(value: f32) -> f32 {
    if value.abs() > f32::EPSILON {
        value
    } else {
        1.0
    }
}
