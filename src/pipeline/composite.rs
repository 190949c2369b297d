//! Tone-map and composite pass
//!
//! Combines albedo, accumulated light, shadow and transparents into the
//! displayable frame:
//! `col = base·light·t + light·(light.a − 1)·base.a·t + base·shadow·ambient`,
//! then `mix(col, transparents, transparents.a)`.

use crate::backend::types::*;
use crate::error::ConfigError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::{Vec3, Vec4};
use std::any::Any;

/// Tone mapping configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeConfig {
    /// Accumulated light is divided by this value
    pub tone_divisor: f32,
    pub ambient_scale: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            tone_divisor: 6.0,
            ambient_scale: 0.2,
        }
    }
}

impl CompositeConfig {
    pub fn with_tone_divisor(mut self, divisor: f32) -> Self {
        self.tone_divisor = divisor;
        self
    }

    pub fn with_ambient_scale(mut self, scale: f32) -> Self {
        self.ambient_scale = scale;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tone_divisor > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "composite.tone_divisor",
                reason: format!("{} is not positive", self.tone_divisor),
            });
        }
        if !(self.ambient_scale >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "composite.ambient_scale",
                reason: "must not be negative".into(),
            });
        }
        Ok(())
    }
}

/// Tone-mapped color of a covered pixel, before transparents
pub fn tone_map(base: Vec4, light: Vec4, shadow: f32, tone: f32, ambient: f32) -> Vec3 {
    let albedo = base.truncate();
    let lit = light.truncate();
    albedo * lit * tone + lit * (light.w - 1.0) * base.w * tone + albedo * shadow * ambient
}

/// Composite pass producing the frame before post-processing
pub struct CompositePass {
    position: ResourceId,
    albedo: ResourceId,
    light: ResourceId,
    shadow: Option<ResourceId>,
    transparents: Option<ResourceId>,
    config: CompositeConfig,
    output: Option<ResourceId>,
}

impl CompositePass {
    pub fn new(config: CompositeConfig, position: ResourceId, albedo: ResourceId, light: ResourceId) -> Self {
        Self {
            position,
            albedo,
            light,
            shadow: None,
            transparents: None,
            config,
            output: None,
        }
    }

    pub fn with_shadow(mut self, shadow: Option<ResourceId>) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_transparents(mut self, transparents: Option<ResourceId>) -> Self {
        self.transparents = transparents;
        self
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &str {
        "Composite Pass"
    }

    fn program(&self) -> Program {
        let variant = if self.transparents.is_some() {
            "tonemap-transparents"
        } else {
            "tonemap"
        };
        Program::fullscreen("composite", variant)
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("position", self.position, ResourceUsage::TextureRead);
        ctx.read("albedo", self.albedo, ResourceUsage::TextureRead);
        ctx.read("light", self.light, ResourceUsage::TextureRead);
        if let Some(shadow) = self.shadow {
            ctx.read("shadow", shadow, ResourceUsage::TextureRead);
        }
        if let Some(transparents) = self.transparents {
            ctx.read("transparents", transparents, ResourceUsage::TextureRead);
        }

        let target = ctx.create_render_target(
            RenderTargetDesc::new("frame", TextureSize::full_screen())
                .attachment("color", TextureFormat::Rgba8Unorm),
        );
        self.output = target.attachment("color");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }

        ctx.set_parameter("tone_factor", 1.0 / self.config.tone_divisor);
        ctx.set_parameter("ambient_scale", self.config.ambient_scale);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput("frame".into()))?;
        let position = ctx.input("position")?;
        let albedo = ctx.input("albedo")?;
        let light = ctx.input("light")?;
        let shadow = ctx.input_opt("shadow");
        let transparents = ctx.input_opt("transparents");
        let tone = ctx.float("tone_factor")?;
        let ambient = ctx.float("ambient_scale")?;
        let clear = ctx.vec4("clear_color")?.truncate();

        let sampler = SamplerDescriptor::NEAREST_CLAMP;
        ctx.output(output)?.fill_with(|_, uv| {
            let color = if position.sample(uv, sampler).w == 0.0 {
                clear
            } else {
                let shadow = shadow.map_or(1.0, |t| t.sample(uv, sampler).x);
                tone_map(albedo.sample(uv, sampler), light.sample(uv, sampler), shadow, tone, ambient)
            };
            let color = match transparents {
                Some(t) => {
                    let layer = t.sample(uv, sampler);
                    color.lerp(layer.truncate(), layer.w)
                }
                None => color,
            };
            color.extend(1.0)
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_map_terms() {
        let base = Vec4::new(0.5, 0.5, 0.5, 0.0);
        // No specular material: light scaled by the tone factor plus ambient
        let color = tone_map(base, Vec4::new(1.2, 1.2, 1.2, 0.0), 1.0, 1.0 / 6.0, 0.2);
        assert!((color.x - (0.5 * 1.2 / 6.0 + 0.1)).abs() < 1e-6);

        // Specular material with a full highlight cancels the correction term
        let shiny = Vec4::new(0.5, 0.5, 0.5, 1.0);
        let color = tone_map(shiny, Vec4::new(0.6, 0.6, 0.6, 1.0), 1.0, 1.0, 0.0);
        assert!((color.x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_shadow_darkens_ambient() {
        let base = Vec4::new(1.0, 1.0, 1.0, 0.0);
        let color = tone_map(base, Vec4::ZERO, 0.0, 1.0 / 6.0, 0.2);
        assert_eq!(color, Vec3::ZERO);
    }

    #[test]
    fn test_validate_tone_divisor() {
        assert!(CompositeConfig::default().validate().is_ok());
        assert!(CompositeConfig::default().with_tone_divisor(0.0).validate().is_err());
        assert!(CompositeConfig::default().with_tone_divisor(-1.0).validate().is_err());
    }
}
