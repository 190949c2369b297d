//! Deferred lighting pass
//!
//! Fullscreen pass that accumulates diffuse light (RGB) and specular
//! intensity (A) from the G-buffer, ambient occlusion and shadow factor.

use crate::backend::types::*;
use crate::error::ConfigError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::ViewLight;
use glam::{Vec3, Vec4};
use std::any::Any;

/// Lighting configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LightingConfig {
    pub specular_exponent: f32,
    /// Lights beyond this count are ignored
    pub max_lights: usize,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            specular_exponent: 100.0,
            max_lights: 8,
        }
    }
}

impl LightingConfig {
    pub fn with_specular_exponent(mut self, exponent: f32) -> Self {
        self.specular_exponent = exponent;
        self
    }

    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.specular_exponent > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "lighting.specular_exponent",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Reflect incident vector `i` about normal `n`
fn reflect(i: Vec3, n: Vec3) -> Vec3 {
    i - 2.0 * n.dot(i) * n
}

/// Light accumulated at one surface point: RGB diffuse, A specular
pub fn shade(
    lights: &[ViewLight],
    position: Vec3,
    normal: Vec3,
    shadow: f32,
    ao: f32,
    specular_exponent: f32,
) -> Vec4 {
    let eye = (-position).normalize_or_zero();
    let mut accum = Vec4::ZERO;
    for light in lights {
        let l = light.direction_from(position);
        let shadow = if light.casts_shadow { shadow } else { 1.0 };
        let diffuse = normal.dot(l).max(0.0) * shadow * ao;
        let specular = reflect(-l, normal).dot(eye).max(0.0).powf(specular_exponent) * shadow;
        accum += (light.color * diffuse).extend(specular);
    }
    accum
}

/// Deferred lighting pass
pub struct LightingPass {
    config: LightingConfig,
    normal: ResourceId,
    position: ResourceId,
    ao: Option<ResourceId>,
    shadow: Option<ResourceId>,
    output: Option<ResourceId>,
}

impl LightingPass {
    pub fn new(config: LightingConfig, normal: ResourceId, position: ResourceId) -> Self {
        Self {
            config,
            normal,
            position,
            ao: None,
            shadow: None,
            output: None,
        }
    }

    pub fn with_ambient_occlusion(mut self, ao: Option<ResourceId>) -> Self {
        self.ao = ao;
        self
    }

    pub fn with_shadow(mut self, shadow: Option<ResourceId>) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "Lighting Pass"
    }

    fn program(&self) -> Program {
        Program::fullscreen("light-accumulate", "phong")
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("normal", self.normal, ResourceUsage::TextureRead);
        ctx.read("position", self.position, ResourceUsage::TextureRead);
        if let Some(ao) = self.ao {
            ctx.read("ao", ao, ResourceUsage::TextureRead);
        }
        if let Some(shadow) = self.shadow {
            ctx.read("shadow", shadow, ResourceUsage::TextureRead);
        }

        let target = ctx.create_render_target(
            RenderTargetDesc::new("light", TextureSize::full_screen())
                .attachment("accum", TextureFormat::Rgba16Float),
        );
        self.output = target.attachment("accum");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }
        ctx.set_parameter("specular_exponent", self.config.specular_exponent);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput("light".into()))?;
        let normal = ctx.input("normal")?;
        let position = ctx.input("position")?;
        let ao = ctx.input_opt("ao");
        let shadow = ctx.input_opt("shadow");
        let exponent = ctx.float("specular_exponent")?;

        let frame = ctx.frame;
        let lights = &frame.lights[..frame.lights.len().min(self.config.max_lights)];
        if frame.lights.len() > lights.len() {
            log::debug!(
                "Lighting uses {} of {} lights",
                lights.len(),
                frame.lights.len()
            );
        }

        ctx.output(output)?.fill_with(|_, uv| {
            let p = position.sample(uv, SamplerDescriptor::NEAREST_CLAMP);
            if p.w == 0.0 {
                return Vec4::ZERO;
            }
            let n = normal
                .sample(uv, SamplerDescriptor::NEAREST_CLAMP)
                .truncate()
                .normalize_or_zero();
            let ao = ao.map_or(1.0, |t| t.sample(uv, SamplerDescriptor::LINEAR_CLAMP).x);
            let shadow = shadow.map_or(1.0, |t| t.sample(uv, SamplerDescriptor::NEAREST_CLAMP).x);
            shade(lights, p.truncate(), n, shadow, ao, exponent)
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
