//! Screen-space ambient occlusion
//!
//! Two techniques share one pass:
//! 1. Spiral sampling: taps on a rotated spiral over the view-space position
//!    buffer, weighted by a configurable falloff.
//! 2. Legacy depth comparison: rings of eight taps over linear depth compared
//!    with an asymmetric gaussian.
//!
//! The output is visibility in [0, 1] (1 = unoccluded) in the `ao.visibility`
//! attachment, optionally at reduced resolution.

use crate::backend::software::{Texture, MAX_TEXTURE_DIMENSION};
use crate::backend::types::*;
use crate::error::ConfigError;
use crate::pipeline::postprocess::BlurKernel;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::{UVec2, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::any::Any;
use std::f32::consts::TAU;

/// Name of the external noise texture the pass samples
pub const NOISE_TEXTURE: &str = "ssao_noise";

const MAX_SAMPLES: u32 = 64;

/// Per-tap weight for the spiral variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AoFalloff {
    /// Hard cutoff at the sample radius
    Hpg12,
    #[default]
    SmoothCubic,
    Linear,
    Step,
}

impl AoFalloff {
    /// Occlusion contributed by a tap with `vv = v·v` and `vn = v·N − bias`
    pub fn evaluate(&self, vv: f32, vn: f32, radius2: f32, epsilon: f32) -> f32 {
        let inside = if vv < radius2 { 1.0 } else { 0.0 };
        match self {
            AoFalloff::Hpg12 => inside * (vn / (epsilon + vv)).max(0.0),
            AoFalloff::SmoothCubic => {
                let f = (radius2 - vv).max(0.0) / radius2;
                f * f * f * (vn / (epsilon + vv)).max(0.0)
            }
            AoFalloff::Linear => 4.0 * (1.0 - vv / radius2).max(0.0) * vn.max(0.0),
            AoFalloff::Step => 2.0 * inside * vn.max(0.0),
        }
    }
}

/// How the summed occlusion becomes visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AoResolve {
    /// `1 − sum/N`
    #[default]
    Subtractive,
    /// `(1/sum)/N`
    Reciprocal,
}

impl AoResolve {
    pub fn visibility(&self, sum: f32, samples: u32) -> f32 {
        let n = samples.max(1) as f32;
        match self {
            AoResolve::Subtractive => 1.0 - (sum / n).clamp(0.0, 1.0),
            AoResolve::Reciprocal => ((1.0 / sum.max(1e-4)) / n).clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoVariant {
    Spiral { falloff: AoFalloff, resolve: AoResolve },
    LegacyDepth,
}

impl Default for AoVariant {
    fn default() -> Self {
        AoVariant::Spiral {
            falloff: AoFalloff::default(),
            resolve: AoResolve::default(),
        }
    }
}

/// Ambient occlusion configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AoConfig {
    pub variant: AoVariant,
    /// Taps per pixel (spiral) or rings (legacy), 1 to 64
    pub sample_count: u32,
    pub spiral_turns: f32,
    /// Sample radius in view-space units
    pub sample_radius: f32,
    /// Ceiling for the projected radius, in pixels
    pub max_radius_px: f32,
    pub bias: f32,
    pub epsilon: f32,
    /// AO target size relative to the screen, in (0, 1]
    pub resolution_scale: f32,
    pub blur: Option<BlurKernel>,
    /// Derive normals from position differences instead of the G-buffer
    pub reconstruct_normals: bool,
    pub noise_size: u32,
    pub noise_seed: u64,
}

impl Default for AoConfig {
    fn default() -> Self {
        Self {
            variant: AoVariant::default(),
            sample_count: 8,
            spiral_turns: 7.0,
            sample_radius: 10.0,
            max_radius_px: 128.0,
            bias: 0.0,
            epsilon: 0.9,
            resolution_scale: 1.0,
            blur: None,
            reconstruct_normals: false,
            noise_size: 4,
            noise_seed: 12345,
        }
    }
}

impl AoConfig {
    pub fn with_variant(mut self, variant: AoVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_sample_radius(mut self, radius: f32) -> Self {
        self.sample_radius = radius;
        self
    }

    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn with_blur(mut self, kernel: BlurKernel) -> Self {
        self.blur = Some(kernel);
        self
    }

    pub fn with_noise_size(mut self, size: u32) -> Self {
        self.noise_size = size;
        self
    }

    pub fn with_reconstructed_normals(mut self, enabled: bool) -> Self {
        self.reconstruct_normals = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SAMPLES).contains(&self.sample_count) {
            return Err(ConfigError::InvalidParameter {
                name: "ao.sample_count",
                reason: format!("{} is outside 1..={}", self.sample_count, MAX_SAMPLES),
            });
        }
        if !(self.sample_radius > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "ao.sample_radius",
                reason: "must be positive".into(),
            });
        }
        if !(self.resolution_scale > 0.0 && self.resolution_scale <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "ao.resolution_scale",
                reason: format!("{} is outside (0, 1]", self.resolution_scale),
            });
        }
        if !(1..=MAX_TEXTURE_DIMENSION).contains(&self.noise_size) {
            return Err(ConfigError::InvalidParameter {
                name: "ao.noise_size",
                reason: format!("{} is outside 1..={}", self.noise_size, MAX_TEXTURE_DIMENSION),
            });
        }
        Ok(())
    }
}

/// Generate the tiled random texture that rotates the spiral per pixel.
///
/// Uses a fixed seed so frames and runs are reproducible.
pub fn generate_noise(size: u32, seed: u64) -> Texture {
    let mut rng = StdRng::seed_from_u64(seed);
    let texels = size as usize * size as usize;
    let mut data = Vec::with_capacity(texels * 4);
    for _ in 0..texels {
        for _ in 0..3 {
            data.push(rng.random_range(0..=255u8));
        }
        data.push(255);
    }
    Texture::from_rgba8(NOISE_TEXTURE, size, size, &data)
}

/// Unit direction and radius fraction of spiral tap `index`
pub fn spiral_tap(index: u32, samples: u32, turns: f32, rotation: f32) -> (Vec2, f32) {
    let alpha = (index as f32 + 0.5) / samples.max(1) as f32;
    let angle = alpha * turns * TAU + rotation;
    (Vec2::new(angle.cos(), angle.sin()), alpha)
}

/// Gaussian depth comparison of the legacy variant; also reports whether the tap was "far"
pub fn legacy_compare(d1: f32, d2: f32) -> (f32, bool) {
    const DISPLACE: f32 = 0.2;
    let diff = (d1 - d2) * 100.0;
    let (area, far) = if diff < DISPLACE { (0.1, false) } else { (10.0, true) };
    let gauss = (-2.0 * (diff - DISPLACE).powi(2) / (area * area)).exp();
    (gauss, far)
}

fn inside_screen(uv: Vec2) -> bool {
    uv.x >= 0.0 && uv.x <= 1.0 && uv.y >= 0.0 && uv.y <= 1.0
}

/// Linear depth `-z / far` for the legacy variant.
///
/// Off-screen coordinates and background pixels read as the far plane.
fn legacy_depth(position: &Texture, uv: Vec2, far: f32) -> f32 {
    if !inside_screen(uv) {
        return 1.0;
    }
    let q = position.sample(uv, SamplerDescriptor::NEAREST_CLAMP);
    if q.w == 0.0 {
        1.0
    } else {
        -q.z / far
    }
}

const NOISE_SAMPLER: SamplerDescriptor = SamplerDescriptor {
    filter: FilterMode::Nearest,
    address_mode: AddressMode::Repeat,
};

/// Screen-space ambient occlusion pass
pub struct SsaoPass {
    config: AoConfig,
    position: ResourceId,
    normal: ResourceId,
    noise: ResourceId,
    output: Option<ResourceId>,
}

impl SsaoPass {
    pub fn new(config: AoConfig, position: ResourceId, normal: ResourceId, noise: ResourceId) -> Self {
        Self {
            config,
            position,
            normal,
            noise,
            output: None,
        }
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }

    fn spiral(
        &self,
        falloff: AoFalloff,
        resolve: AoResolve,
        frame: &AoFrame,
        uv: Vec2,
        p: Vec3,
        n: Vec3,
        noise: Vec4,
    ) -> f32 {
        let view_depth = -p.z;
        if view_depth <= 0.0 {
            return 1.0;
        }
        let cfg = &self.config;
        let rotation = TAU * noise.x * noise.y;
        let radius_px = (frame.projection_scale * cfg.sample_radius / view_depth).min(cfg.max_radius_px);
        let radius2 = cfg.sample_radius * cfg.sample_radius;

        let mut sum = 0.0;
        for i in 0..cfg.sample_count {
            let (direction, alpha) = spiral_tap(i, cfg.sample_count, cfg.spiral_turns, rotation);
            let tap = uv + direction * alpha * radius_px * frame.texel_size;
            if !inside_screen(tap) {
                continue;
            }
            let q = frame.position.sample(tap, SamplerDescriptor::NEAREST_CLAMP);
            if q.w == 0.0 {
                continue;
            }
            let v = q.truncate() - p;
            sum += falloff.evaluate(v.dot(v), v.dot(n) - cfg.bias, radius2, cfg.epsilon);
        }
        resolve.visibility(sum, cfg.sample_count)
    }

    fn legacy(&self, frame: &AoFrame, uv: Vec2, p: Vec3, noise: Vec4) -> f32 {
        let depth = -p.z / frame.far;
        if depth <= 0.0 {
            return 1.0;
        }
        let read = |uv: Vec2| legacy_depth(frame.position, uv, frame.far);

        let tap = |offset: Vec2| -> f32 {
            let coord = uv + offset / depth;
            if !(coord.x > 0.0 && coord.x < 1.0 && coord.y > 0.0 && coord.y < 1.0) {
                return 0.0;
            }
            let (mut t, far) = legacy_compare(depth, read(coord));
            if far {
                let (mirrored, _) = legacy_compare(read(uv - offset / depth), depth);
                t += (1.0 - t) * mirrored;
            }
            t
        };

        let mut ring = frame.texel_size * 0.5;
        let mut sum = 0.0;
        for _ in 0..self.config.sample_count {
            let (pw, ph) = (ring.x, ring.y);
            for offset in [
                Vec2::new(pw, ph),
                Vec2::new(pw, -ph),
                Vec2::new(-pw, ph),
                Vec2::new(-pw, -ph),
                Vec2::new(pw * 1.2, 0.0),
                Vec2::new(-pw * 1.2, 0.0),
                Vec2::new(0.0, ph * 1.2),
                Vec2::new(0.0, -ph * 1.2),
            ] {
                sum += tap(offset);
            }
            ring += Vec2::new(noise.x, noise.y) * 0.0007;
            ring *= 3.5;
        }
        (1.0 - sum / (8.0 * self.config.sample_count as f32)).clamp(0.0, 1.0)
    }
}

struct AoFrame<'a> {
    position: &'a Texture,
    texel_size: Vec2,
    projection_scale: f32,
    far: f32,
}

/// View-space normal from position differences with the right and lower neighbours
fn reconstruct_normal(position: &Texture, pixel: UVec2, center: Vec3) -> Option<Vec3> {
    let (x, y) = (pixel.x as i64, pixel.y as i64);
    let neighbour = |dx: i64, dy: i64| {
        let q = position.load(x + dx, y + dy);
        (q.w != 0.0).then(|| q.truncate())
    };
    let right = neighbour(1, 0)
        .filter(|_| x + 1 < position.width() as i64)
        .map(|q| q - center)
        .or_else(|| neighbour(-1, 0).map(|q| center - q))?;
    let down = neighbour(0, 1)
        .filter(|_| y + 1 < position.height() as i64)
        .map(|q| q - center)
        .or_else(|| neighbour(0, -1).map(|q| center - q))?;
    // Screen y grows downward; flip it to keep the normal facing the viewer
    right.cross(-down).try_normalize()
}

impl RenderPass for SsaoPass {
    fn name(&self) -> &str {
        "SSAO Pass"
    }

    fn program(&self) -> Program {
        let variant = match self.config.variant {
            AoVariant::Spiral { falloff, .. } => match falloff {
                AoFalloff::Hpg12 => "spiral-hpg12",
                AoFalloff::SmoothCubic => "spiral-smooth-cubic",
                AoFalloff::Linear => "spiral-linear",
                AoFalloff::Step => "spiral-step",
            },
            AoVariant::LegacyDepth => "legacy-depth",
        };
        Program::fullscreen("ssao", variant)
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("position", self.position, ResourceUsage::TextureRead);
        ctx.read("normal", self.normal, ResourceUsage::TextureRead);
        ctx.read("noise", self.noise, ResourceUsage::TextureRead);

        let target = ctx.create_render_target(
            RenderTargetDesc::new("ao", TextureSize::scaled(self.config.resolution_scale))
                .attachment("visibility", TextureFormat::Rgba8Unorm),
        );
        self.output = target.attachment("visibility");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }

        let (width, height) = ctx
            .texture_size(self.position)
            .unwrap_or_else(|| ctx.screen_size());
        ctx.set_parameter(
            "texel_size",
            Vec2::new(1.0 / width as f32, 1.0 / height as f32),
        );
        let noise = self.config.noise_size.max(1) as f32;
        ctx.set_parameter(
            "noise_scale",
            Vec2::new(target.width as f32 / noise, target.height as f32 / noise),
        );
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput("ao".into()))?;
        let position = ctx.input("position")?;
        let normal = ctx.input("normal")?;
        let noise = ctx.input("noise")?;
        let noise_scale = ctx.vec2("noise_scale")?;
        let frame = AoFrame {
            position,
            texel_size: ctx.vec2("texel_size")?,
            projection_scale: ctx.float("projection_scale")?,
            far: ctx.float("camera_far")?,
        };

        ctx.output(output)?.fill_with(|_, uv| {
            let p = position.sample(uv, SamplerDescriptor::NEAREST_CLAMP);
            if p.w == 0.0 {
                return Vec4::ONE;
            }
            let n = noise.sample(uv * noise_scale, NOISE_SAMPLER);

            let visibility = match self.config.variant {
                AoVariant::Spiral { falloff, resolve } => {
                    let gbuffer_normal = normal.sample(uv, SamplerDescriptor::NEAREST_CLAMP).truncate();
                    let pixel = (uv * position.size().as_vec2()).as_uvec2();
                    let n_view = if self.config.reconstruct_normals {
                        reconstruct_normal(position, pixel, p.truncate()).unwrap_or(gbuffer_normal)
                    } else {
                        gbuffer_normal
                    };
                    self.spiral(falloff, resolve, &frame, uv, p.truncate(), n_view, n)
                }
                AoVariant::LegacyDepth => self.legacy(&frame, uv, p.truncate(), n),
            };
            Vec4::new(visibility, visibility, visibility, 1.0)
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
