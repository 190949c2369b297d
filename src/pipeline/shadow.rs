//! Shadow mapping
//!
//! The shadow stage runs in two passes: the opaque scene is rendered from the
//! shadow-casting light into a map of absolute size, then every screen pixel
//! is projected into that map and compared over a 4x4 tap kernel.

use crate::backend::software::{ndc_to_uv, Rasterizer, Texture};
use crate::backend::types::*;
use crate::error::ConfigError;
use crate::pipeline::vertex_stage::{DrawStats, MeshTransform};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::any::Any;

/// Texel offsets of the resolve kernel, along each axis
const TAP_OFFSETS: [f32; 4] = [-1.5, -0.5, 0.5, 1.5];

/// Largest shadow map edge accepted by configuration
pub const MAX_SHADOW_MAP_SIZE: u32 = 8192;

/// How a fragment is compared against the shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowComparison {
    /// Binary depth test with an epsilon
    Hard,
    /// Chebyshev upper bound over depth moments
    #[default]
    Variance,
}

/// Contents of the shadow map attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowMapFormat {
    /// One channel: depth
    Depth,
    /// Two channels: depth and depth squared
    #[default]
    Moments,
}

impl ShadowMapFormat {
    pub fn texture_format(&self) -> TextureFormat {
        match self {
            ShadowMapFormat::Depth => TextureFormat::R32Float,
            ShadowMapFormat::Moments => TextureFormat::Rg32Float,
        }
    }
}

/// Shadow configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    pub comparison: ShadowComparison,
    pub map_format: ShadowMapFormat,
    pub map_size: u32,
    /// Tolerance of the hard comparison
    pub epsilon: f32,
    /// Lower bound on the variance of the moments
    pub variance_floor: f32,
    /// Also reject fragments outside the light's depth range
    pub depth_range_check: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            comparison: ShadowComparison::Variance,
            map_format: ShadowMapFormat::Moments,
            map_size: 1024,
            epsilon: 8e-5,
            variance_floor: 2e-8,
            depth_range_check: true,
        }
    }
}

impl ShadowConfig {
    /// Hard comparison over a single-channel depth map
    pub fn hard() -> Self {
        Self {
            comparison: ShadowComparison::Hard,
            map_format: ShadowMapFormat::Depth,
            ..Default::default()
        }
    }

    pub fn with_map_size(mut self, size: u32) -> Self {
        self.map_size = size;
        self
    }

    pub fn with_comparison(mut self, comparison: ShadowComparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn with_map_format(mut self, format: ShadowMapFormat) -> Self {
        self.map_format = format;
        self
    }

    pub fn with_depth_range_check(mut self, enabled: bool) -> Self {
        self.depth_range_check = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size == 0 || self.map_size > MAX_SHADOW_MAP_SIZE {
            return Err(ConfigError::InvalidParameter {
                name: "shadows.map_size",
                reason: format!("{} is outside 1..={}", self.map_size, MAX_SHADOW_MAP_SIZE),
            });
        }
        if self.comparison == ShadowComparison::Variance && self.map_format == ShadowMapFormat::Depth {
            return Err(ConfigError::UnsupportedCombination(
                "variance shadows need a two-channel moments map".into(),
            ));
        }
        if !(self.variance_floor > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "shadows.variance_floor",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Probability that a fragment at `depth` is lit, given the map's depth moments
pub fn chebyshev_upper_bound(m1: f32, m2: f32, depth: f32, variance_floor: f32) -> f32 {
    if depth <= m1 {
        return 1.0;
    }
    let variance = (m2 - m1 * m1).max(variance_floor);
    let d = depth - m1;
    variance / (variance + d * d)
}

/// Renders light-space depth of opaque geometry
pub struct ShadowMapPass {
    config: ShadowConfig,
    skinning: bool,
    map: Option<ResourceId>,
    depth: Option<ResourceId>,
}

impl ShadowMapPass {
    pub fn new(config: ShadowConfig, skinning: bool) -> Self {
        Self {
            config,
            skinning,
            map: None,
            depth: None,
        }
    }

    pub fn map(&self) -> Option<ResourceId> {
        self.map
    }
}

impl RenderPass for ShadowMapPass {
    fn name(&self) -> &str {
        "Shadow Map Pass"
    }

    fn program(&self) -> Program {
        let variant = match self.config.map_format {
            ShadowMapFormat::Depth => "depth",
            ShadowMapFormat::Moments => "moments",
        };
        Program::mesh(self.skinning, "shadow-map", variant)
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        let target = ctx.create_render_target(
            RenderTargetDesc::new("shadow_map", TextureSize::square(self.config.map_size))
                .attachment("map", self.config.map_format.texture_format())
                .attachment("depth", TextureFormat::Depth32Float),
        );
        self.map = target.attachment("map");
        self.depth = target.attachment("depth");
        if let (Some(map), Some(depth)) = (self.map, self.depth) {
            ctx.write(map, ResourceUsage::RenderTarget);
            ctx.write(depth, ResourceUsage::DepthStencilWrite);
        }
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let (Some(map), Some(depth)) = (self.map, self.depth) else {
            return Err(PassError::MissingInput("shadow_map".into()));
        };
        let enabled = ctx.float("shadow_enabled")? > 0.5;
        let transform = if enabled {
            Some(MeshTransform::new(
                ctx.mat4("light_view")?,
                ctx.mat4("light_projection")?,
                self.skinning,
            ))
        } else {
            None
        };
        let scene = ctx.scene();

        let [map_tex, depth_tex] = ctx.outputs.many_mut([map, depth])?;
        map_tex.clear(Vec4::ONE);
        depth_tex.clear(Vec4::ONE);

        let Some(transform) = transform else {
            return Ok(());
        };

        let rasterizer = Rasterizer::new(map_tex.width(), map_tex.height());
        let mut stats = DrawStats::default();
        for object in &scene.objects {
            let material = scene
                .object_material(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;
            if material.is_transparent() {
                continue;
            }
            let mesh = scene
                .object_mesh(object)
                .map_err(|err| PassError::InvalidDrawable(err.to_string()))?;
            let vertices = transform.vertices(scene, object)?;
            stats.merge(transform.draw(&rasterizer, &mesh.indices, &vertices, |_, fragment| {
                let (x, y) = (fragment.pixel.x, fragment.pixel.y);
                let z = fragment.depth;
                if !CompareFunction::LessEqual.passes(z, depth_tex.load(x as i64, y as i64).x) {
                    return;
                }
                depth_tex.store(x, y, Vec4::splat(z));
                map_tex.store(x, y, Vec4::new(z, z * z, 0.0, 0.0));
            }));
        }

        if stats.behind_eye > 0 {
            log::warn!(
                "Shadow map dropped {} triangles crossing the light plane",
                stats.behind_eye
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Projects screen pixels into the shadow map and writes a shadow factor
pub struct ShadowResolvePass {
    config: ShadowConfig,
    position: ResourceId,
    shadow_map: ResourceId,
    output: Option<ResourceId>,
}

impl ShadowResolvePass {
    pub fn new(config: ShadowConfig, position: ResourceId, shadow_map: ResourceId) -> Self {
        Self {
            config,
            position,
            shadow_map,
            output: None,
        }
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }

    /// Shadow factor of one view-space point; 1 means fully lit
    fn factor(&self, map: &Texture, texel: Vec2, shadow_matrix: Mat4, position: Vec3) -> f32 {
        let clip = shadow_matrix * position.extend(1.0);
        if clip.w <= 0.0 {
            return 1.0;
        }
        let ndc = clip.truncate() / clip.w;
        if ndc.x.abs() >= 1.0 || ndc.y.abs() >= 1.0 {
            return 1.0;
        }
        if self.config.depth_range_check && ndc.z.abs() >= 1.0 {
            return 1.0;
        }

        let center = ndc_to_uv(ndc.truncate());
        let depth = ndc.z;
        let mut lit = 0.0;
        for dy in TAP_OFFSETS {
            for dx in TAP_OFFSETS {
                let stored = map.sample(center + Vec2::new(dx, dy) * texel, SamplerDescriptor::NEAREST_CLAMP);
                lit += match self.config.comparison {
                    ShadowComparison::Hard => {
                        if stored.x - depth > -self.config.epsilon {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    ShadowComparison::Variance => {
                        chebyshev_upper_bound(stored.x, stored.y, depth, self.config.variance_floor)
                    }
                };
            }
        }
        lit / (TAP_OFFSETS.len() * TAP_OFFSETS.len()) as f32
    }
}

impl RenderPass for ShadowResolvePass {
    fn name(&self) -> &str {
        "Shadow Resolve Pass"
    }

    fn program(&self) -> Program {
        let variant = match self.config.comparison {
            ShadowComparison::Hard => "hard",
            ShadowComparison::Variance => "variance",
        };
        Program::fullscreen("shadow-resolve", variant)
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("position", self.position, ResourceUsage::TextureRead);
        ctx.read("shadow_map", self.shadow_map, ResourceUsage::TextureRead);

        let target = ctx.create_render_target(
            RenderTargetDesc::new("shadow", TextureSize::full_screen())
                .attachment("factor", TextureFormat::Rgba8Unorm),
        );
        self.output = target.attachment("factor");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }

        let size = ctx
            .texture_size(self.shadow_map)
            .map(|(w, _)| w)
            .unwrap_or(self.config.map_size)
            .max(1);
        ctx.set_parameter("shadow_texel_size", Vec2::splat(1.0 / size as f32));
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput("shadow".into()))?;
        let position = ctx.input("position")?;
        let map = ctx.input("shadow_map")?;
        let enabled = ctx.float("shadow_enabled")? > 0.5;
        let shadow_matrix = ctx.mat4("shadow_matrix")?;
        let texel = ctx.vec2("shadow_texel_size")?;

        let target = ctx.output(output)?;
        if !enabled {
            target.clear(Vec4::ONE);
            return Ok(());
        }
        target.fill_with(|_, uv| {
            let p = position.sample(uv, SamplerDescriptor::NEAREST_CLAMP);
            if p.w == 0.0 {
                return Vec4::ONE;
            }
            let factor = self.factor(map, texel, shadow_matrix, p.truncate());
            Vec4::new(factor, factor, factor, 1.0)
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
    use crate::scene::ShadowCaster;

    fn map(format: TextureFormat, value: f32) -> Texture {
        let mut texture = Texture::new(TextureDescriptor {
            width: 16,
            height: 16,
            format,
            ..Default::default()
        });
        texture.clear(Vec4::new(value, value * value, 0.0, 0.0));
        texture
    }

    fn resolve(config: ShadowConfig) -> ShadowResolvePass {
        ShadowResolvePass::new(config, ResourceId(0), ResourceId(1))
    }

    /// Light looking down -Z from the origin, camera view = identity
    fn light() -> Mat4 {
        ShadowCaster::perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 1.0, 10.0).view_projection()
    }

    fn fragment_depth(position: Vec3) -> f32 {
        let clip = light() * position.extend(1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_hard_unoccluded_and_occluded() {
        let pass = resolve(ShadowConfig::hard());
        let point = Vec3::new(0.0, 0.0, -5.0);
        let depth = fragment_depth(point);
        let texel = Vec2::splat(1.0 / 16.0);

        let clear = map(TextureFormat::R32Float, depth);
        assert!(pass.factor(&clear, texel, light(), point) >= 0.99);

        let blocked = map(TextureFormat::R32Float, depth - 0.6);
        assert!(pass.factor(&blocked, texel, light(), point) <= 0.01);
    }

    #[test]
    fn test_outside_frustum_is_lit() {
        let pass = resolve(ShadowConfig::hard());
        let blocked = map(TextureFormat::R32Float, 0.0);
        let texel = Vec2::splat(1.0 / 16.0);
        // Behind the light and far to the side
        assert_eq!(pass.factor(&blocked, texel, light(), Vec3::new(0.0, 0.0, 5.0)), 1.0);
        assert_eq!(pass.factor(&blocked, texel, light(), Vec3::new(50.0, 0.0, -5.0)), 1.0);
        // Beyond the far plane only when the depth range is checked
        let beyond = Vec3::new(0.0, 0.0, -20.0);
        assert_eq!(pass.factor(&blocked, texel, light(), beyond), 1.0);
        let unchecked = resolve(ShadowConfig::hard().with_depth_range_check(false));
        assert!(unchecked.factor(&blocked, texel, light(), beyond) <= 0.01);
    }

    #[test]
    fn test_variance_is_monotonic_in_distance() {
        let (m1, m2) = (0.4, 0.4 * 0.4 + 1e-4);
        let mut previous = 1.0;
        for step in 0..50 {
            let depth = m1 + step as f32 * 0.01;
            let p = chebyshev_upper_bound(m1, m2, depth, 2e-8);
            assert!(p <= previous + 1e-7);
            assert!((0.0..=1.0).contains(&p));
            previous = p;
        }
        assert_eq!(chebyshev_upper_bound(0.5, 0.25, 0.3, 2e-8), 1.0);
    }

    #[test]
    fn test_variance_resolve_with_moments_map() {
        let pass = resolve(ShadowConfig::default());
        let point = Vec3::new(0.0, 0.0, -5.0);
        let depth = fragment_depth(point);
        let texel = Vec2::splat(1.0 / 16.0);
        assert_eq!(pass.factor(&map(TextureFormat::Rg32Float, depth + 0.01), texel, light(), point), 1.0);
        assert!(pass.factor(&map(TextureFormat::Rg32Float, depth - 0.5), texel, light(), point) < 0.01);
    }

    #[test]
    fn test_validate() {
        assert!(ShadowConfig::default().validate().is_ok());
        assert!(ShadowConfig::hard().validate().is_ok());
        assert!(ShadowConfig::default().with_map_size(0).validate().is_err());
        assert!(matches!(
            ShadowConfig::default()
                .with_map_format(ShadowMapFormat::Depth)
                .validate(),
            Err(ConfigError::UnsupportedCombination(_))
        ));
    }
}
