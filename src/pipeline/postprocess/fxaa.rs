//! FXAA-style edge antialiasing

use crate::backend::software::Texture;
use crate::backend::types::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::{Vec2, Vec3, Vec4};
use std::any::Any;

const SPAN_MAX: f32 = 8.0;
const REDUCE_MUL: f32 = 1.0 / 8.0;
const REDUCE_MIN: f32 = 1.0 / 128.0;
const SUBPIX_SHIFT: f32 = 1.0 / 4.0;
const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

pub fn luma(rgb: Vec3) -> f32 {
    rgb.dot(LUMA)
}

/// Antialiased color at `uv`; `rcp_frame` is one texel in normalized units
pub fn fxaa(source: &Texture, uv: Vec2, rcp_frame: Vec2) -> Vec3 {
    let sampler = SamplerDescriptor::LINEAR_CLAMP;
    let fetch = |p: Vec2| source.sample(p, sampler).truncate();

    let corner = uv - rcp_frame * (0.5 + SUBPIX_SHIFT);
    let rgb_nw = fetch(corner);
    let rgb_ne = fetch(corner + Vec2::new(1.0, 0.0) * rcp_frame);
    let rgb_sw = fetch(corner + Vec2::new(0.0, 1.0) * rcp_frame);
    let rgb_se = fetch(corner + rcp_frame);
    let rgb_m = fetch(uv);

    let (nw, ne, sw, se, m) = (luma(rgb_nw), luma(rgb_ne), luma(rgb_sw), luma(rgb_se), luma(rgb_m));
    let luma_min = m.min(nw.min(ne).min(sw.min(se)));
    let luma_max = m.max(nw.max(ne).max(sw.max(se)));

    let dir = Vec2::new(-((nw + ne) - (sw + se)), (nw + sw) - (ne + se));
    let dir_reduce = ((nw + ne + sw + se) * (0.25 * REDUCE_MUL)).max(REDUCE_MIN);
    let rcp_dir_min = 1.0 / (dir.x.abs().min(dir.y.abs()) + dir_reduce);
    let dir = (dir * rcp_dir_min).clamp(Vec2::splat(-SPAN_MAX), Vec2::splat(SPAN_MAX)) * rcp_frame;

    let rgb_a = 0.5 * (fetch(uv + dir * (1.0 / 3.0 - 0.5)) + fetch(uv + dir * (2.0 / 3.0 - 0.5)));
    let rgb_b = rgb_a * 0.5 + 0.25 * (fetch(uv + dir * -0.5) + fetch(uv + dir * 0.5));
    let luma_b = luma(rgb_b);
    if luma_b < luma_min || luma_b > luma_max {
        rgb_a
    } else {
        rgb_b
    }
}

/// Fullscreen FXAA pass writing `<target>.color`
pub struct FxaaPass {
    source: ResourceId,
    target: String,
    output: Option<ResourceId>,
}

impl FxaaPass {
    pub fn new(source: ResourceId, target: &str) -> Self {
        Self {
            source,
            target: target.to_string(),
            output: None,
        }
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }
}

impl RenderPass for FxaaPass {
    fn name(&self) -> &str {
        "FXAA Pass"
    }

    fn program(&self) -> Program {
        Program::fullscreen("fxaa", "default")
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("source", self.source, ResourceUsage::TextureRead);

        let (width, height) = ctx
            .texture_size(self.source)
            .unwrap_or_else(|| ctx.screen_size());
        let target = ctx.create_render_target(
            RenderTargetDesc::new(&self.target, TextureSize::Absolute { width, height })
                .attachment("color", TextureFormat::Rgba8Unorm),
        );
        self.output = target.attachment("color");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }
        ctx.set_parameter(
            "rcp_frame",
            Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32),
        );
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput(self.target.clone()))?;
        let source = ctx.input("source")?;
        let rcp_frame = ctx.vec2("rcp_frame")?;

        ctx.output(output)?.fill_with(|_, uv| {
            fxaa(source, uv, rcp_frame)
                .clamp(Vec3::ZERO, Vec3::ONE)
                .extend(1.0)
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
