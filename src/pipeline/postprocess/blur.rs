//! Separable blur pass

use super::BlurKernel;
use crate::backend::types::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use glam::{Vec2, Vec4};
use std::any::Any;

/// Axis a blur pass samples along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    fn axis(&self) -> Vec2 {
        match self {
            BlurDirection::Horizontal => Vec2::X,
            BlurDirection::Vertical => Vec2::Y,
        }
    }
}

/// One direction of a separable blur.
///
/// Writes `<target>.color` with the same size and format as the source. Tap
/// offsets in normalized coordinates are computed at setup from the source
/// dimensions and stored as `tap_offsets`.
pub struct BlurPass {
    label: String,
    kernel: BlurKernel,
    direction: BlurDirection,
    source: ResourceId,
    target: String,
    format: TextureFormat,
    output: Option<ResourceId>,
}

impl BlurPass {
    pub fn new(
        kernel: BlurKernel,
        direction: BlurDirection,
        source: ResourceId,
        target: &str,
        format: TextureFormat,
    ) -> Self {
        let axis = match direction {
            BlurDirection::Horizontal => "Horizontal",
            BlurDirection::Vertical => "Vertical",
        };
        Self {
            label: format!("{} Blur ({})", axis, target),
            kernel,
            direction,
            source,
            target: target.to_string(),
            format,
            output: None,
        }
    }

    pub fn output(&self) -> Option<ResourceId> {
        self.output
    }
}

impl RenderPass for BlurPass {
    fn name(&self) -> &str {
        &self.label
    }

    fn program(&self) -> Program {
        Program::fullscreen("blur", self.kernel.name())
    }

    fn setup(&mut self, ctx: &mut PassSetupContext) {
        ctx.read("source", self.source, ResourceUsage::TextureRead);

        let (width, height) = ctx
            .texture_size(self.source)
            .unwrap_or_else(|| ctx.screen_size());
        let target = ctx.create_render_target(
            RenderTargetDesc::new(&self.target, TextureSize::Absolute { width, height })
                .attachment("color", self.format),
        );
        self.output = target.attachment("color");
        if let Some(output) = self.output {
            ctx.write(output, ResourceUsage::RenderTarget);
        }

        let texel = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        let step = texel * self.direction.axis();
        let offsets: Vec<Vec2> = self
            .kernel
            .taps()
            .iter()
            .map(|(index, _)| step * *index as f32)
            .collect();
        ctx.set_parameter("tap_offsets", offsets);
    }

    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
        let output = self
            .output
            .ok_or_else(|| PassError::MissingInput(self.target.clone()))?;
        let source = ctx.input("source")?;
        let offsets = ctx.vec2_array("tap_offsets")?.to_vec();
        let taps = self.kernel.taps();

        ctx.output(output)?.fill_with(|_, uv| {
            offsets
                .iter()
                .zip(&taps)
                .fold(Vec4::ZERO, |sum, (offset, (_, weight))| {
                    sum + source.sample(uv + *offset, SamplerDescriptor::NEAREST_CLAMP) * *weight
                })
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
    use crate::backend::software::Texture;

    fn blur_row(kernel: BlurKernel, row: &[f32]) -> Vec<f32> {
        let mut source = Texture::new(TextureDescriptor {
            label: None,
            width: row.len() as u32,
            height: 1,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::TEXTURE_BINDING,
        });
        for (x, value) in row.iter().enumerate() {
            source.store(x as u32, 0, Vec4::splat(*value));
        }
        let texel = source.texel_size();
        let mut out = Vec::new();
        for x in 0..row.len() {
            let uv = Vec2::new((x as f32 + 0.5) * texel.x, 0.5);
            let value = kernel.taps().iter().fold(0.0, |sum, (i, w)| {
                let offset = Vec2::new(texel.x * *i as f32, 0.0);
                sum + source.sample(uv + offset, SamplerDescriptor::NEAREST_CLAMP).x * w
            });
            out.push(value);
        }
        out
    }

    #[test]
    fn test_blur_preserves_constant_signal() {
        let row = [0.5; 24];
        for value in blur_row(BlurKernel::Taps14, &row) {
            assert!((value - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn test_blur_spreads_impulse_by_weights() {
        let mut row = [0.0; 9];
        row[4] = 1.0;
        let out = blur_row(BlurKernel::Taps4, &row);
        assert!((out[4] - 6.0 / 16.0).abs() < 1e-3);
        assert!((out[3] - 4.0 / 16.0).abs() < 1e-3);
        assert!((out[6] - 1.0 / 16.0).abs() < 1e-3);
        assert!(out[0].abs() < 1e-6);
    }

    #[test]
    fn test_blur_direction_axis() {
        assert_eq!(BlurDirection::Horizontal.axis(), Vec2::X);
        assert_eq!(BlurDirection::Vertical.axis(), Vec2::Y);
    }
}
