//! Deferred rendering pipeline
//!
//! This module assembles the deferred pipeline as a render graph:
//! 1. G-Buffer pass - normals, positions, albedo and object ids of opaque drawables
//! 2. Ambient occlusion - spiral or legacy depth comparison, optionally blurred
//! 3. Shadows - light-space depth or moments map, resolved to a screen-space factor
//! 4. Lighting pass - diffuse and specular accumulation over all lights
//! 5. Transparents - sorted, blended translucent drawables
//! 6. Composite - tone mapping, ambient term and transparents
//! 7. Post-processing - separable blur or FXAA

pub mod composite;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod postprocess;
pub mod shadow;
pub mod skinning;
pub mod ssao;
pub mod transparent_pass;
pub mod vertex_stage;

pub use composite::{CompositeConfig, CompositePass};
pub use gbuffer_pass::{GBufferPass, GBufferTargets};
pub use lighting_pass::{LightingConfig, LightingPass};
pub use postprocess::{BlurDirection, BlurKernel, BlurPass, FxaaPass, PostProcess};
pub use shadow::{ShadowComparison, ShadowConfig, ShadowMapFormat, ShadowMapPass, ShadowResolvePass};
pub use skinning::{BonePose, BoneTable, SkinningError, MAX_BONES};
pub use ssao::{AoConfig, AoFalloff, AoResolve, AoVariant, SsaoPass, NOISE_TEXTURE};
pub use transparent_pass::TransparentPass;

use crate::backend::types::TextureFormat;
use crate::error::ConfigError;
use crate::render_graph::{GraphError, RenderGraph, RenderGraphBuilder, ResourceId};
use glam::Vec4;

/// Configuration for the Deferred pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredConfig {
    /// Color of pixels no opaque drawable covers
    pub clear_color: Vec4,
    /// Blend vertices by their bone table
    pub skinning: bool,
    /// Perturb G-buffer normals with the material detail texture
    pub detail_map: bool,
    pub ambient_occlusion: Option<AoConfig>,
    pub shadows: Option<ShadowConfig>,
    pub lighting: LightingConfig,
    pub composite: CompositeConfig,
    /// Render drawables with opacity below 1 in a separate blended pass
    pub transparents: bool,
    pub post_process: PostProcess,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            skinning: false,
            detail_map: false,
            ambient_occlusion: Some(AoConfig::default()),
            shadows: Some(ShadowConfig::default()),
            lighting: LightingConfig::default(),
            composite: CompositeConfig::default(),
            transparents: true,
            post_process: PostProcess::Fxaa,
        }
    }
}

impl DeferredConfig {
    /// G-buffer, lighting and composite only
    pub fn minimal() -> Self {
        Self {
            ambient_occlusion: None,
            shadows: None,
            transparents: false,
            post_process: PostProcess::None,
            ..Self::default()
        }
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_skinning(mut self, enabled: bool) -> Self {
        self.skinning = enabled;
        self
    }

    pub fn with_detail_map(mut self, enabled: bool) -> Self {
        self.detail_map = enabled;
        self
    }

    pub fn with_ambient_occlusion(mut self, ao: Option<AoConfig>) -> Self {
        self.ambient_occlusion = ao;
        self
    }

    pub fn with_shadows(mut self, shadows: Option<ShadowConfig>) -> Self {
        self.shadows = shadows;
        self
    }

    pub fn with_lighting(mut self, lighting: LightingConfig) -> Self {
        self.lighting = lighting;
        self
    }

    pub fn with_composite(mut self, composite: CompositeConfig) -> Self {
        self.composite = composite;
        self
    }

    pub fn with_transparents(mut self, enabled: bool) -> Self {
        self.transparents = enabled;
        self
    }

    pub fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = post_process;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ao) = &self.ambient_occlusion {
            ao.validate()?;
        }
        if let Some(shadows) = &self.shadows {
            shadows.validate()?;
        }
        self.lighting.validate()?;
        self.composite.validate()
    }
}

/// Resources created by the Deferred pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredResources {
    pub gbuffer: GBufferTargets,
    /// External noise texture the AO pass tiles over the screen
    pub noise: Option<ResourceId>,
    /// AO visibility as read by lighting (after blur when enabled)
    pub ao: Option<ResourceId>,
    pub shadow_map: Option<ResourceId>,
    pub shadow: Option<ResourceId>,
    pub light: ResourceId,
    pub transparents: Option<ResourceId>,
    /// Composited frame before post-processing
    pub frame: ResourceId,
    /// Attachment presented to the host
    pub output: ResourceId,
}

fn created(pass: &str, output: &str, id: Option<ResourceId>) -> Result<ResourceId, GraphError> {
    id.ok_or_else(|| GraphError::MissingOutput {
        pass: pass.to_string(),
        output: output.to_string(),
    })
}

/// Build the Deferred render graph
pub fn build_deferred_graph(
    width: u32,
    height: u32,
    config: &DeferredConfig,
) -> Result<(RenderGraph, DeferredResources), GraphError> {
    let mut builder = RenderGraphBuilder::new(width, height);

    let gbuffer = builder
        .pass_with(GBufferPass::new(config.skinning, config.detail_map), |p| p.targets())?
        .ok_or_else(|| GraphError::MissingOutput {
            pass: "G-Buffer Pass".into(),
            output: "gbuffer".into(),
        })?;

    let mut noise = None;
    let mut ao = None;
    if let Some(ao_config) = &config.ambient_occlusion {
        let noise_id = builder.external(NOISE_TEXTURE);
        noise = Some(noise_id);
        let pass = SsaoPass::new(ao_config.clone(), gbuffer.position, gbuffer.normal, noise_id);
        let mut visibility = created("SSAO Pass", "ao", builder.pass_with(pass, |p| p.output())?)?;

        if let Some(kernel) = ao_config.blur {
            for (direction, target) in [
                (BlurDirection::Horizontal, "ao_blur_h"),
                (BlurDirection::Vertical, "ao_blur_v"),
            ] {
                let pass = BlurPass::new(kernel, direction, visibility, target, TextureFormat::Rgba8Unorm);
                visibility = created(target, "color", builder.pass_with(pass, |p| p.output())?)?;
            }
        }
        ao = Some(visibility);
    }

    let mut shadow_map = None;
    let mut shadow = None;
    if let Some(shadow_config) = &config.shadows {
        let map_pass = ShadowMapPass::new(shadow_config.clone(), config.skinning);
        let map = created("Shadow Map Pass", "map", builder.pass_with(map_pass, |p| p.map())?)?;
        let resolve = ShadowResolvePass::new(shadow_config.clone(), gbuffer.position, map);
        shadow_map = Some(map);
        shadow = Some(created(
            "Shadow Resolve Pass",
            "factor",
            builder.pass_with(resolve, |p| p.output())?,
        )?);
    }

    let lighting = LightingPass::new(config.lighting.clone(), gbuffer.normal, gbuffer.position)
        .with_ambient_occlusion(ao)
        .with_shadow(shadow);
    let light = created("Lighting Pass", "accum", builder.pass_with(lighting, |p| p.output())?)?;

    let transparents = if config.transparents {
        let pass = TransparentPass::new(config.skinning, config.composite.ambient_scale, gbuffer.depth);
        Some(created(
            "Transparents Pass",
            "color",
            builder.pass_with(pass, |p| p.output())?,
        )?)
    } else {
        None
    };

    let composite = CompositePass::new(config.composite.clone(), gbuffer.position, gbuffer.albedo, light)
        .with_shadow(shadow)
        .with_transparents(transparents);
    let frame = created("Composite Pass", "color", builder.pass_with(composite, |p| p.output())?)?;

    let output = match config.post_process {
        PostProcess::None => frame,
        PostProcess::Blur(kernel) => {
            let mut color = frame;
            for (direction, target) in [
                (BlurDirection::Horizontal, "post_blur_h"),
                (BlurDirection::Vertical, "post_blur_v"),
            ] {
                let pass = BlurPass::new(kernel, direction, color, target, TextureFormat::Rgba8Unorm);
                color = created(target, "color", builder.pass_with(pass, |p| p.output())?)?;
            }
            color
        }
        PostProcess::Fxaa => created(
            "FXAA Pass",
            "color",
            builder.pass_with(FxaaPass::new(frame, "post_fxaa"), |p| p.output())?,
        )?,
    };

    let resources = DeferredResources {
        gbuffer,
        noise,
        ao,
        shadow_map,
        shadow,
        light,
        transparents,
        frame,
        output,
    };
    Ok((builder.build(), resources))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_names(graph: &RenderGraph) -> Vec<String> {
        let compiled = graph.compile().unwrap();
        compiled
            .pass_order
            .iter()
            .map(|id| graph.get_pass_node(*id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_default_graph_order() {
        let (graph, resources) = build_deferred_graph(64, 48, &DeferredConfig::default()).unwrap();
        let names = pass_names(&graph);
        let position = |name: &str| names.iter().position(|n| n == name).unwrap();

        assert_eq!(position("G-Buffer Pass"), 0);
        assert!(position("SSAO Pass") < position("Lighting Pass"));
        assert!(position("Shadow Map Pass") < position("Shadow Resolve Pass"));
        assert!(position("Shadow Resolve Pass") < position("Lighting Pass"));
        assert!(position("Lighting Pass") < position("Composite Pass"));
        assert!(position("Transparents Pass") < position("Composite Pass"));
        assert_eq!(names.last().map(String::as_str), Some("FXAA Pass"));
        assert_ne!(resources.output, resources.frame);
    }

    #[test]
    fn test_minimal_graph() {
        let (graph, resources) = build_deferred_graph(32, 32, &DeferredConfig::minimal()).unwrap();
        assert_eq!(
            pass_names(&graph),
            vec!["G-Buffer Pass", "Lighting Pass", "Composite Pass"]
        );
        assert_eq!(resources.output, resources.frame);
        assert!(resources.ao.is_none());
        assert!(resources.noise.is_none());
        assert!(resources.shadow.is_none());
    }

    #[test]
    fn test_ao_blur_feeds_lighting() {
        let config = DeferredConfig::minimal()
            .with_ambient_occlusion(Some(AoConfig::default().with_blur(BlurKernel::Taps8)));
        let (graph, resources) = build_deferred_graph(32, 32, &config).unwrap();
        let ao = resources.ao.unwrap();
        assert_eq!(graph.resource(ao).unwrap().name(), "ao_blur_v.color");

        let lighting = graph.find_pass("Lighting Pass").unwrap();
        assert_eq!(graph.get_pass_node(lighting).unwrap().input("ao"), Some(ao));
    }

    #[test]
    fn test_blur_post_process_keeps_size() {
        let config = DeferredConfig::minimal().with_post_process(PostProcess::Blur(BlurKernel::Taps4));
        let (graph, resources) = build_deferred_graph(40, 30, &config).unwrap();
        let desc = graph.resource(resources.output).unwrap().descriptor().unwrap();
        assert_eq!((desc.width, desc.height), (40, 30));
    }

    #[test]
    fn test_validate_rejects_variance_on_depth_map() {
        let config = DeferredConfig::default().with_shadows(Some(
            ShadowConfig::default().with_map_format(ShadowMapFormat::Depth),
        ));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedCombination(_))
        ));
        assert!(DeferredConfig::default().validate().is_ok());
    }
}
