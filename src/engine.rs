//! Main engine orchestrator

use crate::backend::software::{SoftwareBackend, Texture, MAX_TEXTURE_DIMENSION};
use crate::backend::traits::*;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::pipeline::gbuffer_pass::decode_object_id;
use crate::pipeline::ssao::generate_noise;
use crate::pipeline::{build_deferred_graph, DeferredResources};
use crate::render_graph::{
    CompiledGraph, ExecuteError, ParameterBlock, RenderGraph, RenderGraphExecutor, ResourceId,
};
use crate::scene::{FrameData, Scene, ViewLight};
use crate::EngineConfig;
use glam::{Mat4, Vec2, Vec4};
use std::path::Path;

/// Final frame handed back to the host
#[derive(Debug, Clone)]
pub struct PresentedImage {
    texture: Texture,
}

impl PresentedImage {
    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// Color of a pixel, components in [0, 1]
    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.texture.load(x as i64, y as i64)
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn to_rgba8(&self) -> image::RgbaImage {
        self.texture.to_rgba8()
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        self.to_rgba8()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Drawable found under a pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPick {
    pub object_id: u16,
    /// Normalized device depth of the visible surface
    pub depth: f32,
}

/// Main graphics engine
pub struct Engine<B: GraphicsBackend = SoftwareBackend> {
    config: EngineConfig,
    backend: B,
    graph: RenderGraph,
    compiled: CompiledGraph,
    executor: RenderGraphExecutor,
    resources: DeferredResources,
    frame_count: u64,
    disposed: bool,
}

impl Engine<SoftwareBackend> {
    /// Create an engine on the software backend
    pub fn configure(config: EngineConfig) -> EngineResult<Self> {
        let mut backend = SoftwareBackend::new();
        if let Some(budget) = config.memory_budget {
            backend = backend.with_memory_budget(budget);
        }
        Self::with_backend(config, backend)
    }
}

impl<B: GraphicsBackend> Engine<B> {
    /// Create an engine on a caller-provided backend
    pub fn with_backend(config: EngineConfig, mut backend: B) -> EngineResult<Self> {
        validate_resolution(config.width, config.height)?;
        config.pipeline.validate()?;

        let (graph, resources) = build_deferred_graph(config.width, config.height, &config.pipeline)?;
        let compiled = graph.compile()?;
        let mut executor = RenderGraphExecutor::new();
        if let Err(err) = executor.allocate_resources(&graph, &compiled, &mut backend) {
            executor.cleanup(&mut backend);
            return Err(err.into());
        }

        log::info!(
            "Configured {}x{} deferred pipeline on '{}' with {} passes",
            config.width,
            config.height,
            backend.name(),
            compiled.pass_order.len()
        );

        let mut engine = Self {
            config,
            backend,
            graph,
            compiled,
            executor,
            resources,
            frame_count: 0,
            disposed: false,
        };
        engine.bind_external_textures();
        Ok(engine)
    }

    fn bind_external_textures(&mut self) {
        if let (Some(noise), Some(ao)) = (self.resources.noise, &self.config.pipeline.ambient_occlusion) {
            self.executor
                .set_external_texture(noise, generate_noise(ao.noise_size, ao.noise_seed));
        }
    }

    fn ensure_live(&self) -> EngineResult<()> {
        if self.disposed {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn resources(&self) -> &DeferredResources {
        &self.resources
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Per-frame parameters and view-space lights for a scene
    fn frame_data<'s>(&self, scene: &'s Scene) -> FrameData<'s> {
        let (width, height) = self.size();
        let camera = scene.camera.frame(width, height);

        let mut params = ParameterBlock::new()
            .with("view", camera.view)
            .with("projection", camera.projection)
            .with("inverse_view", camera.inverse_view)
            .with("camera_near", camera.near)
            .with("camera_far", camera.far)
            .with("viewport_size", Vec2::new(width as f32, height as f32))
            .with("projection_scale", camera.projection_scale)
            .with("clear_color", self.config.pipeline.clear_color);

        let caster = scene
            .shadow_caster()
            .filter(|_| self.config.pipeline.shadows.is_some());
        match caster {
            Some((_, caster)) => {
                params.set("shadow_enabled", 1.0);
                params.set("light_view", caster.view);
                params.set("light_projection", caster.projection);
                params.set("shadow_matrix", caster.view_projection() * camera.inverse_view);
            }
            None => {
                params.set("shadow_enabled", 0.0);
                params.set("light_view", Mat4::IDENTITY);
                params.set("light_projection", Mat4::IDENTITY);
                params.set("shadow_matrix", Mat4::IDENTITY);
            }
        }

        let caster_index = caster.map(|(index, _)| index);
        let lights: Vec<ViewLight> = scene
            .lights
            .iter()
            .enumerate()
            .map(|(index, light)| light.to_view_light(camera.view, Some(index) == caster_index))
            .collect();

        FrameData {
            scene,
            params,
            lights,
        }
    }

    /// Render one frame of `scene` and return the presented image
    pub fn render_frame(&mut self, scene: &Scene) -> EngineResult<PresentedImage> {
        self.ensure_live()?;
        scene.validate()?;

        let frame = self.frame_data(scene);
        log::debug!(
            "Rendering frame {}: {} objects, {} lights",
            self.frame_count,
            scene.objects.len(),
            frame.lights.len()
        );

        if let Err(err) = self
            .executor
            .execute(&self.graph, &self.compiled, &mut self.backend, &frame)
        {
            log::error!("Frame {} discarded: {}", self.frame_count, err);
            return Err(err.into());
        }
        self.frame_count += 1;

        let output = self.resources.output;
        let texture = self
            .executor
            .texture(&self.backend, output)
            .ok_or_else(|| ExecuteError::Unallocated(self.resource_name(output)))?;
        Ok(PresentedImage {
            texture: texture.clone(),
        })
    }

    fn resource_name(&self, id: ResourceId) -> String {
        self.graph
            .resource(id)
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| format!("{:?}", id))
    }

    /// Change the output resolution.
    ///
    /// Targets whose size does not depend on the screen keep their storage.
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.ensure_live()?;
        validate_resolution(width, height)?;
        if (width, height) == self.size() {
            return Ok(());
        }

        let (graph, resources) = build_deferred_graph(width, height, &self.config.pipeline)?;
        let compiled = graph.compile()?;
        self.executor
            .allocate_resources(&graph, &compiled, &mut self.backend)?;

        log::info!(
            "Resized from {}x{} to {}x{}",
            self.config.width,
            self.config.height,
            width,
            height
        );
        self.config.width = width;
        self.config.height = height;
        self.graph = graph;
        self.compiled = compiled;
        self.resources = resources;
        self.bind_external_textures();
        Ok(())
    }

    /// Release every render target; later calls fail with [`EngineError::Disposed`]
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.executor.cleanup(&mut self.backend);
        self.disposed = true;
        log::info!(
            "Disposed engine after {} frames, {} textures still live",
            self.frame_count,
            self.backend.live_texture_count()
        );
    }

    /// Drawable visible at a pixel of the last rendered frame
    pub fn object_at(&self, x: u32, y: u32) -> EngineResult<Option<ObjectPick>> {
        self.ensure_live()?;
        if x >= self.config.width || y >= self.config.height {
            return Ok(None);
        }
        let id = self.resources.gbuffer.object_id;
        let texture = self
            .executor
            .texture(&self.backend, id)
            .ok_or_else(|| ExecuteError::Unallocated(self.resource_name(id)))?;
        let (object_id, depth) = decode_object_id(texture.load(x as i64, y as i64));
        Ok((object_id != 0).then_some(ObjectPick { object_id, depth }))
    }

    /// Intermediate attachment by name, such as `gbuffer.normal` or `ao.visibility`
    pub fn attachment(&self, name: &str) -> Option<&Texture> {
        if self.disposed {
            return None;
        }
        let id = self.graph.find_resource(name)?;
        self.executor.texture(&self.backend, id)
    }
}

fn validate_resolution(width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 || width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
        return Err(ConfigError::InvalidResolution { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DeferredConfig;

    fn minimal(width: u32, height: u32) -> EngineConfig {
        EngineConfig::new(width, height).with_pipeline(DeferredConfig::minimal())
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let result = Engine::configure(minimal(0, 10));
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::InvalidResolution { width: 0, height: 10 }))
        ));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut engine = Engine::configure(minimal(8, 8)).unwrap();
        assert!(engine.backend().live_texture_count() > 0);
        engine.dispose();
        engine.dispose();
        assert_eq!(engine.backend().live_texture_count(), 0);
        assert_eq!(engine.backend().allocated_bytes(), 0);
        assert!(matches!(
            engine.render_frame(&Scene::new()),
            Err(EngineError::Disposed)
        ));
        assert!(engine.attachment("frame.color").is_none());
    }

    #[test]
    fn test_empty_scene_is_clear_color() {
        let clear = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let config = EngineConfig::new(8, 6)
            .with_pipeline(DeferredConfig::minimal().with_clear_color(clear));
        let mut engine = Engine::configure(config).unwrap();
        let image = engine.render_frame(&Scene::new()).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
        assert!((image.pixel(3, 3) - clear).abs().max_element() < 1.0 / 255.0);
        assert_eq!(engine.frame_count(), 1);
    }

    #[test]
    fn test_object_at_background_is_none() {
        let mut engine = Engine::configure(minimal(8, 8)).unwrap();
        engine.render_frame(&Scene::new()).unwrap();
        assert_eq!(engine.object_at(4, 4).unwrap(), None);
        assert_eq!(engine.object_at(100, 4).unwrap(), None);
    }
}
