//! Deferred Pipeline - a render graph-based deferred shading pipeline
//!
//! Frames are produced by a fixed chain of render passes running on a CPU
//! software backend:
//! - G-buffer generation with optional skinning and detail-map normals
//! - Screen-space ambient occlusion (spiral sampling or legacy depth compare)
//! - Shadow mapping with hard or variance comparison
//! - Deferred light accumulation
//! - Sorted transparents, tone mapping and composite
//! - Separable blur or FXAA post-processing
//!
//! # Example
//! ```no_run
//! use deferred_pipeline::{Engine, EngineConfig};
//! use deferred_pipeline::resources::{Material, Mesh};
//! use deferred_pipeline::scene::{DirectionalLight, RenderObject, Scene};
//! use glam::Vec3;
//!
//! let mut scene = Scene::new();
//! let mesh = scene.add_mesh(Mesh::cube());
//! let material = scene.add_material(Material::matte(Vec3::new(0.8, 0.3, 0.2)));
//! scene.add_object(RenderObject::new(mesh, material));
//! scene.add_directional_light(DirectionalLight::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE, 1.0));
//!
//! let mut engine = Engine::configure(EngineConfig::new(320, 240))?;
//! let image = engine.render_frame(&scene)?;
//! image.save_png("frame.png")?;
//! # Ok::<(), deferred_pipeline::EngineError>(())
//! ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;

pub use engine::{Engine, ObjectPick, PresentedImage};
pub use error::{ConfigError, EngineError, EngineResult};
pub use pipeline::DeferredConfig;

// Re-export the software backend for direct access
pub use backend::SoftwareBackend;

/// Configuration for initializing the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Pass selection and per-pass settings
    pub pipeline: DeferredConfig,
    /// Upper bound on render-target memory, in bytes
    pub memory_budget: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pipeline: DeferredConfig::default(),
            memory_budget: None,
        }
    }
}

impl EngineConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_pipeline(mut self, pipeline: DeferredConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }
}
