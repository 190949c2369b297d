//! Engine-level error types

use crate::backend::BackendError;
use crate::render_graph::{ExecuteError, GraphError};
use crate::scene::SceneError;
use thiserror::Error;

/// Rejected engine or pipeline configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("Unsupported feature combination: {0}")]
    UnsupportedCombination(String),
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Error returned by [`crate::Engine`] operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to build render graph: {0}")]
    Graph(#[from] GraphError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Frame failed: {0}")]
    Frame(#[from] ExecuteError),
    #[error("Invalid scene: {0}")]
    InvalidScene(#[from] SceneError),
    #[error("Engine has been disposed")]
    Disposed,
    #[error("Failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

pub type EngineResult<T> = Result<T, EngineError>;
