//! Core backend abstraction traits
//!
//! The render graph executor talks to storage only through [`GraphicsBackend`].

use crate::backend::software::Texture;
use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Invalid texture handle: {0}")]
    InvalidHandle(String),
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a backend texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Storage backend for render-target attachments
///
/// A texture handed out by [`GraphicsBackend::take_texture`] is invisible to
/// [`GraphicsBackend::texture`] until it is restored, which gives a pass
/// exclusive write access while other attachments stay readable.
pub trait GraphicsBackend {
    fn name(&self) -> &str;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn texture(&self, texture: TextureHandle) -> Option<&Texture>;
    fn take_texture(&mut self, texture: TextureHandle) -> Option<Texture>;
    fn restore_texture(&mut self, texture: TextureHandle, data: Texture) -> BackendResult<()>;

    /// Bytes held by live textures
    fn allocated_bytes(&self) -> u64;
    fn live_texture_count(&self) -> usize;
}
