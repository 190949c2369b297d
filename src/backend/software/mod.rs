//! Software backend
//!
//! Keeps render-target attachments in system memory and rasterizes on the CPU.
//! An optional memory budget makes allocation failures observable.

mod raster;
mod texture;

pub use raster::*;
pub use texture::*;

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// Largest texture edge the backend accepts
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// CPU implementation of [`GraphicsBackend`]
pub struct SoftwareBackend {
    textures: HashMap<TextureHandle, Slot>,
    next_handle: u64,
    memory_budget: Option<u64>,
    allocated_bytes: u64,
}

enum Slot {
    Resident(Texture),
    /// Handed out to a pass for writing; `bytes` keeps the accounting intact
    CheckedOut { bytes: u64 },
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_handle: 1,
            memory_budget: None,
            allocated_bytes: 0,
        }
    }

    /// Limit the total bytes of live textures
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn memory_budget(&self) -> Option<u64> {
        self.memory_budget
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > MAX_TEXTURE_DIMENSION
            || desc.height > MAX_TEXTURE_DIMENSION
        {
            return Err(BackendError::TextureCreationFailed(format!(
                "{} has invalid size {}x{}",
                desc.label.as_deref().unwrap_or("texture"),
                desc.width,
                desc.height
            )));
        }

        let bytes = desc.size_in_bytes();
        if let Some(budget) = self.memory_budget {
            if self.allocated_bytes + bytes > budget {
                log::error!(
                    "Texture {:?} ({} bytes) exceeds memory budget: {} of {} bytes in use",
                    desc.label,
                    bytes,
                    self.allocated_bytes,
                    budget
                );
                return Err(BackendError::OutOfMemory);
            }
        }

        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.allocated_bytes += bytes;
        self.textures
            .insert(handle, Slot::Resident(Texture::new(desc.clone())));

        log::trace!(
            "Created texture {:?} {:?} {}x{} {:?}",
            handle,
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let Some(slot) = self.textures.remove(&texture) else {
            log::warn!("Destroying unknown texture {:?}", texture);
            return;
        };
        let bytes = match slot {
            Slot::Resident(tex) => tex.descriptor().size_in_bytes(),
            Slot::CheckedOut { bytes } => bytes,
        };
        self.allocated_bytes = self.allocated_bytes.saturating_sub(bytes);
        log::trace!("Destroyed texture {:?}", texture);
    }

    fn texture(&self, texture: TextureHandle) -> Option<&Texture> {
        match self.textures.get(&texture)? {
            Slot::Resident(tex) => Some(tex),
            Slot::CheckedOut { .. } => None,
        }
    }

    fn take_texture(&mut self, texture: TextureHandle) -> Option<Texture> {
        let slot = self.textures.get_mut(&texture)?;
        let Slot::Resident(tex) = slot else {
            return None;
        };
        let bytes = tex.descriptor().size_in_bytes();
        match std::mem::replace(slot, Slot::CheckedOut { bytes }) {
            Slot::Resident(tex) => Some(tex),
            Slot::CheckedOut { .. } => None,
        }
    }

    fn restore_texture(&mut self, texture: TextureHandle, data: Texture) -> BackendResult<()> {
        match self.textures.get_mut(&texture) {
            Some(slot @ Slot::CheckedOut { .. }) => {
                *slot = Slot::Resident(data);
                Ok(())
            }
            Some(Slot::Resident(_)) => Err(BackendError::InvalidHandle(format!(
                "{:?} is not checked out",
                texture
            ))),
            None => Err(BackendError::InvalidHandle(format!("{:?}", texture))),
        }
    }

    fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    fn live_texture_count(&self) -> usize {
        self.textures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor {
            label: Some("test".into()),
            width,
            height,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn test_create_and_destroy_tracks_memory() {
        let mut backend = SoftwareBackend::new();
        let handle = backend.create_texture(&desc(4, 4)).unwrap();
        assert_eq!(backend.allocated_bytes(), 4 * 4 * 16);
        assert_eq!(backend.live_texture_count(), 1);

        backend.destroy_texture(handle);
        assert_eq!(backend.allocated_bytes(), 0);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_memory_budget_surfaces_out_of_memory() {
        let mut backend = SoftwareBackend::new().with_memory_budget(512);
        assert!(backend.create_texture(&desc(4, 4)).is_ok());
        let result = backend.create_texture(&desc(8, 8));
        assert!(matches!(result, Err(BackendError::OutOfMemory)));
    }

    #[test]
    fn test_zero_sized_texture_rejected() {
        let mut backend = SoftwareBackend::new();
        let result = backend.create_texture(&desc(0, 4));
        assert!(matches!(result, Err(BackendError::TextureCreationFailed(_))));
    }

    #[test]
    fn test_take_and_restore() {
        let mut backend = SoftwareBackend::new();
        let handle = backend.create_texture(&desc(2, 2)).unwrap();

        let mut tex = backend.take_texture(handle).unwrap();
        assert!(backend.texture(handle).is_none());
        assert!(backend.take_texture(handle).is_none());

        tex.clear(glam::Vec4::ONE);
        backend.restore_texture(handle, tex).unwrap();
        assert_eq!(backend.texture(handle).unwrap().load(1, 1), glam::Vec4::ONE);
        assert!(backend
            .restore_texture(handle, Texture::new(desc(2, 2)))
            .is_err());
    }
}
