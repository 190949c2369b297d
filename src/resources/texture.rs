//! Texture loading

use crate::backend::software::Texture;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

/// Error raised while decoding an image
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to decode '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Texture '{0}' has no pixels")]
    Empty(String),
}

/// Loaded texture data, tightly packed RGBA8
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|source| TextureError::Decode {
            name: name.clone(),
            source,
        })?;
        Self::from_image(img, &name)
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            name: name.to_string(),
            source,
        })?;
        Self::from_image(img, name)
    }

    fn from_image(img: DynamicImage, name: &str) -> Result<Self, TextureError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty(name.to_string()));
        }
        Ok(Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        })
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8-texel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                data.extend_from_slice(if is_even { &color1 } else { &color2 });
            }
        }

        Self {
            width: size,
            height: size,
            data,
            name: "checkerboard".to_string(),
        }
    }

    /// Height field of concentric rings, usable as a detail map
    pub fn ripples(size: u32, rings: f32) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        let center = size as f32 * 0.5;
        for y in 0..size {
            for x in 0..size {
                let r = ((x as f32 - center).hypot(y as f32 - center)) / size as f32;
                let h = ((r * rings * std::f32::consts::TAU).sin() * 0.5 + 0.5) * 255.0;
                let h = h.round() as u8;
                data.extend_from_slice(&[h, h, h, 255]);
            }
        }
        Self {
            width: size,
            height: size,
            data,
            name: "ripples".to_string(),
        }
    }

    /// Upload into a sampleable texture
    pub fn into_texture(self) -> Texture {
        Texture::from_rgba8(&self.name, self.width, self.height, &self.data)
    }
}
