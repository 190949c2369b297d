//! CPU texel storage used as render-target attachments

use crate::backend::types::*;
use glam::{UVec2, Vec2, Vec4};

/// A texture living in system memory
///
/// Every texel is held as a `Vec4`; the descriptor's format decides how
/// values are stored (quantization, dropped channels) on write.
#[derive(Debug, Clone)]
pub struct Texture {
    desc: TextureDescriptor,
    texels: Vec<Vec4>,
}

impl Texture {
    pub fn new(desc: TextureDescriptor) -> Self {
        let count = desc.width as usize * desc.height as usize;
        Self {
            desc,
            texels: vec![Vec4::ZERO; count],
        }
    }

    /// Build an `Rgba8Unorm` texture from tightly packed RGBA bytes
    pub fn from_rgba8(label: &str, width: u32, height: u32, data: &[u8]) -> Self {
        let mut texture = Self::new(TextureDescriptor {
            label: Some(label.to_string()),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        });
        for (texel, rgba) in texture.texels.iter_mut().zip(data.chunks_exact(4)) {
            *texel = Vec4::new(
                rgba[0] as f32,
                rgba[1] as f32,
                rgba[2] as f32,
                rgba[3] as f32,
            ) / 255.0;
        }
        texture
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.desc.width, self.desc.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    /// Size of one texel in normalized coordinates
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.desc.width as f32, 1.0 / self.desc.height as f32)
    }

    /// Raw texel view, four `f32` per texel
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    pub fn clear(&mut self, value: Vec4) {
        let value = self.desc.format.store(value);
        self.texels.fill(value);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.desc.width as usize + x as usize
    }

    /// Fetch a texel, clamping coordinates to the edge; an empty texture reads zero
    pub fn load(&self, x: i64, y: i64) -> Vec4 {
        if self.texels.is_empty() {
            return Vec4::ZERO;
        }
        let x = x.clamp(0, self.desc.width as i64 - 1) as u32;
        let y = y.clamp(0, self.desc.height as i64 - 1) as u32;
        self.texels[self.index(x, y)]
    }

    /// Fetch a texel, wrapping coordinates around the texture
    pub fn load_wrapped(&self, x: i64, y: i64) -> Vec4 {
        if self.texels.is_empty() {
            return Vec4::ZERO;
        }
        let x = x.rem_euclid(self.desc.width as i64) as u32;
        let y = y.rem_euclid(self.desc.height as i64) as u32;
        self.texels[self.index(x, y)]
    }

    /// Write a texel; out-of-range coordinates are ignored
    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        if x >= self.desc.width || y >= self.desc.height {
            return;
        }
        let index = self.index(x, y);
        self.texels[index] = self.desc.format.store(value);
    }

    /// Sample at normalized coordinates, (0,0) being the top-left corner
    pub fn sample(&self, uv: Vec2, sampler: SamplerDescriptor) -> Vec4 {
        let fetch = |x: i64, y: i64| match sampler.address_mode {
            AddressMode::ClampToEdge => self.load(x, y),
            AddressMode::Repeat => self.load_wrapped(x, y),
        };
        let texel = uv * Vec2::new(self.desc.width as f32, self.desc.height as f32);
        match sampler.filter {
            FilterMode::Nearest => fetch(texel.x.floor() as i64, texel.y.floor() as i64),
            FilterMode::Linear => {
                let p = texel - Vec2::splat(0.5);
                let base = p.floor();
                let f = p - base;
                let (x0, y0) = (base.x as i64, base.y as i64);
                let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), f.x);
                let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), f.x);
                top.lerp(bottom, f.y)
            }
        }
    }

    /// Run a per-pixel kernel over the whole texture.
    ///
    /// The kernel receives the pixel coordinate and the normalized coordinate
    /// of the pixel centre, and returns the value to store.
    pub fn fill_with<F>(&mut self, mut kernel: F)
    where
        F: FnMut(UVec2, Vec2) -> Vec4,
    {
        let size = Vec2::new(self.desc.width as f32, self.desc.height as f32);
        let format = self.desc.format;
        let width = self.desc.width;
        for (index, texel) in self.texels.iter_mut().enumerate() {
            let pixel = UVec2::new(index as u32 % width, index as u32 / width);
            let uv = (pixel.as_vec2() + Vec2::splat(0.5)) / size;
            *texel = format.store(kernel(pixel, uv));
        }
    }

    /// Convert to an 8-bit RGBA image, saturating each channel
    pub fn to_rgba8(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.desc.width, self.desc.height, |x, y| {
            let v = self.texels[self.index(x, y)].clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
            image::Rgba([
                v.x.round() as u8,
                v.y.round() as u8,
                v.z.round() as u8,
                v.w.round() as u8,
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(width: u32, height: u32, format: TextureFormat) -> Texture {
        Texture::new(TextureDescriptor {
            width,
            height,
            format,
            ..Default::default()
        })
    }

    #[test]
    fn test_load_clamps_to_edge() {
        let mut tex = texture(2, 2, TextureFormat::Rgba32Float);
        tex.store(1, 1, Vec4::splat(3.0));
        assert_eq!(tex.load(5, 9), Vec4::splat(3.0));
        assert_eq!(tex.load(-1, -1), Vec4::ZERO);
    }

    #[test]
    fn test_empty_texture_reads_zero() {
        let tex = texture(0, 3, TextureFormat::Rgba32Float);
        assert_eq!(tex.load(0, 0), Vec4::ZERO);
        assert_eq!(tex.load_wrapped(2, -1), Vec4::ZERO);
        assert_eq!(tex.sample(Vec2::splat(0.5), SamplerDescriptor::NEAREST_CLAMP), Vec4::ZERO);
    }

    #[test]
    fn test_load_wrapped() {
        let mut tex = texture(4, 4, TextureFormat::Rgba32Float);
        tex.store(3, 0, Vec4::ONE);
        assert_eq!(tex.load_wrapped(-1, 4), Vec4::ONE);
        assert_eq!(tex.load_wrapped(7, 8), Vec4::ONE);
    }

    #[test]
    fn test_linear_sample_between_texels() {
        let mut tex = texture(2, 1, TextureFormat::Rgba32Float);
        tex.store(0, 0, Vec4::ZERO);
        tex.store(1, 0, Vec4::ONE);
        let mid = tex.sample(Vec2::new(0.5, 0.5), SamplerDescriptor::LINEAR_CLAMP);
        assert!((mid.x - 0.5).abs() < 1e-6);
        let left = tex.sample(Vec2::new(0.25, 0.5), SamplerDescriptor::LINEAR_CLAMP);
        assert!(left.x.abs() < 1e-6);
    }

    #[test]
    fn test_fill_with_applies_format() {
        let mut tex = texture(3, 2, TextureFormat::Rgba8Unorm);
        tex.fill_with(|pixel, uv| {
            assert!(uv.x > 0.0 && uv.x < 1.0);
            Vec4::new(pixel.x as f32, 2.0, 0.5, 1.0)
        });
        assert_eq!(tex.load(2, 1).x, 1.0);
        assert_eq!(tex.load(0, 0).y, 1.0);
    }

    #[test]
    fn test_rgba8_round_trip_through_image() {
        let data = [10u8, 20, 30, 255, 40, 50, 60, 128];
        let tex = Texture::from_rgba8("test", 2, 1, &data);
        let image = tex.to_rgba8();
        assert_eq!(image.get_pixel(1, 0).0, [40, 50, 60, 128]);
    }
}
