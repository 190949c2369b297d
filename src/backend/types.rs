//! Common types shared between the backend and the pipeline

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    Rg32Float,
    R32Float,
    Depth32Float,
}

/// Storage precision class of a texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precision {
    Low,
    Medium,
    High,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::R32Float | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    pub fn channels(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba16Float
            | TextureFormat::Rgba32Float => 4,
            TextureFormat::Rg32Float => 2,
            TextureFormat::R32Float | TextureFormat::Depth32Float => 1,
        }
    }

    pub fn precision(&self) -> Precision {
        match self {
            TextureFormat::Rgba8Unorm => Precision::Low,
            TextureFormat::Rgba16Float => Precision::Medium,
            TextureFormat::Rgba32Float
            | TextureFormat::Rg32Float
            | TextureFormat::R32Float
            | TextureFormat::Depth32Float => Precision::High,
        }
    }

    /// Apply the storage rules of this format to a texel value.
    ///
    /// Unused channels are zeroed; `Rgba8Unorm` clamps to [0, 1] and rounds
    /// to the nearest 1/255 step. Float formats store values as-is.
    pub fn store(&self, value: Vec4) -> Vec4 {
        match self {
            TextureFormat::Rgba8Unorm => {
                (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0
            }
            TextureFormat::Rgba16Float | TextureFormat::Rgba32Float => value,
            TextureFormat::Rg32Float => Vec4::new(value.x, value.y, 0.0, 0.0),
            TextureFormat::R32Float | TextureFormat::Depth32Float => {
                Vec4::new(value.x, 0.0, 0.0, 0.0)
            }
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Bytes the texture would occupy in its declared format
    pub fn size_in_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Standard vertex with position, normal, UV, and a two-bone skin binding
///
/// `skin` packs `(bone0, bone1, weight0, weight1)`; unskinned meshes leave it zeroed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub skin: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            skin: Vec4::ZERO,
        }
    }

    pub fn with_skin(mut self, bones: [u32; 2], weights: [f32; 2]) -> Self {
        self.skin = Vec4::new(bones[0] as f32, bones[1] as f32, weights[0], weights[1]);
        self
    }
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Greater,
    Always,
}

impl CompareFunction {
    pub fn passes(&self, incoming: f32, stored: f32) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Greater => incoming > stored,
            CompareFunction::Always => true,
        }
    }
}

/// Texture filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Texture address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
}

/// Sampler state used by passes when reading textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerDescriptor {
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

impl SamplerDescriptor {
    pub const NEAREST_CLAMP: Self = Self {
        filter: FilterMode::Nearest,
        address_mode: AddressMode::ClampToEdge,
    };

    pub const LINEAR_CLAMP: Self = Self {
        filter: FilterMode::Linear,
        address_mode: AddressMode::ClampToEdge,
    };

    pub const LINEAR_REPEAT: Self = Self {
        filter: FilterMode::Linear,
        address_mode: AddressMode::Repeat,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_store_quantizes() {
        let stored = TextureFormat::Rgba8Unorm.store(Vec4::new(0.5, 1.5, -0.2, 0.2));
        assert!((stored.x - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(stored.y, 1.0);
        assert_eq!(stored.z, 0.0);
        assert!((stored.w - 51.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_channel_store_drops_extra_channels() {
        let stored = TextureFormat::R32Float.store(Vec4::new(0.25, 1.0, 1.0, 1.0));
        assert_eq!(stored, Vec4::new(0.25, 0.0, 0.0, 0.0));

        let moments = TextureFormat::Rg32Float.store(Vec4::new(0.25, 0.0625, 1.0, 1.0));
        assert_eq!(moments, Vec4::new(0.25, 0.0625, 0.0, 0.0));
    }

    #[test]
    fn test_descriptor_size() {
        let desc = TextureDescriptor {
            width: 16,
            height: 8,
            format: TextureFormat::Rgba32Float,
            ..Default::default()
        };
        assert_eq!(desc.size_in_bytes(), 16 * 8 * 16);
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertex = Vertex::new(Vec3::X, Vec3::Z, Vec2::ZERO).with_skin([3, 7], [0.25, 0.75]);
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), std::mem::size_of::<Vertex>());
        assert_eq!(vertex.skin, Vec4::new(3.0, 7.0, 0.25, 0.75));
    }
}
