//! Virtual resources for the render graph

use crate::backend::types::*;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Identifier of a render target (a group of attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) u32);

/// Virtual texture resource in the render graph; one attachment of a render target
#[derive(Debug, Clone)]
pub struct VirtualTexture {
    pub id: ResourceId,
    pub target: TargetId,
    pub desc: TextureDescriptor,
    pub name: String,
}

/// Resource type enumeration
#[derive(Debug, Clone)]
pub enum VirtualResource {
    Texture(VirtualTexture),
    /// Texture supplied from outside the graph (asset or noise texture)
    External { id: ResourceId, name: String },
}

impl VirtualResource {
    pub fn id(&self) -> ResourceId {
        match self {
            VirtualResource::Texture(t) => t.id,
            VirtualResource::External { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VirtualResource::Texture(t) => &t.name,
            VirtualResource::External { name, .. } => name,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, VirtualResource::External { .. })
    }

    pub fn descriptor(&self) -> Option<&TextureDescriptor> {
        match self {
            VirtualResource::Texture(t) => Some(&t.desc),
            VirtualResource::External { .. } => None,
        }
    }
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Read as a texture (sampled)
    TextureRead,
    /// Write as a render target
    RenderTarget,
    /// Depth attachment
    DepthStencilRead,
    DepthStencilWrite,
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::TextureRead | ResourceUsage::DepthStencilRead
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::RenderTarget | ResourceUsage::DepthStencilWrite
        )
    }
}

/// A named input of a pass, resolved to a texture by the executor
#[derive(Debug, Clone)]
pub struct InputBinding {
    pub name: String,
    pub access: ResourceAccess,
}

impl InputBinding {
    pub fn resource(&self) -> ResourceId {
        self.access.resource
    }
}

/// Describes texture dimensions that can be relative to screen size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to screen size (1.0 = full screen)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn full_screen() -> Self {
        Self::default()
    }

    pub fn scaled(scale: f32) -> Self {
        TextureSize::Relative {
            width_scale: scale,
            height_scale: scale,
        }
    }

    pub fn square(size: u32) -> Self {
        TextureSize::Absolute {
            width: size,
            height: size,
        }
    }

    /// Resolve to pixels; relative sizes never drop below one pixel
    pub fn resolve(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                (((screen_width as f32) * width_scale) as u32).max(1),
                (((screen_height as f32) * height_scale) as u32).max(1),
            ),
        }
    }
}

/// One attachment slot of a render target
#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub name: String,
    pub format: TextureFormat,
}

impl AttachmentDesc {
    pub fn new(name: &str, format: TextureFormat) -> Self {
        Self {
            name: name.to_string(),
            format,
        }
    }
}

/// Render target request made by a pass during setup
#[derive(Debug, Clone)]
pub struct RenderTargetDesc {
    pub name: String,
    pub size: TextureSize,
    pub attachments: Vec<AttachmentDesc>,
}

impl RenderTargetDesc {
    pub fn new(name: &str, size: TextureSize) -> Self {
        Self {
            name: name.to_string(),
            size,
            attachments: Vec::new(),
        }
    }

    pub fn attachment(mut self, name: &str, format: TextureFormat) -> Self {
        self.attachments.push(AttachmentDesc::new(name, format));
        self
    }
}

/// Render target as registered in the graph
///
/// All attachments share `width` and `height`.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub id: TargetId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Attachment names paired with their resources, in declaration order
    pub attachments: Vec<(String, ResourceId)>,
}

impl RenderTarget {
    pub fn attachment(&self, name: &str) -> Option<ResourceId> {
        self.attachments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    pub fn attachment_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.attachments.iter().map(|(_, id)| *id)
    }
}
