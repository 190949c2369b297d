//! Render pass definitions for the render graph

use crate::backend::software::Texture;
use crate::backend::types::*;
use crate::render_graph::params::*;
use crate::render_graph::resource::*;
use crate::scene::{FrameData, Scene};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::any::Any;
use thiserror::Error;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

/// Vertex stage of a pass program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStage {
    /// Scene meshes transformed by a camera, optionally bone-blended
    Mesh { skinned: bool },
    /// One full-screen primitive; the fragment stage runs once per output pixel
    Fullscreen,
}

/// Program bound to a pass: vertex stage, fragment program and its variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Program {
    pub vertex: VertexStage,
    pub fragment: &'static str,
    pub variant: &'static str,
}

impl Program {
    pub fn fullscreen(fragment: &'static str, variant: &'static str) -> Self {
        Self {
            vertex: VertexStage::Fullscreen,
            fragment,
            variant,
        }
    }

    pub fn mesh(skinned: bool, fragment: &'static str, variant: &'static str) -> Self {
        Self {
            vertex: VertexStage::Mesh { skinned },
            fragment,
            variant,
        }
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let vertex = match self.vertex {
            VertexStage::Mesh { skinned: true } => "mesh-skinned",
            VertexStage::Mesh { skinned: false } => "mesh",
            VertexStage::Fullscreen => "fullscreen",
        };
        write!(f, "{}/{}[{}]", vertex, self.fragment, self.variant)
    }
}

/// Context for setting up pass resources
pub struct PassSetupContext<'a> {
    pub(crate) resources: &'a mut Vec<VirtualResource>,
    pub(crate) targets: &'a mut Vec<RenderTarget>,
    pub(crate) inputs: &'a mut Vec<InputBinding>,
    pub(crate) outputs: &'a mut Vec<ResourceAccess>,
    pub(crate) params: &'a mut ParameterBlock,
    pub(crate) next_resource_id: &'a mut u32,
    pub(crate) next_target_id: &'a mut u32,
    pub(crate) screen_width: u32,
    pub(crate) screen_height: u32,
}

impl<'a> PassSetupContext<'a> {
    /// Create a render target; every attachment gets the same resolved size
    pub fn create_render_target(&mut self, desc: RenderTargetDesc) -> RenderTarget {
        let target_id = TargetId(*self.next_target_id);
        *self.next_target_id += 1;

        let (width, height) = desc.size.resolve(self.screen_width, self.screen_height);
        let mut attachments = Vec::with_capacity(desc.attachments.len());

        for attachment in &desc.attachments {
            let id = ResourceId(*self.next_resource_id);
            *self.next_resource_id += 1;

            let name = format!("{}.{}", desc.name, attachment.name);
            self.resources.push(VirtualResource::Texture(VirtualTexture {
                id,
                target: target_id,
                desc: TextureDescriptor {
                    label: Some(name.clone()),
                    width,
                    height,
                    format: attachment.format,
                    usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                },
                name,
            }));
            attachments.push((attachment.name.clone(), id));
        }

        let target = RenderTarget {
            id: target_id,
            name: desc.name,
            width,
            height,
            attachments,
        };
        self.targets.push(target.clone());
        target
    }

    /// Declare that this pass reads from a resource under a binding name
    pub fn read(&mut self, binding: &str, resource: ResourceId, usage: ResourceUsage) {
        self.inputs.push(InputBinding {
            name: binding.to_string(),
            access: ResourceAccess { resource, usage },
        });
    }

    /// Declare that this pass writes to a resource
    pub fn write(&mut self, resource: ResourceId, usage: ResourceUsage) {
        self.outputs.push(ResourceAccess { resource, usage });
    }

    /// Store a value in the pass parameter block
    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParameterValue>) {
        self.params.set(name, value);
    }

    /// Get screen dimensions
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Pixel size of a graph texture; `None` for external or unknown resources
    pub fn texture_size(&self, resource: ResourceId) -> Option<(u32, u32)> {
        self.resources
            .iter()
            .find(|r| r.id() == resource)
            .and_then(|r| r.descriptor())
            .map(|desc| (desc.width, desc.height))
    }
}

/// Error raised while a pass executes
#[derive(Error, Debug)]
pub enum PassError {
    #[error("Input '{0}' is not bound")]
    MissingInput(String),
    #[error("Output {0:?} is not an output of this pass")]
    MissingOutput(ResourceId),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("Invalid drawable: {0}")]
    InvalidDrawable(String),
}

struct OutputSlot {
    id: ResourceId,
    texture: Texture,
    written: bool,
}

/// Output textures checked out for one pass execution
#[derive(Default)]
pub struct PassOutputs {
    slots: Vec<OutputSlot>,
}

impl PassOutputs {
    pub(crate) fn insert(&mut self, id: ResourceId, texture: Texture) {
        self.slots.push(OutputSlot {
            id,
            texture,
            written: false,
        });
    }

    pub(crate) fn into_textures(self) -> impl Iterator<Item = (ResourceId, Texture)> {
        self.slots.into_iter().map(|slot| (slot.id, slot.texture))
    }

    /// Outputs the pass never touched
    pub fn unwritten(&self) -> Vec<ResourceId> {
        self.slots
            .iter()
            .filter(|slot| !slot.written)
            .map(|slot| slot.id)
            .collect()
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Result<&mut Texture, PassError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(PassError::MissingOutput(id))?;
        slot.written = true;
        Ok(&mut slot.texture)
    }

    /// Borrow several distinct outputs at once
    pub fn many_mut<const N: usize>(
        &mut self,
        ids: [ResourceId; N],
    ) -> Result<[&mut Texture; N], PassError> {
        let mut found: [Option<&mut Texture>; N] = std::array::from_fn(|_| None);
        for slot in self.slots.iter_mut() {
            if let Some(index) = ids.iter().position(|id| *id == slot.id) {
                slot.written = true;
                found[index] = Some(&mut slot.texture);
            }
        }

        let mut textures = Vec::with_capacity(N);
        for (index, texture) in found.into_iter().enumerate() {
            textures.push(texture.ok_or(PassError::MissingOutput(ids[index]))?);
        }
        textures
            .try_into()
            .map_err(|_| PassError::MissingOutput(ids[0]))
    }
}

/// Context for executing a render pass
pub struct PassExecuteContext<'a> {
    pub frame: &'a FrameData<'a>,
    pub params: &'a ParameterBlock,
    pub(crate) inputs: &'a [(&'a str, &'a Texture)],
    pub outputs: &'a mut PassOutputs,
}

impl<'a> PassExecuteContext<'a> {
    pub fn scene(&self) -> &'a Scene {
        self.frame.scene
    }

    /// Texture bound to the named input
    pub fn input(&self, name: &str) -> Result<&'a Texture, PassError> {
        self.input_opt(name)
            .ok_or_else(|| PassError::MissingInput(name.to_string()))
    }

    /// Texture bound to the named input, if the pass declared it
    pub fn input_opt(&self, name: &str) -> Option<&'a Texture> {
        self.inputs
            .iter()
            .find(|(binding, _)| *binding == name)
            .map(|(_, texture)| *texture)
    }

    pub fn output(&mut self, id: ResourceId) -> Result<&mut Texture, PassError> {
        self.outputs.get_mut(id)
    }

    /// Look a parameter up in the pass block, then in the per-frame block
    pub fn parameter(&self, name: &str) -> Result<&ParameterValue, ParameterError> {
        self.params
            .get(name)
            .or_else(|_| self.frame.params.get(name))
    }

    pub fn float(&self, name: &str) -> Result<f32, ParameterError> {
        self.parameter(name)?.as_float(name)
    }

    pub fn vec2(&self, name: &str) -> Result<Vec2, ParameterError> {
        self.parameter(name)?.as_vec2(name)
    }

    pub fn vec3(&self, name: &str) -> Result<Vec3, ParameterError> {
        self.parameter(name)?.as_vec3(name)
    }

    pub fn vec4(&self, name: &str) -> Result<Vec4, ParameterError> {
        self.parameter(name)?.as_vec4(name)
    }

    pub fn mat4(&self, name: &str) -> Result<Mat4, ParameterError> {
        self.parameter(name)?.as_mat4(name)
    }

    pub fn vec2_array(&self, name: &str) -> Result<&[Vec2], ParameterError> {
        self.parameter(name)?.as_vec2_array(name)
    }
}

/// Trait for render passes
pub trait RenderPass: Send + Sync {
    /// Get the pass name for debugging
    fn name(&self) -> &str;

    /// Program and variant this pass runs
    fn program(&self) -> Program;

    /// Setup phase - declare resources, bindings and static parameters
    fn setup(&mut self, ctx: &mut PassSetupContext);

    /// Execute phase - write every declared output
    fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError>;

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub program: Program,
    pub inputs: Vec<InputBinding>,
    pub outputs: Vec<ResourceAccess>,
    pub params: ParameterBlock,
}

impl PassNode {
    pub fn reads_resource(&self, resource: ResourceId) -> bool {
        self.inputs.iter().any(|b| b.resource() == resource)
    }

    pub fn writes_resource(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|a| a.resource == resource)
    }

    pub fn input(&self, name: &str) -> Option<ResourceId> {
        self.inputs
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.resource())
    }
}
