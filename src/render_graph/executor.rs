//! Render graph executor

use crate::backend::software::Texture;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::scene::FrameData;
use std::collections::HashMap;
use thiserror::Error;

/// Error raised while executing a frame; the frame is discarded
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Pass '{pass}' failed: {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: PassError,
    },
    #[error("Pass '{pass}' left outputs unwritten: {resources:?}")]
    IncompleteOutputs {
        pass: String,
        resources: Vec<String>,
    },
    #[error("Resource '{0}' has no backing texture")]
    Unallocated(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone)]
struct AllocatedTexture {
    handle: TextureHandle,
    desc: TextureDescriptor,
}

/// Executor for running the compiled render graph
pub struct RenderGraphExecutor {
    /// Allocated textures mapped by resource ID
    allocated_textures: HashMap<ResourceId, AllocatedTexture>,

    /// External textures (asset and noise textures)
    external_textures: HashMap<ResourceId, Texture>,
}

impl RenderGraphExecutor {
    pub fn new() -> Self {
        Self {
            allocated_textures: HashMap::new(),
            external_textures: HashMap::new(),
        }
    }

    /// Set an external texture
    pub fn set_external_texture(&mut self, resource: ResourceId, texture: Texture) {
        self.external_textures.insert(resource, texture);
    }

    /// Allocate textures needed for the render graph.
    ///
    /// Allocations survive graph rebuilds: a resource whose descriptor is
    /// unchanged keeps its texture, everything else is destroyed and recreated.
    /// Resources no pass touches are not allocated.
    pub fn allocate_resources<B: GraphicsBackend>(
        &mut self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut B,
    ) -> BackendResult<()> {
        let wanted: HashMap<ResourceId, &TextureDescriptor> = graph
            .resources()
            .iter()
            .filter_map(|resource| match resource {
                VirtualResource::Texture(tex)
                    if compiled.resource_lifetimes.contains_key(&tex.id) =>
                {
                    Some((tex.id, &tex.desc))
                }
                _ => None,
            })
            .collect();

        let stale: Vec<ResourceId> = self
            .allocated_textures
            .iter()
            .filter(|(id, allocated)| wanted.get(id) != Some(&&allocated.desc))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(allocated) = self.allocated_textures.remove(&id) {
                backend.destroy_texture(allocated.handle);
            }
        }

        let mut reused = 0;
        for (id, desc) in wanted {
            if self.allocated_textures.contains_key(&id) {
                reused += 1;
                continue;
            }
            let handle = backend.create_texture(desc)?;
            self.allocated_textures.insert(
                id,
                AllocatedTexture {
                    handle,
                    desc: desc.clone(),
                },
            );
        }

        log::debug!(
            "Allocated render graph textures: {} live, {} reused, {} bytes on '{}'",
            self.allocated_textures.len(),
            reused,
            backend.allocated_bytes(),
            backend.name()
        );
        Ok(())
    }

    /// Texture backing a resource, if allocated or external
    pub fn texture<'b, B: GraphicsBackend>(
        &'b self,
        backend: &'b B,
        resource: ResourceId,
    ) -> Option<&'b Texture> {
        if let Some(external) = self.external_textures.get(&resource) {
            return Some(external);
        }
        let allocated = self.allocated_textures.get(&resource)?;
        backend.texture(allocated.handle)
    }

    /// Execute the render graph
    pub fn execute<B: GraphicsBackend>(
        &self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        backend: &mut B,
        frame: &FrameData,
    ) -> Result<(), ExecuteError> {
        for &pass_id in &compiled.pass_order {
            let (Some(pass), Some(node)) = (graph.get_pass(pass_id), graph.get_pass_node(pass_id))
            else {
                continue;
            };

            // Check the outputs out of the backend for exclusive writing
            let mut outputs = PassOutputs::default();
            let mut checkout = Ok(());
            for access in &node.outputs {
                match self.take_output(graph, backend, access.resource) {
                    Ok(texture) => outputs.insert(access.resource, texture),
                    Err(err) => {
                        checkout = Err(err);
                        break;
                    }
                }
            }

            let result = checkout
                .and_then(|_| self.run_pass(graph, backend, frame, pass, node, &mut outputs));

            // Always hand textures back so the next frame starts from a consistent state
            for (id, texture) in outputs.into_textures() {
                if let Some(allocated) = self.allocated_textures.get(&id) {
                    backend.restore_texture(allocated.handle, texture)?;
                }
            }

            result?;
        }
        Ok(())
    }

    fn take_output<B: GraphicsBackend>(
        &self,
        graph: &RenderGraph,
        backend: &mut B,
        resource: ResourceId,
    ) -> Result<Texture, ExecuteError> {
        self.allocated_textures
            .get(&resource)
            .and_then(|allocated| backend.take_texture(allocated.handle))
            .ok_or_else(|| ExecuteError::Unallocated(resource_name(graph, resource)))
    }

    fn run_pass<B: GraphicsBackend>(
        &self,
        graph: &RenderGraph,
        backend: &B,
        frame: &FrameData,
        pass: &dyn RenderPass,
        node: &PassNode,
        outputs: &mut PassOutputs,
    ) -> Result<(), ExecuteError> {
        let mut inputs: Vec<(&str, &Texture)> = Vec::with_capacity(node.inputs.len());
        for binding in &node.inputs {
            let texture = self
                .texture(backend, binding.resource())
                .ok_or_else(|| ExecuteError::Unallocated(resource_name(graph, binding.resource())))?;
            inputs.push((binding.name.as_str(), texture));
        }

        log::trace!("Executing pass '{}' ({})", node.name, node.program);

        let mut ctx = PassExecuteContext {
            frame,
            params: &node.params,
            inputs: &inputs,
            outputs: &mut *outputs,
        };
        pass.execute(&mut ctx).map_err(|source| ExecuteError::PassFailed {
            pass: node.name.clone(),
            source,
        })?;

        let unwritten = outputs.unwritten();
        if !unwritten.is_empty() {
            return Err(ExecuteError::IncompleteOutputs {
                pass: node.name.clone(),
                resources: unwritten
                    .into_iter()
                    .map(|id| resource_name(graph, id))
                    .collect(),
            });
        }
        Ok(())
    }

    /// Clean up allocated resources
    pub fn cleanup<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, allocated) in self.allocated_textures.drain() {
            backend.destroy_texture(allocated.handle);
        }
        self.external_textures.clear();
    }
}

impl Default for RenderGraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn resource_name(graph: &RenderGraph, id: ResourceId) -> String {
    graph
        .resource(id)
        .map(|r| r.name().to_string())
        .unwrap_or_else(|| format!("{:?}", id))
}

/// Builder for creating render graphs with a fluent API
pub struct RenderGraphBuilder {
    graph: RenderGraph,
    screen_width: u32,
    screen_height: u32,
}

impl RenderGraphBuilder {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            graph: RenderGraph::new(),
            screen_width,
            screen_height,
        }
    }

    /// Register an external resource
    pub fn external(&mut self, name: &str) -> ResourceId {
        self.graph.register_external(name)
    }

    /// Add a pass
    pub fn pass<P: RenderPass + 'static>(&mut self, pass: P) -> Result<PassId, GraphError> {
        self.graph
            .add_pass(pass, self.screen_width, self.screen_height)
    }

    /// Add a pass and read it back as its concrete type, to learn the
    /// resources it created during setup
    pub fn pass_with<P, T, F>(&mut self, pass: P, inspect: F) -> Result<T, GraphError>
    where
        P: RenderPass + 'static,
        F: FnOnce(&P) -> T,
    {
        let id = self.pass(pass)?;
        self.graph
            .get_pass_as::<P>(id)
            .map(inspect)
            .ok_or_else(|| GraphError::PassTypeMismatch(format!("{:?}", id)))
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Build the render graph
    pub fn build(self) -> RenderGraph {
        self.graph
    }
}
