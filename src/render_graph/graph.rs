//! Render graph definition and compilation

use crate::render_graph::params::ParameterBlock;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Error raised while building or compiling a render graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Pass '{pass}' reads unknown resource {resource:?}")]
    UnknownResource { pass: String, resource: ResourceId },
    #[error("Pass '{pass}' reads '{resource}' before any pass writes it")]
    ReadBeforeWrite { pass: String, resource: String },
    #[error("Pass '{pass}' writes '{resource}' which pass '{writer}' already writes")]
    MultipleWriters {
        pass: String,
        resource: String,
        writer: String,
    },
    #[error("Pass '{pass}' both reads and writes '{resource}'")]
    ReadWriteHazard { pass: String, resource: String },
    #[error("Pass '{pass}' writes external resource '{resource}'")]
    ExternalWrite { pass: String, resource: String },
    #[error("Pass '{pass}' did not create its '{output}' output")]
    MissingOutput { pass: String, output: String },
    #[error("Pass {0} is not of the requested type")]
    PassTypeMismatch(String),
    #[error("Render graph contains a dependency cycle")]
    CyclicDependency,
}

/// The main render graph structure
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    targets: Vec<RenderTarget>,
    next_pass_id: u32,
    next_resource_id: u32,
    next_target_id: u32,

    /// External resources (asset and noise textures)
    external_resources: HashMap<String, ResourceId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            targets: Vec::new(),
            next_pass_id: 0,
            next_resource_id: 0,
            next_target_id: 0,
            external_resources: HashMap::new(),
        }
    }

    /// Register an external resource; registering a name twice returns the same id
    pub fn register_external(&mut self, name: &str) -> ResourceId {
        if let Some(id) = self.external_resources.get(name) {
            return *id;
        }
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.push(VirtualResource::External {
            id,
            name: name.to_string(),
        });
        self.external_resources.insert(name.to_string(), id);
        id
    }

    /// Add a render pass to the graph.
    ///
    /// Passes are added in execution order: every input must already be
    /// written by an earlier pass (or be external), and a pass may not write a
    /// resource that an earlier pass already writes. A rejected pass
    /// leaves the graph unchanged.
    pub fn add_pass<P: RenderPass + 'static>(
        &mut self,
        pass: P,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<PassId, GraphError> {
        let name = pass.name().to_string();
        let program = pass.program();
        let mut boxed_pass = Box::new(pass);

        let resource_mark = self.resources.len();
        let target_mark = self.targets.len();
        let next_resource_mark = self.next_resource_id;
        let next_target_mark = self.next_target_id;

        // Setup the pass
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut params = ParameterBlock::new();
        {
            let mut ctx = PassSetupContext {
                resources: &mut self.resources,
                targets: &mut self.targets,
                inputs: &mut inputs,
                outputs: &mut outputs,
                params: &mut params,
                next_resource_id: &mut self.next_resource_id,
                next_target_id: &mut self.next_target_id,
                screen_width,
                screen_height,
            };
            boxed_pass.setup(&mut ctx);
        }

        if let Err(err) = self.validate(&name, &inputs, &outputs) {
            self.resources.truncate(resource_mark);
            self.targets.truncate(target_mark);
            self.next_resource_id = next_resource_mark;
            self.next_target_id = next_target_mark;
            log::error!("Rejected pass '{}': {}", name, err);
            return Err(err);
        }

        let id = PassId(self.next_pass_id);
        self.next_pass_id += 1;

        log::debug!(
            "Added pass '{}' ({}) with {} inputs, {} outputs",
            name,
            program,
            inputs.len(),
            outputs.len()
        );

        self.passes.push(boxed_pass);
        self.pass_nodes.push(PassNode {
            id,
            name,
            program,
            inputs,
            outputs,
            params,
        });

        Ok(id)
    }

    fn validate(
        &self,
        pass: &str,
        inputs: &[InputBinding],
        outputs: &[ResourceAccess],
    ) -> Result<(), GraphError> {
        for binding in inputs {
            let id = binding.resource();
            let resource = self
                .resource(id)
                .ok_or_else(|| GraphError::UnknownResource {
                    pass: pass.to_string(),
                    resource: id,
                })?;
            if outputs.iter().any(|o| o.resource == id) {
                return Err(GraphError::ReadWriteHazard {
                    pass: pass.to_string(),
                    resource: resource.name().to_string(),
                });
            }
            if !resource.is_external() && !self.pass_nodes.iter().any(|n| n.writes_resource(id)) {
                return Err(GraphError::ReadBeforeWrite {
                    pass: pass.to_string(),
                    resource: resource.name().to_string(),
                });
            }
        }

        for access in outputs {
            let id = access.resource;
            let resource = self
                .resource(id)
                .ok_or_else(|| GraphError::UnknownResource {
                    pass: pass.to_string(),
                    resource: id,
                })?;
            if resource.is_external() {
                return Err(GraphError::ExternalWrite {
                    pass: pass.to_string(),
                    resource: resource.name().to_string(),
                });
            }
            if let Some(writer) = self.pass_nodes.iter().find(|n| n.writes_resource(id)) {
                return Err(GraphError::MultipleWriters {
                    pass: pass.to_string(),
                    resource: resource.name().to_string(),
                    writer: writer.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Compile the graph - topological sort and resource lifetime planning
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        // A pass depends on another if it reads a resource that the other writes
        let mut dependencies: HashMap<PassId, HashSet<PassId>> = HashMap::new();
        for reader in &self.pass_nodes {
            let deps = dependencies.entry(reader.id).or_default();
            for writer in &self.pass_nodes {
                if reader.id == writer.id {
                    continue;
                }
                if reader
                    .inputs
                    .iter()
                    .any(|input| writer.writes_resource(input.resource()))
                {
                    deps.insert(writer.id);
                }
            }
        }

        // Kahn's algorithm; ties resolve to the lowest pass id so the order is stable
        let mut in_degree: HashMap<PassId, usize> = dependencies
            .iter()
            .map(|(id, deps)| (*id, deps.len()))
            .collect();
        let mut ready: BTreeSet<PassId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted_passes = Vec::with_capacity(self.pass_nodes.len());
        while let Some(pass_id) = ready.pop_first() {
            sorted_passes.push(pass_id);

            for node in &self.pass_nodes {
                if dependencies[&node.id].contains(&pass_id) {
                    if let Some(degree) = in_degree.get_mut(&node.id) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(node.id);
                        }
                    }
                }
            }
        }

        if sorted_passes.len() != self.pass_nodes.len() {
            return Err(GraphError::CyclicDependency);
        }

        // Determine resource lifetimes
        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();
        for (order, pass_id) in sorted_passes.iter().enumerate() {
            let Some(node) = self.get_pass_node(*pass_id) else {
                continue;
            };
            let accessed = node
                .inputs
                .iter()
                .map(|b| b.resource())
                .chain(node.outputs.iter().map(|a| a.resource));
            for resource in accessed {
                let lifetime = resource_lifetimes
                    .entry(resource)
                    .or_insert(ResourceLifetime {
                        first_use: order,
                        last_use: order,
                    });
                lifetime.last_use = order;
            }
        }

        log::debug!(
            "Compiled render graph: {} passes, {} live resources",
            sorted_passes.len(),
            resource_lifetimes.len()
        );

        Ok(CompiledGraph {
            pass_order: sorted_passes,
            resource_lifetimes,
        })
    }

    /// Get all passes
    pub fn passes(&self) -> &[Box<dyn RenderPass>] {
        &self.passes
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    /// Get all render targets
    pub fn render_targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    pub fn resource(&self, id: ResourceId) -> Option<&VirtualResource> {
        self.resources.iter().find(|r| r.id() == id)
    }

    /// Find a graph texture by its `target.attachment` name
    pub fn find_resource(&self, name: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.id())
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        let index = self.pass_nodes.iter().position(|n| n.id == id)?;
        Some(self.passes[index].as_ref())
    }

    /// Get a pass downcast to its concrete type
    pub fn get_pass_as<P: RenderPass + 'static>(&self, id: PassId) -> Option<&P> {
        self.get_pass(id)?.as_any().downcast_ref::<P>()
    }

    /// Get pass node by ID
    pub fn get_pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.iter().find(|n| n.id == id)
    }

    /// Find a pass by name
    pub fn find_pass(&self, name: &str) -> Option<PassId> {
        self.pass_nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug, Clone, Default)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::types::TextureFormat;
    use std::any::Any;

    /// Minimal pass used to exercise graph construction
    pub(crate) struct TestPass {
        pub name: &'static str,
        pub reads: Vec<(&'static str, ResourceId)>,
        pub writes: Vec<ResourceId>,
        pub create: Option<&'static str>,
        pub write_created: bool,
        pub created: Option<ResourceId>,
    }

    impl TestPass {
        pub fn producer(name: &'static str, target: &'static str) -> Self {
            Self {
                name,
                reads: Vec::new(),
                writes: Vec::new(),
                create: Some(target),
                write_created: true,
                created: None,
            }
        }

        pub fn consumer(name: &'static str, reads: Vec<(&'static str, ResourceId)>) -> Self {
            Self {
                name,
                reads,
                writes: Vec::new(),
                create: None,
                write_created: false,
                created: None,
            }
        }
    }

    impl RenderPass for TestPass {
        fn name(&self) -> &str {
            self.name
        }

        fn program(&self) -> Program {
            Program::fullscreen("test", "default")
        }

        fn setup(&mut self, ctx: &mut PassSetupContext) {
            for (binding, resource) in &self.reads {
                ctx.read(binding, *resource, ResourceUsage::TextureRead);
            }
            for resource in &self.writes {
                ctx.write(*resource, ResourceUsage::RenderTarget);
            }
            if let Some(target) = self.create {
                let target = ctx.create_render_target(
                    RenderTargetDesc::new(target, TextureSize::full_screen())
                        .attachment("color", TextureFormat::Rgba32Float),
                );
                let color = target.attachment_ids().next();
                if let (Some(color), true) = (color, self.write_created) {
                    ctx.write(color, ResourceUsage::RenderTarget);
                }
                self.created = color;
            }
        }

        fn execute(&self, ctx: &mut PassExecuteContext) -> Result<(), PassError> {
            if let (Some(created), true) = (self.created, self.write_created) {
                ctx.output(created)?.clear(glam::Vec4::ONE);
            }
            for resource in &self.writes {
                ctx.output(*resource)?.clear(glam::Vec4::ONE);
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn created(graph: &RenderGraph, id: PassId) -> ResourceId {
        graph
            .get_pass_as::<TestPass>(id)
            .and_then(|p| p.created)
            .unwrap()
    }

    #[test]
    fn test_linear_chain_compiles_in_order() {
        let mut graph = RenderGraph::new();
        let a = graph.add_pass(TestPass::producer("a", "ta"), 4, 4).unwrap();
        let ta = created(&graph, a);
        let mut b = TestPass::producer("b", "tb");
        b.reads.push(("input", ta));
        let b = graph.add_pass(b, 4, 4).unwrap();
        let tb = created(&graph, b);
        let c = graph
            .add_pass(TestPass::consumer("c", vec![("input", tb)]), 4, 4)
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order, vec![a, b, c]);
        assert_eq!(
            compiled.resource_lifetimes[&ta],
            ResourceLifetime {
                first_use: 0,
                last_use: 1
            }
        );
        assert!(compiled.is_resource_alive(tb, 2));
        assert!(!compiled.is_resource_alive(ta, 2));
    }

    #[test]
    fn test_unknown_resource_leaves_graph_unchanged() {
        let mut graph = RenderGraph::new();
        graph.add_pass(TestPass::producer("a", "ta"), 4, 4).unwrap();
        let resources_before = graph.resources().len();

        let mut bad = TestPass::producer("bad", "tb");
        bad.reads.push(("x", ResourceId(99)));
        let err = graph.add_pass(bad, 4, 4).unwrap_err();
        assert!(matches!(err, GraphError::UnknownResource { .. }));
        assert_eq!(graph.resources().len(), resources_before);
        assert_eq!(graph.render_targets().len(), 1);
        assert!(graph.find_pass("bad").is_none());
    }

    #[test]
    fn test_reader_before_writer_rejected() {
        let mut graph = RenderGraph::new();
        let mut declare = TestPass::producer("declare", "late");
        declare.write_created = false;
        let declare = graph.add_pass(declare, 4, 4).unwrap();
        let late = created(&graph, declare);

        let err = graph
            .add_pass(TestPass::consumer("early_reader", vec![("t", late)]), 4, 4)
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::ReadBeforeWrite {
                pass: "early_reader".into(),
                resource: "late.color".into()
            }
        );

        let mut writer = TestPass::consumer("writer", Vec::new());
        writer.writes.push(late);
        graph.add_pass(writer, 4, 4).unwrap();
        assert!(graph
            .add_pass(TestPass::consumer("reader", vec![("t", late)]), 4, 4)
            .is_ok());
    }

    #[test]
    fn test_multiple_writers_rejected() {
        let mut graph = RenderGraph::new();
        let external = graph.register_external("noise");
        graph
            .add_pass(TestPass::consumer("noise_reader", vec![("noise", external)]), 4, 4)
            .unwrap();
        let b = graph.add_pass(TestPass::producer("producer", "t"), 4, 4).unwrap();
        let t = created(&graph, b);

        let mut rewriter = TestPass::consumer("rewriter", Vec::new());
        rewriter.writes.push(t);
        let err = graph.add_pass(rewriter, 4, 4).unwrap_err();
        assert_eq!(
            err,
            GraphError::MultipleWriters {
                pass: "rewriter".into(),
                resource: "t.color".into(),
                writer: "producer".into()
            }
        );
    }

    #[test]
    fn test_read_write_hazard() {
        let mut graph = RenderGraph::new();
        let a = graph.add_pass(TestPass::producer("a", "ta"), 4, 4).unwrap();
        let ta = created(&graph, a);
        let mut pass = TestPass::consumer("self", vec![("in", ta)]);
        pass.writes.push(ta);
        let err = graph.add_pass(pass, 4, 4).unwrap_err();
        assert_eq!(
            err,
            GraphError::ReadWriteHazard {
                pass: "self".into(),
                resource: "ta.color".into()
            }
        );
    }

    #[test]
    fn test_external_write_rejected() {
        let mut graph = RenderGraph::new();
        let external = graph.register_external("asset");
        let mut pass = TestPass::consumer("writer", Vec::new());
        pass.writes.push(external);
        let err = graph.add_pass(pass, 4, 4).unwrap_err();
        assert!(matches!(err, GraphError::ExternalWrite { .. }));
        assert_eq!(graph.register_external("asset"), external);
    }

    #[test]
    fn test_render_target_attachments_share_size() {
        struct MrtPass;
        impl RenderPass for MrtPass {
            fn name(&self) -> &str {
                "mrt"
            }
            fn program(&self) -> Program {
                Program::mesh(false, "mrt", "default")
            }
            fn setup(&mut self, ctx: &mut PassSetupContext) {
                let target = ctx.create_render_target(
                    RenderTargetDesc::new("gbuffer", TextureSize::scaled(0.5))
                        .attachment("normal", TextureFormat::Rgba16Float)
                        .attachment("depth", TextureFormat::Depth32Float),
                );
                for id in target.attachment_ids() {
                    ctx.write(id, ResourceUsage::RenderTarget);
                }
            }
            fn execute(&self, _ctx: &mut PassExecuteContext) -> Result<(), PassError> {
                Ok(())
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        let mut graph = RenderGraph::new();
        graph.add_pass(MrtPass, 64, 32).unwrap();
        let target = &graph.render_targets()[0];
        assert_eq!((target.width, target.height), (32, 16));
        for id in target.attachment_ids() {
            let desc = graph.resource(id).and_then(|r| r.descriptor()).unwrap();
            assert_eq!((desc.width, desc.height), (32, 16));
        }
        assert!(graph.find_resource("gbuffer.depth").is_some());
    }
}
