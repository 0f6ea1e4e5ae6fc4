//! Passes and the resources they declare

use crate::backend::traits::GraphicsBackend;
use crate::pipeline::FramePacket;
use crate::render_graph::resource::*;

/// Collects the accesses one pass declares. Names seen for the first time
/// are registered with the graph; the usage decides whether the name is a
/// texture or a buffer.
pub struct PassIo<'a> {
    pub(crate) registry: &'a mut Vec<GraphResource>,
    pub(crate) node: &'a mut PassNode,
}

impl PassIo<'_> {
    fn lookup(&mut self, name: &str, usage: ResourceUsage) -> ResourceId {
        if let Some(found) = self.registry.iter().find(|r| r.name == name) {
            return found.id;
        }
        let id = ResourceId(self.registry.len() as u32);
        self.registry.push(GraphResource {
            id,
            name: name.to_string(),
            kind: usage.kind(),
        });
        id
    }

    pub fn read(&mut self, name: &str, usage: ResourceUsage) -> ResourceId {
        let resource = self.lookup(name, usage);
        self.node.inputs.push(ResourceAccess { resource, usage });
        resource
    }

    pub fn write(&mut self, name: &str, usage: ResourceUsage) -> ResourceId {
        let resource = self.lookup(name, usage);
        self.node.outputs.push(ResourceAccess { resource, usage });
        resource
    }
}

/// What a pass records into
pub struct PassContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub frame: &'a FramePacket<'a>,
}

/// One step of the frame.
///
/// `declare` runs once when the pass joins a graph; `record` runs every time
/// the graph executes and may only touch what was declared.
pub trait RenderPass: Send + Sync {
    fn name(&self) -> &str;

    fn declare(&self, io: &mut PassIo);

    fn record(&self, ctx: &mut PassContext);
}

/// The declared accesses of a pass, kept alongside it in the graph
#[derive(Debug, Default)]
pub struct PassNode {
    pub name: String,
    pub inputs: Vec<ResourceAccess>,
    pub outputs: Vec<ResourceAccess>,
}

impl PassNode {
    fn touches(accesses: &[ResourceAccess], resource: ResourceId) -> bool {
        accesses.iter().any(|a| a.resource == resource)
    }

    /// Whether `later` has to stay after this pass: it reads something this
    /// pass writes, or writes something this pass reads or writes.
    pub fn conflicts_with(&self, later: &PassNode) -> bool {
        later
            .inputs
            .iter()
            .any(|a| Self::touches(&self.outputs, a.resource))
            || later.outputs.iter().any(|a| {
                Self::touches(&self.inputs, a.resource) || Self::touches(&self.outputs, a.resource)
            })
    }

    /// Inputs, then outputs, each in declaration order
    pub fn accesses(&self) -> impl Iterator<Item = &ResourceAccess> {
        self.inputs.iter().chain(&self.outputs)
    }
}
