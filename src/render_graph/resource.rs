//! Resources referenced by the render graph

use crate::backend::barrier::{AccessFlags, PipelineStages, TextureLayout};
use crate::backend::types::ShaderStageFlags;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Kind of resource the graph tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Texture,
    Buffer,
}

/// Resource imported into the graph.
///
/// The graph never allocates GPU memory itself. The renderer owns the depth
/// buffer, shadow maps and per-slot buffers and registers them by name so
/// passes can declare how they touch them.
#[derive(Debug, Clone)]
pub struct GraphResource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Sampled texture read from the given stages
    TextureRead(ShaderStageFlags),
    /// Color attachment write
    RenderTarget,
    /// Depth attachment tested but not written
    DepthStencilRead,
    /// Depth attachment cleared and written
    DepthStencilWrite,
    /// Uniform buffer read
    UniformBuffer(ShaderStageFlags),
    /// Read-only storage buffer
    StorageBufferRead(ShaderStageFlags),
    /// Read-write storage buffer
    StorageBufferWrite(ShaderStageFlags),
}

fn shader_stages(stages: ShaderStageFlags) -> PipelineStages {
    let mut result = PipelineStages::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        result |= PipelineStages::VERTEX_SHADER;
    }
    if stages.contains(ShaderStageFlags::FRAGMENT) {
        result |= PipelineStages::FRAGMENT_SHADER;
    }
    if stages.contains(ShaderStageFlags::COMPUTE) {
        result |= PipelineStages::COMPUTE_SHADER;
    }
    result
}

impl ResourceUsage {
    pub fn kind(self) -> ResourceKind {
        match self {
            ResourceUsage::TextureRead(_)
            | ResourceUsage::RenderTarget
            | ResourceUsage::DepthStencilRead
            | ResourceUsage::DepthStencilWrite => ResourceKind::Texture,
            ResourceUsage::UniformBuffer(_)
            | ResourceUsage::StorageBufferRead(_)
            | ResourceUsage::StorageBufferWrite(_) => ResourceKind::Buffer,
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceUsage::RenderTarget
                | ResourceUsage::DepthStencilWrite
                | ResourceUsage::StorageBufferWrite(_)
        )
    }

    /// Layout a texture has to be in for this usage. Buffers report `General`.
    pub fn layout(self) -> TextureLayout {
        match self {
            ResourceUsage::TextureRead(_) => TextureLayout::ShaderReadOnly,
            ResourceUsage::RenderTarget => TextureLayout::ColorAttachment,
            ResourceUsage::DepthStencilRead => TextureLayout::DepthStencilReadOnly,
            ResourceUsage::DepthStencilWrite => TextureLayout::DepthStencilAttachment,
            ResourceUsage::UniformBuffer(_)
            | ResourceUsage::StorageBufferRead(_)
            | ResourceUsage::StorageBufferWrite(_) => TextureLayout::General,
        }
    }

    pub fn stages(self) -> PipelineStages {
        match self {
            ResourceUsage::TextureRead(s)
            | ResourceUsage::UniformBuffer(s)
            | ResourceUsage::StorageBufferRead(s)
            | ResourceUsage::StorageBufferWrite(s) => shader_stages(s),
            ResourceUsage::RenderTarget => PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            ResourceUsage::DepthStencilRead | ResourceUsage::DepthStencilWrite => {
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS
            }
        }
    }

    pub fn access(self) -> AccessFlags {
        match self {
            ResourceUsage::TextureRead(_) | ResourceUsage::StorageBufferRead(_) => {
                AccessFlags::SHADER_READ
            }
            ResourceUsage::UniformBuffer(_) => AccessFlags::UNIFORM_READ,
            ResourceUsage::StorageBufferWrite(_) => {
                AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE
            }
            ResourceUsage::RenderTarget => AccessFlags::COLOR_ATTACHMENT_WRITE,
            ResourceUsage::DepthStencilRead => AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            ResourceUsage::DepthStencilWrite => {
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
        }
    }
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        !self.usage.is_write()
    }

    pub fn is_write(&self) -> bool {
        self.usage.is_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_write_is_attachment_layout() {
        let usage = ResourceUsage::DepthStencilWrite;
        assert!(usage.is_write());
        assert_eq!(usage.layout(), TextureLayout::DepthStencilAttachment);
        assert!(usage.access().is_write());
    }

    #[test]
    fn compute_texture_read_maps_to_compute_stage() {
        let usage = ResourceUsage::TextureRead(ShaderStageFlags::COMPUTE);
        assert_eq!(usage.stages(), PipelineStages::COMPUTE_SHADER);
        assert_eq!(usage.access(), AccessFlags::SHADER_READ);
        assert!(!usage.is_write());
    }
}
