//! Synchronization vocabulary shared by the render graph and backends.
//!
//! The render graph derives a list of [`Barrier`]s between passes from the
//! declared resource usages. Explicit backends translate them one to one;
//! wgpu tracks hazards itself and only logs them.

use bitflags::bitflags;

/// Image layout states a texture moves through inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Initial state, contents undefined.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth attachment writes and tests.
    DepthStencilAttachment,
    /// Depth tested but not written, and readable from shaders.
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Buffers and storage images.
    General,
    /// Ready for presentation.
    PresentSrc,
}

bitflags! {
    /// Pipeline stages that produce or consume a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const EARLY_FRAGMENT_TESTS = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const LATE_FRAGMENT_TESTS = 1 << 4;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        const COMPUTE_SHADER = 1 << 6;
        const TRANSFER = 1 << 7;
        const BOTTOM_OF_PIPE = 1 << 8;
    }
}

bitflags! {
    /// Memory access kinds that need to be made visible.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const UNIFORM_READ = 1 << 0;
        const SHADER_READ = 1 << 1;
        const SHADER_WRITE = 1 << 2;
        const COLOR_ATTACHMENT_WRITE = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 5;
        const TRANSFER_READ = 1 << 6;
        const TRANSFER_WRITE = 1 << 7;
        const VERTEX_ATTRIBUTE_READ = 1 << 8;
    }
}

impl AccessFlags {
    pub fn is_write(self) -> bool {
        self.intersects(
            AccessFlags::SHADER_WRITE
                | AccessFlags::COLOR_ATTACHMENT_WRITE
                | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                | AccessFlags::TRANSFER_WRITE,
        )
    }
}

/// Kind of resource a barrier guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    Texture,
    Buffer,
}

/// One dependency between a producing and a consuming pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    pub resource: String,
    pub kind: BarrierKind,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
}

impl Barrier {
    /// True when this barrier orders `src` before `dst` on the named resource.
    pub fn covers(&self, resource: &str, src: PipelineStages, dst: PipelineStages) -> bool {
        self.resource == resource && self.src_stages.contains(src) && self.dst_stages.contains(dst)
    }

    pub fn is_layout_transition(&self) -> bool {
        self.kind == BarrierKind::Texture && self.old_layout != self.new_layout
    }
}

impl std::fmt::Display for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:?} -> {:?}] {:?}/{:?} -> {:?}/{:?}",
            self.resource,
            self.old_layout,
            self.new_layout,
            self.src_stages,
            self.src_access,
            self.dst_stages,
            self.dst_access
        )
    }
}
