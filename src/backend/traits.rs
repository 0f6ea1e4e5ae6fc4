//! The interface the renderer records through
//!
//! The renderer talks to the GPU only through [`GraphicsBackend`]. The wgpu
//! backend drives real hardware; the recording backend captures the command
//! stream so frame structure can be inspected without a device.

use crate::backend::barrier::Barrier;
use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Everything a backend call can fail with
#[derive(Error, Debug)]
pub enum BackendError {
    // Setup
    #[error("no usable GPU: {0}")]
    InitializationFailed(String),
    #[error("cannot create a surface for the window: {0}")]
    SurfaceCreationFailed(String),
    #[error("device request rejected: {0}")]
    DeviceCreationFailed(String),

    // Resource creation
    #[error("buffer rejected: {0}")]
    BufferCreationFailed(String),
    #[error("texture rejected: {0}")]
    TextureCreationFailed(String),
    #[error("pipeline rejected: {0}")]
    PipelineCreationFailed(String),
    #[error("WGSL did not validate: {0}")]
    ShaderCreationFailed(String),
    #[error("buffer readback failed: {0}")]
    ReadbackFailed(String),
    #[error("{kind} handle {id} does not exist")]
    InvalidHandle { kind: &'static str, id: u64 },

    // Per frame
    #[error("swapchain no longer matches the surface")]
    SurfaceOutdated,
    #[error("swapchain image not ready in time")]
    SurfaceTimeout,
    #[error("surface was lost")]
    SurfaceLost,
    #[error("GPU memory exhausted")]
    OutOfMemory,
    #[error("GPU device was lost")]
    DeviceLost,
    #[error("device reported: {0}")]
    Device(String),
}

impl BackendError {
    /// Errors after which the swapchain has to be rebuilt before the next frame.
    pub fn needs_resize(&self) -> bool {
        matches!(self, BackendError::SurfaceOutdated | BackendError::SurfaceLost)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! handles {
    ($($(#[$doc:meta])* $name:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub(crate) u64);
        )*
    };
}

handles! {
    BufferHandle;
    TextureHandle;
    TextureViewHandle;
    SamplerHandle;
    RenderPipelineHandle;
    ComputePipelineHandle;
    BindGroupHandle;
    BindGroupLayoutHandle;
    /// One submitted frame of GPU work.
    ///
    /// Waiting on it blocks until everything recorded before the matching
    /// [`GraphicsBackend::end_frame`] has executed, which is what lets a
    /// frame slot's uniform, light and tile buffers be rewritten.
    FenceHandle;
}

#[derive(Debug, Clone)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

#[derive(Debug, Clone)]
pub enum BindingType {
    /// Dynamic offsets select one object's block out of the per-draw buffer
    UniformBuffer { has_dynamic_offset: bool },
    /// Light records and tile lists
    StorageBuffer { read_only: bool },
    Texture { sample_type: TextureSampleType },
    /// `comparison` is set for the shadow map sampler
    Sampler { comparison: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSampleType {
    Float { filterable: bool },
    /// Scene depth read by culling, shadow maps read by shading
    Depth,
}

/// Render pipeline description.
///
/// `shader` holds one WGSL module with `vs_main` and, when `has_fragment` is
/// set, `fs_main`. Depth-only pipelines (pre-pass and shadow maps) leave
/// `color_targets` empty.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub has_fragment: bool,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub primitive_topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendMode>,
    pub write_mask: ColorWrites,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub entry_point: String,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
}

#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// What a pass does with an attachment's previous contents
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    /// Clear to a color; depth attachments use the first component
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// The acquired swapchain image for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub swapchain_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

/// A submitted frame
///
/// The work is queued even when presenting failed, so `fence` is always
/// valid and has to be waited on before the frame's resources are reused.
#[derive(Debug)]
pub struct Submission {
    pub fence: FenceHandle,
    pub presented: BackendResult<()>,
}

/// Everything the renderer needs from a GPU.
///
/// Commands recorded between [`begin_frame`](Self::begin_frame) and
/// [`end_frame`](Self::end_frame) belong to one submission. Resource
/// creation may happen at any time and fails synchronously.
pub trait GraphicsBackend {
    /// Name used in log lines
    fn name(&self) -> &'static str;

    /// Rebuild the swapchain. Zero extents are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// Current swapchain extent, after any clamping to device limits
    fn surface_size(&self) -> (u32, u32);

    /// Acquire the next swapchain image.
    ///
    /// `SurfaceOutdated`, `SurfaceLost` and `SurfaceTimeout` are reported as
    /// errors so the caller can decide whether to rebuild and skip.
    fn begin_frame(&mut self) -> BackendResult<FrameContext>;

    /// Submit the frame and present; the fence signals on completion
    fn end_frame(&mut self) -> BackendResult<Submission>;

    fn wait_for_fence(&mut self, fence: FenceHandle) -> BackendResult<()>;

    fn swapchain_format(&self) -> TextureFormat;

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Queue a CPU write; it lands before the next submitted frame
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Copy `size` bytes back, waiting for outstanding GPU work first
    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64)
        -> BackendResult<Vec<u8>>;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Upload a whole mip 0 of tightly packed texels
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32);

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    /// Validates the WGSL first; invalid shaders never reach the device
    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle>;

    /// Order the next pass after earlier writers.
    ///
    /// Backends with implicit tracking may only log the request.
    fn pipeline_barrier(&mut self, barriers: &[Barrier]);

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    fn end_render_pass(&mut self);

    fn begin_compute_pass(&mut self, label: Option<&str>);

    fn end_compute_pass(&mut self);

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle);

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Also invalidates every view of the texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}
