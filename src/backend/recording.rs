//! Device-free backend that records the command stream.
//!
//! Buffers keep their bytes so uploads can be read back, pipelines are
//! validated with naga, and fences signal immediately. Acquire failures can
//! be queued to exercise the swapchain recovery path.

use crate::backend::barrier::Barrier;
use crate::backend::shader::{validate_wgsl, ShaderStage};
use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier(Vec<Barrier>),
    BeginRenderPass {
        label: Option<String>,
        color: Vec<(TextureViewHandle, LoadOp)>,
        depth: Option<(TextureViewHandle, LoadOp)>,
    },
    EndRenderPass,
    BeginComputePass {
        label: Option<String>,
    },
    EndComputePass,
    SetRenderPipeline(RenderPipelineHandle),
    SetComputePipeline(ComputePipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
        dynamic_offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        instances: Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

impl Command {
    /// Label of a render or compute pass start
    pub fn pass_label(&self) -> Option<&str> {
        match self {
            Command::BeginRenderPass { label, .. } | Command::BeginComputePass { label } => {
                label.as_deref()
            }
            _ => None,
        }
    }
}

const SWAPCHAIN_VIEW: TextureViewHandle = TextureViewHandle(u64::MAX);

/// Backend that records instead of rendering
pub struct RecordingBackend {
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: u64,
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, TextureHandle>,
    bind_groups: HashMap<u64, BindGroupLayoutHandle>,
    render_pipelines: HashMap<u64, String>,
    compute_pipelines: HashMap<u64, String>,
    commands: Vec<Command>,
    submitted: Vec<Vec<Command>>,
    acquire_failures: VecDeque<BackendError>,
    present_failures: VecDeque<BackendError>,
    waited: Vec<FenceHandle>,
    resizes: Vec<(u32, u32)>,
    in_frame: bool,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            compute_pipelines: HashMap::new(),
            commands: Vec::new(),
            submitted: Vec::new(),
            acquire_failures: VecDeque::new(),
            present_failures: VecDeque::new(),
            waited: Vec::new(),
            resizes: Vec::new(),
            in_frame: false,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Make the next `begin_frame` fail with `error`
    pub fn fail_next_acquire(&mut self, error: BackendError) {
        self.acquire_failures.push_back(error);
    }

    /// Make the next `end_frame` submit but fail to present with `error`
    pub fn fail_next_present(&mut self, error: BackendError) {
        self.present_failures.push_back(error);
    }

    /// Commands recorded since the last `end_frame`
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Command lists of every submitted frame, oldest first
    pub fn submitted_frames(&self) -> &[Vec<Command>] {
        &self.submitted
    }

    pub fn last_frame(&self) -> Option<&[Command]> {
        self.submitted.last().map(Vec::as_slice)
    }

    /// Fences passed to `wait_for_fence`, in call order
    pub fn waited_fences(&self) -> &[FenceHandle] {
        &self.waited
    }

    /// Sizes passed to `resize`, in call order
    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn render_pipeline_label(&self, pipeline: RenderPipelineHandle) -> Option<&str> {
        self.render_pipelines.get(&pipeline.0).map(String::as_str)
    }

    pub fn compute_pipeline_label(&self, pipeline: ComputePipelineHandle) -> Option<&str> {
        self.compute_pipelines.get(&pipeline.0).map(String::as_str)
    }

    /// Live buffer count, for leak checks across resizes
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }

    fn record(&mut self, command: Command) {
        if !self.in_frame {
            log::trace!("Recording {command:?} outside a frame");
        }
        self.commands.push(command);
    }
}

impl GraphicsBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if let Some(error) = self.acquire_failures.pop_front() {
            return Err(error);
        }
        self.in_frame = true;
        Ok(FrameContext {
            swapchain_view: SWAPCHAIN_VIEW,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<Submission> {
        self.in_frame = false;
        self.submitted.push(std::mem::take(&mut self.commands));
        Ok(Submission {
            fence: FenceHandle(self.submitted.len() as u64),
            presented: self.present_failures.pop_front().map_or(Ok(()), Err),
        })
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> BackendResult<()> {
        self.waited.push(fence);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?}: zero-sized buffer",
                desc.label
            )));
        }
        let id = self.allocate();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = self.create_buffer(&BufferDescriptor {
            size: desc.size.max(data.len() as u64),
            ..desc.clone()
        })?;
        self.write_buffer(handle, 0, data);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(bytes) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("write_buffer on unknown buffer {}", buffer.0);
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            log::warn!("write_buffer overruns buffer {} ({end} > {})", buffer.0, bytes.len());
            return;
        }
        bytes[start..end].copy_from_slice(data);
    }

    fn read_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> BackendResult<Vec<u8>> {
        let bytes = self.buffers.get(&buffer.0).ok_or(BackendError::InvalidHandle {
            kind: "buffer",
            id: buffer.0,
        })?;
        let start = offset as usize;
        let end = start + size as usize;
        bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| BackendError::ReadbackFailed(format!("range {start}..{end} out of bounds")))
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: zero extent",
                desc.label
            )));
        }
        let id = self.allocate();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        let id = self.allocate();
        self.views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        let Some(desc) = self.textures.get(&texture.0) else {
            log::warn!("write_texture on unknown texture {}", texture.0);
            return;
        };
        let expected = (width * height * desc.format.bytes_per_pixel()) as usize;
        if data.len() < expected {
            log::warn!("write_texture short by {} bytes", expected - data.len());
        }
    }

    fn create_sampler(&mut self, _desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        Ok(SamplerHandle(self.allocate()))
    }

    fn create_bind_group_layout(
        &mut self,
        _entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        Ok(BindGroupLayoutHandle(self.allocate()))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        for (binding, entry) in entries {
            match entry {
                BindGroupEntry::Buffer { buffer, .. } if !self.buffers.contains_key(&buffer.0) => {
                    log::error!("Bind group entry {binding} references a destroyed buffer");
                    return Err(BackendError::InvalidHandle {
                        kind: "buffer",
                        id: buffer.0,
                    });
                }
                BindGroupEntry::Texture(view)
                    if *view != SWAPCHAIN_VIEW && !self.views.contains_key(&view.0) =>
                {
                    log::error!("Bind group entry {binding} references a destroyed view");
                    return Err(BackendError::InvalidHandle {
                        kind: "texture view",
                        id: view.0,
                    });
                }
                _ => {}
            }
        }
        let id = self.allocate();
        self.bind_groups.insert(id, layout);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        let label = desc.label.clone().unwrap_or_default();
        let mut entries = vec![("vs_main", ShaderStage::Vertex)];
        if desc.has_fragment {
            entries.push(("fs_main", ShaderStage::Fragment));
        }
        validate_wgsl(&label, &desc.shader, &entries)?;

        let id = self.allocate();
        self.render_pipelines.insert(id, label);
        Ok(RenderPipelineHandle(id))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        let label = desc.label.clone().unwrap_or_default();
        validate_wgsl(&label, &desc.shader, &[(&desc.entry_point, ShaderStage::Compute)])?;

        let id = self.allocate();
        self.compute_pipelines.insert(id, label);
        Ok(ComputePipelineHandle(id))
    }

    fn pipeline_barrier(&mut self, barriers: &[Barrier]) {
        self.record(Command::Barrier(barriers.to_vec()));
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.record(Command::BeginRenderPass {
            label: desc.label.clone(),
            color: desc
                .color_attachments
                .iter()
                .map(|a| (a.view, a.load_op))
                .collect(),
            depth: desc
                .depth_stencil_attachment
                .as_ref()
                .map(|d| (d.view, d.depth_load_op)),
        });
    }

    fn end_render_pass(&mut self) {
        self.record(Command::EndRenderPass);
    }

    fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.record(Command::BeginComputePass {
            label: label.map(str::to_string),
        });
    }

    fn end_compute_pass(&mut self) {
        self.record(Command::EndComputePass);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(Command::SetRenderPipeline(pipeline));
    }

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.record(Command::SetComputePipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]) {
        self.record(Command::SetBindGroup {
            index,
            bind_group,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record(Command::SetIndexBuffer { buffer, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.record(Command::DrawIndexed { indices, instances });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record(Command::Dispatch { x, y, z });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.views.retain(|_, owner| *owner != texture);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_keep_written_bytes() {
        let mut backend = RecordingBackend::new(8, 8);
        let buffer = backend.create_buffer(&BufferDescriptor::storage("test", 16)).unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.read_buffer(buffer, 4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(backend.read_buffer(buffer, 12, 8).is_err());
    }

    #[test]
    fn queued_acquire_failure_is_returned_once() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.fail_next_acquire(BackendError::SurfaceOutdated);
        assert!(matches!(backend.begin_frame(), Err(BackendError::SurfaceOutdated)));
        assert!(backend.begin_frame().is_ok());
    }

    #[test]
    fn end_frame_moves_commands_into_history() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.begin_frame().unwrap();
        backend.begin_compute_pass(Some("work"));
        backend.dispatch_compute(1, 1, 1);
        backend.end_compute_pass();
        let fence = backend.end_frame().unwrap().fence;

        assert!(backend.commands().is_empty());
        let frame = backend.last_frame().unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame[0].pass_label(), Some("work"));
        backend.wait_for_fence(fence).unwrap();
        assert_eq!(backend.waited_fences(), &[fence]);
    }

    #[test]
    fn pipelines_are_validated() {
        let mut backend = RecordingBackend::new(8, 8);
        let desc = ComputePipelineDescriptor {
            label: Some("broken".into()),
            shader: "@compute @workgroup_size(1) fn cs_main() {".into(),
            entry_point: "cs_main".into(),
            bind_group_layouts: vec![],
        };
        assert!(matches!(
            backend.create_compute_pipeline(&desc),
            Err(BackendError::ShaderCreationFailed(_))
        ));
    }
}
