//! wgpu implementation of [`GraphicsBackend`]
//!
//! One command encoder per frame. Submissions are tracked by
//! [`wgpu::SubmissionIndex`] so a frame slot can wait on exactly the work
//! that last used it. Errors the device reports outside an error scope are
//! caught by the uncaptured-error hook and surface on the next `end_frame`.

mod conversion;
mod passes;
mod registry;

use crate::backend::barrier::Barrier;
use crate::backend::shader::{validate_wgsl, ShaderStage};
use crate::backend::traits::*;
use crate::backend::types::*;
use parking_lot::Mutex;
use passes::{PassCommand, PendingPass};
use registry::Resources;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Where finished frames go
enum PresentTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
        /// Handle standing in for this frame's swapchain view
        frame_view: u64,
    },
    /// Headless rendering into a texture owned by the backend
    Offscreen {
        texture: TextureHandle,
        view: TextureViewHandle,
        width: u32,
        height: u32,
    },
}

const OFFSCREEN_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: PresentTarget,
    // First error reported through the uncaptured-error hook since the last submit
    device_error: Arc<Mutex<Option<String>>>,
    resources: Resources,
    encoder: Option<wgpu::CommandEncoder>,
    pending: Option<PendingPass>,
}

impl WgpuBackend {
    /// Create a backend presenting to `window`
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
        let (device, queue, adapter) = open_device(&instance, Some(&surface)).await?;

        let caps = surface.get_capabilities(&adapter);
        // Shading writes linear values, so an sRGB surface does the encoding
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| BackendError::SurfaceCreationFailed("surface reports no formats".into()))?;

        let size = window.inner_size();
        let (width, height) =
            conversion::clamp_extent(size.width, size.height, device.limits().max_texture_dimension_2d);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: crate::MAX_FRAMES_IN_FLIGHT as u32,
        };
        surface.configure(&device, &config);
        log::info!("Surface configured: {width}x{height} {format:?}, vsync={vsync}");

        Ok(Self::from_parts(
            device,
            queue,
            PresentTarget::Surface {
                surface,
                config,
                current: None,
                frame_view: 0,
            },
        ))
    }

    /// Create a backend that renders into an offscreen texture instead of a window
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
            let (device, queue, _) = open_device(&instance, None).await?;
            let mut backend = Self::from_parts(
                device,
                queue,
                PresentTarget::Offscreen {
                    texture: TextureHandle(0),
                    view: TextureViewHandle(0),
                    width: 0,
                    height: 0,
                },
            );
            backend.rebuild_offscreen(width, height)?;
            log::info!("Headless target created: {width}x{height}");
            Ok(backend)
        })
    }

    fn from_parts(device: wgpu::Device, queue: wgpu::Queue, target: PresentTarget) -> Self {
        let device_error = Arc::new(Mutex::new(None));
        let hook_error = Arc::clone(&device_error);
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("Uncaptured wgpu error: {error}");
            hook_error.lock().get_or_insert_with(|| error.to_string());
        }));

        Self {
            device,
            queue,
            target,
            device_error,
            resources: Resources::new(),
            encoder: None,
            pending: None,
        }
    }

    fn rebuild_offscreen(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if let PresentTarget::Offscreen { texture, view, .. } = self.target {
            self.resources.views.remove(view.0);
            self.destroy_texture(texture);
        }
        let texture = self.create_texture(&TextureDescriptor {
            label: Some("Offscreen Target".into()),
            width,
            height,
            mip_levels: 1,
            format: OFFSCREEN_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        })?;
        let view = self.create_texture_view(texture)?;
        self.target = PresentTarget::Offscreen {
            texture,
            view,
            width,
            height,
        };
        Ok(())
    }

    /// Run `f` inside a validation error scope and turn a captured error into `err`.
    fn scoped<T>(
        &self,
        f: impl FnOnce(&wgpu::Device) -> T,
        err: impl FnOnce(String) -> BackendError,
    ) -> BackendResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(err(error.to_string())),
            None => Ok(value),
        }
    }

    fn shader_module(&self, label: Option<&str>, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label,
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    fn pipeline_layout(&self, handles: &[BindGroupLayoutHandle]) -> BackendResult<wgpu::PipelineLayout> {
        let layouts = handles
            .iter()
            .map(|h| self.resources.layouts.require(h.0))
            .collect::<BackendResult<Vec<_>>>()?;
        Ok(self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        }))
    }

    fn record(&mut self, command: PassCommand) {
        match &mut self.pending {
            Some(pass) => pass.push(command),
            None => log::warn!("{command:?} recorded outside a pass"),
        }
    }
}

async fn open_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> BackendResult<(wgpu::Device, wgpu::Queue, wgpu::Adapter)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| BackendError::InitializationFailed("no suitable adapter found".into()))?;
    let info = adapter.get_info();
    log::info!("Selected GPU: {} ({:?} backend)", info.name, info.backend);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Forward+ Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        )
        .await
        .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;
    Ok((device, queue, adapter))
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) =
            conversion::clamp_extent(width, height, self.device.limits().max_texture_dimension_2d);

        match &mut self.target {
            PresentTarget::Surface { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            PresentTarget::Offscreen { .. } => {
                if let Err(e) = self.rebuild_offscreen(width, height) {
                    log::error!("Failed to resize offscreen target: {e}");
                }
            }
        }
        log::debug!("Backend resized to {width}x{height}");
    }

    fn surface_size(&self) -> (u32, u32) {
        match &self.target {
            PresentTarget::Surface { config, .. } => (config.width, config.height),
            PresentTarget::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let (width, height) = self.surface_size();
        let swapchain_view = match &mut self.target {
            PresentTarget::Surface {
                surface,
                current,
                frame_view,
                ..
            } => {
                *current = Some(surface.get_current_texture().map_err(conversion::surface_error)?);
                // The real view is created when a pass targets this handle
                *frame_view = self.resources.allocate();
                TextureViewHandle(*frame_view)
            }
            PresentTarget::Offscreen { view, .. } => *view,
        };

        self.encoder = Some(self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        }));
        Ok(FrameContext {
            swapchain_view,
            width,
            height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<Submission> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.device.create_command_encoder(&Default::default()),
        };
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let current = match &mut self.target {
            PresentTarget::Surface { current, .. } => current.take(),
            PresentTarget::Offscreen { .. } => None,
        };
        let id = self.resources.allocate();
        self.resources.submissions.insert(id, index);

        // The surface texture is dropped unpresented on a device error
        let presented = match self.device_error.lock().take() {
            Some(message) => Err(BackendError::Device(message)),
            None => {
                if let Some(texture) = current {
                    texture.present();
                }
                Ok(())
            }
        };
        Ok(Submission {
            fence: FenceHandle(id),
            presented,
        })
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> BackendResult<()> {
        // A fence that is gone was already waited on
        if let Some(index) = self.resources.submissions.remove(fence.0) {
            let _ = self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        match &self.target {
            PresentTarget::Surface { config, .. } => conversion::texture_format_back(config.format),
            PresentTarget::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer = self.scoped(
            |device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: desc.label.as_deref(),
                    size: desc.size,
                    usage: conversion::buffer_usage(desc.usage),
                    mapped_at_creation: desc.mapped_at_creation,
                })
            },
            BackendError::BufferCreationFailed,
        )?;
        let id = self.resources.allocate();
        self.resources.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        let buffer = self.scoped(
            |device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: desc.label.as_deref(),
                    contents: data,
                    usage: conversion::buffer_usage(desc.usage),
                })
            },
            BackendError::BufferCreationFailed,
        )?;
        let id = self.resources.allocate();
        self.resources.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.resources.buffers.get(buffer.0) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => log::warn!("write_buffer on unknown buffer {}", buffer.0),
        }
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>> {
        let source = self.resources.buffers.require(buffer.0)?;
        let aligned = size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: aligned,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, offset, &staging, 0, aligned);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let bytes = slice.get_mapped_range()[..size as usize].to_vec();
        staging.unmap();
        Ok(bytes)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.scoped(
            |device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: desc.label.as_deref(),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: desc.mip_levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: conversion::texture_format(desc.format),
                    usage: conversion::texture_usage(desc.usage),
                    view_formats: &[],
                })
            },
            BackendError::TextureCreationFailed,
        )?;
        let id = self.resources.allocate();
        self.resources.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let view = self
            .resources
            .textures
            .require(texture.0)?
            .create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.resources.allocate();
        self.resources.views.insert(id, view);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        let Some(target) = self.resources.textures.get(texture.0) else {
            log::warn!("write_texture on unknown texture {}", texture.0);
            return;
        };
        let bytes_per_pixel = conversion::texture_format_back(target.format()).bytes_per_pixel();
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        self.queue.write_texture(
            target.as_image_copy(),
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            extent,
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let address_mode = conversion::address_mode(desc.address_mode);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: conversion::filter_mode(desc.mag_filter),
            min_filter: conversion::filter_mode(desc.min_filter),
            compare: desc.compare.map(conversion::compare_function),
            ..Default::default()
        });
        let id = self.resources.allocate();
        self.resources.samplers.insert(id, sampler);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let entries: Vec<_> = entries
            .iter()
            .map(|e| wgpu::BindGroupLayoutEntry {
                binding: e.binding,
                visibility: conversion::shader_stages(e.visibility),
                ty: conversion::binding_type(&e.ty),
                count: None,
            })
            .collect();
        let layout = self.scoped(
            |device| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: None,
                    entries: &entries,
                })
            },
            BackendError::PipelineCreationFailed,
        )?;
        let id = self.resources.allocate();
        self.resources.layouts.insert(id, layout);
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let resources = &self.resources;
        let layout = resources.layouts.require(layout.0)?;
        let entries = entries
            .iter()
            .map(|(binding, entry)| {
                let resource = match entry {
                    BindGroupEntry::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: resources.buffers.require(buffer.0)?,
                        offset: *offset,
                        size: size.and_then(std::num::NonZeroU64::new),
                    }),
                    BindGroupEntry::Texture(view) => {
                        wgpu::BindingResource::TextureView(resources.views.require(view.0)?)
                    }
                    BindGroupEntry::Sampler(sampler) => {
                        wgpu::BindingResource::Sampler(resources.samplers.require(sampler.0)?)
                    }
                };
                Ok(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource,
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let bind_group = self.scoped(
            |device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout,
                    entries: &entries,
                })
            },
            BackendError::PipelineCreationFailed,
        )?;
        let id = self.resources.allocate();
        self.resources.bind_groups.insert(id, bind_group);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle> {
        let label = desc.label.as_deref().unwrap_or("render pipeline");
        let mut entry_points = vec![("vs_main", ShaderStage::Vertex)];
        if desc.has_fragment {
            entry_points.push(("fs_main", ShaderStage::Fragment));
        }
        validate_wgsl(label, &desc.shader, &entry_points)?;

        let shader = self.shader_module(desc.label.as_deref(), &desc.shader);
        let layout = self.pipeline_layout(&desc.bind_group_layouts)?;

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: conversion::vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<_> = desc
            .vertex_layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets: Vec<_> = desc
            .color_targets
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: conversion::texture_format(target.format),
                    blend: target.blend.as_ref().map(conversion::blend_state),
                    write_mask: wgpu::ColorWrites::from_bits_truncate(target.write_mask.bits()),
                })
            })
            .collect();
        let depth_stencil = desc.depth_stencil.as_ref().map(|ds| wgpu::DepthStencilState {
            format: conversion::texture_format(ds.format),
            depth_write_enabled: ds.depth_write_enabled,
            depth_compare: conversion::compare_function(ds.depth_compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.scoped(
            |device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: "vs_main",
                        buffers: &vertex_buffers,
                        compilation_options: Default::default(),
                    },
                    fragment: desc.has_fragment.then(|| wgpu::FragmentState {
                        module: &shader,
                        entry_point: "fs_main",
                        targets: &targets,
                        compilation_options: Default::default(),
                    }),
                    primitive: conversion::primitive_state(desc),
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                })
            },
            |e| BackendError::PipelineCreationFailed(format!("{label}: {e}")),
        )?;
        let id = self.resources.allocate();
        self.resources.render_pipelines.insert(id, pipeline);
        log::debug!("Created render pipeline '{label}'");
        Ok(RenderPipelineHandle(id))
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle> {
        let label = desc.label.as_deref().unwrap_or("compute pipeline");
        validate_wgsl(label, &desc.shader, &[(desc.entry_point.as_str(), ShaderStage::Compute)])?;

        let shader = self.shader_module(desc.label.as_deref(), &desc.shader);
        let layout = self.pipeline_layout(&desc.bind_group_layouts)?;
        let pipeline = self.scoped(
            |device| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: desc.label.as_deref(),
                    layout: Some(&layout),
                    module: &shader,
                    entry_point: &desc.entry_point,
                    compilation_options: Default::default(),
                })
            },
            |e| BackendError::PipelineCreationFailed(format!("{label}: {e}")),
        )?;
        let id = self.resources.allocate();
        self.resources.compute_pipelines.insert(id, pipeline);
        log::debug!("Created compute pipeline '{label}'");
        Ok(ComputePipelineHandle(id))
    }

    fn pipeline_barrier(&mut self, barriers: &[Barrier]) {
        // wgpu tracks usage and inserts the equivalent transitions itself
        for barrier in barriers {
            log::trace!("barrier {barrier}");
        }
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending = Some(PendingPass::Render {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(PendingPass::Render { descriptor, commands }) = self.pending.take() else {
            log::warn!("end_render_pass without an open render pass");
            return;
        };
        let Some(mut encoder) = self.encoder.take() else {
            log::warn!("end_render_pass outside of a frame");
            return;
        };

        let (swapchain, frame_view) = match &self.target {
            PresentTarget::Surface {
                current, frame_view, ..
            } => (
                current
                    .as_ref()
                    .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default())),
                *frame_view,
            ),
            PresentTarget::Offscreen { .. } => (None, 0),
        };
        let resources = &self.resources;
        let view_for = |handle: TextureViewHandle| match &swapchain {
            Some(view) if handle.0 == frame_view => Some(view),
            _ => resources.views.get(handle.0),
        };

        let color_attachments: Vec<_> = descriptor
            .color_attachments
            .iter()
            .map(|att| {
                view_for(att.view).map(|view| wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: conversion::load_color(&att.load_op),
                        store: conversion::store_op(att.store_op),
                    },
                })
            })
            .collect();
        let depth_stencil_attachment = descriptor.depth_stencil_attachment.as_ref().and_then(|att| {
            Some(wgpu::RenderPassDepthStencilAttachment {
                view: view_for(att.view)?,
                depth_ops: Some(wgpu::Operations {
                    load: match att.depth_load_op {
                        LoadOp::Clear(_) => wgpu::LoadOp::Clear(att.depth_clear_value),
                        LoadOp::Load => wgpu::LoadOp::Load,
                    },
                    store: conversion::store_op(att.depth_store_op),
                }),
                stencil_ops: None,
            })
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            passes::replay_render(&mut pass, &commands, resources);
        }
        self.encoder = Some(encoder);
    }

    fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.pending = Some(PendingPass::Compute {
            label: label.map(str::to_string),
            commands: Vec::new(),
        });
    }

    fn end_compute_pass(&mut self) {
        let Some(PendingPass::Compute { label, commands }) = self.pending.take() else {
            log::warn!("end_compute_pass without an open compute pass");
            return;
        };
        let Some(encoder) = self.encoder.as_mut() else {
            log::warn!("end_compute_pass outside of a frame");
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: label.as_deref(),
            timestamp_writes: None,
        });
        passes::replay_compute(&mut pass, &commands, &self.resources);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(PassCommand::RenderPipeline(pipeline));
    }

    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle) {
        self.record(PassCommand::ComputePipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, dynamic_offsets: &[u32]) {
        self.record(PassCommand::BindGroup {
            index,
            bind_group,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record(PassCommand::VertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record(PassCommand::IndexBuffer { buffer, offset, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(PassCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(PassCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record(PassCommand::Dispatch { x, y, z });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.resources.buffers.remove(buffer.0) {
            buffer.destroy();
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(texture) = self.resources.textures.remove(texture.0) {
            texture.destroy();
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if self.resources.views.remove(view.0).is_none() {
            log::trace!("texture view {} was already released", view.0);
        }
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if self.resources.bind_groups.remove(bind_group.0).is_none() {
            log::trace!("bind group {} was already released", bind_group.0);
        }
    }
}
