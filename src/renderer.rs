//! Frame orchestration.
//!
//! [`Renderer`] owns the per-slot buffers, the depth buffer, the shadow maps
//! and every pipeline. A frame runs as:
//!
//! ```text
//! begin_frame ─► update_uniforms ─► draw_scene ─► end_frame
//!     │                                              │
//!     └─ waits on the slot's fence          submits and records the fence
//! ```
//!
//! An out-of-date or lost surface turns `begin_frame` into a resize and a
//! skipped frame; the caller simply tries again next iteration.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::debug::DebugSettings;
use crate::debug_lines::{LineBatch, DEFAULT_LINE_BUDGET_BYTES};
use crate::frame::{FrameResources, FrameSlots, SharedViews};
use crate::pipeline::{
    build_frame_graph, BindGroupLayouts, DrawItem, FramePacket, FrameTargets, Pipelines,
    DEPTH_FORMAT, UNIFORM_STRIDE,
};
use crate::render_graph;
use crate::resources::{Aabb, GpuMaterial, GpuMesh, Material, MaterialSlot, Mesh};
use crate::scene::{Camera, FrameUniforms, GpuLight, LightSet, ObjectUniforms};
use crate::shadow::ShadowPlan;
use crate::tiling::{TileGrid, TileLightList};
use crate::MAX_SPOT_SHADOWS;
use glam::Mat4;

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Only read when the caller builds a windowed backend from this config
    pub vsync: bool,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub directional_shadow_size: u32,
    pub spot_shadow_size: u32,
    pub debug_line_budget_bytes: u64,
    /// Radius of the directional shadow volume when there is nothing to fit
    pub shadow_fallback_radius: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            frames_in_flight: crate::MAX_FRAMES_IN_FLIGHT,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            directional_shadow_size: 2048,
            spot_shadow_size: 1024,
            debug_line_budget_bytes: DEFAULT_LINE_BUDGET_BYTES,
            shadow_fallback_radius: 20.0,
        }
    }
}

impl RendererConfig {
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_shadow_sizes(mut self, directional: u32, spot: u32) -> Self {
        self.directional_shadow_size = directional;
        self.spot_shadow_size = spot;
        self
    }

    pub fn with_debug_line_budget(mut self, bytes: u64) -> Self {
        self.debug_line_budget_bytes = bytes;
        self
    }

    pub fn with_shadow_fallback_radius(mut self, radius: f32) -> Self {
        self.shadow_fallback_radius = radius;
        self
    }
}

/// Counters for the most recent frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub slot: usize,
    pub lights_uploaded: usize,
    pub lights_dropped: usize,
    pub spot_shadows: usize,
    pub line_vertices: usize,
    pub line_vertices_dropped: usize,
    pub tile_count: u32,
}

/// An acquired frame. Hand it back to [`Renderer::end_frame`].
#[derive(Debug)]
pub struct Frame {
    context: FrameContext,
    slot: usize,
    index: u64,
}

impl Frame {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> (u32, u32) {
        (self.context.width, self.context.height)
    }
}

/// One opaque object to draw this frame
#[derive(Debug, Clone, Copy)]
pub struct MeshDraw<'a> {
    pub mesh: &'a GpuMesh,
    pub material: &'a GpuMaterial,
    pub transform: Mat4,
}

struct ShadowMaps {
    textures: Vec<TextureHandle>,
    directional: TextureViewHandle,
    spots: [TextureViewHandle; MAX_SPOT_SHADOWS],
    sampler: SamplerHandle,
}

impl ShadowMaps {
    fn create(backend: &mut dyn GraphicsBackend, config: &RendererConfig) -> BackendResult<Self> {
        let mut textures = Vec::with_capacity(1 + MAX_SPOT_SHADOWS);
        let mut map = |backend: &mut dyn GraphicsBackend, label: String, size: u32| {
            let texture = backend.create_texture(&depth_descriptor(label, size, size))?;
            textures.push(texture);
            backend.create_texture_view(texture)
        };

        let directional = map(backend, "Directional Shadow Map".into(), config.directional_shadow_size)?;
        let mut spots = [directional; MAX_SPOT_SHADOWS];
        for (slot, view) in spots.iter_mut().enumerate() {
            *view = map(backend, format!("Spot Shadow Map {slot}"), config.spot_shadow_size)?;
        }

        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Shadow Comparison Sampler".into()),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode: AddressMode::ClampToEdge,
            compare: Some(CompareFunction::LessEqual),
        })?;

        Ok(Self {
            textures,
            directional,
            spots,
            sampler,
        })
    }
}

fn depth_descriptor(label: String, width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor {
        label: Some(label),
        width,
        height,
        mip_levels: 1,
        format: DEPTH_FORMAT,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    }
}

/// Tiled Forward+ renderer over any [`GraphicsBackend`]
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    layouts: BindGroupLayouts,
    pipelines: Pipelines,
    frames: FrameSlots,
    slots: Vec<FrameResources>,
    grid: TileGrid,
    depth_texture: TextureHandle,
    shared: SharedViews,
    shadow_maps: ShadowMaps,
    material_sampler: SamplerHandle,
    lights: Vec<GpuLight>,
    lines: LineBatch,
    last_lights_dropped: usize,
    stats: FrameStats,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, config: RendererConfig) -> BackendResult<Self> {
        let frames = FrameSlots::new(config.frames_in_flight)?;
        let (width, height) = backend.surface_size();
        let grid = TileGrid::new(width, height);
        log::info!(
            "Creating renderer on {} at {width}x{height} ({}x{} tiles, {} frames in flight)",
            backend.name(),
            grid.tiles_x,
            grid.tiles_y,
            config.frames_in_flight
        );

        let color_format = backend.swapchain_format();
        let layouts = BindGroupLayouts::create(&mut backend)?;
        let pipelines = Pipelines::create(&mut backend, &layouts, color_format)?;

        let depth_texture = backend.create_texture(&depth_descriptor("Scene Depth".into(), width, height))?;
        let depth = backend.create_texture_view(depth_texture)?;
        let shadow_maps = ShadowMaps::create(&mut backend, &config)?;
        let shared = SharedViews {
            depth,
            directional_shadow: shadow_maps.directional,
            spot_shadows: shadow_maps.spots,
            shadow_sampler: shadow_maps.sampler,
        };

        let slots = (0..config.frames_in_flight)
            .map(|slot| {
                FrameResources::create(
                    &mut backend,
                    &layouts,
                    slot,
                    &grid,
                    &shared,
                    config.debug_line_budget_bytes,
                )
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let material_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Material Sampler".into()),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
            compare: None,
        })?;

        Ok(Self {
            frames,
            lines: LineBatch::with_budget(config.debug_line_budget_bytes),
            backend,
            config,
            layouts,
            pipelines,
            slots,
            grid,
            depth_texture,
            shared,
            shadow_maps,
            material_sampler,
            lights: Vec::new(),
            last_lights_dropped: 0,
            stats: FrameStats::default(),
        })
    }

    /// Acquire the next image.
    ///
    /// Returns `Ok(None)` when the frame has to be skipped: the surface was out
    /// of date or lost (size-dependent resources are rebuilt first) or the
    /// acquire timed out.
    pub fn begin_frame(&mut self) -> BackendResult<Option<Frame>> {
        self.frames.acquire(&mut self.backend)?;

        let context = match self.backend.begin_frame() {
            Ok(context) => context,
            Err(e) if e.needs_resize() => {
                let (width, height) = self.backend.surface_size();
                log::warn!("{e}; rebuilding at {width}x{height} and skipping the frame");
                self.resize(width, height)?;
                return Ok(None);
            }
            Err(BackendError::SurfaceTimeout) => {
                log::warn!("Surface acquire timed out; skipping the frame");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if (context.width, context.height) != (self.grid.width, self.grid.height) {
            self.rebuild_size_dependent(context.width, context.height)?;
        }

        let slot = self.frames.slot();
        let index = self.frames.started();
        self.stats = FrameStats {
            frame_index: index,
            slot,
            tile_count: self.grid.tile_count(),
            ..Default::default()
        };
        Ok(Some(Frame {
            context,
            slot,
            index,
        }))
    }

    /// Upload the camera block and the light set for `frame`.
    ///
    /// Lights past [`MAX_LIGHTS`](crate::MAX_LIGHTS) are dropped with a
    /// warning whenever the dropped amount changes.
    pub fn update_uniforms(&mut self, frame: &Frame, camera: &Camera, lights: &LightSet, time: f32) {
        let packed = lights.pack();
        if packed.dropped != self.last_lights_dropped && packed.dropped > 0 {
            log::warn!(
                "Light set has {} lights; dropping {} past the cap of {}",
                lights.len(),
                packed.dropped,
                crate::MAX_LIGHTS
            );
        }

        let mut camera = camera.clone();
        camera.set_aspect(self.grid.width as f32, self.grid.height as f32);
        let uniforms = FrameUniforms::new(
            &camera,
            &lights.ambient,
            packed.lights.len() as u32,
            &self.grid,
            time,
        );

        let resources = &self.slots[frame.slot];
        self.backend
            .write_buffer(resources.frame_uniforms, 0, bytemuck::bytes_of(&uniforms));
        if !packed.lights.is_empty() {
            self.backend
                .write_buffer(resources.lights, 0, bytemuck::cast_slice(&packed.lights));
        }

        let previous_line_drops = self.lines.dropped();
        self.lines.clear();
        self.lines.lights(lights);
        if self.lines.dropped() != previous_line_drops && self.lines.dropped() > 0 {
            log::warn!(
                "Light wireframes exceed the {}-vertex budget; dropping {} vertices",
                self.lines.capacity(),
                self.lines.dropped()
            );
        }

        self.stats.lights_uploaded = packed.lights.len();
        self.stats.lights_dropped = packed.dropped;
        self.stats.line_vertices = self.lines.vertices().len();
        self.stats.line_vertices_dropped = self.lines.dropped();
        self.lights = packed.lights;
        self.last_lights_dropped = packed.dropped;
    }

    /// Record the whole frame: pre-pass, culling, shadows, shading, overlays.
    pub fn draw_scene(
        &mut self,
        frame: &Frame,
        draws: &[MeshDraw],
        settings: &DebugSettings,
    ) -> BackendResult<()> {
        let slot = frame.slot;
        self.slots[slot].ensure_object_capacity(&mut self.backend, &self.layouts, draws.len())?;
        let resources = &self.slots[slot];

        let mut items = Vec::with_capacity(draws.len());
        let mut scene_bounds: Option<Aabb> = None;
        for (i, draw) in draws.iter().enumerate() {
            let offset = i as u64 * UNIFORM_STRIDE;
            let object = ObjectUniforms::from_model(draw.transform);
            self.backend
                .write_buffer(resources.objects, offset, bytemuck::bytes_of(&object));

            if let Some(bounds) = draw.mesh.bounds {
                let world = bounds.transformed(&draw.transform);
                scene_bounds = Some(match scene_bounds {
                    Some(total) => total.union(&world),
                    None => world,
                });
            }

            items.push(DrawItem {
                vertex_buffer: draw.mesh.vertex_buffer,
                index_buffer: draw.mesh.index_buffer,
                index_count: draw.mesh.index_count,
                index_format: draw.mesh.index_format,
                material: draw.material.bind_group,
                object_offset: offset as u32,
            });
        }

        let plan = ShadowPlan::build(
            &self.lights,
            scene_bounds,
            self.config.shadow_fallback_radius,
            settings,
        );
        self.backend
            .write_buffer(resources.shadow_uniforms, 0, bytemuck::bytes_of(&plan.uniforms));
        for (i, view) in plan.views.iter().enumerate() {
            self.backend.write_buffer(
                resources.casters,
                i as u64 * UNIFORM_STRIDE,
                bytemuck::bytes_of(&view.view_proj),
            );
        }

        let line_vertex_count = if settings.show_light_wireframes {
            let bytes = self.lines.bytes();
            if !bytes.is_empty() {
                self.backend.write_buffer(resources.line_vertices, 0, bytes);
            }
            self.lines.vertices().len() as u32
        } else {
            0
        };

        let graph = build_frame_graph(&self.pipelines, settings, line_vertex_count)?;
        let schedule = graph.compile();
        let packet = FramePacket {
            settings,
            draws: &items,
            bindings: resources.bindings,
            targets: FrameTargets {
                color: frame.context.swapchain_view,
                depth: self.shared.depth,
                directional_shadow: self.shared.directional_shadow,
                spot_shadows: self.shared.spot_shadows,
            },
            shadow_views: &plan.views,
            grid: self.grid,
            line_vertex_count,
            clear_color: self.config.clear_color,
        };

        log::trace!(
            "Frame {}: {} draws, {} passes, {} shadow views",
            frame.index,
            items.len(),
            schedule.len(),
            plan.views.len()
        );
        render_graph::execute(&graph, &schedule, &mut self.backend, &packet);

        self.stats.spot_shadows = plan.uniforms.spot_count as usize;
        Ok(())
    }

    /// Submit and present `frame`, then advance to the next slot.
    ///
    /// The slot is retired as soon as the work is queued, so a failed present
    /// still leaves its fence for the next frame in that slot to wait on.
    pub fn end_frame(&mut self, frame: Frame) -> BackendResult<()> {
        let submission = self.backend.end_frame()?;
        self.frames.retire(submission.fence);
        match submission.presented {
            Ok(()) => Ok(()),
            Err(e) if e.needs_resize() => {
                log::warn!("{e} while presenting frame {}", frame.index);
                let (width, height) = self.backend.surface_size();
                self.resize(width, height)
            }
            Err(e) => Err(e),
        }
    }

    /// Resize the surface and every size-dependent resource.
    ///
    /// A zero extent (minimized window) is ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        self.backend.resize(width, height);
        let (width, height) = self.backend.surface_size();
        self.rebuild_size_dependent(width, height)
    }

    fn rebuild_size_dependent(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.frames.drain(&mut self.backend)?;

        self.backend.destroy_texture_view(self.shared.depth);
        self.backend.destroy_texture(self.depth_texture);
        self.depth_texture = self
            .backend
            .create_texture(&depth_descriptor("Scene Depth".into(), width, height))?;
        self.shared.depth = self.backend.create_texture_view(self.depth_texture)?;

        self.grid = TileGrid::new(width, height);
        for resources in &mut self.slots {
            resources.resize_tiles(&mut self.backend, &self.layouts, &self.grid, &self.shared)?;
        }

        log::debug!(
            "Rebuilt size-dependent resources at {width}x{height} ({}x{} tiles)",
            self.grid.tiles_x,
            self.grid.tiles_y
        );
        Ok(())
    }

    /// Upload a mesh with its local bounds
    pub fn upload_mesh(&mut self, mesh: &Mesh) -> BackendResult<GpuMesh> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(BackendError::BufferCreationFailed(format!(
                "mesh '{}' has no geometry",
                mesh.name
            )));
        }
        let vertex_buffer = self.backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", mesh.name)),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = self.backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", mesh.name)),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            mesh.index_bytes(),
        )?;

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
            index_format: IndexFormat::Uint32,
            bounds: mesh.bounds(),
        })
    }

    /// Upload a material, substituting 1x1 defaults for missing textures
    pub fn create_material(&mut self, material: &Material) -> BackendResult<GpuMaterial> {
        let uniforms = material.uniforms();
        let uniform_buffer = self.backend.create_buffer_init(
            &BufferDescriptor::uniform(
                &format!("{} material", material.name),
                std::mem::size_of_val(&uniforms) as u64,
            ),
            bytemuck::bytes_of(&uniforms),
        )?;

        let mut textures = Vec::with_capacity(MaterialSlot::ALL.len());
        let mut entries = vec![(
            0,
            BindGroupEntry::Buffer {
                buffer: uniform_buffer,
                offset: 0,
                size: None,
            },
        )];
        for slot in MaterialSlot::ALL {
            let (texture, view) = match material.texture(slot) {
                Some(data) => data.upload(&mut self.backend)?,
                None => slot.fallback().upload(&mut self.backend)?,
            };
            textures.push(texture);
            entries.push((slot.binding(), BindGroupEntry::Texture(view)));
        }
        entries.push((5, BindGroupEntry::Sampler(self.material_sampler)));

        let bind_group = self.backend.create_bind_group(self.layouts.material, &entries)?;
        Ok(GpuMaterial {
            bind_group,
            uniform_buffer,
            textures,
        })
    }

    /// Copy the tile lists of the most recently submitted frame back to the CPU
    pub fn read_tile_lights(&mut self) -> BackendResult<Vec<TileLightList>> {
        let slots = self.slots.len();
        let slot = (self.frames.slot() + slots - 1) % slots;
        let bytes = self
            .backend
            .read_buffer(self.slots[slot].tiles, 0, self.grid.buffer_size())?;
        Ok(TileLightList::decode_all(&bytes))
    }

    /// Block until the GPU has finished every submitted frame
    pub fn wait_idle(&mut self) -> BackendResult<()> {
        self.frames.drain(&mut self.backend)
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameSlots {
        &self.frames
    }

    /// Per-slot resources, for inspecting uploads
    pub fn slot_resources(&self, slot: usize) -> Option<&FrameResources> {
        self.slots.get(slot)
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GraphicsBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.frames.drain(&mut self.backend) {
            log::error!("Failed to drain frames on shutdown: {e}");
        }
        self.release_resources();
    }
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Destroy every buffer, texture, view and bind group the renderer owns
    fn release_resources(&mut self) {
        for resources in &self.slots {
            resources.release(&mut self.backend);
        }

        let shadow_views = std::iter::once(self.shadow_maps.directional).chain(self.shadow_maps.spots);
        for view in shadow_views.chain([self.shared.depth]) {
            self.backend.destroy_texture_view(view);
        }
        for texture in self.shadow_maps.textures.iter().chain([&self.depth_texture]) {
            self.backend.destroy_texture(*texture);
        }
        log::debug!("Released renderer resources on {}", self.backend.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn teardown_releases_everything_it_owns() {
        let mut renderer = Renderer::new(RecordingBackend::new(96, 64), RendererConfig::default()).unwrap();
        let backend = renderer.backend();
        assert!(backend.buffer_count() > 0 && backend.bind_group_count() > 0);
        assert_eq!(backend.texture_count(), 1 + 1 + crate::MAX_SPOT_SHADOWS);

        renderer.release_resources();
        let backend = renderer.backend();
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(backend.texture_count(), 0);
        assert_eq!(backend.view_count(), 0);
        assert_eq!(backend.bind_group_count(), 0);
    }
}
