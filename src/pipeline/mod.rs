//! Forward+ frame pipeline
//!
//! Every frame is described as a render graph of these passes:
//! 1. Depth pre-pass - opaque depth only, or just a clear when skipped
//! 2. Light culling - one compute workgroup per tile writes the tile light lists
//! 3. Shadow pass - light's-eye depth for the directional map and up to four spot maps
//! 4. Shading pass - PBR over each fragment's tile list, shadowed and tone mapped
//! 5. Heatmap and light wireframes - optional overlays
//!
//! Passes only hold pipeline handles. Everything that changes per frame
//! travels in a [`FramePacket`].

pub mod debug_line_pass;
pub mod depth_prepass;
pub mod heatmap;
pub mod light_culling;
pub mod shading_pass;
pub mod shadow_pass;
pub mod wgsl;

pub use debug_line_pass::DebugLinePass;
pub use depth_prepass::DepthPrepass;
pub use heatmap::HeatmapPass;
pub use light_culling::LightCullingPass;
pub use shading_pass::ShadingPass;
pub use shadow_pass::ShadowPass;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::debug::DebugSettings;
use crate::render_graph::RenderGraph;
use crate::shadow::ShadowView;
use crate::tiling::TileGrid;
use crate::MAX_SPOT_SHADOWS;
use std::collections::HashMap;

/// Depth format shared by the scene depth buffer and every shadow map
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Stride between per-draw and per-shadow-view uniform blocks
pub const UNIFORM_STRIDE: u64 = 256;

/// Names the graph uses for the resources passes share
pub mod resource_names {
    pub const FRAME_UNIFORMS: &str = "frame_uniforms";
    pub const LIGHTS: &str = "lights";
    pub const TILES: &str = "tiles";
    pub const DEPTH: &str = "depth";
    pub const SHADOW_MAPS: &str = "shadow_maps";
    pub const COLOR: &str = "color";
}

/// One opaque draw as the passes see it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub index_format: IndexFormat,
    pub material: BindGroupHandle,
    /// Dynamic offset of this draw's [`ObjectUniforms`](crate::scene::ObjectUniforms)
    pub object_offset: u32,
}

impl DrawItem {
    pub(crate) fn record(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_vertex_buffer(0, self.vertex_buffer, 0);
        backend.set_index_buffer(self.index_buffer, 0, self.index_format);
        backend.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Bind groups of the active flight slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBindings {
    /// Frame uniforms only; pre-pass and debug lines
    pub camera: BindGroupHandle,
    /// Culling inputs and the writable tile buffer
    pub culling: BindGroupHandle,
    /// Frame, lights, tiles, shadow block and shadow maps for shading and heatmap
    pub view: BindGroupHandle,
    /// Per-draw object uniforms, dynamic offset
    pub objects: BindGroupHandle,
    /// Per-shadow-view light matrices, dynamic offset
    pub casters: BindGroupHandle,
    pub line_vertices: BufferHandle,
}

/// Attachments for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTargets {
    pub color: TextureViewHandle,
    pub depth: TextureViewHandle,
    pub directional_shadow: TextureViewHandle,
    pub spot_shadows: [TextureViewHandle; MAX_SPOT_SHADOWS],
}

/// Everything passes read while recording one frame
pub struct FramePacket<'a> {
    pub settings: &'a DebugSettings,
    pub draws: &'a [DrawItem],
    pub bindings: FrameBindings,
    pub targets: FrameTargets,
    pub shadow_views: &'a [ShadowView],
    pub grid: TileGrid,
    pub line_vertex_count: u32,
    pub clear_color: [f32; 4],
}

/// Layouts every pipeline is built from
#[derive(Debug, Clone, Copy)]
pub struct BindGroupLayouts {
    pub camera: BindGroupLayoutHandle,
    pub culling: BindGroupLayoutHandle,
    pub view: BindGroupLayoutHandle,
    pub object: BindGroupLayoutHandle,
    pub caster: BindGroupLayoutHandle,
    pub material: BindGroupLayoutHandle,
}

fn uniform(binding: u32, visibility: ShaderStageFlags, dynamic: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::UniformBuffer {
            has_dynamic_offset: dynamic,
        },
    }
}

fn storage(binding: u32, visibility: ShaderStageFlags, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::StorageBuffer { read_only },
    }
}

fn texture(binding: u32, visibility: ShaderStageFlags, sample_type: TextureSampleType) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Texture { sample_type },
    }
}

fn sampler(binding: u32, visibility: ShaderStageFlags, comparison: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Sampler { comparison },
    }
}

impl BindGroupLayouts {
    pub fn create(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let vf = ShaderStageFlags::VERTEX_FRAGMENT;
        let cs = ShaderStageFlags::COMPUTE;
        let fs = ShaderStageFlags::FRAGMENT;

        let camera = backend.create_bind_group_layout(&[uniform(0, vf, false)])?;

        let culling = backend.create_bind_group_layout(&[
            uniform(0, cs, false),
            storage(1, cs, true),
            storage(2, cs, false),
            texture(3, cs, TextureSampleType::Depth),
        ])?;

        let mut view_entries = vec![
            uniform(0, vf, false),
            storage(1, fs, true),
            storage(2, fs, true),
            uniform(3, fs, false),
            texture(4, fs, TextureSampleType::Depth),
        ];
        for slot in 0..MAX_SPOT_SHADOWS as u32 {
            view_entries.push(texture(5 + slot, fs, TextureSampleType::Depth));
        }
        view_entries.push(sampler(9, fs, true));
        let view = backend.create_bind_group_layout(&view_entries)?;

        let object = backend.create_bind_group_layout(&[uniform(0, ShaderStageFlags::VERTEX, true)])?;
        let caster = backend.create_bind_group_layout(&[uniform(0, ShaderStageFlags::VERTEX, true)])?;

        let filterable = TextureSampleType::Float { filterable: true };
        let material = backend.create_bind_group_layout(&[
            uniform(0, fs, false),
            texture(1, fs, filterable),
            texture(2, fs, filterable),
            texture(3, fs, filterable),
            texture(4, fs, filterable),
            sampler(5, fs, false),
        ])?;

        Ok(Self {
            camera,
            culling,
            view,
            object,
            caster,
            material,
        })
    }
}

/// Rasterizer state driven by the debug toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl RasterState {
    pub fn from_settings(settings: &DebugSettings) -> Self {
        Self {
            cull_mode: settings.cull_mode(),
            front_face: settings.front_face,
        }
    }

    /// Every state the debug toggles can select
    pub fn all() -> impl Iterator<Item = RasterState> {
        [CullMode::Back, CullMode::None].into_iter().flat_map(|cull_mode| {
            [FrontFace::Ccw, FrontFace::Cw]
                .into_iter()
                .map(move |front_face| RasterState {
                    cull_mode,
                    front_face,
                })
        })
    }
}

/// Every pipeline the frame needs, created up front.
///
/// wgpu bakes culling and winding into the pipeline, so the pre-pass and
/// shading pipelines exist once per [`RasterState`]; shading also has a
/// depth-writing variant for frames that skip the pre-pass.
#[derive(Debug, Clone)]
pub struct Pipelines {
    prepass: HashMap<RasterState, RenderPipelineHandle>,
    shading: HashMap<(RasterState, bool), RenderPipelineHandle>,
    pub shadow: RenderPipelineHandle,
    pub cull: ComputePipelineHandle,
    pub clear_tiles: ComputePipelineHandle,
    pub heatmap: RenderPipelineHandle,
    pub debug_lines: RenderPipelineHandle,
}

impl Pipelines {
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        color_format: TextureFormat,
    ) -> BackendResult<Self> {
        let mut prepass = HashMap::new();
        let mut shading = HashMap::new();
        for state in RasterState::all() {
            let pipeline =
                backend.create_render_pipeline(&depth_prepass::pipeline_descriptor(layouts, state))?;
            prepass.insert(state, pipeline);

            for depth_write in [false, true] {
                let desc = shading_pass::pipeline_descriptor(layouts, state, depth_write, color_format);
                shading.insert((state, depth_write), backend.create_render_pipeline(&desc)?);
            }
        }

        let shadow = backend.create_render_pipeline(&shadow_pass::pipeline_descriptor(layouts))?;
        let cull = backend.create_compute_pipeline(&light_culling::pipeline_descriptor(
            layouts,
            light_culling::CULL_ENTRY,
        ))?;
        let clear_tiles = backend.create_compute_pipeline(&light_culling::pipeline_descriptor(
            layouts,
            light_culling::CLEAR_ENTRY,
        ))?;
        let heatmap =
            backend.create_render_pipeline(&heatmap::pipeline_descriptor(layouts, color_format))?;
        let debug_lines = backend
            .create_render_pipeline(&debug_line_pass::pipeline_descriptor(layouts, color_format))?;

        log::debug!(
            "Created {} pre-pass and {} shading pipeline variants",
            prepass.len(),
            shading.len()
        );

        Ok(Self {
            prepass,
            shading,
            shadow,
            cull,
            clear_tiles,
            heatmap,
            debug_lines,
        })
    }

    pub fn prepass(&self, state: RasterState) -> Option<RenderPipelineHandle> {
        self.prepass.get(&state).copied()
    }

    pub fn shading(&self, state: RasterState, depth_write: bool) -> Option<RenderPipelineHandle> {
        self.shading.get(&(state, depth_write)).copied()
    }
}

/// Assemble this frame's graph from the debug toggles
pub fn build_frame_graph(
    pipelines: &Pipelines,
    settings: &DebugSettings,
    line_vertex_count: u32,
) -> BackendResult<RenderGraph> {
    let state = RasterState::from_settings(settings);
    let missing = || BackendError::PipelineCreationFailed(format!("no pipeline for {state:?}"));

    let prepass = if settings.skip_depth_prepass {
        None
    } else {
        Some(pipelines.prepass(state).ok_or_else(missing)?)
    };
    let shading = pipelines
        .shading(state, settings.skip_depth_prepass)
        .ok_or_else(missing)?;

    let mut graph = RenderGraph::new()
        .with(DepthPrepass::new(prepass))
        .with(LightCullingPass::new(
            pipelines.cull,
            pipelines.clear_tiles,
            settings.disable_light_culling,
        ))
        .with(ShadowPass::new(pipelines.shadow))
        .with(ShadingPass::new(shading, settings.skip_depth_prepass));

    if settings.show_heatmap {
        graph.add(HeatmapPass::new(pipelines.heatmap));
    }
    if settings.show_light_wireframes && line_vertex_count > 0 {
        graph.add(DebugLinePass::new(pipelines.debug_lines));
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_states_cover_all_toggles() {
        let states: Vec<_> = RasterState::all().collect();
        assert_eq!(states.len(), 4);
        for disable in [false, true] {
            for front_face in [FrontFace::Ccw, FrontFace::Cw] {
                let settings = DebugSettings {
                    disable_backface_culling: disable,
                    front_face,
                    ..Default::default()
                };
                assert!(states.contains(&RasterState::from_settings(&settings)));
            }
        }
    }
}
