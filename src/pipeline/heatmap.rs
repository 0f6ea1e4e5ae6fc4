//! Tile light-count heatmap overlay
//!
//! A full-screen triangle blended over the shaded image. Each pixel takes
//! its tile's count and maps `count / HEATMAP_MAX_LIGHTS` onto a
//! black-blue-green-yellow-red ramp.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, FRAME_STRUCT, TILE_STRUCT};
use crate::pipeline::BindGroupLayouts;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::HEATMAP_MAX_LIGHTS;

/// Overlay opacity
pub const HEATMAP_ALPHA: f32 = 0.4;

pub struct HeatmapPass {
    pipeline: RenderPipelineHandle,
}

impl HeatmapPass {
    pub fn new(pipeline: RenderPipelineHandle) -> Self {
        Self { pipeline }
    }
}

impl RenderPass for HeatmapPass {
    fn name(&self) -> &str {
        "Tile Heatmap"
    }

    fn declare(&self, io: &mut PassIo) {
        io.read(TILES, ResourceUsage::StorageBufferRead(ShaderStageFlags::FRAGMENT));
        io.write(COLOR, ResourceUsage::RenderTarget);
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        let backend = &mut *ctx.backend;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Tile Heatmap".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.targets.color,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, frame.bindings.view, &[]);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
    }
}

pub fn pipeline_descriptor(layouts: &BindGroupLayouts, color_format: TextureFormat) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some("Tile Heatmap".into()),
        shader: shader_source(),
        has_fragment: true,
        vertex_layouts: vec![],
        bind_group_layouts: vec![layouts.view],
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: FrontFace::Ccw,
        cull_mode: CullMode::None,
        depth_stencil: None,
        color_targets: vec![ColorTargetState {
            format: color_format,
            blend: Some(BlendMode::Alpha),
            write_mask: ColorWrites::ALL,
        }],
    }
}

pub fn shader_source() -> String {
    let constants = format!(
        "\nconst HEATMAP_MAX_LIGHTS: f32 = {HEATMAP_MAX_LIGHTS}.0;\nconst HEATMAP_ALPHA: f32 = {HEATMAP_ALPHA:?};\n"
    );
    wgsl::compose(&[FRAME_STRUCT, TILE_STRUCT, &constants, HEATMAP_SHADER])
}

pub const HEATMAP_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(0) @binding(2) var<storage, read> tiles: array<TileLights>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((vertex_index << 1u) & 2u), f32(vertex_index & 2u));
    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}

fn ramp(t: f32) -> vec3<f32> {
    let black = vec3<f32>(0.0, 0.0, 0.0);
    let blue = vec3<f32>(0.0, 0.0, 1.0);
    let green = vec3<f32>(0.0, 1.0, 0.0);
    let yellow = vec3<f32>(1.0, 1.0, 0.0);
    let red = vec3<f32>(1.0, 0.0, 0.0);
    let s = clamp(t, 0.0, 1.0) * 4.0;
    if s < 1.0 {
        return mix(black, blue, s);
    } else if s < 2.0 {
        return mix(blue, green, s - 1.0);
    } else if s < 3.0 {
        return mix(green, yellow, s - 2.0);
    }
    return mix(yellow, red, s - 3.0);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let max_tile = vec2<u32>(frame.tile_count_x - 1u, frame.tile_count_y - 1u);
    let tile = min(vec2<u32>(in.clip_position.xy) / frame.tile_size, max_tile);
    let count = min(tiles[tile.y * frame.tile_count_x + tile.x].count, MAX_LIGHTS_PER_TILE);
    return vec4<f32>(ramp(f32(count) / HEATMAP_MAX_LIGHTS), HEATMAP_ALPHA);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates() {
        validate_wgsl(
            "heatmap",
            &shader_source(),
            &[("vs_main", ShaderStage::Vertex), ("fs_main", ShaderStage::Fragment)],
        )
        .unwrap();
    }

    #[test]
    fn constants_are_valid_wgsl_literals() {
        let source = shader_source();
        assert!(source.contains("const HEATMAP_MAX_LIGHTS: f32 = 32.0;"));
        assert!(source.contains("const HEATMAP_ALPHA: f32 = 0.4;"));
    }
}
