//! Light wireframe overlay
//!
//! Draws the frame's [`LineBatch`](crate::debug_lines::LineBatch) as a line
//! list, depth tested against the scene without writing depth.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::debug_lines::LineVertex;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, FRAME_STRUCT};
use crate::pipeline::{BindGroupLayouts, DEPTH_FORMAT};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

pub struct DebugLinePass {
    pipeline: RenderPipelineHandle,
}

impl DebugLinePass {
    pub fn new(pipeline: RenderPipelineHandle) -> Self {
        Self { pipeline }
    }
}

impl RenderPass for DebugLinePass {
    fn name(&self) -> &str {
        "Light Wireframes"
    }

    fn declare(&self, io: &mut PassIo) {
        io.read(FRAME_UNIFORMS, ResourceUsage::UniformBuffer(ShaderStageFlags::VERTEX));
        io.read(DEPTH, ResourceUsage::DepthStencilRead);
        io.write(COLOR, ResourceUsage::RenderTarget);
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        if frame.line_vertex_count == 0 {
            return;
        }
        let backend = &mut *ctx.backend;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Light Wireframes".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.targets.color,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: frame.targets.depth,
                depth_load_op: LoadOp::Load,
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, frame.bindings.camera, &[]);
        backend.set_vertex_buffer(0, frame.bindings.line_vertices, 0);
        backend.draw(0..frame.line_vertex_count, 0..1);
        backend.end_render_pass();
    }
}

pub fn pipeline_descriptor(layouts: &BindGroupLayouts, color_format: TextureFormat) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some("Light Wireframes".into()),
        shader: shader_source(),
        has_fragment: true,
        vertex_layouts: vec![LineVertex::layout()],
        bind_group_layouts: vec![layouts.camera],
        primitive_topology: PrimitiveTopology::LineList,
        front_face: FrontFace::Ccw,
        cull_mode: CullMode::None,
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: CompareFunction::LessEqual,
        }),
        color_targets: vec![ColorTargetState {
            format: color_format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }],
    }
}

pub fn shader_source() -> String {
    wgsl::compose(&[FRAME_STRUCT, DEBUG_LINE_SHADER])
}

pub const DEBUG_LINE_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> frame: FrameUniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = frame.proj * frame.view * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates() {
        validate_wgsl(
            "debug_lines",
            &shader_source(),
            &[("vs_main", ShaderStage::Vertex), ("fs_main", ShaderStage::Fragment)],
        )
        .unwrap();
    }
}
