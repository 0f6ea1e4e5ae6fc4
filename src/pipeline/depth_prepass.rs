//! Depth pre-pass for Forward+ rendering

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, FRAME_STRUCT, OBJECT_STRUCT};
use crate::pipeline::{BindGroupLayouts, RasterState, DEPTH_FORMAT};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Depth pre-pass
///
/// Always clears the depth buffer. With no pipeline (pre-pass skipped) that
/// clear is all it records, leaving depth at the far plane for culling.
pub struct DepthPrepass {
    pipeline: Option<RenderPipelineHandle>,
}

impl DepthPrepass {
    pub fn new(pipeline: Option<RenderPipelineHandle>) -> Self {
        Self { pipeline }
    }
}

impl RenderPass for DepthPrepass {
    fn name(&self) -> &str {
        "Depth Prepass"
    }

    fn declare(&self, io: &mut PassIo) {
        io.read(FRAME_UNIFORMS, ResourceUsage::UniformBuffer(ShaderStageFlags::VERTEX));
        io.write(DEPTH, ResourceUsage::DepthStencilWrite);
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        let backend = &mut *ctx.backend;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Depth Prepass".into()),
            color_attachments: vec![],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: frame.targets.depth,
                depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });

        if let Some(pipeline) = self.pipeline {
            backend.set_render_pipeline(pipeline);
            backend.set_bind_group(0, frame.bindings.camera, &[]);
            for draw in frame.draws {
                backend.set_bind_group(1, frame.bindings.objects, &[draw.object_offset]);
                draw.record(backend);
            }
        }

        backend.end_render_pass();
    }
}

pub fn pipeline_descriptor(layouts: &BindGroupLayouts, state: RasterState) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some(format!(
            "Depth Prepass ({:?}, {:?})",
            state.cull_mode, state.front_face
        )),
        shader: shader_source(),
        has_fragment: false,
        vertex_layouts: vec![Vertex::position_only_layout()],
        bind_group_layouts: vec![layouts.camera, layouts.object],
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: state.front_face,
        cull_mode: state.cull_mode,
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
        }),
        color_targets: vec![],
    }
}

pub fn shader_source() -> String {
    wgsl::compose(&[FRAME_STRUCT, OBJECT_STRUCT, DEPTH_PREPASS_SHADER])
}

pub const DEPTH_PREPASS_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let world = object.model * vec4<f32>(position, 1.0);
    return frame.proj * frame.view * world;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates() {
        validate_wgsl("depth_prepass", &shader_source(), &[("vs_main", ShaderStage::Vertex)])
            .unwrap();
    }
}
