//! Shadow map rendering
//!
//! One depth-only render pass per [`ShadowView`](crate::shadow::ShadowView),
//! each clearing its own map. The caster bind group carries the light's
//! view-projection at a dynamic offset of `view index * UNIFORM_STRIDE`.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, OBJECT_STRUCT};
use crate::pipeline::{BindGroupLayouts, DEPTH_FORMAT, UNIFORM_STRIDE};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use crate::shadow::ShadowTarget;

pub struct ShadowPass {
    pipeline: RenderPipelineHandle,
}

impl ShadowPass {
    pub fn new(pipeline: RenderPipelineHandle) -> Self {
        Self { pipeline }
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &str {
        "Shadow Maps"
    }

    fn declare(&self, io: &mut PassIo) {
        io.write(SHADOW_MAPS, ResourceUsage::DepthStencilWrite);
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        let backend = &mut *ctx.backend;

        for (i, view) in frame.shadow_views.iter().enumerate() {
            let target = match view.target {
                ShadowTarget::Directional => frame.targets.directional_shadow,
                ShadowTarget::Spot(slot) => match frame.targets.spot_shadows.get(slot) {
                    Some(target) => *target,
                    None => {
                        log::warn!("Spot shadow slot {slot} has no map, skipping");
                        continue;
                    }
                },
            };

            log::trace!("Shadow view {i}: {:?} for light {}", view.target, view.light_index);
            backend.begin_render_pass(&RenderPassDescriptor {
                label: Some(format!("Shadow {:?}", view.target)),
                color_attachments: vec![],
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view: target,
                    depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                    depth_store_op: StoreOp::Store,
                    depth_clear_value: 1.0,
                }),
            });

            backend.set_render_pipeline(self.pipeline);
            let caster_offset = (i as u64 * UNIFORM_STRIDE) as u32;
            backend.set_bind_group(0, frame.bindings.casters, &[caster_offset]);
            for draw in frame.draws {
                backend.set_bind_group(1, frame.bindings.objects, &[draw.object_offset]);
                draw.record(backend);
            }

            backend.end_render_pass();
        }
    }
}

/// Casters render both faces so thin geometry and open meshes still occlude
pub fn pipeline_descriptor(layouts: &BindGroupLayouts) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some("Shadow Maps".into()),
        shader: shader_source(),
        has_fragment: false,
        vertex_layouts: vec![Vertex::position_only_layout()],
        bind_group_layouts: vec![layouts.caster, layouts.object],
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: FrontFace::Ccw,
        cull_mode: CullMode::None,
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
        }),
        color_targets: vec![],
    }
}

pub fn shader_source() -> String {
    wgsl::compose(&[OBJECT_STRUCT, SHADOW_PASS_SHADER])
}

pub const SHADOW_PASS_SHADER: &str = r#"
struct Caster {
    view_proj: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> caster: Caster;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return caster.view_proj * object.model * vec4<f32>(position, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates() {
        validate_wgsl("shadow_pass", &shader_source(), &[("vs_main", ShaderStage::Vertex)]).unwrap();
    }

    #[test]
    fn casters_are_double_sided() {
        // Layout handles are never dereferenced by the descriptor builder
        let layout = BindGroupLayoutHandle(0);
        let layouts = BindGroupLayouts {
            camera: layout,
            culling: layout,
            view: layout,
            object: layout,
            caster: layout,
            material: layout,
        };
        let desc = pipeline_descriptor(&layouts);
        assert_eq!(desc.cull_mode, CullMode::None);
        assert!(!desc.has_fragment);
    }
}
