//! Light culling compute pass for Forward+
//!
//! One 16x16 workgroup per tile. The workgroup reduces the tile's depth
//! range, builds four side planes from the tile corners unprojected through
//! the inverse projection, then tests every light's bounding sphere against
//! the slice. Directional lights are always kept. Each tile record ends with
//! at most [`MAX_LIGHTS_PER_TILE`](crate::MAX_LIGHTS_PER_TILE) indices.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, FRAME_STRUCT, LIGHT_STRUCT, TILE_STRUCT};
use crate::pipeline::BindGroupLayouts;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

pub const CULL_ENTRY: &str = "cs_cull";
pub const CLEAR_ENTRY: &str = "cs_clear";

/// Threads per workgroup of the clear entry point
const CLEAR_GROUP_SIZE: u32 = 64;

/// Light culling compute pass
pub struct LightCullingPass {
    cull: ComputePipelineHandle,
    clear: ComputePipelineHandle,
    disabled: bool,
}

impl LightCullingPass {
    /// With `disabled` set the pass zeroes every tile count instead of culling
    pub fn new(cull: ComputePipelineHandle, clear: ComputePipelineHandle, disabled: bool) -> Self {
        Self {
            cull,
            clear,
            disabled,
        }
    }
}

impl RenderPass for LightCullingPass {
    fn name(&self) -> &str {
        "Light Culling"
    }

    fn declare(&self, io: &mut PassIo) {
        let cs = ShaderStageFlags::COMPUTE;
        io.read(DEPTH, ResourceUsage::TextureRead(cs));
        io.read(FRAME_UNIFORMS, ResourceUsage::UniformBuffer(cs));
        io.read(LIGHTS, ResourceUsage::StorageBufferRead(cs));
        io.write(TILES, ResourceUsage::StorageBufferWrite(cs));
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        let grid = frame.grid;
        let backend = &mut *ctx.backend;

        backend.begin_compute_pass(Some("Light Culling"));
        if self.disabled {
            backend.set_compute_pipeline(self.clear);
            backend.set_bind_group(0, frame.bindings.culling, &[]);
            backend.dispatch_compute(grid.tile_count().div_ceil(CLEAR_GROUP_SIZE), 1, 1);
        } else {
            backend.set_compute_pipeline(self.cull);
            backend.set_bind_group(0, frame.bindings.culling, &[]);
            backend.dispatch_compute(grid.tiles_x, grid.tiles_y, 1);
        }
        backend.end_compute_pass();
    }
}

pub fn pipeline_descriptor(layouts: &BindGroupLayouts, entry_point: &str) -> ComputePipelineDescriptor {
    ComputePipelineDescriptor {
        label: Some(format!("Light Culling ({entry_point})")),
        shader: shader_source(),
        entry_point: entry_point.to_string(),
        bind_group_layouts: vec![layouts.culling],
    }
}

pub fn shader_source() -> String {
    wgsl::compose(&[FRAME_STRUCT, LIGHT_STRUCT, TILE_STRUCT, LIGHT_CULLING_SHADER])
}

pub const LIGHT_CULLING_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(0) @binding(1) var<storage, read> lights: array<Light>;
@group(0) @binding(2) var<storage, read_write> tiles: array<TileLights>;
@group(0) @binding(3) var depth_texture: texture_depth_2d;

var<workgroup> tile_min_depth: atomic<u32>;
var<workgroup> tile_max_depth: atomic<u32>;
var<workgroup> visible_count: atomic<u32>;
var<workgroup> visible_indices: array<u32, 256>;

fn view_point(ndc: vec3<f32>) -> vec3<f32> {
    let p = frame.inv_proj * vec4<f32>(ndc, 1.0);
    return p.xyz / p.w;
}

// Bounding sphere of a light in view space, xyz centre and w radius
fn bounding_sphere(light: Light) -> vec4<f32> {
    let position = (frame.view * vec4<f32>(light.position_type.xyz, 1.0)).xyz;
    let radius = light.direction_radius.w;
    if light_type(light) != LIGHT_SPOT {
        return vec4<f32>(position, radius);
    }

    let direction = normalize((frame.view * vec4<f32>(light.direction_radius.xyz, 0.0)).xyz);
    let cos_outer = light.cone.y;
    if cos_outer <= 0.0 {
        return vec4<f32>(position, radius);
    }
    if cos_outer < 0.70710678 {
        let sin_outer = sqrt(max(1.0 - cos_outer * cos_outer, 0.0));
        return vec4<f32>(position + direction * radius * cos_outer, radius * sin_outer);
    }
    let half_extent = radius / (2.0 * cos_outer);
    return vec4<f32>(position + direction * half_extent, half_extent);
}

@compute @workgroup_size(16, 16, 1)
fn cs_cull(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(local_invocation_index) local_index: u32,
    @builtin(workgroup_id) group_id: vec3<u32>,
) {
    let tile = group_id.xy;
    let tile_index = tile.y * frame.tile_count_x + tile.x;

    if local_index == 0u {
        // bit pattern of 1.0
        atomicStore(&tile_min_depth, 0x3f800000u);
        atomicStore(&tile_max_depth, 0u);
        atomicStore(&visible_count, 0u);
    }
    workgroupBarrier();

    // Depth is non-negative, so its bit pattern orders like the float
    let pixel = tile * frame.tile_size + local_id.xy;
    if pixel.x < frame.screen_width && pixel.y < frame.screen_height {
        let depth = textureLoad(depth_texture, vec2<i32>(pixel), 0);
        let bits = bitcast<u32>(clamp(depth, 0.0, 1.0));
        atomicMin(&tile_min_depth, bits);
        atomicMax(&tile_max_depth, bits);
    }
    workgroupBarrier();

    let min_depth = bitcast<f32>(atomicLoad(&tile_min_depth));
    let max_depth = bitcast<f32>(atomicLoad(&tile_max_depth));
    let near_distance = -view_point(vec3<f32>(0.0, 0.0, min_depth)).z;
    let far_distance = -view_point(vec3<f32>(0.0, 0.0, max_depth)).z;

    let screen = vec2<f32>(f32(frame.screen_width), f32(frame.screen_height));
    let pixel_min = vec2<f32>(tile * frame.tile_size);
    let pixel_max = min(pixel_min + f32(frame.tile_size), screen);
    let ndc_left = pixel_min.x / screen.x * 2.0 - 1.0;
    let ndc_right = pixel_max.x / screen.x * 2.0 - 1.0;
    let ndc_top = 1.0 - pixel_min.y / screen.y * 2.0;
    let ndc_bottom = 1.0 - pixel_max.y / screen.y * 2.0;

    let top_left = view_point(vec3<f32>(ndc_left, ndc_top, 1.0));
    let top_right = view_point(vec3<f32>(ndc_right, ndc_top, 1.0));
    let bottom_left = view_point(vec3<f32>(ndc_left, ndc_bottom, 1.0));
    let bottom_right = view_point(vec3<f32>(ndc_right, ndc_bottom, 1.0));

    // Inward normals of the side planes, all through the eye
    var planes: array<vec3<f32>, 4>;
    planes[0] = normalize(cross(bottom_left, top_left));
    planes[1] = normalize(cross(top_right, bottom_right));
    planes[2] = normalize(cross(top_left, top_right));
    planes[3] = normalize(cross(bottom_right, bottom_left));

    for (var i = local_index; i < frame.light_count; i = i + 256u) {
        let light = lights[i];
        var visible = true;
        if light_type(light) != LIGHT_DIRECTIONAL {
            let sphere = bounding_sphere(light);
            let distance = -sphere.z;
            visible = distance + sphere.w >= near_distance && distance - sphere.w <= far_distance;
            for (var p = 0u; p < 4u; p = p + 1u) {
                visible = visible && dot(planes[p], sphere.xyz) >= -sphere.w;
            }
        }
        if visible {
            let slot = atomicAdd(&visible_count, 1u);
            if slot < MAX_LIGHTS_PER_TILE {
                visible_indices[slot] = i;
            }
        }
    }
    workgroupBarrier();

    let count = min(atomicLoad(&visible_count), MAX_LIGHTS_PER_TILE);
    for (var i = local_index; i < count; i = i + 256u) {
        tiles[tile_index].indices[i] = visible_indices[i];
    }
    if local_index == 0u {
        tiles[tile_index].count = count;
    }
}

@compute @workgroup_size(64, 1, 1)
fn cs_clear(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x < frame.tile_count_x * frame.tile_count_y {
        tiles[id.x].count = 0u;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates_both_entry_points() {
        validate_wgsl(
            "light_culling",
            &shader_source(),
            &[
                (CULL_ENTRY, ShaderStage::Compute),
                (CLEAR_ENTRY, ShaderStage::Compute),
            ],
        )
        .unwrap();
    }
}
