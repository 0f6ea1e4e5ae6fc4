//! Forward+ shading pass
//!
//! Each fragment looks up its 16x16 tile, walks that tile's light list and
//! evaluates a Cook-Torrance BRDF (GGX distribution, Smith geometry,
//! Schlick Fresnel) per light. A tile with a count of zero falls back to
//! every light in the frame. Shadowed lights are attenuated by a 3x3 PCF
//! lookup into their map. The result is Reinhard tone mapped; the sRGB
//! swapchain applies the display curve.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::resource_names::*;
use crate::pipeline::wgsl::{self, FRAME_STRUCT, LIGHT_STRUCT, OBJECT_STRUCT, SHADOW_STRUCT, TILE_STRUCT};
use crate::pipeline::{BindGroupLayouts, RasterState, DEPTH_FORMAT};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Shading pass
///
/// Tests against the pre-pass depth without writing it. When the pre-pass is
/// skipped the pass writes depth itself so overlays still have something to
/// test against.
pub struct ShadingPass {
    pipeline: RenderPipelineHandle,
    depth_writes: bool,
}

impl ShadingPass {
    pub fn new(pipeline: RenderPipelineHandle, depth_writes: bool) -> Self {
        Self {
            pipeline,
            depth_writes,
        }
    }
}

impl RenderPass for ShadingPass {
    fn name(&self) -> &str {
        "Shading"
    }

    fn declare(&self, io: &mut PassIo) {
        let fs = ShaderStageFlags::FRAGMENT;
        io.read(FRAME_UNIFORMS, ResourceUsage::UniformBuffer(ShaderStageFlags::VERTEX_FRAGMENT));
        io.read(LIGHTS, ResourceUsage::StorageBufferRead(fs));
        io.read(TILES, ResourceUsage::StorageBufferRead(fs));
        io.read(SHADOW_MAPS, ResourceUsage::TextureRead(fs));
        if self.depth_writes {
            io.write(DEPTH, ResourceUsage::DepthStencilWrite);
        } else {
            io.read(DEPTH, ResourceUsage::DepthStencilRead);
        }
        io.write(COLOR, ResourceUsage::RenderTarget);
    }

    fn record(&self, ctx: &mut PassContext) {
        let frame = ctx.frame;
        let backend = &mut *ctx.backend;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Shading".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.targets.color,
                load_op: LoadOp::Clear(frame.clear_color),
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
        backend.set_bind_group(0, frame.bindings.view, &[]);
        for draw in frame.draws {
            backend.set_bind_group(1, frame.bindings.objects, &[draw.object_offset]);
            backend.set_bind_group(2, draw.material, &[]);
            draw.record(backend);
        }

        backend.end_render_pass();
    }
}

pub fn pipeline_descriptor(
    layouts: &BindGroupLayouts,
    state: RasterState,
    depth_write: bool,
    color_format: TextureFormat,
) -> RenderPipelineDescriptor {
    RenderPipelineDescriptor {
        label: Some(format!(
            "Shading ({:?}, {:?}, depth_write={depth_write})",
            state.cull_mode, state.front_face
        )),
        shader: shader_source(),
        has_fragment: true,
        vertex_layouts: vec![Vertex::layout()],
        bind_group_layouts: vec![layouts.view, layouts.object, layouts.material],
        primitive_topology: PrimitiveTopology::TriangleList,
        front_face: state.front_face,
        cull_mode: state.cull_mode,
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
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
    wgsl::compose(&[
        FRAME_STRUCT,
        LIGHT_STRUCT,
        TILE_STRUCT,
        SHADOW_STRUCT,
        OBJECT_STRUCT,
        SHADING_SHADER,
    ])
}

pub const SHADING_SHADER: &str = r#"
const PI: f32 = 3.14159265359;
const EPSILON: f32 = 0.0001;
const DIELECTRIC_F0: f32 = 0.04;

struct MaterialUniforms {
    base_color: vec4<f32>,
    emissive: vec4<f32>,
    metallic_roughness: vec4<f32>,
}

@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(0) @binding(1) var<storage, read> lights: array<Light>;
@group(0) @binding(2) var<storage, read> tiles: array<TileLights>;
@group(0) @binding(3) var<uniform> shadow: ShadowUniforms;
@group(0) @binding(4) var directional_shadow_map: texture_depth_2d;
@group(0) @binding(5) var spot_shadow_map_0: texture_depth_2d;
@group(0) @binding(6) var spot_shadow_map_1: texture_depth_2d;
@group(0) @binding(7) var spot_shadow_map_2: texture_depth_2d;
@group(0) @binding(8) var spot_shadow_map_3: texture_depth_2d;
@group(0) @binding(9) var shadow_sampler: sampler_comparison;

@group(1) @binding(0) var<uniform> object: ObjectUniforms;

@group(2) @binding(0) var<uniform> material: MaterialUniforms;
@group(2) @binding(1) var base_color_texture: texture_2d<f32>;
@group(2) @binding(2) var metallic_roughness_texture: texture_2d<f32>;
@group(2) @binding(3) var normal_texture: texture_2d<f32>;
@group(2) @binding(4) var emissive_texture: texture_2d<f32>;
@group(2) @binding(5) var material_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) world_tangent: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = object.model * vec4<f32>(in.position, 1.0);
    var out: VertexOutput;
    out.clip_position = frame.proj * frame.view * world;
    out.world_position = world.xyz;
    out.world_normal = (object.normal_matrix * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv;
    out.world_tangent = vec4<f32>((object.model * vec4<f32>(in.tangent.xyz, 0.0)).xyz, in.tangent.w);
    return out;
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

fn geometry_schlick_ggx(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot_x / (n_dot_x * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

// Outgoing radiance per unit incoming radiance, cosine included
fn brdf(n: vec3<f32>, v: vec3<f32>, l: vec3<f32>, albedo: vec3<f32>, metallic: f32, roughness: f32) -> vec3<f32> {
    let h = normalize(v + l);
    let n_dot_l = max(dot(n, l), 0.0);
    let n_dot_v = max(dot(n, v), 0.0);
    let n_dot_h = max(dot(n, h), 0.0);
    let v_dot_h = max(dot(v, h), 0.0);

    let f0 = mix(vec3<f32>(DIELECTRIC_F0), albedo, metallic);
    let d = distribution_ggx(n_dot_h, roughness);
    let g = geometry_smith(n_dot_v, n_dot_l, roughness);
    let f = fresnel_schlick(v_dot_h, f0);

    let specular = d * g * f / (4.0 * n_dot_v * n_dot_l + EPSILON);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metallic);
    return (kd * albedo / PI + specular) * n_dot_l;
}

fn distance_falloff(distance: f32, radius: f32) -> f32 {
    let ratio = distance / max(radius, EPSILON);
    let window = clamp(1.0 - ratio * ratio * ratio * ratio, 0.0, 1.0);
    return window * window / (distance * distance + 1.0);
}

fn cone_falloff(cos_angle: f32, cos_inner: f32, cos_outer: f32) -> f32 {
    let t = clamp((cos_angle - cos_outer) / max(cos_inner - cos_outer, EPSILON), 0.0, 1.0);
    return t * t * (3.0 - 2.0 * t);
}

fn pcf(map: texture_depth_2d, view_proj: mat4x4<f32>, world_position: vec3<f32>) -> f32 {
    let clip = view_proj * vec4<f32>(world_position, 1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5);
    if any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z < 0.0 || ndc.z > 1.0 {
        return 1.0;
    }

    let texel = 1.0 / vec2<f32>(textureDimensions(map));
    let reference = ndc.z - shadow.bias;
    var lit = 0.0;
    for (var y = -1; y <= 1; y = y + 1) {
        for (var x = -1; x <= 1; x = x + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit = lit + textureSampleCompareLevel(map, shadow_sampler, uv + offset, reference);
        }
    }
    return lit / 9.0;
}

fn spot_shadow(slot: u32, world_position: vec3<f32>) -> f32 {
    var lit = 1.0;
    switch slot {
        case 0u: { lit = pcf(spot_shadow_map_0, shadow.spot_view_proj[0], world_position); }
        case 1u: { lit = pcf(spot_shadow_map_1, shadow.spot_view_proj[1], world_position); }
        case 2u: { lit = pcf(spot_shadow_map_2, shadow.spot_view_proj[2], world_position); }
        case 3u: { lit = pcf(spot_shadow_map_3, shadow.spot_view_proj[3], world_position); }
        default: {}
    }
    return lit;
}

fn shadow_factor(index: u32, kind: u32, world_position: vec3<f32>) -> f32 {
    if (shadow.flags & SHADOW_FLAG_ENABLED) == 0u {
        return 1.0;
    }
    if kind == LIGHT_DIRECTIONAL {
        if (shadow.flags & SHADOW_FLAG_DIRECTIONAL) != 0u && shadow.directional_light_index == index {
            return pcf(directional_shadow_map, shadow.directional_view_proj, world_position);
        }
        return 1.0;
    }
    if kind == LIGHT_SPOT {
        for (var slot = 0u; slot < shadow.spot_count; slot = slot + 1u) {
            if shadow.spot_light_indices[slot] == index {
                return spot_shadow(slot, world_position);
            }
        }
    }
    return 1.0;
}

fn shade_light(
    index: u32,
    world_position: vec3<f32>,
    n: vec3<f32>,
    v: vec3<f32>,
    albedo: vec3<f32>,
    metallic: f32,
    roughness: f32,
) -> vec3<f32> {
    let light = lights[index];
    let kind = light_type(light);

    var l: vec3<f32>;
    var attenuation = 1.0;
    if kind == LIGHT_DIRECTIONAL {
        l = normalize(-light.direction_radius.xyz);
    } else {
        let to_light = light.position_type.xyz - world_position;
        let distance = length(to_light);
        l = to_light / max(distance, EPSILON);
        attenuation = distance_falloff(distance, light.direction_radius.w);
        if kind == LIGHT_SPOT {
            let cos_angle = dot(-l, normalize(light.direction_radius.xyz));
            attenuation = attenuation * cone_falloff(cos_angle, light.cone.x, light.cone.y);
        }
    }
    if attenuation <= 0.0 || dot(n, l) <= 0.0 {
        return vec3<f32>(0.0);
    }

    let radiance = light.color_intensity.rgb * light.color_intensity.w * attenuation;
    let lit = shadow_factor(index, kind, world_position);
    return brdf(n, v, l, albedo, metallic, roughness) * radiance * lit;
}

fn shading_normal(in: VertexOutput) -> vec3<f32> {
    let n = normalize(in.world_normal);
    let t_raw = in.world_tangent.xyz - n * dot(n, in.world_tangent.xyz);
    let tangent_normal = textureSample(normal_texture, material_sampler, in.uv).xyz * 2.0 - 1.0;
    if length(t_raw) < EPSILON {
        return n;
    }
    let t = normalize(t_raw);
    let b = cross(n, t) * in.world_tangent.w;
    return normalize(mat3x3<f32>(t, b, n) * tangent_normal);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(base_color_texture, material_sampler, in.uv) * material.base_color;
    let packed = textureSample(metallic_roughness_texture, material_sampler, in.uv);
    let emissive = textureSample(emissive_texture, material_sampler, in.uv).rgb * material.emissive.rgb;
    let n = shading_normal(in);

    let albedo = base.rgb;
    let metallic = clamp(packed.b * material.metallic_roughness.x, 0.0, 1.0);
    let roughness = clamp(packed.g * material.metallic_roughness.y, 0.05, 1.0);
    let v = normalize(frame.camera_position.xyz - in.world_position);

    let max_tile = vec2<u32>(frame.tile_count_x - 1u, frame.tile_count_y - 1u);
    let tile = min(vec2<u32>(in.clip_position.xy) / frame.tile_size, max_tile);
    let tile_index = tile.y * frame.tile_count_x + tile.x;
    let count = min(tiles[tile_index].count, MAX_LIGHTS_PER_TILE);

    var lo = vec3<f32>(0.0);
    if count == 0u {
        // Empty tile: shade with every light rather than leave it unlit
        for (var i = 0u; i < frame.light_count; i = i + 1u) {
            lo = lo + shade_light(i, in.world_position, n, v, albedo, metallic, roughness);
        }
    } else {
        for (var i = 0u; i < count; i = i + 1u) {
            let index = tiles[tile_index].indices[i];
            lo = lo + shade_light(index, in.world_position, n, v, albedo, metallic, roughness);
        }
    }

    let color = frame.ambient.rgb * albedo + lo + emissive;
    let mapped = color / (color + vec3<f32>(1.0));
    return vec4<f32>(mapped, base.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{validate_wgsl, ShaderStage};

    #[test]
    fn shader_validates() {
        validate_wgsl(
            "shading",
            &shader_source(),
            &[("vs_main", ShaderStage::Vertex), ("fs_main", ShaderStage::Fragment)],
        )
        .unwrap();
    }

    #[test]
    fn shader_has_no_gamma_curve() {
        let source = shader_source();
        assert!(!source.contains("1.0 / 2.2"));
        assert!(!source.contains("0.4545"));
    }
}
