//! WGSL declarations shared by every pass
//!
//! Struct layouts here mirror the `#[repr(C)]` records uploaded from Rust:
//! [`FrameUniforms`](crate::scene::FrameUniforms),
//! [`GpuLight`](crate::scene::GpuLight),
//! [`TileLightList`](crate::tiling::TileLightList),
//! [`ShadowUniforms`](crate::shadow::ShadowUniforms) and
//! [`ObjectUniforms`](crate::scene::ObjectUniforms).

pub const FRAME_STRUCT: &str = r#"
struct FrameUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    light_count: u32,
    tile_count_x: u32,
    tile_count_y: u32,
    tile_size: u32,
    screen_width: u32,
    screen_height: u32,
    time: f32,
    _padding: u32,
}
"#;

pub const LIGHT_STRUCT: &str = r#"
const LIGHT_DIRECTIONAL: u32 = 0u;
const LIGHT_POINT: u32 = 1u;
const LIGHT_SPOT: u32 = 2u;

struct Light {
    position_type: vec4<f32>,
    direction_radius: vec4<f32>,
    color_intensity: vec4<f32>,
    cone: vec4<f32>,
}

fn light_type(light: Light) -> u32 {
    return u32(light.position_type.w + 0.5);
}
"#;

pub const TILE_STRUCT: &str = r#"
const MAX_LIGHTS_PER_TILE: u32 = 256u;

struct TileLights {
    count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    indices: array<u32, 256>,
}
"#;

pub const SHADOW_STRUCT: &str = r#"
const SHADOW_FLAG_ENABLED: u32 = 1u;
const SHADOW_FLAG_DIRECTIONAL: u32 = 2u;

struct ShadowUniforms {
    directional_view_proj: mat4x4<f32>,
    spot_view_proj: array<mat4x4<f32>, 4>,
    spot_light_indices: vec4<u32>,
    directional_light_index: u32,
    spot_count: u32,
    bias: f32,
    flags: u32,
}
"#;

pub const OBJECT_STRUCT: &str = r#"
struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
}
"#;

/// Join declaration blocks and a shader body into one module
pub fn compose(parts: &[&str]) -> String {
    parts.concat()
}
