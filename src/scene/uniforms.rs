//! Frame uniform block shared by every stage

use crate::scene::{AmbientLight, Camera};
use crate::tiling::TileGrid;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Per-frame camera and grid state, 256 bytes
///
/// Read by the culling compute stage, the shading pass and the overlays.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    /// xyz camera position, w = 1
    pub camera_position: Vec4,
    /// rgb ambient color already multiplied by intensity
    pub ambient: Vec4,
    pub light_count: u32,
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub tile_size: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub time: f32,
    pub _padding: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<FrameUniforms>(), 256);

impl FrameUniforms {
    pub fn new(
        camera: &Camera,
        ambient: &AmbientLight,
        light_count: u32,
        grid: &TileGrid,
        time: f32,
    ) -> Self {
        let proj = camera.projection_matrix();
        Self {
            view: camera.view_matrix(),
            proj,
            inv_proj: proj.inverse(),
            camera_position: camera.position.extend(1.0),
            ambient: ambient.scaled().extend(0.0),
            light_count,
            tile_count_x: grid.tiles_x,
            tile_count_y: grid.tiles_y,
            tile_size: grid.tile_size,
            screen_width: grid.width,
            screen_height: grid.height,
            time,
            _padding: 0,
        }
    }
}
