//! Tile light culling on the CPU
//!
//! Mirrors `cs_cull`: per tile, a frustum made of four side planes through
//! the eye plus the tile's depth range, tested against each light's view
//! space bounding sphere. Directional lights are kept everywhere.

use crate::cpu::raster::DepthBuffer;
use crate::scene::{FrameUniforms, GpuLight, LightType};
use crate::tiling::{TileGrid, TileLightList};
use glam::{Mat4, Vec3};
use std::f32::consts::FRAC_1_SQRT_2;

/// Side planes and depth range of one tile in view space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFrustum {
    /// Inward normals of the left, right, top and bottom planes
    pub planes: [Vec3; 4],
    /// Distance along -Z of the closest depth in the tile
    pub near_distance: f32,
    /// Distance along -Z of the farthest depth in the tile
    pub far_distance: f32,
}

impl TileFrustum {
    pub fn new(inv_proj: Mat4, grid: &TileGrid, tx: u32, ty: u32, min_depth: f32, max_depth: f32) -> Self {
        let view_point = |ndc: Vec3| inv_proj.project_point3(ndc);

        let (x0, y0, x1, y1) = grid.tile_bounds(tx, ty);
        let width = grid.width as f32;
        let height = grid.height as f32;
        let left = x0 as f32 / width * 2.0 - 1.0;
        let right = x1 as f32 / width * 2.0 - 1.0;
        let top = 1.0 - y0 as f32 / height * 2.0;
        let bottom = 1.0 - y1 as f32 / height * 2.0;

        let top_left = view_point(Vec3::new(left, top, 1.0));
        let top_right = view_point(Vec3::new(right, top, 1.0));
        let bottom_left = view_point(Vec3::new(left, bottom, 1.0));
        let bottom_right = view_point(Vec3::new(right, bottom, 1.0));

        Self {
            planes: [
                bottom_left.cross(top_left).normalize(),
                top_right.cross(bottom_right).normalize(),
                top_left.cross(top_right).normalize(),
                bottom_right.cross(bottom_left).normalize(),
            ],
            near_distance: -view_point(Vec3::new(0.0, 0.0, min_depth)).z,
            far_distance: -view_point(Vec3::new(0.0, 0.0, max_depth)).z,
        }
    }

    /// Conservative sphere test; may keep spheres that miss a corner
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let distance = -center.z;
        if distance + radius < self.near_distance || distance - radius > self.far_distance {
            return false;
        }
        self.planes.iter().all(|plane| plane.dot(center) >= -radius)
    }
}

/// View space bounding sphere of a point or spot light as `(centre, radius)`
///
/// Spots use the tighter of the sphere around the cone's base and the sphere
/// with the cone's axis as diameter.
pub fn bounding_sphere(light: &GpuLight, view: &Mat4) -> (Vec3, f32) {
    let position = view.transform_point3(light.position());
    let radius = light.radius();
    if light.light_type() != Some(LightType::Spot) {
        return (position, radius);
    }

    let direction = view.transform_vector3(light.direction()).normalize_or_zero();
    let cos_outer = light.cone.y;
    if cos_outer <= 0.0 {
        return (position, radius);
    }
    if cos_outer < FRAC_1_SQRT_2 {
        let sin_outer = (1.0 - cos_outer * cos_outer).max(0.0).sqrt();
        return (position + direction * radius * cos_outer, radius * sin_outer);
    }
    let half_extent = radius / (2.0 * cos_outer);
    (position + direction * half_extent, half_extent)
}

/// Whether a light survives culling against one tile
pub fn light_visible(frustum: &TileFrustum, light: &GpuLight, view: &Mat4) -> bool {
    if light.light_type() == Some(LightType::Directional) {
        return true;
    }
    let (center, radius) = bounding_sphere(light, view);
    frustum.intersects_sphere(center, radius)
}

/// Build every tile's light list from a depth buffer
///
/// Only the first `frame.light_count` lights are considered. Lists keep
/// ascending light order and stop at the per-tile capacity.
pub fn cull_tiles(frame: &FrameUniforms, lights: &[GpuLight], depth: &DepthBuffer) -> Vec<TileLightList> {
    let grid = TileGrid::with_tile_size(frame.screen_width, frame.screen_height, frame.tile_size);
    let count = (frame.light_count as usize).min(lights.len());

    let mut tiles = Vec::with_capacity(grid.tile_count() as usize);
    for ty in 0..grid.tiles_y {
        for tx in 0..grid.tiles_x {
            let (x0, y0, x1, y1) = grid.tile_bounds(tx, ty);
            let (min_depth, max_depth) = depth.depth_range(x0, y0, x1, y1);
            let frustum = TileFrustum::new(frame.inv_proj, &grid, tx, ty, min_depth, max_depth);

            let mut tile = TileLightList::default();
            for (index, light) in lights[..count].iter().enumerate() {
                if light_visible(&frustum, light, &frame.view) && !tile.push(index as u32) {
                    break;
                }
            }
            tiles.push(tile);
        }
    }
    tiles
}
