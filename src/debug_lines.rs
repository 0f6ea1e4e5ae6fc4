//! Line-list wireframes for lights
//!
//! Geometry is regenerated every frame and written into a fixed-size vertex
//! buffer; anything past the budget is dropped.

use crate::backend::types::{VertexAttribute, VertexBufferLayout, VertexFormat};
use crate::scene::{DirectionalLight, Light, LightSet, PointLight, SpotLight};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::f32::consts::TAU;

/// Default size of the per-slot line vertex buffer
pub const DEFAULT_LINE_BUDGET_BYTES: u64 = 64 * 1024;

const DIRECTIONAL_ANCHOR: Vec3 = Vec3::new(0.0, 5.0, 0.0);
const ARROW_SHAFT: f32 = 2.0;
const ARROW_HEAD: f32 = 0.4;
const ARROW_HEAD_RADIUS: f32 = 0.15;
const CROSS_HALF: f32 = 0.15;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: Vec3,
    pub color: Vec3,
}

static_assertions::const_assert_eq!(std::mem::size_of::<LineVertex>(), 24);

impl LineVertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
            ],
        }
    }
}

/// Whole line segments that fit in `budget_bytes`, counted in vertices
pub fn max_vertices(budget_bytes: u64) -> usize {
    let vertices = (budget_bytes / std::mem::size_of::<LineVertex>() as u64) as usize;
    vertices & !1
}

/// Line list bounded by a vertex budget
#[derive(Debug, Clone)]
pub struct LineBatch {
    vertices: Vec<LineVertex>,
    capacity: usize,
    dropped: usize,
}

impl LineBatch {
    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            vertices: Vec::new(),
            capacity: max_vertices(budget_bytes),
            dropped: 0,
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.dropped = 0;
    }

    pub fn vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vertices that did not fit since the last clear
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn line(&mut self, a: Vec3, b: Vec3, color: Vec3) {
        if self.vertices.len() + 2 > self.capacity {
            self.dropped += 2;
            return;
        }
        self.vertices.push(LineVertex { position: a, color });
        self.vertices.push(LineVertex { position: b, color });
    }

    /// Circle in the plane spanned by two unit axes
    pub fn circle(
        &mut self,
        center: Vec3,
        axis_u: Vec3,
        axis_v: Vec3,
        radius: f32,
        color: Vec3,
        segments: u32,
    ) {
        let point = |i: u32| {
            let angle = TAU * i as f32 / segments as f32;
            center + radius * (angle.cos() * axis_u + angle.sin() * axis_v)
        };
        for i in 0..segments {
            self.line(point(i), point(i + 1), color);
        }
    }

    pub fn directional(&mut self, light: &DirectionalLight) {
        let dir = light.direction.try_normalize().unwrap_or(-Vec3::Y);
        let color = light.color;
        let tip = DIRECTIONAL_ANCHOR + dir * ARROW_SHAFT;
        self.line(DIRECTIONAL_ANCHOR, tip, color);

        let (u, v) = basis(dir);
        let head_base = tip - dir * ARROW_HEAD;
        for i in 0..4 {
            let angle = TAU * i as f32 / 4.0;
            let rib_end = head_base + ARROW_HEAD_RADIUS * (angle.cos() * u + angle.sin() * v);
            self.line(tip, rib_end, color);
        }
        self.circle(head_base, u, v, ARROW_HEAD_RADIUS, color, 8);
    }

    pub fn point(&mut self, position: Vec3, light: &PointLight) {
        let (color, r) = (light.color, light.radius);
        self.circle(position, Vec3::X, Vec3::Y, r, color, 32);
        self.circle(position, Vec3::X, Vec3::Z, r, color, 32);
        self.circle(position, Vec3::Y, Vec3::Z, r, color, 32);

        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            self.line(position - axis * CROSS_HALF, position + axis * CROSS_HALF, color);
        }
    }

    pub fn spot(&mut self, position: Vec3, light: &SpotLight) {
        let dir = light.direction.try_normalize().unwrap_or(-Vec3::Y);
        let (color, r) = (light.color, light.radius);
        let (u, v) = basis(dir);

        let base = position + dir * r;
        let outer_radius = r * light.outer_angle.tan();
        self.circle(base, u, v, outer_radius, color, 32);
        self.circle(base, u, v, r * light.inner_angle.tan(), color * 0.6, 16);

        for i in 0..8 {
            let angle = TAU * i as f32 / 8.0;
            let rim = base + outer_radius * (angle.cos() * u + angle.sin() * v);
            self.line(position, rim, color);
        }
        self.line(position, base, color * 0.5);
    }

    /// Append every light's shape in packed order
    pub fn lights(&mut self, set: &LightSet) {
        for light in set.packed_order() {
            match light {
                Light::Directional(d) => self.directional(d),
                Light::Point { position, light } => self.point(*position, light),
                Light::Spot { position, light } => self.spot(*position, light),
            }
        }
    }
}

/// Two unit axes perpendicular to `dir` and to each other
fn basis(dir: Vec3) -> (Vec3, Vec3) {
    let up = if dir.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
    let u = dir.cross(up).normalize();
    let v = dir.cross(u).normalize();
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_vertex_counts() {
        let mut batch = LineBatch::with_budget(DEFAULT_LINE_BUDGET_BYTES);
        batch.directional(&DirectionalLight::default());
        // shaft + 4 ribs + 8-segment ring
        assert_eq!(batch.vertices().len(), 2 * (1 + 4 + 8));

        batch.clear();
        batch.point(Vec3::ZERO, &PointLight::default());
        assert_eq!(batch.vertices().len(), 2 * (3 * 32 + 3));

        batch.clear();
        batch.spot(Vec3::ZERO, &SpotLight::default());
        assert_eq!(batch.vertices().len(), 2 * (32 + 16 + 8 + 1));
    }

    #[test]
    fn budget_truncates_whole_segments() {
        assert_eq!(max_vertices(DEFAULT_LINE_BUDGET_BYTES), 2730);
        assert_eq!(max_vertices(24 * 5), 4);

        let mut set = LightSet::new();
        for i in 0..20 {
            set.add_point(Vec3::X * i as f32, PointLight::default());
        }
        let mut batch = LineBatch::with_budget(DEFAULT_LINE_BUDGET_BYTES);
        batch.lights(&set);
        assert_eq!(batch.vertices().len(), 2730);
        assert_eq!(batch.dropped(), 20 * 198 - 2730);
        assert_eq!(batch.bytes().len(), 2730 * 24);
    }

    #[test]
    fn spot_rim_lies_on_cone() {
        let light = SpotLight::default();
        let mut batch = LineBatch::with_budget(DEFAULT_LINE_BUDGET_BYTES);
        batch.spot(Vec3::ZERO, &light);
        let rim = batch.vertices()[1].position;
        let angle = rim.normalize().dot(-Vec3::Y).acos();
        assert!((angle - light.outer_angle).abs() < 1e-4);
    }
}
