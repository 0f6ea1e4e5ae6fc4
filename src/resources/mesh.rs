//! Meshes and the built-in shapes
//!
//! Every shape is stitched from parametric grids whose triangles wind
//! counter-clockwise seen from the side the normal points to.

use crate::backend::traits::{BufferHandle, IndexFormat};
use crate::backend::types::Vertex;
use glam::{Mat4, Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box holding every point; `None` when there are none
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Aabb>, p| {
            Some(match acc {
                Some(b) => Aabb::new(b.min.min(p), b.max.max(p)),
                None => Aabb::new(p, p),
            })
        })
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn center(&self) -> Vec3 {
        self.min.lerp(self.max, 0.5)
    }

    /// Distance from the center to any corner
    pub fn bounding_radius(&self) -> f32 {
        self.min.distance(self.max) * 0.5
    }

    /// Box around this one after `matrix` is applied
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut out = Aabb::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN));
        for i in 0..8 {
            let corner = Vec3::select(
                glam::BVec3::new(i & 1 != 0, i & 2 != 0, i & 4 != 0),
                self.max,
                self.min,
            );
            let p = matrix.transform_point3(corner);
            out = Aabb::new(out.min.min(p), out.max.max(p));
        }
        out
    }
}

/// Indexed triangle list with 32-bit indices
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]].map(|i| self.vertices[i as usize].position))
    }

    /// Append a `cols` x `rows` grid sampled by `vertex(u, v)` with u and v in
    /// [0, 1]. Triangles face the side `d/du x d/dv` points to.
    fn push_grid(&mut self, cols: u32, rows: u32, vertex: impl Fn(f32, f32) -> Vertex) {
        let base = self.vertices.len() as u32;
        let stride = cols + 1;
        for row in 0..=rows {
            for col in 0..=cols {
                self.vertices
                    .push(vertex(col as f32 / cols as f32, row as f32 / rows as f32));
            }
        }
        for row in 0..rows {
            for col in 0..cols {
                let a = base + row * stride + col;
                let b = a + stride;
                self.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
    }

    /// Unit cube around the origin, four vertices per face
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");
        let faces = [
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
        ];
        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            mesh.push_grid(1, 1, |u, v| Vertex {
                position: normal * 0.5 + tangent * (u - 0.5) + bitangent * (v - 0.5),
                normal,
                uv: Vec2::new(u, 1.0 - v),
                tangent: tangent.extend(1.0),
            });
        }
        mesh
    }

    /// Sphere of radius 0.5 with `segments` around and `rings` pole to pole
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        mesh.push_grid(segments.max(3), rings.max(2), |u, v| {
            let (theta, phi) = (u * TAU, v * PI);
            let dir = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            Vertex {
                position: dir * 0.5,
                normal: dir.try_normalize().unwrap_or(Vec3::Y),
                uv: Vec2::new(u, v),
                tangent: Vec3::new(-theta.sin(), 0.0, theta.cos()).extend(1.0),
            }
        });
        mesh
    }

    /// `width` x `depth` plane in XZ facing +Y, split into `subdivisions`
    /// squares per side
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let n = subdivisions.max(1);
        mesh.push_grid(n, n, |u, v| Vertex {
            // z runs against v so that +Y is the front side
            position: Vec3::new((u - 0.5) * width, 0.0, (0.5 - v) * depth),
            normal: Vec3::Y,
            uv: Vec2::new(u, v),
            tangent: Vec3::X.extend(1.0),
        });
        mesh
    }
}

/// Vertex and index buffers of an uploaded [`Mesh`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub index_format: IndexFormat,
    /// Local space; `None` only for meshes without vertices
    pub bounds: Option<Aabb>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Mesh::cube())]
    #[case(Mesh::sphere(16, 8))]
    fn closed_shapes_face_outward(#[case] mesh: Mesh) {
        for [a, b, c] in mesh.triangles() {
            let n = (b - a).cross(c - a);
            // pole triangles collapse to a line
            if n.length_squared() > 1e-12 {
                assert!(n.dot(a + b + c) > 0.0, "{} has an inward triangle", mesh.name);
            }
        }
    }

    #[test]
    fn plane_faces_up() {
        let plane = Mesh::plane(4.0, 4.0, 2);
        assert_eq!(plane.triangle_count(), 8);
        assert!(plane.triangles().all(|[a, b, c]| (b - a).cross(c - a).y > 0.0));
        let bounds = plane.bounds().unwrap();
        assert_eq!((bounds.min, bounds.max), (Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 0.0, 2.0)));
    }

    #[test]
    fn cube_tangents_follow_u() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        for face in cube.vertices.chunks(4) {
            let along_u = (face[1].position - face[0].position).normalize();
            assert!(along_u.dot(face[0].tangent.truncate()) > 0.99);
        }
    }

    #[test]
    fn bounds_follow_transforms() {
        let cube = Mesh::cube().bounds().unwrap();
        assert_eq!(cube.min, Vec3::splat(-0.5));
        let moved = cube.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(10.0, 0.0, 0.0));
        let both = cube.union(&moved);
        assert_eq!(both.max - both.min, Vec3::new(11.0, 1.0, 1.0));
        assert!((cube.bounding_radius() - 0.75f32.sqrt()).abs() < 1e-6);

        let turned = cube.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        assert!((turned.max.x - 0.5 * 2f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        assert!(Mesh::new("empty").bounds().is_none());
    }
}
