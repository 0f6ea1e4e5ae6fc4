//! Depth-only triangle rasterization

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Depth target cleared to 1.0, tested with `Less`
///
/// Rows run top to bottom, matching framebuffer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            data: vec![1.0; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.data[(y * self.width + x) as usize]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Smallest and largest depth inside a pixel rectangle (exclusive upper bound)
    pub fn depth_range(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> (f32, f32) {
        let mut min = 1.0f32;
        let mut max = 0.0f32;
        for y in y0..y1.min(self.height) {
            for x in x0..x1.min(self.width) {
                let depth = self.depth_at(x, y).clamp(0.0, 1.0);
                min = min.min(depth);
                max = max.max(depth);
            }
        }
        (min, max)
    }

    /// Rasterize one triangle given in clip space, both windings
    ///
    /// Triangles with a vertex at or behind the eye are skipped rather than
    /// clipped. Pixels are sampled at their centres.
    pub fn draw_triangle(&mut self, clip: [Vec4; 3]) -> usize {
        if clip.iter().any(|c| c.w <= 0.0) {
            return 0;
        }
        let size = Vec2::new(self.width as f32, self.height as f32);
        let screen = clip.map(|c| {
            let ndc = c.truncate() / c.w;
            Vec3::new(
                (ndc.x * 0.5 + 0.5) * size.x,
                (0.5 - ndc.y * 0.5) * size.y,
                ndc.z,
            )
        });

        let area = edge(screen[0], screen[1], screen[2]);
        if area.abs() <= f32::EPSILON {
            return 0;
        }

        let min = screen[0].min(screen[1]).min(screen[2]);
        let max = screen[0].max(screen[1]).max(screen[2]);
        let x0 = min.x.floor().max(0.0) as u32;
        let y0 = min.y.floor().max(0.0) as u32;
        let x1 = (max.x.ceil().max(0.0) as u32).min(self.width);
        let y1 = (max.y.ceil().max(0.0) as u32).min(self.height);

        let mut written = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                let w0 = edge(screen[1], screen[2], p) / area;
                let w1 = edge(screen[2], screen[0], p) / area;
                let w2 = edge(screen[0], screen[1], p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * screen[0].z + w1 * screen[1].z + w2 * screen[2].z;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                let slot = &mut self.data[(y * self.width + x) as usize];
                if depth < *slot {
                    *slot = depth;
                    written += 1;
                }
            }
        }
        written
    }

    /// Rasterize an indexed mesh, returning how many pixels passed the depth test
    pub fn draw_mesh(&mut self, view_proj: Mat4, model: Mat4, positions: &[Vec3], indices: &[u32]) -> usize {
        let mvp = view_proj * model;
        indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let fetch = |i: u32| positions.get(i as usize).map(|p| mvp * p.extend(1.0));
                Some([fetch(tri[0])?, fetch(tri[1])?, fetch(tri[2])?])
            })
            .map(|clip| self.draw_triangle(clip))
            .sum()
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_screen_quad(depth: f32) -> ([Vec3; 4], [u32; 6]) {
        (
            [
                Vec3::new(-1.0, -1.0, depth),
                Vec3::new(1.0, -1.0, depth),
                Vec3::new(1.0, 1.0, depth),
                Vec3::new(-1.0, 1.0, depth),
            ],
            [0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn new_buffer_is_cleared_to_far() {
        let buffer = DepthBuffer::new(4, 3);
        assert!(buffer.as_slice().iter().all(|&d| d == 1.0));
        assert_eq!(buffer.depth_range(0, 0, 4, 3), (1.0, 1.0));
    }

    #[test]
    fn quad_covers_every_pixel() {
        let mut buffer = DepthBuffer::new(8, 8);
        let (positions, indices) = full_screen_quad(0.25);
        let written = buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &positions, &indices);
        assert_eq!(written, 64);
        assert!(buffer.as_slice().iter().all(|&d| (d - 0.25).abs() < 1e-6));
    }

    #[test]
    fn depth_test_keeps_nearest() {
        let mut buffer = DepthBuffer::new(8, 8);
        let (near, indices) = full_screen_quad(0.2);
        let (far, _) = full_screen_quad(0.6);
        buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &near, &indices);
        let written = buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &far, &indices);
        assert_eq!(written, 0);
        assert!((buffer.depth_at(3, 3) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn equal_depth_fails_less() {
        let mut buffer = DepthBuffer::new(4, 4);
        let (quad, indices) = full_screen_quad(0.5);
        buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &quad, &indices);
        assert_eq!(buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &quad, &indices), 0);
    }

    #[test]
    fn triangle_behind_eye_is_skipped() {
        let mut buffer = DepthBuffer::new(4, 4);
        let clip = [
            Vec4::new(0.0, 0.0, 0.5, -1.0),
            Vec4::new(1.0, 0.0, 0.5, 1.0),
            Vec4::new(0.0, 1.0, 0.5, 1.0),
        ];
        assert_eq!(buffer.draw_triangle(clip), 0);
    }

    #[test]
    fn top_half_maps_to_top_rows() {
        let mut buffer = DepthBuffer::new(4, 4);
        let positions = [
            Vec3::new(-1.0, 0.0, 0.3),
            Vec3::new(1.0, 0.0, 0.3),
            Vec3::new(1.0, 1.0, 0.3),
            Vec3::new(-1.0, 1.0, 0.3),
        ];
        buffer.draw_mesh(Mat4::IDENTITY, Mat4::IDENTITY, &positions, &[0, 1, 2, 0, 2, 3]);
        assert!((buffer.depth_at(1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(buffer.depth_at(1, 3), 1.0);
    }
}
