//! Screen-space tile grid and the per-tile light list record

use crate::{MAX_LIGHTS_PER_TILE, TILE_SIZE};
use bytemuck::{Pod, Zeroable};

/// Tile grid covering the viewport
///
/// Tile `(x, y)` covers pixels `[x * tile_size, (x + 1) * tile_size)` horizontally
/// and the same vertically; the last row and column may be partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_tile_size(width, height, TILE_SIZE)
    }

    pub fn with_tile_size(width: u32, height: u32, tile_size: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            tile_size,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Tile coordinate containing a pixel
    pub fn tile_of(&self, px: u32, py: u32) -> (u32, u32) {
        (
            (px / self.tile_size).min(self.tiles_x - 1),
            (py / self.tile_size).min(self.tiles_y - 1),
        )
    }

    /// Linear index of a tile, row major
    pub fn tile_index(&self, tx: u32, ty: u32) -> usize {
        (ty * self.tiles_x + tx) as usize
    }

    /// Pixel bounds of a tile as `(x0, y0, x1, y1)`, exclusive upper bound,
    /// clipped to the viewport
    pub fn tile_bounds(&self, tx: u32, ty: u32) -> (u32, u32, u32, u32) {
        let x0 = tx * self.tile_size;
        let y0 = ty * self.tile_size;
        (
            x0,
            y0,
            (x0 + self.tile_size).min(self.width),
            (y0 + self.tile_size).min(self.height),
        )
    }

    /// Size in bytes of the buffer holding every tile record
    pub fn buffer_size(&self) -> u64 {
        self.tile_count() as u64 * std::mem::size_of::<TileLightList>() as u64
    }
}

/// One tile's light list as laid out on the GPU
///
/// `count` never exceeds [`MAX_LIGHTS_PER_TILE`]; only the first `count`
/// entries of `indices` are meaningful.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TileLightList {
    pub count: u32,
    pub _padding: [u32; 3],
    pub indices: [u32; MAX_LIGHTS_PER_TILE],
}

static_assertions::const_assert_eq!(std::mem::size_of::<TileLightList>(), 1040);

impl Default for TileLightList {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl TileLightList {
    /// Append a light index, returning false once the tile is full
    pub fn push(&mut self, light_index: u32) -> bool {
        let count = self.count as usize;
        if count >= MAX_LIGHTS_PER_TILE {
            return false;
        }
        self.indices[count] = light_index;
        self.count += 1;
        true
    }

    pub fn lights(&self) -> &[u32] {
        &self.indices[..(self.count as usize).min(MAX_LIGHTS_PER_TILE)]
    }

    /// Decode a tile buffer read back from the GPU
    pub fn decode_all(bytes: &[u8]) -> Vec<TileLightList> {
        bytes
            .chunks_exact(std::mem::size_of::<TileLightList>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1920, 1080, 120, 68)]
    #[case(1280, 720, 80, 45)]
    #[case(17, 16, 2, 1)]
    #[case(1, 1, 1, 1)]
    fn tile_counts_round_up(
        #[case] width: u32,
        #[case] height: u32,
        #[case] tiles_x: u32,
        #[case] tiles_y: u32,
    ) {
        let grid = TileGrid::new(width, height);
        assert_eq!((grid.tiles_x, grid.tiles_y), (tiles_x, tiles_y));
    }

    #[rstest]
    #[case(1920, 1080)]
    #[case(33, 47)]
    #[case(800, 600)]
    fn every_pixel_lands_in_exactly_one_tile(#[case] width: u32, #[case] height: u32) {
        let grid = TileGrid::new(width, height);
        let mut covered = vec![0u8; (width * height) as usize];
        for ty in 0..grid.tiles_y {
            for tx in 0..grid.tiles_x {
                let (x0, y0, x1, y1) = grid.tile_bounds(tx, ty);
                for y in y0..y1 {
                    for x in x0..x1 {
                        covered[(y * width + x) as usize] += 1;
                    }
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));

        for (px, py) in [(0, 0), (width - 1, height - 1), (width / 2, height / 3)] {
            let (tx, ty) = grid.tile_of(px, py);
            let (x0, y0, x1, y1) = grid.tile_bounds(tx, ty);
            assert!(px >= x0 && px < x1 && py >= y0 && py < y1);
        }
    }

    #[test]
    fn push_clamps_at_capacity() {
        let mut tile = TileLightList::default();
        for i in 0..(MAX_LIGHTS_PER_TILE as u32 + 10) {
            tile.push(i);
        }
        assert_eq!(tile.count as usize, MAX_LIGHTS_PER_TILE);
        assert_eq!(tile.lights().len(), MAX_LIGHTS_PER_TILE);
    }

    #[test]
    fn decodes_read_back_bytes() {
        let mut tiles = vec![TileLightList::default(); 3];
        tiles[1].push(7);
        let bytes: &[u8] = bytemuck::cast_slice(&tiles);
        let decoded = TileLightList::decode_all(bytes);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].lights(), &[7]);
    }
}
