//! Grid compositing of equally sized tiles.

use image::{GenericImage, Rgb, RgbImage};

use crate::error::{VisError, VisResult};

/// Gap between tiles, as a fraction of the tile height, when the caller has
/// no preference.
pub const DEFAULT_GAP_RATIO: f64 = 0.1;

/// Geometry of a composite canvas.
///
/// Tiles are given as `groups`, each holding `group_len` tiles. Tile `j` of
/// group `i` lands in column `j % nrows` and row
/// `(j / nrows) * groups + i`, so the groups interleave row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub tile_width: u32,
    pub tile_height: u32,
    pub gap: u32,
    /// Tiles per canvas row.
    pub nrows: usize,
    pub groups: usize,
    pub group_len: usize,
}

impl Grid {
    pub fn new(
        tile_width: u32,
        tile_height: u32,
        gap_ratio: f64,
        nrows: usize,
        groups: usize,
        group_len: usize,
    ) -> Self {
        Self {
            tile_width,
            tile_height,
            gap: (f64::from(tile_height) * gap_ratio).floor() as u32,
            nrows,
            groups,
            group_len,
        }
    }

    /// Canvas rows of tiles.
    pub fn rows(&self) -> usize {
        self.group_len.div_ceil(self.nrows) * self.groups
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        let span = |count: usize, size: u32| {
            let count = count as u32;
            size * count + self.gap * count.saturating_sub(1)
        };
        (
            span(self.nrows, self.tile_width),
            span(self.rows(), self.tile_height),
        )
    }

    /// Top-left pixel of tile `index` of group `group`.
    pub fn offset(&self, group: usize, index: usize) -> (u32, u32) {
        let column = (index % self.nrows) as u32;
        let row = ((index / self.nrows) * self.groups + group) as u32;
        (
            column * (self.tile_width + self.gap),
            row * (self.tile_height + self.gap),
        )
    }
}

/// Places `groups` of tiles on a white canvas, `nrows` tiles per canvas row.
///
/// All tiles must share the first tile's size and every group must hold as
/// many tiles as the first group.
///
/// # Errors
///
/// Returns an error if there is nothing to place, `nrows` is zero, or the
/// groups or tiles are not uniform.
pub fn concat_images(groups: &[Vec<RgbImage>], nrows: usize, gap_ratio: f64) -> VisResult<RgbImage> {
    if nrows == 0 {
        return Err(VisError::ZeroColumns);
    }
    let first = groups
        .first()
        .and_then(|group| group.first())
        .ok_or(VisError::EmptyGrid)?;
    let expected = first.dimensions();
    let group_len = groups[0].len();

    for (g, group) in groups.iter().enumerate() {
        if group.len() != group_len {
            return Err(VisError::GroupLength {
                group: g,
                expected: group_len,
                actual: group.len(),
            });
        }
        if let Some((index, tile)) = group
            .iter()
            .enumerate()
            .find(|(_, tile)| tile.dimensions() != expected)
        {
            return Err(VisError::TileSize {
                group: g,
                index,
                expected,
                actual: tile.dimensions(),
            });
        }
    }

    let grid = Grid::new(expected.0, expected.1, gap_ratio, nrows, groups.len(), group_len);
    let (width, height) = grid.canvas_size();
    tracing::debug!(width, height, rows = grid.rows(), nrows, gap = grid.gap, "compositing");

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for (g, group) in groups.iter().enumerate() {
        for (j, tile) in group.iter().enumerate() {
            let (x, y) = grid.offset(g, j);
            canvas
                .copy_from(tile, x, y)
                .map_err(|source| VisError::Composite { source })?;
        }
    }
    Ok(canvas)
}
