use crate::compression::TILE_SIZE;
use image::{GenericImage, GrayImage, ImageResult, Luma};
use thiserror::Error;

/// Genesis tiles store two pixels per byte, left pixel in the high nibble.
const BYTES_PER_ROW: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    #[error("Tile data of {0} bytes is not a multiple of 32")]
    Misaligned(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorIndex(u8);

impl ColorIndex {
    pub const fn new(index: u8) -> Self {
        assert!(index < 16, "ColorIndex must be less than 16");

        ColorIndex(index)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn is_transparent(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile([ColorIndex; 64]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSet(Vec<Tile>);

impl TileSet {
    pub fn try_from_slice(data: &[u8]) -> Result<Self, TileError> {
        if data.len() % TILE_SIZE != 0 {
            return Err(TileError::Misaligned(data.len()));
        }

        let tiles = data.chunks_exact(TILE_SIZE).map(Tile::from_chunk).collect();

        Ok(TileSet(tiles))
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lay the tiles out left to right, `columns` per row, as a greyscale preview.
    pub fn to_sheet(&self, columns: usize) -> ImageResult<GrayImage> {
        let columns = columns.max(1);
        let rows = self.0.len().div_ceil(columns).max(1);
        let width = (columns.min(self.0.len().max(1)) * 8) as u32;

        let mut sheet = GrayImage::new(width, rows as u32 * 8);
        for (i, tile) in self.0.iter().enumerate() {
            let x = (i % columns) as u32 * 8;
            let y = (i / columns) as u32 * 8;

            sheet.copy_from(&tile.to_image(), x, y)?;
        }

        Ok(sheet)
    }
}

impl Tile {
    pub fn data(&self) -> &[ColorIndex] {
        &self.0
    }

    /// Decode exactly one tile. Panics if `data` is not 32 bytes long.
    pub fn from_chunk(data: &[u8]) -> Self {
        assert!(data.len() == TILE_SIZE, "Tile data must be 32 bytes long");

        let mut tile = [ColorIndex::new(0); 64];

        for (row, bytes) in data.chunks_exact(BYTES_PER_ROW).enumerate() {
            for (i, &byte) in bytes.iter().enumerate() {
                tile[row * 8 + i * 2] = ColorIndex::new(byte >> 4);
                tile[row * 8 + i * 2 + 1] = ColorIndex::new(byte & 0x0f);
            }
        }

        Tile(tile)
    }

    pub fn get(&self, x: usize, y: usize) -> ColorIndex {
        self.0[y * 8 + x]
    }

    /// Index `n` becomes luma `n * 17`, so index 15 is white.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(8, 8, |x, y| {
            let index = self.get(x as usize, y as usize);
            Luma([index.as_u8() * 17])
        })
    }
}
