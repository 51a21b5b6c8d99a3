use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;

use crate::compression::{
    DecodeFailure, DecodeOptions, DecodeSession, Decompressed, Termination, TILE_SIZE,
};

mod map;
pub use map::{AssetMap, BlockDefinition, BlockLength, MapError, RomMetadata};

/// Size of the tile count that precedes header-prefixed blocks.
pub const HEADER_SIZE: usize = 2;

#[derive(Error, Debug)]
pub enum RomError {
    #[error("Failed to read ROM file")]
    Read(#[from] std::io::Error),
    #[error("No tile count header at {0:#x}")]
    MissingHeader(usize),
    #[error("A block of {0} tiles is too large to decode")]
    TooManyTiles(usize),
    #[error("Failed to decompress data")]
    Decompress(#[from] DecodeFailure),
    #[error("Block {0} was not decoded because an earlier block in its chain failed")]
    BrokenChain(String),
    #[error("Failed to extract block {name}")]
    Block {
        name: String,
        #[source]
        source: Box<RomError>,
    },
}

/// A ROM image held in memory.
#[derive(Debug, Clone)]
pub struct Rom {
    data: Vec<u8>,
    crc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub name: String,
    pub category: Option<String>,
    pub offset: usize,
    pub data: Vec<u8>,
    /// Compressed size, header included.
    pub bytes_read: usize,
}

impl Rom {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RomError> {
        Ok(Self::new(fs::read(path.as_ref())?))
    }

    pub fn new(data: Vec<u8>) -> Self {
        let crc = crc32fast::hash(&data);
        Self { data, crc }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Tile count stored big-endian in front of a block.
    pub fn tile_header(&self, offset: usize) -> Result<usize, RomError> {
        let header = self
            .data
            .get(offset..)
            .and_then(|rest| rest.get(..HEADER_SIZE))
            .ok_or(RomError::MissingHeader(offset))?;

        Ok(usize::from(u16::from_be_bytes([header[0], header[1]])))
    }

    /// Decompress a header-prefixed block of tiles at `offset`.
    pub fn decompress_tiles(
        &self,
        offset: usize,
        options: DecodeOptions,
    ) -> Result<Decompressed, RomError> {
        let tiles = self.tile_header(offset)?;
        let options = options.with_termination(tile_quota(tiles)?);

        let mut result = DecodeSession::new(&self.data, offset + HEADER_SIZE, options)?.run()?;
        result.bytes_read += HEADER_SIZE;

        Ok(result)
    }

    /// Decompress every block of `map`. Chains run in parallel, the blocks of one chain run in
    /// order. `on_block` is called once per block, whether it succeeded or not.
    pub fn extract<F>(
        &self,
        map: &AssetMap,
        options: DecodeOptions,
        on_block: F,
    ) -> Vec<Result<ExtractedBlock, RomError>>
    where
        F: Fn(&BlockDefinition) + Sync,
    {
        map.chains()
            .par_iter()
            .flat_map_iter(|chain| {
                let results = self.extract_chain(chain, options);
                chain.iter().for_each(&on_block);
                results
            })
            .collect()
    }

    fn extract_chain(
        &self,
        chain: &[BlockDefinition],
        options: DecodeOptions,
    ) -> Vec<Result<ExtractedBlock, RomError>> {
        let mut results = Vec::with_capacity(chain.len());
        let mut history = Some(Vec::new());

        for block in chain {
            let result = match history.take() {
                Some(seed) => self.extract_block(block, options, seed).map(|(extracted, data)| {
                    history = Some(data);
                    extracted
                }),
                None => Err(RomError::BrokenChain(block.name.clone())),
            };

            results.push(result.map_err(|source| RomError::Block {
                name: block.name.clone(),
                source: Box::new(source),
            }));
        }

        results
    }

    /// Returns the block and the full output buffer to seed the next block with.
    fn extract_block(
        &self,
        block: &BlockDefinition,
        options: DecodeOptions,
        history: Vec<u8>,
    ) -> Result<(ExtractedBlock, Vec<u8>), RomError> {
        let (start, termination) = match block.length {
            BlockLength::Sentinel => (block.offset, Termination::Sentinel),
            BlockLength::Tiles(tiles) => (block.offset, tile_quota(tiles)?),
            BlockLength::Bytes(bytes) => (block.offset, Termination::Quota(bytes)),
            BlockLength::Header => (
                block.offset + HEADER_SIZE,
                tile_quota(self.tile_header(block.offset)?)?,
            ),
        };

        let mut options = options.with_termination(termination);
        if block.max_output.is_some() {
            options = options.with_max_output(block.max_output);
        }

        let result = DecodeSession::with_history(&self.data, start, options, history)?.run()?;
        if result.output().len() % TILE_SIZE != 0 {
            log::warn!(
                "Block {} decoded to {:#x} bytes, which is not a whole number of tiles",
                block.name,
                result.output().len()
            );
        }

        let extracted = ExtractedBlock {
            name: block.name.clone(),
            category: block.category.clone(),
            offset: block.offset,
            data: result.output().to_vec(),
            bytes_read: result.bytes_read + (start - block.offset),
        };

        Ok((extracted, result.data))
    }
}

fn tile_quota(tiles: usize) -> Result<Termination, RomError> {
    Termination::tiles(tiles).ok_or(RomError::TooManyTiles(tiles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::DecodeError;

    fn rom() -> Rom {
        let mut data = vec![0xffu8; 0x40];

        // 0x00: sentinel block, fill + copy
        data[..5].copy_from_slice(&[0x33, 0x11, 0x81, 0x04, 0x00]);
        // 0x10: one tile behind a header
        data[0x10..0x16].copy_from_slice(&[0x00, 0x01, 0x3f, 0x22, 0x2f, 0xff]);
        // 0x20: chained to the block at 0x10, copies the last byte of it
        data[0x20..0x23].copy_from_slice(&[0x50, 0x00, 0xff]);
        // 0x30: broken
        data[0x30] = 0x40;

        Rom::new(data)
    }

    #[test]
    fn tile_header() {
        let rom = rom();
        assert_eq!(rom.tile_header(0x10).unwrap(), 1);
        assert!(matches!(
            rom.tile_header(0x3f),
            Err(RomError::MissingHeader(0x3f))
        ));
    }

    #[test]
    fn decompress_tiles() -> anyhow::Result<()> {
        let result = rom().decompress_tiles(0x10, DecodeOptions::default())?;

        let mut expected = vec![0x22; 16];
        expected.extend([0; 16]);
        assert_eq!(result.data, expected);
        assert_eq!(result.bytes_read, 5);

        Ok(())
    }

    #[test]
    fn extract_map() -> anyhow::Result<()> {
        let rom = rom();
        let map = AssetMap::parse(
            r#"
            supported_roms = []

            [[block]]
            name = "plain"
            offset = 0x00

            [[block]]
            name = "tiles"
            offset = 0x10
            length = "header"

            [[block]]
            name = "overlay"
            offset = 0x20
            length = { bytes = 1 }
            chain = true

            [[block]]
            name = "broken"
            offset = 0x30

            [[block]]
            name = "after_broken"
            offset = 0x20
            chain = true
            "#,
        )?;

        let seen = std::sync::atomic::AtomicUsize::new(0);
        let results = rom.extract(&map, DecodeOptions::default(), |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(seen.into_inner(), 5);
        assert_eq!(results.len(), 5);

        let plain = results[0].as_ref().unwrap();
        assert_eq!(plain.data, vec![0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);
        assert_eq!(plain.bytes_read, 5);

        let tiles = results[1].as_ref().unwrap();
        assert_eq!(tiles.data.len(), 32);
        assert_eq!(tiles.bytes_read, 5);

        let overlay = results[2].as_ref().unwrap();
        assert_eq!(overlay.data, vec![0x00]);

        match &results[3] {
            Err(RomError::Block { name, source }) => {
                assert_eq!(name, "broken");
                match source.as_ref() {
                    RomError::Decompress(failure) => {
                        assert_eq!(failure.error.kind(), "MalformedCommand")
                    }
                    other => panic!("unexpected error {other:?}"),
                }
            }
            other => panic!("unexpected result {other:?}"),
        }

        match &results[4] {
            Err(RomError::Block { source, .. }) => {
                assert!(matches!(source.as_ref(), RomError::BrokenChain(_)))
            }
            other => panic!("unexpected result {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn oversized_block() {
        let block = BlockDefinition {
            name: "huge".to_string(),
            category: None,
            offset: 0,
            length: BlockLength::Tiles(usize::MAX / 16),
            chain: false,
            max_output: None,
        };

        let result = rom().extract_block(&block, DecodeOptions::default(), Vec::new());
        assert!(matches!(result, Err(RomError::TooManyTiles(n)) if n == usize::MAX / 16));
    }

    #[test]
    fn block_budget() -> anyhow::Result<()> {
        let rom = rom();
        let map = AssetMap::parse(
            r#"
            supported_roms = []

            [[block]]
            name = "plain"
            offset = 0x00
            max_output = 2
            "#,
        )?;

        let results = rom.extract(&map, DecodeOptions::default(), |_| {});
        let Err(RomError::Block { source, .. }) = &results[0] else {
            panic!("expected the budget to be exceeded");
        };
        let RomError::Decompress(failure) = source.as_ref() else {
            panic!("unexpected error {source:?}");
        };
        assert_eq!(
            failure.error,
            DecodeError::OutputBudgetExceeded { budget: 2 }
        );
        assert_eq!(failure.partial(), &[0x11, 0x11]);

        Ok(())
    }
}
