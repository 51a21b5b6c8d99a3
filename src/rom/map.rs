use serde::{
    de::{self, Visitor},
    Deserialize,
};
use std::{collections::HashSet, fmt};
use thiserror::Error;

use super::Rom;
use crate::compression::Termination;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Failed to parse asset map")]
    Parse(#[from] toml::de::Error),
    #[error("Block name {0} is used more than once")]
    DuplicateName(String),
    #[error("Block {0} is chained but has no block before it")]
    DanglingChain(String),
}

/// Describes where the compressed blocks of a ROM live.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetMap {
    pub supported_roms: Vec<RomMetadata>,

    #[serde(rename = "block", default)]
    pub blocks: Vec<BlockDefinition>,
}

impl AssetMap {
    pub fn parse(map: &str) -> Result<AssetMap, MapError> {
        let map: AssetMap = toml::de::from_str(map)?;

        let mut names = HashSet::new();
        for block in &map.blocks {
            if !names.insert(block.name.as_str()) {
                return Err(MapError::DuplicateName(block.name.clone()));
            }
        }

        if let Some(first) = map.blocks.first().filter(|block| block.chain) {
            return Err(MapError::DanglingChain(first.name.clone()));
        }

        Ok(map)
    }

    pub fn metadata_for(&self, rom: &Rom) -> Option<&RomMetadata> {
        self.supported_roms
            .iter()
            .find(|rom_type| rom_type.crc == rom.crc())
    }

    pub fn is_compatible_with(&self, rom: &Rom) -> bool {
        self.metadata_for(rom).is_some()
    }

    /// Split the blocks into runs that have to be decoded in order. A run starts at every block
    /// that is not chained to its predecessor.
    pub fn chains(&self) -> Vec<&[BlockDefinition]> {
        let mut chains = Vec::new();
        let mut start = 0;

        for (i, block) in self.blocks.iter().enumerate().skip(1) {
            if !block.chain {
                chains.push(&self.blocks[start..i]);
                start = i;
            }
        }

        if start < self.blocks.len() {
            chains.push(&self.blocks[start..]);
        }

        chains
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RomMetadata {
    pub name: String,
    pub crc: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub category: Option<String>,

    pub offset: usize,
    #[serde(default)]
    pub length: BlockLength,

    /// Seed the decoder with the output of the preceding blocks
    #[serde(default)]
    pub chain: bool,

    #[serde(default)]
    pub max_output: Option<usize>,
}

/// How the end of a block is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockLength {
    /// `"sentinel"`
    #[default]
    Sentinel,
    /// `"header"`: a big-endian tile count precedes the block
    Header,
    /// a plain integer
    Tiles(usize),
    /// `{ bytes = n }`
    Bytes(usize),
}

impl<'de> Deserialize<'de> for BlockLength {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(BlockLengthVisitor)
    }
}

struct BlockLengthVisitor;

impl<'de> Visitor<'de> for BlockLengthVisitor {
    type Value = BlockLength;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("\"sentinel\", \"header\", a tile count or a table with `bytes`")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "sentinel" => Ok(BlockLength::Sentinel),
            "header" => Ok(BlockLength::Header),
            other => Err(de::Error::unknown_variant(other, &["sentinel", "header"])),
        }
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let tiles = usize::try_from(value)
            .map_err(|_| de::Error::custom("Tile count must not be negative"))?;
        tile_count(tiles)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let tiles =
            usize::try_from(value).map_err(|_| de::Error::custom("Tile count is too large"))?;
        tile_count(tiles)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let mut bytes = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "bytes" => {
                    if bytes.is_some() {
                        return Err(de::Error::duplicate_field("bytes"));
                    }
                    bytes = Some(map.next_value::<usize>()?);
                }
                other => return Err(de::Error::unknown_field(other, &["bytes"])),
            }
        }

        bytes
            .map(BlockLength::Bytes)
            .ok_or_else(|| de::Error::missing_field("bytes"))
    }
}

fn tile_count<E: de::Error>(tiles: usize) -> Result<BlockLength, E> {
    match Termination::tiles(tiles) {
        Some(_) => Ok(BlockLength::Tiles(tiles)),
        None => Err(de::Error::custom(format!("{tiles} tiles is too large"))),
    }
}
