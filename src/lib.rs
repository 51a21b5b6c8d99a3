pub mod compression;
pub use compression::{
    decompress, decompress_tiles, DecodeError, DecodeFailure, DecodeOptions, DecodeSession,
    Decompressed, ExtendedFamilies, Termination,
};

mod tile;
pub use tile::{ColorIndex, Tile, TileError, TileSet};

mod rom;
pub use rom::{
    AssetMap, BlockDefinition, BlockLength, ExtractedBlock, MapError, Rom, RomError, RomMetadata,
    HEADER_SIZE,
};
