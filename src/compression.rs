mod command;
mod cursor;
mod decompress;
mod error;
mod execute;
mod output;

pub use command::Command;
pub use cursor::ByteCursor;
pub use decompress::{
    decompress_chained, DecodeFailure, DecodeSession, Decompressed, SessionState, Step,
};
pub use error::{DecodeError, MalformedReason};
pub use execute::execute;
pub use output::OutputBuffer;

/// Size of a single 4bpp Genesis tile in bytes.
pub const TILE_SIZE: usize = 32;

/// Output cap used when the caller does not configure one. Matches the size of VRAM.
pub const DEFAULT_MAX_OUTPUT: usize = 0x10000;

/// A single decoded instruction. Produced by [`Operation::decode`] and applied by [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Copy `count` raw bytes from the stream.
    Literal { count: usize },
    /// Append `count` zero bytes.
    ZeroFill { count: usize },
    /// Append `count` copies of `value`.
    ByteFill { count: usize, value: u8 },
    /// Append `count` bytes, each taken from `offset` bytes behind the end of the output
    /// at the time it is appended.
    BackReference { offset: usize, count: usize },
}

impl Operation {
    /// Number of bytes this operation appends to the output.
    pub const fn output_len(&self) -> usize {
        match *self {
            Operation::Literal { count }
            | Operation::ZeroFill { count }
            | Operation::ByteFill { count, .. }
            | Operation::BackReference { count, .. } => count,
        }
    }
}

/// The command family selected by the high nibble of a command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// `0x0_`, `0x1_`
    Literal,
    /// `0x2_`
    ZeroFill,
    /// `0x3_`
    ByteFill,
    /// `0x5_`: offset and count packed into the low nibble
    ShortBackReference,
    /// `0x8_`, `0x9_`: offset in the following byte
    ByteOffsetBackReference,
    /// `0xA_`: 10 bit offset
    WideBackReference,
    /// `0xB_`: byte offset, long count
    LongBackReference,
    /// `0xC_`, `0xD_`: no operand, fixed distance of one or two tiles
    FixedBackReference,
    /// `0xE_`: 12 bit offset
    FarBackReference,
}

impl Family {
    /// Whether the bit layout of this family has been checked against known-good tile output.
    /// Everything from `0xA_` upwards is still a best guess.
    pub const fn is_validated(&self) -> bool {
        matches!(
            self,
            Family::Literal
                | Family::ZeroFill
                | Family::ByteFill
                | Family::ShortBackReference
                | Family::ByteOffsetBackReference
        )
    }
}

/// How a session decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// Stop at a `0x00` command byte.
    #[default]
    Sentinel,
    /// Stop once this many bytes have been produced. `0x00` is an ordinary literal here.
    Quota(usize),
}

impl Termination {
    /// Quota for `tiles` full tiles, or `None` if their size does not fit in a `usize`.
    pub fn tiles(tiles: usize) -> Option<Self> {
        tiles.checked_mul(TILE_SIZE).map(Termination::Quota)
    }
}

/// What to do with the `0xA_`..`0xF_` families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedFamilies {
    /// Treat them as malformed commands.
    #[default]
    Reject,
    /// Decode `0xA_`..`0xE_` with unconfirmed layouts. Output may be wrong.
    Provisional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub termination: Termination,
    /// Upper bound on the number of bytes a session may produce. `None` disables the check.
    pub max_output: Option<usize>,
    pub families: ExtendedFamilies,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            termination: Termination::default(),
            max_output: Some(DEFAULT_MAX_OUTPUT),
            families: ExtendedFamilies::default(),
        }
    }
}

impl DecodeOptions {
    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_max_output(mut self, max_output: Option<usize>) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn with_families(mut self, families: ExtendedFamilies) -> Self {
        self.families = families;
        self
    }
}

/// Decompress a block starting at `offset`, stopping at the sentinel command.
pub fn decompress(src: &[u8], offset: usize) -> Result<Decompressed, DecodeFailure> {
    DecodeSession::new(src, offset, DecodeOptions::default())?.run()
}

/// Decompress a block of `tiles` tiles starting at `offset`.
///
/// A tile count too large to address fails with [`DecodeError::OutputBudgetExceeded`] before
/// anything is read, since no such block fits under the default budget.
pub fn decompress_tiles(
    src: &[u8],
    offset: usize,
    tiles: usize,
) -> Result<Decompressed, DecodeFailure> {
    let termination = Termination::tiles(tiles).ok_or_else(|| {
        let budget = DEFAULT_MAX_OUTPUT;
        DecodeFailure::at_start(DecodeError::OutputBudgetExceeded { budget }, offset)
    })?;

    let options = DecodeOptions::default().with_termination(termination);
    DecodeSession::new(src, offset, options)?.run()
}
