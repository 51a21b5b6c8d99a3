use super::{
    execute, ByteCursor, Command, DecodeError, DecodeOptions, OutputBuffer, Termination,
};
use thiserror::Error;

/// Result of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    /// Whole output buffer, including any history the session was seeded with.
    pub data: Vec<u8>,
    /// Length of the history at the start of `data`.
    pub history: usize,
    /// Number of source bytes consumed, sentinel included.
    pub bytes_read: usize,
    /// Number of commands executed, sentinel excluded.
    pub commands: usize,
}

impl Decompressed {
    /// The bytes produced by the session itself.
    pub fn output(&self) -> &[u8] {
        &self.data[self.history..]
    }

    pub fn into_output(mut self) -> Vec<u8> {
        self.data.split_off(self.history)
    }
}

/// A session that stopped on an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} (at offset {position:#x})")]
pub struct DecodeFailure {
    pub error: DecodeError,
    /// Position of the cursor in the source when the error happened.
    pub position: usize,
    /// Position of the command that was being executed, if one had been read.
    pub command_offset: Option<usize>,
    partial: Vec<u8>,
}

impl DecodeFailure {
    /// A failure before the first command was read.
    pub(crate) fn at_start(error: DecodeError, position: usize) -> Self {
        Self {
            error,
            position,
            command_offset: None,
            partial: Vec::new(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        self.error.kind()
    }

    /// Output produced before the error, without history.
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }

    pub fn into_partial(self) -> Vec<u8> {
        self.partial
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// Stopped at a sentinel command or after reaching the quota.
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Executed(Command),
    Finished,
}

/// State of one decompression call.
#[derive(Debug, Clone)]
pub struct DecodeSession<'a> {
    cursor: ByteCursor<'a>,
    output: OutputBuffer,
    options: DecodeOptions,

    /// where the block starts in the source
    start: usize,
    commands: usize,

    state: SessionState,
    /// error, cursor position and command offset of a failed session
    failure: Option<(DecodeError, usize, Option<usize>)>,
}

impl<'a> DecodeSession<'a> {
    pub fn new(
        src: &'a [u8],
        offset: usize,
        options: DecodeOptions,
    ) -> Result<Self, DecodeFailure> {
        Self::with_history(src, offset, options, Vec::new())
    }

    /// Start a session whose output already contains `history`, so back-references can reach
    /// into a previously decoded block.
    pub fn with_history(
        src: &'a [u8],
        offset: usize,
        options: DecodeOptions,
        history: Vec<u8>,
    ) -> Result<Self, DecodeFailure> {
        let cursor =
            ByteCursor::new(src, offset).map_err(|error| DecodeFailure::at_start(error, offset))?;

        Ok(Self {
            cursor,
            output: OutputBuffer::with_history(history).with_budget(options.max_output),
            options,

            start: offset,
            commands: 0,

            state: SessionState::Running,
            failure: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Read and execute a single command.
    pub fn step(&mut self) -> Result<Step, DecodeFailure> {
        match self.state {
            SessionState::Running => {}
            SessionState::Finished => return Ok(Step::Finished),
            SessionState::Failed => return Err(self.failure()),
        }

        if let Termination::Quota(quota) = self.options.termination {
            if self.output.produced() >= quota {
                self.output.truncate_produced(quota);
                self.state = SessionState::Finished;
                return Ok(Step::Finished);
            }
        }

        let offset = self.cursor.position();
        let opcode = match self.cursor.read_byte() {
            Ok(opcode) => opcode,
            Err(error) => return Err(self.fail(error, None)),
        };

        if opcode == 0x00 && self.options.termination == Termination::Sentinel {
            self.state = SessionState::Finished;
            return Ok(Step::Finished);
        }

        let command =
            match Command::decode(offset, opcode, &mut self.cursor, self.options.families) {
                Ok(command) => command,
                Err(error) => return Err(self.fail(error, Some(offset))),
            };

        log::trace!(
            "{:#07x}: {:#04x} {:?} {:?}",
            offset,
            opcode,
            command.family,
            command.operation
        );

        if let Err(error) = execute(command.operation, &mut self.cursor, &mut self.output) {
            return Err(self.fail(error, Some(offset)));
        }

        self.commands += 1;
        Ok(Step::Executed(command))
    }

    /// Run until the block terminates.
    pub fn run(mut self) -> Result<Decompressed, DecodeFailure> {
        while let Step::Executed(_) = self.step()? {}

        let bytes_read = self.cursor.position() - self.start;
        log::debug!(
            "Decompressed {:#x} bytes from {:#x} source bytes at {:#x} ({} commands)",
            self.output.produced(),
            bytes_read,
            self.start,
            self.commands
        );

        Ok(Decompressed {
            history: self.output.history_len(),
            data: self.output.into_vec(),
            bytes_read,
            commands: self.commands,
        })
    }

    fn fail(&mut self, error: DecodeError, command_offset: Option<usize>) -> DecodeFailure {
        self.state = SessionState::Failed;
        self.failure = Some((error, self.cursor.position(), command_offset));
        self.failure()
    }

    fn failure(&self) -> DecodeFailure {
        let (error, position, command_offset) = self
            .failure
            .unwrap_or((DecodeError::UnexpectedEndOfStream, self.cursor.position(), None));

        DecodeFailure {
            error,
            position,
            command_offset,
            partial: self.output.as_slice()[self.output.history_len()..].to_vec(),
        }
    }
}

/// Decode a run of blocks where every block is seeded with the output of all blocks before it.
///
/// The returned blocks carry only their own bytes.
pub fn decompress_chained(
    src: &[u8],
    blocks: &[(usize, Termination)],
    options: DecodeOptions,
) -> Result<Vec<Decompressed>, DecodeFailure> {
    let mut history = Vec::new();
    let mut decoded = Vec::with_capacity(blocks.len());

    for &(offset, termination) in blocks {
        let options = options.with_termination(termination);
        let result = DecodeSession::with_history(src, offset, options, history)?.run()?;

        decoded.push(Decompressed {
            data: result.output().to_vec(),
            history: 0,
            bytes_read: result.bytes_read,
            commands: result.commands,
        });
        history = result.data;
    }

    Ok(decoded)
}
