use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("Malformed command {command:#04x}: {reason}")]
    MalformedCommand { command: u8, reason: MalformedReason },
    #[error("Back-reference distance {distance} is outside of the {length} bytes written so far")]
    InvalidBackReference { distance: usize, length: usize },
    #[error("Output exceeded the budget of {budget:#x} bytes")]
    OutputBudgetExceeded { budget: usize },
}

impl DecodeError {
    /// Short name of the error kind, as printed by the command line driver.
    pub const fn kind(&self) -> &'static str {
        match self {
            DecodeError::UnexpectedEndOfStream => "UnexpectedEndOfStream",
            DecodeError::MalformedCommand { .. } => "MalformedCommand",
            DecodeError::InvalidBackReference { .. } => "InvalidBackReference",
            DecodeError::OutputBudgetExceeded { .. } => "OutputBudgetExceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// No family is assigned to this command
    Unrecognised,
    /// The family exists but its layout is provisional and was not enabled
    Provisional,
    /// An operand byte was missing at the end of the stream
    TruncatedOperand,
    ZeroOffset,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MalformedReason::Unrecognised => "unrecognised command",
            MalformedReason::Provisional => "provisional command family is disabled",
            MalformedReason::TruncatedOperand => "operand missing at end of stream",
            MalformedReason::ZeroOffset => "back-reference offset of zero",
        })
    }
}
