use super::{ByteCursor, DecodeError, ExtendedFamilies, Family, MalformedReason, Operation};

/// A command as it was read from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Position of the command byte in the source.
    pub offset: usize,
    pub opcode: u8,
    pub family: Family,
    pub operation: Operation,
}

impl Command {
    /// Decode the command whose byte `opcode` was just read from `offset`. Operand bytes are
    /// consumed from `cursor`; literal data is left for the executor.
    pub fn decode(
        offset: usize,
        opcode: u8,
        cursor: &mut ByteCursor,
        families: ExtendedFamilies,
    ) -> Result<Self, DecodeError> {
        let (family, operation) = Operation::decode(opcode, cursor, families)?;

        Ok(Self {
            offset,
            opcode,
            family,
            operation,
        })
    }
}

impl Operation {
    pub fn decode(
        op: u8,
        cursor: &mut ByteCursor,
        families: ExtendedFamilies,
    ) -> Result<(Family, Self), DecodeError> {
        let low = usize::from(op & 0x0f);

        let decoded = match op {
            0x00..0x10 => (Family::Literal, Self::Literal { count: low + 1 }),
            0x10..0x20 => (Family::Literal, Self::Literal { count: low + 17 }),
            0x20..0x30 => (Family::ZeroFill, Self::ZeroFill { count: low + 1 }),
            0x30..0x40 => (
                Family::ByteFill,
                Self::ByteFill {
                    count: low + 1,
                    value: operand(op, cursor)?,
                },
            ),
            0x50..0x60 => (
                Family::ShortBackReference,
                Self::BackReference {
                    offset: (low >> 2) + 1,
                    count: (low & 0x03) + 1,
                },
            ),
            0x80..0xa0 => (
                Family::ByteOffsetBackReference,
                Self::decode_byte_offset(op, low + 1, cursor)?,
            ),
            0xa0..0xf0 => {
                if families == ExtendedFamilies::Reject {
                    return Err(malformed(op, MalformedReason::Provisional));
                }

                Self::decode_provisional(op, cursor)?
            }
            _ => return Err(malformed(op, MalformedReason::Unrecognised)),
        };

        Ok(decoded)
    }

    fn decode_byte_offset(
        op: u8,
        count: usize,
        cursor: &mut ByteCursor,
    ) -> Result<Self, DecodeError> {
        let offset = usize::from(operand(op, cursor)?);
        if offset == 0 {
            return Err(malformed(op, MalformedReason::ZeroOffset));
        }

        Ok(Self::BackReference { offset, count })
    }

    // None of these layouts has been matched against real tile data yet.
    fn decode_provisional(
        op: u8,
        cursor: &mut ByteCursor,
    ) -> Result<(Family, Self), DecodeError> {
        let low = usize::from(op & 0x0f);

        let decoded = match op & 0xf0 {
            0xa0 => {
                let lower = usize::from(operand(op, cursor)?);
                let offset = (((low & 0x03) << 8) | lower) + 1;
                let count = (low >> 2) + 2;

                (Family::WideBackReference, Self::BackReference { offset, count })
            }
            0xb0 => (
                Family::LongBackReference,
                Self::decode_byte_offset(op, low + 17, cursor)?,
            ),
            0xc0 => (
                Family::FixedBackReference,
                Self::BackReference {
                    offset: 32,
                    count: low + 1,
                },
            ),
            0xd0 => (
                Family::FixedBackReference,
                Self::BackReference {
                    offset: 64,
                    count: low + 1,
                },
            ),
            _ => {
                let lower = usize::from(operand(op, cursor)?);
                let offset = ((low << 8) | lower) + 1;

                (
                    Family::FarBackReference,
                    Self::BackReference { offset, count: 3 },
                )
            }
        };

        Ok(decoded)
    }
}

fn operand(op: u8, cursor: &mut ByteCursor) -> Result<u8, DecodeError> {
    cursor
        .read_byte()
        .map_err(|_| malformed(op, MalformedReason::TruncatedOperand))
}

fn malformed(command: u8, reason: MalformedReason) -> DecodeError {
    DecodeError::MalformedCommand { command, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<(Family, Operation), DecodeError> {
        decode_with(bytes, ExtendedFamilies::Provisional)
    }

    fn decode_with(
        bytes: &[u8],
        families: ExtendedFamilies,
    ) -> Result<(Family, Operation), DecodeError> {
        let mut cursor = ByteCursor::new(bytes, 1).unwrap();
        Operation::decode(bytes[0], &mut cursor, families)
    }

    #[test]
    fn literal_counts() {
        assert_eq!(decode(&[0x00]), Ok((Family::Literal, Operation::Literal { count: 1 })));
        assert_eq!(decode(&[0x0f]), Ok((Family::Literal, Operation::Literal { count: 16 })));
        assert_eq!(decode(&[0x10]), Ok((Family::Literal, Operation::Literal { count: 17 })));
        assert_eq!(decode(&[0x1f]), Ok((Family::Literal, Operation::Literal { count: 32 })));
    }

    #[test]
    fn fills() {
        assert_eq!(
            decode(&[0x24]),
            Ok((Family::ZeroFill, Operation::ZeroFill { count: 5 }))
        );
        assert_eq!(
            decode(&[0x33, 0xaa]),
            Ok((Family::ByteFill, Operation::ByteFill { count: 4, value: 0xaa }))
        );
    }

    #[test]
    fn short_back_reference_fields() {
        assert_eq!(
            decode(&[0x55]),
            Ok((
                Family::ShortBackReference,
                Operation::BackReference { offset: 2, count: 2 }
            ))
        );
        assert_eq!(
            decode(&[0x5e]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 4, count: 3 })
        );
        assert_eq!(
            decode(&[0x50]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 1, count: 1 })
        );
    }

    #[test]
    fn byte_offset_back_reference() {
        assert_eq!(
            decode(&[0x81, 0x03]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 3, count: 2 })
        );
        assert_eq!(
            decode(&[0x90, 0x02]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 2, count: 1 })
        );
        assert_eq!(
            decode(&[0x8f, 0xff]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 255, count: 16 })
        );
    }

    #[test]
    fn zero_offset_is_malformed() {
        assert_eq!(
            decode(&[0x82, 0x00]),
            Err(DecodeError::MalformedCommand {
                command: 0x82,
                reason: MalformedReason::ZeroOffset
            })
        );
    }

    #[test]
    fn truncated_operand() {
        for op in [0x30, 0x85, 0x9f, 0xa0, 0xb3, 0xe1] {
            assert_eq!(
                decode(&[op]),
                Err(DecodeError::MalformedCommand {
                    command: op,
                    reason: MalformedReason::TruncatedOperand
                }),
                "command {op:#04x}"
            );
        }
    }

    #[test]
    fn unassigned_commands() {
        for op in [0x40, 0x4f, 0x60, 0x7f, 0xf0, 0xff] {
            assert_eq!(
                decode(&[op, 0x01]),
                Err(DecodeError::MalformedCommand {
                    command: op,
                    reason: MalformedReason::Unrecognised
                }),
                "command {op:#04x}"
            );
        }
    }

    #[test]
    fn provisional_layouts() {
        assert_eq!(
            decode(&[0xa7, 0x10]),
            Ok((
                Family::WideBackReference,
                Operation::BackReference { offset: 0x311, count: 3 }
            ))
        );
        assert_eq!(
            decode(&[0xb2, 0x08]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 8, count: 19 })
        );
        assert_eq!(
            decode(&[0xc2]),
            Ok((
                Family::FixedBackReference,
                Operation::BackReference { offset: 32, count: 3 }
            ))
        );
        assert_eq!(
            decode(&[0xd0]).map(|(_, op)| op),
            Ok(Operation::BackReference { offset: 64, count: 1 })
        );
        assert_eq!(
            decode(&[0xe1, 0x00]),
            Ok((
                Family::FarBackReference,
                Operation::BackReference { offset: 0x101, count: 3 }
            ))
        );
    }

    #[test]
    fn provisional_rejected() {
        for op in [0xa0, 0xb0, 0xc0, 0xd0, 0xe0] {
            assert_eq!(
                decode_with(&[op, 0x01], ExtendedFamilies::Reject),
                Err(DecodeError::MalformedCommand {
                    command: op,
                    reason: MalformedReason::Provisional
                })
            );
        }

        assert!(decode_with(&[0x81, 0x01], ExtendedFamilies::Reject).is_ok());
    }

    #[test]
    fn operands_are_consumed() {
        let bytes = [0x33, 0xaa, 0x55];
        let mut cursor = ByteCursor::new(&bytes, 1).unwrap();
        Operation::decode(0x33, &mut cursor, ExtendedFamilies::Provisional).unwrap();
        assert_eq!(cursor.position(), 2);

        let command = Command::decode(2, 0x55, &mut cursor, ExtendedFamilies::Provisional).unwrap();
        assert_eq!(command.offset, 2);
        assert_eq!(command.family, Family::ShortBackReference);
        assert_eq!(cursor.position(), 2);
    }
}
