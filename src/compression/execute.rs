use super::{ByteCursor, DecodeError, Operation, OutputBuffer};

/// Apply one operation. Literal data is read from `cursor`.
///
/// Bytes appended before a failure stay in `output`.
pub fn execute(
    operation: Operation,
    cursor: &mut ByteCursor,
    output: &mut OutputBuffer,
) -> Result<(), DecodeError> {
    match operation {
        Operation::Literal { count } => {
            for _ in 0..count {
                let value = cursor.read_byte()?;
                output.append(value)?;
            }
        }
        Operation::ZeroFill { count } => fill(output, count, 0)?,
        Operation::ByteFill { count, value } => fill(output, count, value)?,
        Operation::BackReference { offset, count } => {
            // the source is looked up again for every byte so that an offset shorter than
            // the count repeats what this very copy has just written
            for _ in 0..count {
                let value = output.read_at(offset)?;
                output.append(value)?;
            }
        }
    }

    Ok(())
}

fn fill(output: &mut OutputBuffer, count: usize, value: u8) -> Result<(), DecodeError> {
    for _ in 0..count {
        output.append(value)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(operation: Operation, input: &[u8], history: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut cursor = ByteCursor::new(input, 0).unwrap();
        let mut output = OutputBuffer::with_history(history.to_vec());
        execute(operation, &mut cursor, &mut output)?;
        Ok(output.as_slice()[history.len()..].to_vec())
    }

    #[test]
    fn literal() {
        assert_eq!(
            run(Operation::Literal { count: 2 }, &[9, 8, 7], &[]),
            Ok(vec![9, 8])
        );
    }

    #[test]
    fn literal_past_end_keeps_partial() {
        let mut cursor = ByteCursor::new(&[1, 2], 0).unwrap();
        let mut output = OutputBuffer::new();

        let result = execute(Operation::Literal { count: 4 }, &mut cursor, &mut output);
        assert_eq!(result, Err(DecodeError::UnexpectedEndOfStream));
        assert_eq!(output.as_slice(), &[1, 2]);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn fills() {
        assert_eq!(run(Operation::ZeroFill { count: 3 }, &[], &[5]), Ok(vec![0; 3]));
        assert_eq!(
            run(Operation::ByteFill { count: 2, value: 0x7e }, &[], &[]),
            Ok(vec![0x7e, 0x7e])
        );
    }

    #[test]
    fn overlapping_back_reference_repeats() {
        assert_eq!(
            run(
                Operation::BackReference { offset: 1, count: 5 },
                &[],
                &[0x42]
            ),
            Ok(vec![0x42; 5])
        );
        assert_eq!(
            run(
                Operation::BackReference { offset: 3, count: 7 },
                &[],
                &[1, 2, 3]
            ),
            Ok(vec![1, 2, 3, 1, 2, 3, 1])
        );
    }

    #[test]
    fn back_reference_before_start() {
        assert_eq!(
            run(Operation::BackReference { offset: 3, count: 1 }, &[], &[1, 2]),
            Err(DecodeError::InvalidBackReference {
                distance: 3,
                length: 2
            })
        );
    }

    #[test]
    fn budget_stops_fill() {
        let mut cursor = ByteCursor::new(&[], 0).unwrap();
        let mut output = OutputBuffer::new().with_budget(Some(4));

        let result = execute(Operation::ZeroFill { count: 16 }, &mut cursor, &mut output);
        assert_eq!(result, Err(DecodeError::OutputBudgetExceeded { budget: 4 }));
        assert_eq!(output.len(), 4);
    }
}
