use super::DecodeError;

/// Forward-only reader over the compressed input.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    src: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    /// Fails if `start` lies past the end of `src`.
    pub fn new(src: &'a [u8], start: usize) -> Result<Self, DecodeError> {
        if start > src.len() {
            return Err(DecodeError::UnexpectedEndOfStream);
        }

        Ok(Self {
            src,
            position: start,
        })
    }

    /// Read the next byte. The position is left untouched on failure.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let value = self.peek().ok_or(DecodeError::UnexpectedEndOfStream)?;
        self.position += 1;
        Ok(value)
    }

    pub fn peek(&self) -> Option<u8> {
        self.src.get(self.position).copied()
    }

    pub fn bytes_remaining(&self) -> usize {
        self.src.len() - self.position
    }

    /// Absolute position inside the source slice.
    pub fn position(&self) -> usize {
        self.position
    }
}
