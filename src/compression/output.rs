use super::DecodeError;

/// Append-only output of a decode session.
///
/// Bytes can only be added at the end, but any byte already written can be read back by its
/// distance from the end. The buffer may start out with history from earlier blocks; that
/// history is readable but does not count towards the budget.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    data: Vec<u8>,
    history: usize,
    budget: Option<usize>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<u8>) -> Self {
        Self {
            history: history.len(),
            data: history,
            budget: None,
        }
    }

    /// Limit the number of bytes this buffer accepts on top of its history.
    pub fn with_budget(mut self, budget: Option<usize>) -> Self {
        self.budget = budget;
        self
    }

    pub fn append(&mut self, value: u8) -> Result<(), DecodeError> {
        if let Some(budget) = self.budget {
            if self.produced() >= budget {
                return Err(DecodeError::OutputBudgetExceeded { budget });
            }
        }

        self.data.push(value);
        Ok(())
    }

    /// Byte at `len() - distance`.
    pub fn read_at(&self, distance: usize) -> Result<u8, DecodeError> {
        if distance == 0 || distance > self.data.len() {
            return Err(DecodeError::InvalidBackReference {
                distance,
                length: self.data.len(),
            });
        }

        Ok(self.data[self.data.len() - distance])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written after the history.
    pub fn produced(&self) -> usize {
        self.data.len() - self.history
    }

    pub fn history_len(&self) -> usize {
        self.history
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Drop everything past `produced` bytes of output. Only used to cut an overshooting final
    /// operation back to a quota.
    pub(crate) fn truncate_produced(&mut self, produced: usize) {
        self.data.truncate(self.history + produced);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
