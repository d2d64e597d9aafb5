use std::fmt;

use crate::error::ConfigError;

/// A worker's fixed position in `[0, workers)`. It selects the map, the model
/// artifact and the output files the worker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerSlot(usize);

impl WorkerSlot {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for WorkerSlot {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl TryFrom<i64> for WorkerSlot {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .map(Self)
            .map_err(|_| ConfigError::NegativeSlot(value))
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
