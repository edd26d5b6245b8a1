use std::fmt::{self, Display};

use grove_core::{ChromRegion, RegionError};
use thiserror::Error;

/// One failed sub-range of a batch insert, with up to three of the entries
/// that were pending for it.
#[derive(Debug, Clone)]
pub struct InsertFailure {
    pub range: ChromRegion,
    pub message: String,
    pub entries: Vec<String>,
}

impl Display for InsertFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.range, self.message)?;
        if !self.entries.is_empty() {
            write!(f, " (entries: {})", self.entries.join(", "))?;
        }
        Ok(())
    }
}

/// The collected failures of a batch insert, one line per sub-range.
#[derive(Debug, Clone)]
pub struct InsertFailures(pub Vec<InsertFailure>);

impl Display for InsertFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "insert failed for {} sub-range(s):", self.0.len())?;
        for failure in &self.0 {
            writeln!(f, "  {}", failure)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Data not ready for {0}")]
    DataNotReady(ChromRegion),

    #[error("Invalid tree configuration: {0}")]
    InvalidConfig(String),

    /// Internal signal: a subtree cannot be balanced with local
    /// rearrangement only. Caught by the nearest ancestor during
    /// restructuring and never escapes the root.
    #[error("Cannot balance subtree locally")]
    CannotBalance,

    #[error("Continued-list entry {0} is missing from the loaded region covering its start")]
    InconsistentContinuedList(String),

    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    #[error("{0}")]
    AggregatedInsert(InsertFailures),

    #[error(transparent)]
    Region(#[from] RegionError),
}
