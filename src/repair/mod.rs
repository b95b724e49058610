//! Repair stages and the pipeline that runs them.
//!
//! Each stage works on the scratch tree by key, records what it did on the
//! report and returns a [`StageOutcome`]. A stage never aborts the run.

pub mod clean;
pub mod fallback;
pub mod metadata;
mod pipeline;
pub mod sanitize;

pub use fallback::FallbackState;
pub use pipeline::{repair_file, Repairer};
pub use sanitize::{sanitize, SanitizeResult};

/// Result of running one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Nothing to do, or the stage was disabled
    Skipped,
    /// The stage changed the scratch tree
    Repaired,
    /// The stage ran into an error it recorded on the report
    Failed,
}

impl StageOutcome {
    /// Combine the outcomes of several steps: any failure wins, then any repair.
    pub fn merge(self, other: StageOutcome) -> StageOutcome {
        use StageOutcome::*;
        match (self, other) {
            (Failed, _) | (_, Failed) => Failed,
            (Repaired, _) | (_, Repaired) => Repaired,
            _ => Skipped,
        }
    }
}
