//! Run summaries
//!
//! A run reports counts by terminal state, per-step completion
//! percentages, and a bounded sample of recent failures. Individual item
//! failures are data here, not process errors.

use caseflow_store::{FailureSample, StatusCounts, StoreError, StoreReader};
use serde::{Deserialize, Serialize};

/// How many recent failures a summary carries
const FAILURE_SAMPLE_LIMIT: usize = 10;

/// Completion percentage for one step across all tracked items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPercent {
    /// Step number
    pub step_number: u32,
    /// Step name as recorded
    pub step_name: String,
    /// Items with the flag set
    pub completed: u64,
    /// Items tracked in total
    pub total: u64,
}

impl StepPercent {
    /// Completion as a percentage of all tracked items
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// What one orchestrator run did and where the backlog stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Whether this was a dry run (nothing claimed, nothing written)
    pub dry_run: bool,
    /// New work items inserted by discovery
    pub discovered: usize,
    /// Items this run claimed (or would claim, for dry runs)
    pub claimed: usize,
    /// Items this run completed
    pub completed: usize,
    /// Items this run failed
    pub failed: usize,
    /// Items this run skipped permanently
    pub skipped: usize,
    /// Whole-store counts by status after the run
    pub status_counts: StatusCounts,
    /// Per-step completion across all items
    pub steps: Vec<StepPercent>,
    /// Bounded sample of the most recent failures
    pub failures: Vec<FailureSample>,
}

impl RunSummary {
    /// Assemble a summary from run tallies plus the store's current state
    pub fn collect(
        reader: &StoreReader,
        dry_run: bool,
        discovered: usize,
        claimed: usize,
        completed: usize,
        failed: usize,
        skipped: usize,
    ) -> Result<Self, StoreError> {
        let status_counts = reader.status_counts()?;
        let total = status_counts.total();
        let steps = reader
            .step_completion()?
            .into_iter()
            .map(|tally| StepPercent {
                step_number: tally.step_number,
                step_name: tally.step_name,
                completed: tally.completed,
                total,
            })
            .collect();
        Ok(Self {
            dry_run,
            discovered,
            claimed,
            completed,
            failed,
            skipped,
            status_counts,
            steps,
            failures: reader.recent_failures(FAILURE_SAMPLE_LIMIT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_empty_store() {
        let step = StepPercent {
            step_number: 1,
            step_name: "tax_status".to_string(),
            completed: 0,
            total: 0,
        };
        assert_eq!(step.percent(), 0.0);
    }

    #[test]
    fn percent_is_proportional() {
        let step = StepPercent {
            step_number: 1,
            step_name: "tax_status".to_string(),
            completed: 3,
            total: 4,
        };
        assert!((step.percent() - 75.0).abs() < f64::EPSILON);
    }
}
