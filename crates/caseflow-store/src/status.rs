//! Per-item pipeline status and the status state machine
//!
//! Status moves forward only: `pending -> processing -> {completed, failed,
//! skipped}`, with the single backward edge `failed -> pending` used when a
//! later run reclaims a retryable item. `skipped` and `completed` are
//! terminal forever.

use crate::error::StoreError;
use crate::item::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline status of one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Discovered, not yet claimed
    Pending,
    /// Claimed by a running orchestrator
    Processing,
    /// All applicable steps finished
    Completed,
    /// At least one step failed; reclaimable while retries remain
    Failed,
    /// Permanently unusable input; never reclaimed
    Skipped,
}

impl PipelineStatus {
    /// Stable text form used in the database
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown pipeline status: {other}")),
        }
    }
}

/// Statuses reachable from `from` in one transition
pub fn allowed_transitions(from: PipelineStatus) -> &'static [PipelineStatus] {
    use PipelineStatus::*;
    match from {
        Pending => &[Processing, Skipped],
        Processing => &[Completed, Failed, Skipped],
        Failed => &[Pending, Processing],
        Completed => &[],
        Skipped => &[],
    }
}

/// Validates a status transition.
///
/// Illegal transitions are errors, not panics: a raced claim or a stale
/// reclaim is a normal runtime condition the caller handles.
pub fn validate_transition(
    from: PipelineStatus,
    to: PipelineStatus,
) -> Result<(), StoreError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition { from, to })
    }
}

/// Persisted progress record, one per work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Item this record belongs to
    pub item_id: ItemId,
    /// Current pipeline status
    pub pipeline_status: PipelineStatus,
    /// Step number last touched by the runner
    pub current_step: Option<u32>,
    /// Most recent failure text (truncated)
    pub last_error: Option<String>,
    /// Step number the most recent failure occurred at
    pub error_step: Option<u32>,
    /// Failed attempts so far
    pub retry_count: u32,
    /// Set exactly once, when the item completes
    pub completed_at: Option<DateTime<Utc>>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// Forward-only completion flag for one step of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFlag {
    /// Step number (1-based, stable across runs)
    pub step_number: u32,
    /// Step name at the time the flag was set
    pub step_name: String,
    /// When the step completed
    pub completed_at: DateTime<Utc>,
}
