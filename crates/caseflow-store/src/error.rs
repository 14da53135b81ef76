//! Error types for the caseflow store
//!
//! Covers persistence failures, serialization failures, and illegal
//! pipeline-status transitions. Persistence and writer-channel errors are
//! fatal to a run; transition errors are decisions callers act on.

use crate::status::PipelineStatus;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// JSON column (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Status transition not permitted by the state machine
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: PipelineStatus,
        /// Requested status
        to: PipelineStatus,
    },

    /// Work item has no status record
    #[error("work item not found: {0}")]
    ItemNotFound(String),

    /// Write queue has shut down
    #[error("write queue closed")]
    WriterClosed,
}

impl StoreError {
    /// Whether this error means the store itself is unusable.
    ///
    /// Fatal errors abort a run; non-fatal ones are decisions
    /// (illegal transition, missing item) the caller handles.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Serialization(_) | Self::WriterClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_display() {
        let err = StoreError::IllegalTransition {
            from: PipelineStatus::Skipped,
            to: PipelineStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "illegal status transition: skipped -> pending"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn writer_closed_is_fatal() {
        assert!(StoreError::WriterClosed.is_fatal());
    }
}
