//! Error types for the orchestration core
//!
//! Three layers, matching the failure taxonomy:
//! - `SourceError` - what a collaborator reports; always transient
//! - `StepError` - what a step runner surfaces; collaborator failures are
//!   recorded as data, store failures are fatal
//! - `PipelineError` - what aborts a run

use caseflow_store::StoreError;

/// Transient failure reported by an external collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Collaborator did not answer in time
    #[error("timeout after {0}s")]
    Timeout(u64),

    /// Collaborator reachable but refusing or erroring
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Collaborator answered with something unparseable
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Anything else the collaborator reports
    #[error("{0}")]
    Other(String),
}

/// Uniform collaborator result: data, a confirmed empty answer, or a
/// transient failure. Never a panic, never an exception.
#[derive(Debug, Clone)]
pub enum SourceResult<T> {
    /// Data obtained
    Success(T),
    /// Confirmed empty; terminal for this attempt
    NoData,
    /// Transient failure; retryable on a later run
    Failure(SourceError),
}

impl<T> SourceResult<T> {
    /// Map the success payload
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SourceResult<U> {
        match self {
            Self::Success(value) => SourceResult::Success(f(value)),
            Self::NoData => SourceResult::NoData,
            Self::Failure(err) => SourceResult::Failure(err),
        }
    }
}

/// Failure surfaced by one step runner
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The collaborator failed; recorded against the item, never
    /// propagated to sibling steps
    #[error("collaborator failure: {0}")]
    Collaborator(#[from] SourceError),

    /// The store failed; fatal to the whole run
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run-aborting failure
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Store or write queue unavailable
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A concurrency gate was closed (shutdown race)
    #[error("concurrency gate closed")]
    GateClosed,

    /// Upstream discovery failed for the requested window
    #[error("discovery failed: {0}")]
    Discovery(SourceError),

    /// A per-item worker task panicked
    #[error("worker panicked: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_result_map() {
        let ok: SourceResult<u32> = SourceResult::Success(21);
        match ok.map(|n| n * 2) {
            SourceResult::Success(n) => assert_eq!(n, 42),
            _ => panic!("expected success"),
        }

        let failed: SourceResult<u32> = SourceResult::Failure(SourceError::Timeout(30));
        assert!(matches!(
            failed.map(|n| n * 2),
            SourceResult::Failure(SourceError::Timeout(30))
        ));
    }

    #[test]
    fn step_error_from_source() {
        let err: StepError = SourceError::Unavailable("503".to_string()).into();
        assert!(err.to_string().contains("503"));
    }
}
