//! Caseflow Pipeline - the enrichment orchestration core
//!
//! Coordinates a dozen enrichment steps per work item:
//! - Bulkhead concurrency gates per external service
//! - Phased execution ordered by data dependency, with write barriers
//! - A generic step-runner harness with idempotency short-circuits
//! - Entity-key validation gating with a party-name fallback path
//! - A top-level orchestrator driving resumable batch runs
//!
//! # Example
//!
//! ```rust,ignore
//! use caseflow_pipeline::{GateLimits, Orchestrator, RunOptions};
//!
//! # async fn example(store: &caseflow_store::Store) -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     store, steps, discovery, fallback, &GateLimits::default(), RunOptions::default(),
//! );
//! let summary = orchestrator.run().await?;
//! println!("completed {} items", summary.completed);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod gates;
pub mod orchestrator;
mod phase;
pub mod runner;
pub mod step;
pub mod summary;
pub mod validate;

pub use error::{PipelineError, SourceError, SourceResult, StepError};
pub use gates::{GateLimits, Gates, ServiceKind};
pub use orchestrator::{CaseDiscovery, Orchestrator, RunOptions};
pub use runner::{Disposition, StepReport};
pub use step::{EnrichStep, Phase, StepContext, StepDescriptor, StepOutcome};
pub use summary::{RunSummary, StepPercent};
pub use validate::{validate_entity_key, FallbackSearch, KeyVerdict, KEY_SENTINELS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
