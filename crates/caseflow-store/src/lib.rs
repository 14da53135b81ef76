//! Caseflow Store - embedded persistence for the enrichment pipeline
//!
//! Owns everything that touches the database:
//! - Work items and their per-item status records (the pipeline state machine)
//! - The denormalized entity projection and per-domain detail tables
//! - The write queue: all mutations serialized through one writer task
//! - The read-only query surface shared by every step runner
//!
//! # Example
//!
//! ```rust,ignore
//! use caseflow_store::{Store, WriteOp, WorkItem};
//!
//! # async fn example() -> Result<(), caseflow_store::StoreError> {
//! let store = Store::open("cases.db")?;
//! store.queue().enqueue(WriteOp::InsertWorkItem(item))?;
//! store.queue().flush().await?;
//! let counts = store.reader().status_counts()?;
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

mod db;
pub mod entity;
pub mod error;
pub mod item;
pub mod queries;
pub mod records;
pub mod status;
pub mod writer;

pub use entity::EntityRecord;
pub use error::StoreError;
pub use item::{EntityKey, ItemId, WorkItem};
pub use queries::{FailureSample, StatusCounts, StepCompletion, StoreReader};
pub use records::{
    BusinessEntity, DeedDocument, FloodZone, LienRecord, MarketListing, PermitRecord,
    PropertyProfile, SurveyRecord, TaxStatus, TitleAnalysis, ValuationSummary,
};
pub use status::{
    allowed_transitions, validate_transition, PipelineStatus, StatusRecord, StepFlag,
};
pub use writer::{CustomWrite, WriteOp, WriteQueue};

use std::path::Path;

/// Open store: one writer task, one shared read handle
#[derive(Debug, Clone)]
pub struct Store {
    queue: WriteQueue,
    reader: StoreReader,
}

impl Store {
    /// Open (creating if needed) the database at `path` and spawn the
    /// writer task. Must be called from within a Tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let write_conn = db::open_connection(path)?;
        db::bootstrap(&write_conn)?;
        let read_conn = db::open_connection(path)?;
        Ok(Self {
            queue: WriteQueue::spawn(write_conn),
            reader: StoreReader::new(read_conn),
        })
    }

    /// Handle for mutations
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Handle for reads
    #[inline]
    #[must_use]
    pub fn reader(&self) -> &StoreReader {
        &self.reader
    }

    /// Drain the write queue and release the database
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.queue.shutdown().await
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
