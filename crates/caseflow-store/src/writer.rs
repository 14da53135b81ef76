//! Write queue: single-writer serialization over the embedded store
//!
//! Every mutation flows through one queue drained by one writer task that
//! owns the write connection. Concurrent step runners never touch the
//! database directly for writes, which keeps the embedded store free of
//! write-write contention.
//!
//! Two delivery modes:
//! - [`WriteQueue::enqueue`] is fire-and-forget, applied strictly in enqueue
//!   order.
//! - [`WriteQueue::execute_with_result`] blocks the caller until the
//!   operation has been applied and returns its result. `flush` is the
//!   degenerate case used as the inter-phase barrier.
//!
//! Shutdown drains everything already queued before releasing the
//! connection.

use crate::error::StoreError;
use crate::item::{EntityKey, ItemId, WorkItem};
use crate::records::{
    BusinessEntity, DeedDocument, FloodZone, LienRecord, MarketListing, PermitRecord,
    PropertyProfile, SurveyRecord, TaxStatus, TitleAnalysis, ValuationSummary,
};
use crate::status::{validate_transition, PipelineStatus};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Error text longer than this is truncated before persisting
const MAX_ERROR_LEN: usize = 500;

/// One-off mutation applied by the writer task
pub type CustomWrite = Box<dyn FnOnce(&Connection) -> Result<(), StoreError> + Send + 'static>;

/// The closed registry of named mutations, plus one escape hatch
pub enum WriteOp {
    /// Insert a discovered work item and its pending status record.
    /// Idempotent: re-discovered items are ignored.
    InsertWorkItem(WorkItem),
    /// Claim an item: validated transition to `processing`
    MarkProcessing {
        /// Item to claim
        item_id: ItemId,
    },
    /// Set a step's forward-only completion flag
    MarkStepComplete {
        /// Item the step ran for
        item_id: ItemId,
        /// Step number
        step_number: u32,
        /// Step name recorded alongside the flag
        step_name: String,
    },
    /// Record a step failure: increments `retry_count`, status `failed`
    MarkFailed {
        /// Item that failed
        item_id: ItemId,
        /// Diagnostic text (truncated to 500 chars)
        reason: String,
        /// Step the failure occurred at
        step_number: u32,
    },
    /// Permanently skip an item. Never reclaimed.
    MarkSkipped {
        /// Item to skip
        item_id: ItemId,
        /// Diagnostic reason
        reason: String,
    },
    /// Terminal success; sets `completed_at` exactly once
    MarkCompleted {
        /// Item that finished
        item_id: ItemId,
    },
    /// Save county tax standing onto the entity
    UpdateTaxStatus {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        tax: TaxStatus,
    },
    /// Upsert market listings for the entity
    SaveMarketListings {
        /// Entity the listings belong to
        entity_key: EntityKey,
        /// Payload rows
        listings: Vec<MarketListing>,
    },
    /// Apply the assessor profile (may set the canonical key)
    UpdateProfile {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        profile: PropertyProfile,
    },
    /// Save the flood designation
    UpdateFloodZone {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        flood: FloodZone,
    },
    /// Upsert permits for the entity
    SavePermits {
        /// Entity the permits belong to
        entity_key: EntityKey,
        /// Payload rows
        permits: Vec<PermitRecord>,
    },
    /// Save the business-registry match
    UpdateRegistry {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        entity: BusinessEntity,
    },
    /// Save the recorded survey
    UpdateSurvey {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        survey: SurveyRecord,
    },
    /// Insert recorded instruments (immutable; duplicates ignored)
    SaveDocuments {
        /// Entity the documents belong to
        entity_key: EntityKey,
        /// Payload rows
        documents: Vec<DeedDocument>,
    },
    /// Upsert liens, including survival determinations
    SaveLiens {
        /// Entity the liens belong to
        entity_key: EntityKey,
        /// Payload rows
        liens: Vec<LienRecord>,
    },
    /// Record the chain-of-title analysis and stamp `last_analyzed_item`
    RecordAnalysis {
        /// Entity analyzed
        entity_key: EntityKey,
        /// Work item the analysis ran under
        item_id: ItemId,
        /// Payload
        analysis: TitleAnalysis,
    },
    /// Save the derived valuation
    UpdateValuation {
        /// Entity to update
        entity_key: EntityKey,
        /// Payload
        valuation: ValuationSummary,
    },
    /// Long-tail one-off mutation
    Custom(CustomWrite),
    /// No-op used as a synchronization barrier
    Flush,
}

impl WriteOp {
    /// Variant name, for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertWorkItem(_) => "insert_work_item",
            Self::MarkProcessing { .. } => "mark_processing",
            Self::MarkStepComplete { .. } => "mark_step_complete",
            Self::MarkFailed { .. } => "mark_failed",
            Self::MarkSkipped { .. } => "mark_skipped",
            Self::MarkCompleted { .. } => "mark_completed",
            Self::UpdateTaxStatus { .. } => "update_tax_status",
            Self::SaveMarketListings { .. } => "save_market_listings",
            Self::UpdateProfile { .. } => "update_profile",
            Self::UpdateFloodZone { .. } => "update_flood_zone",
            Self::SavePermits { .. } => "save_permits",
            Self::UpdateRegistry { .. } => "update_registry",
            Self::UpdateSurvey { .. } => "update_survey",
            Self::SaveDocuments { .. } => "save_documents",
            Self::SaveLiens { .. } => "save_liens",
            Self::RecordAnalysis { .. } => "record_analysis",
            Self::UpdateValuation { .. } => "update_valuation",
            Self::Custom(_) => "custom",
            Self::Flush => "flush",
        }
    }
}

impl std::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WriteOp").field(&self.name()).finish()
    }
}

enum Command {
    Apply {
        op: WriteOp,
        reply: Option<oneshot::Sender<Result<(), StoreError>>>,
    },
    Shutdown,
}

/// Cloneable handle to the single writer task
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Command>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WriteQueue {
    /// Spawn the writer task over an owned write connection
    #[must_use]
    pub fn spawn(conn: Connection) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || writer_loop(conn, rx));
        Self {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Fire-and-forget: the operation is applied in enqueue order.
    ///
    /// # Errors
    /// `WriterClosed` if the writer task has shut down.
    pub fn enqueue(&self, op: WriteOp) -> Result<(), StoreError> {
        self.tx
            .send(Command::Apply { op, reply: None })
            .map_err(|_| StoreError::WriterClosed)
    }

    /// Apply the operation and wait for its result.
    ///
    /// Used at synchronization barriers and wherever the caller's next
    /// decision depends on the mutation's effect (e.g. a validated status
    /// transition).
    pub async fn execute_with_result(&self, op: WriteOp) -> Result<(), StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Apply {
                op,
                reply: Some(reply_tx),
            })
            .map_err(|_| StoreError::WriterClosed)?;
        reply_rx.await.map_err(|_| StoreError::WriterClosed)?
    }

    /// Barrier: resolves once every previously enqueued operation has been
    /// applied. Readers observing the store after a flush see all writes
    /// enqueued before it.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.execute_with_result(WriteOp::Flush).await
    }

    /// Drain the queue and release the database handle.
    ///
    /// Operations enqueued before this call are applied; the call returns
    /// after the writer task exits.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        // Ignore send failure: the writer may already be gone.
        let _ = self.tx.send(Command::Shutdown);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.await.map_err(|_| StoreError::WriterClosed)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue").finish_non_exhaustive()
    }
}

fn writer_loop(conn: Connection, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Apply { op, reply } => {
                let name = op.name();
                let result = apply(&conn, op);
                if let Err(err) = &result {
                    tracing::warn!(op = name, error = %err, "write operation failed");
                }
                if let Some(reply) = reply {
                    // Caller may have given up waiting; that's fine.
                    let _ = reply.send(result);
                }
            }
            Command::Shutdown => break,
        }
    }
    tracing::debug!("write queue drained, releasing database handle");
}

fn apply(conn: &Connection, op: WriteOp) -> Result<(), StoreError> {
    let now = Utc::now();
    match op {
        WriteOp::InsertWorkItem(item) => {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO work_items
                     (item_id, entity_key, scheduled_date, item_type, parties, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.item_id.to_string(),
                    item.entity_key.as_str(),
                    item.scheduled_date,
                    item.item_type,
                    serde_json::to_string(&item.parties)?,
                    now,
                ],
            )?;
            if inserted > 0 {
                conn.execute(
                    "INSERT INTO item_status (item_id, pipeline_status, updated_at)
                     VALUES (?1, 'pending', ?2)",
                    params![item.item_id.to_string(), now],
                )?;
            }
            Ok(())
        }
        WriteOp::MarkProcessing { item_id } => {
            let from = current_status(conn, item_id)?;
            validate_transition(from, PipelineStatus::Processing)?;
            conn.execute(
                "UPDATE item_status SET pipeline_status = 'processing', updated_at = ?2
                 WHERE item_id = ?1",
                params![item_id.to_string(), now],
            )?;
            Ok(())
        }
        WriteOp::MarkStepComplete {
            item_id,
            step_number,
            step_name,
        } => {
            // Forward-only: re-marking an already complete step is a no-op.
            conn.execute(
                "INSERT OR IGNORE INTO step_status
                     (item_id, step_number, step_name, completed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![item_id.to_string(), step_number, step_name, now],
            )?;
            conn.execute(
                "UPDATE item_status SET current_step = ?2, updated_at = ?3
                 WHERE item_id = ?1",
                params![item_id.to_string(), step_number, now],
            )?;
            Ok(())
        }
        WriteOp::MarkFailed {
            item_id,
            reason,
            step_number,
        } => {
            let from = current_status(conn, item_id)?;
            validate_transition(from, PipelineStatus::Failed)?;
            conn.execute(
                "UPDATE item_status
                 SET pipeline_status = 'failed',
                     last_error = ?2,
                     error_step = ?3,
                     retry_count = retry_count + 1,
                     updated_at = ?4
                 WHERE item_id = ?1",
                params![item_id.to_string(), truncate(&reason), step_number, now],
            )?;
            Ok(())
        }
        WriteOp::MarkSkipped { item_id, reason } => {
            let from = current_status(conn, item_id)?;
            validate_transition(from, PipelineStatus::Skipped)?;
            conn.execute(
                "UPDATE item_status
                 SET pipeline_status = 'skipped', last_error = ?2, updated_at = ?3
                 WHERE item_id = ?1",
                params![item_id.to_string(), truncate(&reason), now],
            )?;
            Ok(())
        }
        WriteOp::MarkCompleted { item_id } => {
            let from = current_status(conn, item_id)?;
            validate_transition(from, PipelineStatus::Completed)?;
            conn.execute(
                "UPDATE item_status
                 SET pipeline_status = 'completed',
                     completed_at = COALESCE(completed_at, ?2),
                     updated_at = ?2
                 WHERE item_id = ?1",
                params![item_id.to_string(), now],
            )?;
            Ok(())
        }
        WriteOp::UpdateTaxStatus { entity_key, tax } => {
            update_entity_json(conn, &entity_key, "tax_json", &tax)
        }
        WriteOp::UpdateFloodZone { entity_key, flood } => {
            update_entity_json(conn, &entity_key, "flood_json", &flood)
        }
        WriteOp::UpdateRegistry { entity_key, entity } => {
            update_entity_json(conn, &entity_key, "registry_json", &entity)
        }
        WriteOp::UpdateSurvey { entity_key, survey } => {
            update_entity_json(conn, &entity_key, "survey_json", &survey)
        }
        WriteOp::UpdateValuation {
            entity_key,
            valuation,
        } => update_entity_json(conn, &entity_key, "valuation_json", &valuation),
        WriteOp::UpdateProfile {
            entity_key,
            profile,
        } => {
            ensure_entity(conn, &entity_key)?;
            conn.execute(
                "UPDATE entities
                 SET canonical_key = COALESCE(?2, canonical_key),
                     owner_name = COALESCE(?3, owner_name),
                     situs_address = COALESCE(?4, situs_address),
                     updated_at = ?5
                 WHERE entity_key = ?1",
                params![
                    entity_key.as_str(),
                    profile.canonical_key,
                    profile.owner_name,
                    profile.situs_address,
                    now,
                ],
            )?;
            Ok(())
        }
        WriteOp::SaveMarketListings {
            entity_key,
            listings,
        } => {
            ensure_entity(conn, &entity_key)?;
            for listing in listings {
                conn.execute(
                    "INSERT INTO market_listings (entity_key, source, payload, fetched_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (entity_key, source)
                     DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
                    params![
                        entity_key.as_str(),
                        listing.source,
                        serde_json::to_string(&listing)?,
                        now,
                    ],
                )?;
            }
            Ok(())
        }
        WriteOp::SavePermits {
            entity_key,
            permits,
        } => {
            ensure_entity(conn, &entity_key)?;
            for permit in permits {
                conn.execute(
                    "INSERT INTO permits (entity_key, permit_no, payload, fetched_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (entity_key, permit_no)
                     DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
                    params![
                        entity_key.as_str(),
                        permit.permit_no,
                        serde_json::to_string(&permit)?,
                        now,
                    ],
                )?;
            }
            Ok(())
        }
        WriteOp::SaveDocuments {
            entity_key,
            documents,
        } => {
            ensure_entity(conn, &entity_key)?;
            for document in documents {
                // Recorded instruments are immutable; a re-fetch of a known
                // doc_ref must not bump fetched_at or the entity-scoped
                // analyses would re-trigger forever.
                conn.execute(
                    "INSERT OR IGNORE INTO documents (entity_key, doc_ref, payload, fetched_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        entity_key.as_str(),
                        document.doc_ref,
                        serde_json::to_string(&document)?,
                        now,
                    ],
                )?;
            }
            Ok(())
        }
        WriteOp::SaveLiens { entity_key, liens } => {
            ensure_entity(conn, &entity_key)?;
            for lien in liens {
                conn.execute(
                    "INSERT INTO liens (entity_key, doc_ref, payload, fetched_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (entity_key, doc_ref)
                     DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
                    params![
                        entity_key.as_str(),
                        lien.doc_ref,
                        serde_json::to_string(&lien)?,
                        now,
                    ],
                )?;
            }
            Ok(())
        }
        WriteOp::RecordAnalysis {
            entity_key,
            item_id,
            analysis,
        } => {
            ensure_entity(conn, &entity_key)?;
            conn.execute(
                "UPDATE entities
                 SET analysis_json = ?2,
                     last_analyzed_item = ?3,
                     analyzed_at = ?4,
                     updated_at = ?4
                 WHERE entity_key = ?1",
                params![
                    entity_key.as_str(),
                    serde_json::to_string(&analysis)?,
                    item_id.to_string(),
                    now,
                ],
            )?;
            Ok(())
        }
        WriteOp::Custom(write) => write(conn),
        WriteOp::Flush => Ok(()),
    }
}

fn current_status(conn: &Connection, item_id: ItemId) -> Result<PipelineStatus, StoreError> {
    let text: Option<String> = conn
        .query_row(
            "SELECT pipeline_status FROM item_status WHERE item_id = ?1",
            params![item_id.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let text = text.ok_or_else(|| StoreError::ItemNotFound(item_id.to_string()))?;
    text.parse()
        .map_err(|_| StoreError::ItemNotFound(item_id.to_string()))
}

fn ensure_entity(conn: &Connection, key: &EntityKey) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO entities (entity_key, updated_at) VALUES (?1, ?2)",
        params![key.as_str(), Utc::now()],
    )?;
    Ok(())
}

fn update_entity_json<T: serde::Serialize>(
    conn: &Connection,
    key: &EntityKey,
    column: &str,
    value: &T,
) -> Result<(), StoreError> {
    ensure_entity(conn, key)?;
    // Column names come from the closed match above, never from input.
    let sql =
        format!("UPDATE entities SET {column} = ?2, updated_at = ?3 WHERE entity_key = ?1");
    conn.execute(
        &sql,
        params![key.as_str(), serde_json::to_string(value)?, Utc::now()],
    )?;
    Ok(())
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
