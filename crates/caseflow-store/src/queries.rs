//! Read-side query surface
//!
//! Readers share one connection behind a mutex and never mutate. Reads
//! performed after a write-queue flush observe every write enqueued before
//! the flush; reads without a barrier carry no ordering guarantee relative
//! to in-flight writers.

use crate::entity::EntityRecord;
use crate::error::StoreError;
use crate::item::{EntityKey, ItemId, WorkItem};
use crate::records::{DeedDocument, LienRecord, MarketListing, PermitRecord};
use crate::status::{PipelineStatus, StatusRecord, StepFlag};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Item counts by pipeline status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Discovered, unclaimed
    pub pending: u64,
    /// Claimed by a run
    pub processing: u64,
    /// Terminal success
    pub completed: u64,
    /// Failed, possibly reclaimable
    pub failed: u64,
    /// Terminal skip
    pub skipped: u64,
}

impl StatusCounts {
    /// Total items tracked
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.skipped
    }
}

/// Completion tally for one step across all items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompletion {
    /// Step number
    pub step_number: u32,
    /// Step name as recorded
    pub step_name: String,
    /// Items with the flag set
    pub completed: u64,
}

/// One recent failure, for run summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSample {
    /// Failing item
    pub item_id: ItemId,
    /// Step the failure occurred at
    pub error_step: Option<u32>,
    /// Truncated diagnostic text
    pub last_error: String,
    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

/// Cloneable read handle over the store
#[derive(Clone)]
pub struct StoreReader {
    conn: Arc<Mutex<Connection>>,
}

impl StoreReader {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Status record for an item, if one exists
    pub fn get_status(&self, item_id: ItemId) -> Result<Option<StatusRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT item_id, pipeline_status, current_step, last_error, error_step,
                    retry_count, completed_at, updated_at
             FROM item_status WHERE item_id = ?1",
            params![item_id.to_string()],
            map_status_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Pipeline status for an item
    ///
    /// # Errors
    /// `ItemNotFound` when the item has no status record.
    pub fn get_state(&self, item_id: ItemId) -> Result<PipelineStatus, StoreError> {
        self.get_status(item_id)?
            .map(|record| record.pipeline_status)
            .ok_or_else(|| StoreError::ItemNotFound(item_id.to_string()))
    }

    /// All step flags set for an item, ordered by step number
    pub fn step_flags(&self, item_id: ItemId) -> Result<Vec<StepFlag>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT step_number, step_name, completed_at
             FROM step_status WHERE item_id = ?1 ORDER BY step_number",
        )?;
        let rows = stmt.query_map(params![item_id.to_string()], |row| {
            Ok(StepFlag {
                step_number: row.get(0)?,
                step_name: row.get(1)?,
                completed_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Whether one step's flag is already set
    pub fn step_complete(&self, item_id: ItemId, step_number: u32) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM step_status WHERE item_id = ?1 AND step_number = ?2",
            params![item_id.to_string(), step_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Work item by id
    pub fn work_item(&self, item_id: ItemId) -> Result<Option<WorkItem>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT item_id, entity_key, scheduled_date, item_type, parties
                 FROM work_items WHERE item_id = ?1",
                params![item_id.to_string()],
                map_item_row,
            )
            .optional()?;
        row.map(parse_item_row).transpose()
    }

    /// Items a run may claim: everything `pending`, plus `failed` items with
    /// retries remaining. `retry_failed` lifts the retry cap. `skipped` and
    /// `completed` are never returned.
    pub fn claimable_items(
        &self,
        max_retries: u32,
        retry_failed: bool,
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let conn = self.conn.lock();
        let limit = limit.map_or(i64::MAX, |n| n as i64);
        let mut stmt = conn.prepare(
            "SELECT w.item_id, w.entity_key, w.scheduled_date, w.item_type, w.parties
             FROM work_items w
             JOIN item_status s ON s.item_id = w.item_id
             WHERE s.pipeline_status = 'pending'
                OR (s.pipeline_status = 'failed'
                    AND (s.retry_count < ?1 OR ?2))
             ORDER BY w.scheduled_date, w.item_id
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![max_retries, retry_failed, limit], map_item_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(parse_item_row)
            .collect()
    }

    /// Entity projection by key
    pub fn entity(&self, key: &EntityKey) -> Result<Option<EntityRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT entity_key, canonical_key, owner_name, situs_address,
                        tax_json, flood_json, registry_json, survey_json,
                        analysis_json, valuation_json,
                        last_analyzed_item, analyzed_at, updated_at
                 FROM entities WHERE entity_key = ?1",
                params![key.as_str()],
                map_entity_row,
            )
            .optional()?;
        row.map(parse_entity_row).transpose()
    }

    /// Recorded instruments for an entity
    pub fn documents(&self, key: &EntityKey) -> Result<Vec<DeedDocument>, StoreError> {
        self.detail_rows(key, "documents")
    }

    /// Liens for an entity
    pub fn liens(&self, key: &EntityKey) -> Result<Vec<LienRecord>, StoreError> {
        self.detail_rows(key, "liens")
    }

    /// Permits for an entity
    pub fn permits(&self, key: &EntityKey) -> Result<Vec<PermitRecord>, StoreError> {
        self.detail_rows(key, "permits")
    }

    /// Market listings for an entity
    pub fn market_listings(&self, key: &EntityKey) -> Result<Vec<MarketListing>, StoreError> {
        self.detail_rows(key, "market_listings")
    }

    /// Instruments recorded into the store after `since`.
    ///
    /// Drives the entity-scoped skip rule: an existing analysis stays valid
    /// while no new source documents have appeared.
    pub fn documents_since(
        &self,
        key: &EntityKey,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE entity_key = ?1 AND fetched_at > ?2",
            params![key.as_str(), since],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Item counts grouped by pipeline status
    pub fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT pipeline_status, COUNT(*) FROM item_status GROUP BY 1")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match status.as_str() {
                "pending" => counts.pending = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                "skipped" => counts.skipped = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Per-step completion tallies across all items
    pub fn step_completion(&self) -> Result<Vec<StepCompletion>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT step_number, step_name, COUNT(*)
             FROM step_status GROUP BY step_number, step_name ORDER BY step_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StepCompletion {
                step_number: row.get(0)?,
                step_name: row.get(1)?,
                completed: row.get::<_, i64>(2)? as u64,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Most recent failures, newest first, bounded by `limit`
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<FailureSample>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT item_id, error_step, last_error, updated_at
             FROM item_status
             WHERE pipeline_status = 'failed' AND last_error IS NOT NULL
             ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<u32>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
            ))
        })?;
        let mut samples = Vec::new();
        for row in rows {
            let (id, error_step, last_error, failed_at) = row?;
            let item_id = id
                .parse()
                .map_err(|_| StoreError::ItemNotFound(id.clone()))?;
            samples.push(FailureSample {
                item_id,
                error_step,
                last_error,
                failed_at,
            });
        }
        Ok(samples)
    }

    fn detail_rows<T: DeserializeOwned>(
        &self,
        key: &EntityKey,
        table: &str,
    ) -> Result<Vec<T>, StoreError> {
        let conn = self.conn.lock();
        // Table names come from the fixed call sites above, never from input.
        let sql = format!("SELECT payload FROM {table} WHERE entity_key = ?1 ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![key.as_str()], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for payload in rows {
            out.push(serde_json::from_str(&payload?)?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for StoreReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreReader").finish_non_exhaustive()
    }
}

fn map_status_row(row: &Row<'_>) -> rusqlite::Result<StatusRecord> {
    let id: String = row.get(0)?;
    let status: String = row.get(1)?;
    Ok(StatusRecord {
        item_id: id
            .parse()
            .map_err(|err| conversion_error(0, Box::new(err)))?,
        pipeline_status: status
            .parse::<PipelineStatus>()
            .map_err(|err| conversion_error(1, err.into()))?,
        current_step: row.get(2)?,
        last_error: row.get(3)?,
        error_step: row.get(4)?,
        retry_count: row.get(5)?,
        completed_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

type RawItemRow = (String, String, chrono::NaiveDate, String, String);

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<RawItemRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn parse_item_row(raw: RawItemRow) -> Result<WorkItem, StoreError> {
    let (id, entity_key, scheduled_date, item_type, parties) = raw;
    let item_id = id
        .parse()
        .map_err(|_| StoreError::ItemNotFound(id.clone()))?;
    Ok(WorkItem {
        item_id,
        entity_key: EntityKey::new(entity_key),
        scheduled_date,
        item_type,
        parties: serde_json::from_str(&parties)?,
    })
}

#[allow(clippy::type_complexity)]
type RawEntityRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn map_entity_row(row: &Row<'_>) -> rusqlite::Result<RawEntityRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ))
}

fn parse_entity_row(raw: RawEntityRow) -> Result<EntityRecord, StoreError> {
    let (
        entity_key,
        canonical_key,
        owner_name,
        situs_address,
        tax_json,
        flood_json,
        registry_json,
        survey_json,
        analysis_json,
        valuation_json,
        last_analyzed_item,
        analyzed_at,
        updated_at,
    ) = raw;
    Ok(EntityRecord {
        entity_key,
        canonical_key,
        owner_name,
        situs_address,
        tax: parse_json(tax_json)?,
        flood: parse_json(flood_json)?,
        registry: parse_json(registry_json)?,
        survey: parse_json(survey_json)?,
        analysis: parse_json(analysis_json)?,
        valuation: parse_json(valuation_json)?,
        last_analyzed_item: last_analyzed_item
            .map(|id| id.parse().map_err(|_| StoreError::ItemNotFound(id)))
            .transpose()?,
        analyzed_at,
        updated_at,
    })
}

fn parse_json<T: DeserializeOwned>(json: Option<String>) -> Result<Option<T>, StoreError> {
    json.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(StoreError::from)
}

fn conversion_error(
    index: usize,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err)
}
