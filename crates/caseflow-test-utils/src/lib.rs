//! Testing utilities for the Caseflow workspace
//!
//! Shared fixtures: temp-directory stores, work-item builders, and a
//! pre-wired offline collaborator hub.

use caseflow_pipeline::{GateLimits, Orchestrator, RunOptions};
use caseflow_steps::{OfflineHub, StepRegistry};
use caseflow_store::{Store, WorkItem};
use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;

/// Store backed by a fresh temp directory. Keep the [`TempDir`] alive for
/// the duration of the test; dropping it deletes the database.
pub fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("cases.db")).unwrap();
    (store, dir)
}

/// A date inside the default test discovery window
pub fn sale_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
}

/// Inclusive discovery window containing [`sale_date`]
pub fn sale_window() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
    )
}

/// Tax-sale work item with a valid entity key
pub fn tax_sale_item(key: &str) -> WorkItem {
    WorkItem::new(key, sale_date(), "tax_sale")
        .with_parties(vec!["Offline Owner LLC".to_string(), "County".to_string()])
}

/// Work item whose key will fail validation (sentinel)
pub fn unknown_key_item() -> WorkItem {
    tax_sale_item("UNKNOWN")
}

/// Orchestrator wired with the standard step set over an offline hub
pub fn offline_orchestrator(
    store: &Store,
    hub: &Arc<OfflineHub>,
    options: RunOptions,
) -> Orchestrator {
    let collaborators = hub.collaborators();
    let steps = StepRegistry::standard(&collaborators).into_steps();
    Orchestrator::new(
        store,
        steps,
        collaborators.discovery,
        collaborators.fallback,
        &GateLimits::default(),
        options,
    )
}

/// Run options with discovery over [`sale_window`]
pub fn windowed_options() -> RunOptions {
    RunOptions {
        window: Some(sale_window()),
        ..RunOptions::default()
    }
}
