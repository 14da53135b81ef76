//! Denormalized entity projection
//!
//! One row per entity key, accumulating enrichment results across all work
//! items that reference the entity. Mutated only by the write queue;
//! read-shared by every step runner.

use crate::item::ItemId;
use crate::records::{
    BusinessEntity, FloodZone, SurveyRecord, TaxStatus, TitleAnalysis, ValuationSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared, mutable projection of everything learned about one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Raw entity key as discovered
    pub entity_key: String,
    /// Authoritative parcel/legal key once the profile step corrects it
    pub canonical_key: Option<String>,
    /// Owner of record
    pub owner_name: Option<String>,
    /// Situs address
    pub situs_address: Option<String>,
    /// Tax standing
    pub tax: Option<TaxStatus>,
    /// Flood designation
    pub flood: Option<FloodZone>,
    /// Business-registry match for the owner
    pub registry: Option<BusinessEntity>,
    /// Recorded survey
    pub survey: Option<SurveyRecord>,
    /// Chain-of-title analysis
    pub analysis: Option<TitleAnalysis>,
    /// Derived valuation
    pub valuation: Option<ValuationSummary>,
    /// Work item the entity-scoped analyses last ran under
    pub last_analyzed_item: Option<ItemId>,
    /// When the entity-scoped analyses last ran
    pub analyzed_at: Option<DateTime<Utc>>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Key Phase-2 lookups should use: canonical when known, raw otherwise
    #[inline]
    #[must_use]
    pub fn effective_key(&self) -> &str {
        self.canonical_key.as_deref().unwrap_or(&self.entity_key)
    }
}
