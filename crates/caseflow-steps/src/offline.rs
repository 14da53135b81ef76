//! Deterministic offline collaborator hub
//!
//! One object implements every client trait plus discovery and fallback
//! search, answering from fixtures derived from the entity key. Used by
//! the CLI's offline mode and throughout the integration tests: call
//! counts per method make idempotency and short-circuit behavior directly
//! observable.

use crate::clients::{
    AnalysisClient, Collaborators, DocumentIndexClient, GisClient, MarketClient, PermitClient,
    PropertyClient, RegistryClient, SurveyClient, TaxClient,
};
use async_trait::async_trait;
use caseflow_pipeline::orchestrator::CaseDiscovery;
use caseflow_pipeline::validate::FallbackSearch;
use caseflow_pipeline::{SourceError, SourceResult};
use caseflow_store::{
    BusinessEntity, DeedDocument, EntityKey, EntityRecord, FloodZone, LienRecord, MarketListing,
    PermitRecord, PropertyProfile, SurveyRecord, TaxStatus, TitleAnalysis, ValuationSummary,
    WorkItem,
};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Scripted response for one hub method
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with the deterministic fixture (default)
    Fixture,
    /// Answer "confirmed nothing"
    NoData,
    /// Fail with the given message
    Fail(String),
}

/// Offline implementation of every collaborator
#[derive(Debug, Default)]
pub struct OfflineHub {
    call_counts: DashMap<&'static str, u64>,
    behaviors: DashMap<&'static str, Behavior>,
    seeded_cases: Mutex<Vec<WorkItem>>,
    fallback_key: Mutex<Option<EntityKey>>,
}

impl OfflineHub {
    /// Fresh hub with all methods on fixture behavior
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this hub as the full collaborator set
    #[must_use]
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            tax: self.clone(),
            market: self.clone(),
            property: self.clone(),
            gis: self.clone(),
            permit: self.clone(),
            registry: self.clone(),
            survey: self.clone(),
            documents: self.clone(),
            analysis: self.clone(),
            discovery: self.clone(),
            fallback: self.clone(),
        }
    }

    /// Script a method's response
    pub fn set_behavior(&self, method: &'static str, behavior: Behavior) {
        self.behaviors.insert(method, behavior);
    }

    /// Cases `discover` will return inside the requested window
    pub fn seed_case(&self, item: WorkItem) {
        self.seeded_cases.lock().push(item);
    }

    /// Key the party-name fallback search resolves to
    pub fn set_fallback_key(&self, key: EntityKey) {
        *self.fallback_key.lock() = Some(key);
    }

    /// Calls recorded against one method
    #[must_use]
    pub fn calls(&self, method: &str) -> u64 {
        self.call_counts.get(method).map_or(0, |count| *count)
    }

    /// Calls recorded against all collaborator methods combined
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.call_counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Forget recorded calls; scripted behaviors stay
    pub fn reset_counts(&self) {
        self.call_counts.clear();
    }

    fn respond<T>(&self, method: &'static str, fixture: T) -> SourceResult<T> {
        *self.call_counts.entry(method).or_insert(0) += 1;
        match self.behaviors.get(method).map(|b| b.value().clone()) {
            None | Some(Behavior::Fixture) => SourceResult::Success(fixture),
            Some(Behavior::NoData) => SourceResult::NoData,
            Some(Behavior::Fail(message)) => {
                tracing::debug!(method, %message, "scripted failure");
                SourceResult::Failure(SourceError::Unavailable(message))
            }
        }
    }
}

/// Stable small number derived from the key, used to vary fixture values
fn seed(key: &EntityKey) -> i64 {
    key.as_str().bytes().map(i64::from).sum()
}

#[async_trait]
impl TaxClient for OfflineHub {
    async fn tax_status(&self, key: &EntityKey) -> SourceResult<TaxStatus> {
        let n = seed(key);
        self.respond(
            "tax_status",
            TaxStatus {
                amount_due_cents: 10_000 + n * 100,
                delinquent_years: vec![2023, 2024],
                paid_through: Some(2022),
                assessed_value_cents: Some(15_000_000 + n * 1_000),
            },
        )
    }
}

#[async_trait]
impl MarketClient for OfflineHub {
    async fn listings(&self, key: &EntityKey) -> SourceResult<Vec<MarketListing>> {
        let n = seed(key);
        self.respond(
            "listings",
            vec![MarketListing {
                source: "mls".to_string(),
                price_cents: Some(20_000_000 + n * 1_000),
                status: "active".to_string(),
                listed_on: NaiveDate::from_ymd_opt(2026, 5, 1),
            }],
        )
    }
}

#[async_trait]
impl PropertyClient for OfflineHub {
    async fn profile(&self, key: &EntityKey) -> SourceResult<PropertyProfile> {
        self.respond(
            "profile",
            PropertyProfile {
                canonical_key: Some(format!("PARCEL-{}", key.as_str())),
                owner_name: Some("Offline Owner LLC".to_string()),
                situs_address: Some("100 Main St".to_string()),
                legal_description: Some("LOT 1 BLK 2 OFFLINE ADDN".to_string()),
                land_use: Some("R1".to_string()),
            },
        )
    }
}

#[async_trait]
impl GisClient for OfflineHub {
    async fn flood_zone(&self, key: &EntityKey) -> SourceResult<FloodZone> {
        let zone = if seed(key) % 2 == 0 { "X" } else { "AE" };
        self.respond(
            "flood_zone",
            FloodZone {
                zone: zone.to_string(),
                panel: Some("48000C0001".to_string()),
                effective: NaiveDate::from_ymd_opt(2019, 11, 15),
            },
        )
    }
}

#[async_trait]
impl PermitClient for OfflineHub {
    async fn permits(&self, key: &EntityKey) -> SourceResult<Vec<PermitRecord>> {
        self.respond(
            "permits",
            vec![PermitRecord {
                permit_no: format!("BP-{}", seed(key)),
                kind: "building".to_string(),
                status: "final".to_string(),
                issued_on: NaiveDate::from_ymd_opt(2021, 6, 3),
                description: Some("roof replacement".to_string()),
            }],
        )
    }
}

#[async_trait]
impl RegistryClient for OfflineHub {
    async fn lookup(&self, key: &EntityKey) -> SourceResult<BusinessEntity> {
        self.respond(
            "lookup",
            BusinessEntity {
                name: "Offline Owner LLC".to_string(),
                registry_id: format!("REG-{}", seed(key)),
                status: "active".to_string(),
                registered_agent: Some("A. Agent".to_string()),
            },
        )
    }
}

#[async_trait]
impl SurveyClient for OfflineHub {
    async fn survey(&self, key: &EntityKey) -> SourceResult<SurveyRecord> {
        self.respond(
            "survey",
            SurveyRecord {
                survey_ref: format!("SV-{}", seed(key)),
                recorded_on: NaiveDate::from_ymd_opt(2015, 2, 20),
                notes: None,
            },
        )
    }
}

#[async_trait]
impl DocumentIndexClient for OfflineHub {
    async fn index_documents(&self, key: &EntityKey) -> SourceResult<Vec<DeedDocument>> {
        let n = seed(key);
        self.respond(
            "index_documents",
            vec![
                DeedDocument {
                    doc_ref: format!("INST-{n}-1"),
                    doc_type: "mortgage".to_string(),
                    recorded_on: NaiveDate::from_ymd_opt(2018, 4, 10),
                    grantor: Some("Offline Owner LLC".to_string()),
                    grantee: Some("First Bank".to_string()),
                },
                DeedDocument {
                    doc_ref: format!("INST-{n}-2"),
                    doc_type: "judgment".to_string(),
                    recorded_on: NaiveDate::from_ymd_opt(2022, 9, 1),
                    grantor: None,
                    grantee: Some("County".to_string()),
                },
            ],
        )
    }

    async fn deed_history(&self, key: &EntityKey) -> SourceResult<Vec<DeedDocument>> {
        let n = seed(key);
        self.respond(
            "deed_history",
            vec![DeedDocument {
                doc_ref: format!("DEED-{n}"),
                doc_type: "deed".to_string(),
                recorded_on: NaiveDate::from_ymd_opt(2012, 7, 30),
                grantor: Some("Prior Owner".to_string()),
                grantee: Some("Offline Owner LLC".to_string()),
            }],
        )
    }
}

#[async_trait]
impl AnalysisClient for OfflineHub {
    async fn chain_of_title(
        &self,
        _key: &EntityKey,
        documents: &[DeedDocument],
    ) -> SourceResult<TitleAnalysis> {
        let chain: Vec<String> = documents
            .iter()
            .filter(|doc| doc.doc_type == "deed")
            .map(|doc| doc.doc_ref.clone())
            .collect();
        self.respond(
            "chain_of_title",
            TitleAnalysis {
                chain,
                gaps: 0,
                vested_owner: Some("Offline Owner LLC".to_string()),
                analyzed_at: Utc::now(),
            },
        )
    }

    async fn lien_survival(
        &self,
        _key: &EntityKey,
        documents: &[DeedDocument],
    ) -> SourceResult<Vec<LienRecord>> {
        let liens: Vec<LienRecord> = documents
            .iter()
            .filter(|doc| matches!(doc.doc_type.as_str(), "mortgage" | "judgment"))
            .map(|doc| LienRecord {
                doc_ref: doc.doc_ref.clone(),
                lien_type: doc.doc_type.clone(),
                amount_cents: Some(5_000_000),
                holder: doc.grantee.clone(),
                recorded_on: doc.recorded_on,
                survives: Some(doc.doc_type == "judgment"),
            })
            .collect();
        self.respond("lien_survival", liens)
    }

    async fn valuation(&self, entity: &EntityRecord) -> SourceResult<ValuationSummary> {
        let assessed = entity.tax.as_ref().and_then(|tax| tax.assessed_value_cents);
        self.respond(
            "valuation",
            ValuationSummary {
                assessed_cents: assessed,
                market_estimate_cents: assessed.map(|cents| cents + cents / 10),
                confidence: if assessed.is_some() { 0.8 } else { 0.3 },
            },
        )
    }
}

#[async_trait]
impl CaseDiscovery for OfflineHub {
    async fn discover(&self, from: NaiveDate, to: NaiveDate) -> SourceResult<Vec<WorkItem>> {
        let cases: Vec<WorkItem> = self
            .seeded_cases
            .lock()
            .iter()
            .filter(|item| item.scheduled_date >= from && item.scheduled_date <= to)
            .cloned()
            .collect();
        self.respond("discover", cases)
    }
}

#[async_trait]
impl FallbackSearch for OfflineHub {
    async fn search_by_parties(&self, _item: &WorkItem) -> SourceResult<EntityKey> {
        let configured = self.fallback_key.lock().clone();
        match configured {
            Some(key) => self.respond("search_by_parties", key),
            None => {
                *self.call_counts.entry("search_by_parties").or_insert(0) += 1;
                SourceResult::NoData
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_is_deterministic_per_key() {
        let hub = OfflineHub::shared();
        let key = EntityKey::new("CASE-001");
        let first = hub.tax_status(&key).await;
        let second = hub.tax_status(&key).await;
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
        assert_eq!(hub.calls("tax_status"), 2);
    }

    #[tokio::test]
    async fn scripted_failure_overrides_fixture() {
        let hub = OfflineHub::shared();
        hub.set_behavior("flood_zone", Behavior::Fail("gis outage".to_string()));
        let result = hub.flood_zone(&EntityKey::new("CASE-002")).await;
        assert!(matches!(result, SourceResult::Failure(_)));
        assert_eq!(hub.calls("flood_zone"), 1);
    }

    #[tokio::test]
    async fn discovery_respects_window() {
        let hub = OfflineHub::shared();
        let inside = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let outside = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        hub.seed_case(WorkItem::new("CASE-A", inside, "tax_sale"));
        hub.seed_case(WorkItem::new("CASE-B", outside, "tax_sale"));

        let from = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        match hub.discover(from, to).await {
            SourceResult::Success(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].entity_key.as_str(), "CASE-A");
            }
            other => panic!("unexpected discovery result: {other:?}"),
        }
    }
}
