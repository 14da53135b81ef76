//! Collaborator (client) traits, one per external service category
//!
//! These are the seams the concrete scrapers and extraction services plug
//! into. Every call takes the entity key and returns a [`SourceResult`]:
//! data, a confirmed empty answer, or a transient failure. No trait method
//! panics and none throws through the seam.

use async_trait::async_trait;
use caseflow_pipeline::orchestrator::CaseDiscovery;
use caseflow_pipeline::validate::FallbackSearch;
use caseflow_pipeline::SourceResult;
use caseflow_store::{
    BusinessEntity, DeedDocument, EntityKey, EntityRecord, FloodZone, LienRecord, MarketListing,
    PermitRecord, PropertyProfile, SurveyRecord, TaxStatus, TitleAnalysis, ValuationSummary,
};
use std::sync::Arc;

/// County tax roll lookups
#[async_trait]
pub trait TaxClient: Send + Sync {
    /// Current tax standing for the entity
    async fn tax_status(&self, key: &EntityKey) -> SourceResult<TaxStatus>;
}

/// Listing/market feed lookups
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// Active and recent listings for the entity
    async fn listings(&self, key: &EntityKey) -> SourceResult<Vec<MarketListing>>;
}

/// Assessor property profile lookups
#[async_trait]
pub trait PropertyClient: Send + Sync {
    /// Coarse profile; may correct the canonical parcel key
    async fn profile(&self, key: &EntityKey) -> SourceResult<PropertyProfile>;
}

/// GIS / flood map lookups
#[async_trait]
pub trait GisClient: Send + Sync {
    /// Flood designation for the entity
    async fn flood_zone(&self, key: &EntityKey) -> SourceResult<FloodZone>;
}

/// Permit portal lookups
#[async_trait]
pub trait PermitClient: Send + Sync {
    /// Permits on file for the entity
    async fn permits(&self, key: &EntityKey) -> SourceResult<Vec<PermitRecord>>;
}

/// Business registry searches
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Registry record for the entity's owner, when the owner is a company
    async fn lookup(&self, key: &EntityKey) -> SourceResult<BusinessEntity>;
}

/// Survey record lookups
#[async_trait]
pub trait SurveyClient: Send + Sync {
    /// Most recent recorded survey for the entity
    async fn survey(&self, key: &EntityKey) -> SourceResult<SurveyRecord>;
}

/// Recorder document index lookups (slow, heavily rate limited)
#[async_trait]
pub trait DocumentIndexClient: Send + Sync {
    /// All indexed instruments for the canonical key
    async fn index_documents(&self, key: &EntityKey) -> SourceResult<Vec<DeedDocument>>;

    /// Transfer-deed history for the canonical key
    async fn deed_history(&self, key: &EntityKey) -> SourceResult<Vec<DeedDocument>>;
}

/// Title/lien analysis workers
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Chain-of-title over the collected instruments
    async fn chain_of_title(
        &self,
        key: &EntityKey,
        documents: &[DeedDocument],
    ) -> SourceResult<TitleAnalysis>;

    /// Lien survival determinations over the collected instruments
    async fn lien_survival(
        &self,
        key: &EntityKey,
        documents: &[DeedDocument],
    ) -> SourceResult<Vec<LienRecord>>;

    /// Derived valuation from the accumulated entity projection
    async fn valuation(&self, entity: &EntityRecord) -> SourceResult<ValuationSummary>;
}

/// The full collaborator set one run is wired with
#[derive(Clone)]
pub struct Collaborators {
    /// Tax roll client
    pub tax: Arc<dyn TaxClient>,
    /// Market feed client
    pub market: Arc<dyn MarketClient>,
    /// Assessor profile client
    pub property: Arc<dyn PropertyClient>,
    /// GIS client
    pub gis: Arc<dyn GisClient>,
    /// Permit portal client
    pub permit: Arc<dyn PermitClient>,
    /// Business registry client
    pub registry: Arc<dyn RegistryClient>,
    /// Survey records client
    pub survey: Arc<dyn SurveyClient>,
    /// Recorder document index client
    pub documents: Arc<dyn DocumentIndexClient>,
    /// Analysis workers client
    pub analysis: Arc<dyn AnalysisClient>,
    /// Upstream case discovery
    pub discovery: Arc<dyn CaseDiscovery>,
    /// Party-name fallback search
    pub fallback: Arc<dyn FallbackSearch>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
