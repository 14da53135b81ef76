//! Phase 1: independent steps
//!
//! Inputs are known at claim time, so all seven run concurrently. Each
//! checks its idempotency predicate against the entity projection before
//! touching its collaborator.

use crate::clients::{
    GisClient, MarketClient, PermitClient, PropertyClient, RegistryClient, SurveyClient,
    TaxClient,
};
use async_trait::async_trait;
use caseflow_pipeline::{
    EnrichStep, Phase, ServiceKind, SourceResult, StepContext, StepDescriptor, StepError,
    StepOutcome,
};
use caseflow_store::WriteOp;
use std::sync::Arc;

/// Step 1: county tax standing
pub struct TaxStatusStep {
    client: Arc<dyn TaxClient>,
}

impl TaxStatusStep {
    /// Build the step over a tax roll client
    pub fn new(client: Arc<dyn TaxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for TaxStatusStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 1,
            name: "tax_status",
            phase: Phase::One,
            service: ServiceKind::Tax,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(ctx.entity()?.is_some_and(|entity| entity.tax.is_some()))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.tax_status(&ctx.resolved_key).await {
            SourceResult::Success(tax) => {
                ctx.queue.enqueue(WriteOp::UpdateTaxStatus {
                    entity_key: ctx.resolved_key.clone(),
                    tax,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 2: market listings
pub struct MarketListingStep {
    client: Arc<dyn MarketClient>,
}

impl MarketListingStep {
    /// Build the step over a market feed client
    pub fn new(client: Arc<dyn MarketClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for MarketListingStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 2,
            name: "market_listing",
            phase: Phase::One,
            service: ServiceKind::Market,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(!ctx.reader.market_listings(&ctx.resolved_key)?.is_empty())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.listings(&ctx.resolved_key).await {
            SourceResult::Success(listings) if listings.is_empty() => Ok(StepOutcome::NoData),
            SourceResult::Success(listings) => {
                ctx.queue.enqueue(WriteOp::SaveMarketListings {
                    entity_key: ctx.resolved_key.clone(),
                    listings,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 3: assessor property profile
///
/// The profile may carry the canonical parcel key Phase 2 depends on.
pub struct PropertyProfileStep {
    client: Arc<dyn PropertyClient>,
}

impl PropertyProfileStep {
    /// Build the step over an assessor client
    pub fn new(client: Arc<dyn PropertyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for PropertyProfileStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 3,
            name: "property_profile",
            phase: Phase::One,
            service: ServiceKind::Property,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(ctx.entity()?.is_some_and(|entity| {
            entity.canonical_key.is_some() || entity.owner_name.is_some()
        }))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.profile(&ctx.resolved_key).await {
            SourceResult::Success(profile) => {
                ctx.queue.enqueue(WriteOp::UpdateProfile {
                    entity_key: ctx.resolved_key.clone(),
                    profile,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 4: flood zone designation
pub struct FloodZoneStep {
    client: Arc<dyn GisClient>,
}

impl FloodZoneStep {
    /// Build the step over a GIS client
    pub fn new(client: Arc<dyn GisClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for FloodZoneStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 4,
            name: "flood_zone",
            phase: Phase::One,
            service: ServiceKind::Gis,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(ctx.entity()?.is_some_and(|entity| entity.flood.is_some()))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.flood_zone(&ctx.resolved_key).await {
            SourceResult::Success(flood) => {
                ctx.queue.enqueue(WriteOp::UpdateFloodZone {
                    entity_key: ctx.resolved_key.clone(),
                    flood,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 5: permits on file
pub struct PermitsStep {
    client: Arc<dyn PermitClient>,
}

impl PermitsStep {
    /// Build the step over a permit portal client
    pub fn new(client: Arc<dyn PermitClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for PermitsStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 5,
            name: "permits",
            phase: Phase::One,
            service: ServiceKind::Permit,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(!ctx.reader.permits(&ctx.resolved_key)?.is_empty())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.permits(&ctx.resolved_key).await {
            SourceResult::Success(permits) if permits.is_empty() => Ok(StepOutcome::NoData),
            SourceResult::Success(permits) => {
                ctx.queue.enqueue(WriteOp::SavePermits {
                    entity_key: ctx.resolved_key.clone(),
                    permits,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 6: business registry match for the owner
pub struct BusinessRegistryStep {
    client: Arc<dyn RegistryClient>,
}

impl BusinessRegistryStep {
    /// Build the step over a business registry client
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for BusinessRegistryStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 6,
            name: "business_registry",
            phase: Phase::One,
            service: ServiceKind::Registry,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(ctx.entity()?.is_some_and(|entity| entity.registry.is_some()))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.lookup(&ctx.resolved_key).await {
            SourceResult::Success(entity) => {
                ctx.queue.enqueue(WriteOp::UpdateRegistry {
                    entity_key: ctx.resolved_key.clone(),
                    entity,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 7: recorded survey lookup
pub struct SurveyLookupStep {
    client: Arc<dyn SurveyClient>,
}

impl SurveyLookupStep {
    /// Build the step over a survey records client
    pub fn new(client: Arc<dyn SurveyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for SurveyLookupStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 7,
            name: "survey_lookup",
            phase: Phase::One,
            service: ServiceKind::Survey,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(ctx.entity()?.is_some_and(|entity| entity.survey.is_some()))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        match self.client.survey(&ctx.resolved_key).await {
            SourceResult::Success(survey) => {
                ctx.queue.enqueue(WriteOp::UpdateSurvey {
                    entity_key: ctx.resolved_key.clone(),
                    survey,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}
