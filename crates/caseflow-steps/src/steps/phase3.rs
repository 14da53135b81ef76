//! Phase 3: analyses over the collected record
//!
//! Chain-of-title and lien survival are entity-scoped: when several work
//! items reference the same entity, the first to finish Phase 2 pays for
//! the analysis and the rest short-circuit unless new instruments arrived
//! since. Valuation is cheap and derived purely from the projection.

use crate::clients::AnalysisClient;
use async_trait::async_trait;
use caseflow_pipeline::{
    EnrichStep, Phase, ServiceKind, SourceResult, StepContext, StepDescriptor, StepError,
    StepOutcome,
};
use caseflow_store::WriteOp;
use std::sync::Arc;

/// True when the entity-scoped analyses are already current for this item:
/// either this item ran them, or another item did and no instrument has
/// been fetched since.
fn analysis_is_current(ctx: &StepContext) -> Result<bool, StepError> {
    let Some(entity) = ctx.entity()? else {
        return Ok(false);
    };
    if entity.last_analyzed_item == Some(ctx.item.item_id) {
        return Ok(true);
    }
    let (Some(_), Some(analyzed_at)) = (&entity.analysis, entity.analyzed_at) else {
        return Ok(false);
    };
    Ok(ctx.reader.documents_since(&ctx.resolved_key, analyzed_at)? == 0)
}

/// Step 10: chain-of-title analysis
pub struct ChainOfTitleStep {
    client: Arc<dyn AnalysisClient>,
}

impl ChainOfTitleStep {
    /// Build the step over an analysis client
    pub fn new(client: Arc<dyn AnalysisClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for ChainOfTitleStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 10,
            name: "chain_of_title",
            phase: Phase::Three,
            service: ServiceKind::Analysis,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        analysis_is_current(ctx)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let documents = ctx.reader.documents(&ctx.resolved_key)?;
        if documents.is_empty() {
            return Ok(StepOutcome::NoData);
        }
        let key = ctx.effective_key()?;
        match self.client.chain_of_title(&key, &documents).await {
            SourceResult::Success(analysis) => {
                ctx.queue.enqueue(WriteOp::RecordAnalysis {
                    entity_key: ctx.resolved_key.clone(),
                    item_id: ctx.item.item_id,
                    analysis,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 11: lien survival determinations
pub struct LienSurvivalStep {
    client: Arc<dyn AnalysisClient>,
}

impl LienSurvivalStep {
    /// Build the step over an analysis client
    pub fn new(client: Arc<dyn AnalysisClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for LienSurvivalStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 11,
            name: "lien_survival",
            phase: Phase::Three,
            service: ServiceKind::Analysis,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        if !analysis_is_current(ctx)? {
            return Ok(false);
        }
        let liens = ctx.reader.liens(&ctx.resolved_key)?;
        Ok(liens.iter().all(|lien| lien.survives.is_some()))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let documents = ctx.reader.documents(&ctx.resolved_key)?;
        if documents.is_empty() {
            return Ok(StepOutcome::NoData);
        }
        let key = ctx.effective_key()?;
        match self.client.lien_survival(&key, &documents).await {
            SourceResult::Success(liens) if liens.is_empty() => Ok(StepOutcome::NoData),
            SourceResult::Success(liens) => {
                ctx.queue.enqueue(WriteOp::SaveLiens {
                    entity_key: ctx.resolved_key.clone(),
                    liens,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 12: derived valuation summary
///
/// Re-derived every pass: the inputs (tax, listings, analysis) may have
/// changed even when the entity-scoped analyses short-circuited.
pub struct ValuationSummaryStep {
    client: Arc<dyn AnalysisClient>,
}

impl ValuationSummaryStep {
    /// Build the step over an analysis client
    pub fn new(client: Arc<dyn AnalysisClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for ValuationSummaryStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 12,
            name: "valuation_summary",
            phase: Phase::Three,
            service: ServiceKind::Analysis,
        }
    }

    async fn already_has_data(&self, _ctx: &StepContext) -> Result<bool, StepError> {
        Ok(false)
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let Some(entity) = ctx.entity()? else {
            return Ok(StepOutcome::NoData);
        };
        match self.client.valuation(&entity).await {
            SourceResult::Success(valuation) => {
                ctx.queue.enqueue(WriteOp::UpdateValuation {
                    entity_key: ctx.resolved_key.clone(),
                    valuation,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}
