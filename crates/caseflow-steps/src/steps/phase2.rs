//! Phase 2: recorder document collection
//!
//! Both steps hit the recorder's document index, the slowest and most
//! tightly rate-limited collaborator. They query with the effective key
//! (canonical when Phase 1 produced one) and persist under the resolved
//! key so the item's projection stays in one place.

use crate::clients::DocumentIndexClient;
use async_trait::async_trait;
use caseflow_pipeline::{
    EnrichStep, Phase, ServiceKind, SourceResult, StepContext, StepDescriptor, StepError,
    StepOutcome,
};
use caseflow_store::WriteOp;
use std::sync::Arc;

/// Step 8: full instrument index for the entity
pub struct DocumentIndexStep {
    client: Arc<dyn DocumentIndexClient>,
}

impl DocumentIndexStep {
    /// Build the step over a document index client
    pub fn new(client: Arc<dyn DocumentIndexClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for DocumentIndexStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 8,
            name: "document_index",
            phase: Phase::Two,
            service: ServiceKind::DocumentIndex,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        Ok(!ctx.reader.documents(&ctx.resolved_key)?.is_empty())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let key = ctx.effective_key()?;
        match self.client.index_documents(&key).await {
            SourceResult::Success(documents) if documents.is_empty() => Ok(StepOutcome::NoData),
            SourceResult::Success(documents) => {
                ctx.queue.enqueue(WriteOp::SaveDocuments {
                    entity_key: ctx.resolved_key.clone(),
                    documents,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}

/// Step 9: transfer-deed history
///
/// Deeds land in the same documents table as step 8; the recorder dedupes
/// on doc_ref, so overlap between the two result sets is harmless.
pub struct DeedHistoryStep {
    client: Arc<dyn DocumentIndexClient>,
}

impl DeedHistoryStep {
    /// Build the step over a document index client
    pub fn new(client: Arc<dyn DocumentIndexClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichStep for DeedHistoryStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            number: 9,
            name: "deed_history",
            phase: Phase::Two,
            service: ServiceKind::DocumentIndex,
        }
    }

    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError> {
        let documents = ctx.reader.documents(&ctx.resolved_key)?;
        Ok(documents.iter().any(|doc| doc.doc_type == "deed"))
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let key = ctx.effective_key()?;
        match self.client.deed_history(&key).await {
            SourceResult::Success(deeds) if deeds.is_empty() => Ok(StepOutcome::NoData),
            SourceResult::Success(deeds) => {
                ctx.queue.enqueue(WriteOp::SaveDocuments {
                    entity_key: ctx.resolved_key.clone(),
                    documents: deeds,
                })?;
                Ok(StepOutcome::Saved)
            }
            SourceResult::NoData => Ok(StepOutcome::NoData),
            SourceResult::Failure(err) => Err(err.into()),
        }
    }
}
