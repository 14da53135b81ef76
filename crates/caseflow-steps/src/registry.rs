//! Step registry: the ordered, numbered step set a run executes

use crate::clients::Collaborators;
use crate::steps::{
    BusinessRegistryStep, ChainOfTitleStep, DeedHistoryStep, DocumentIndexStep, FloodZoneStep,
    LienSurvivalStep, MarketListingStep, PermitsStep, PropertyProfileStep, SurveyLookupStep,
    TaxStatusStep, ValuationSummaryStep,
};
use caseflow_pipeline::EnrichStep;
use indexmap::IndexMap;
use std::sync::Arc;

/// Ordered collection of enrichment steps keyed by step number.
///
/// Insertion order is execution order within a phase, so the registry
/// preserves it rather than sorting on every read.
#[derive(Default)]
pub struct StepRegistry {
    steps: IndexMap<u32, Arc<dyn EnrichStep>>,
}

impl StepRegistry {
    /// Empty registry, for tests that wire custom steps
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The full production step set, in step-number order
    #[must_use]
    pub fn standard(collaborators: &Collaborators) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TaxStatusStep::new(collaborators.tax.clone())));
        registry.register(Arc::new(MarketListingStep::new(collaborators.market.clone())));
        registry.register(Arc::new(PropertyProfileStep::new(
            collaborators.property.clone(),
        )));
        registry.register(Arc::new(FloodZoneStep::new(collaborators.gis.clone())));
        registry.register(Arc::new(PermitsStep::new(collaborators.permit.clone())));
        registry.register(Arc::new(BusinessRegistryStep::new(
            collaborators.registry.clone(),
        )));
        registry.register(Arc::new(SurveyLookupStep::new(collaborators.survey.clone())));
        registry.register(Arc::new(DocumentIndexStep::new(
            collaborators.documents.clone(),
        )));
        registry.register(Arc::new(DeedHistoryStep::new(
            collaborators.documents.clone(),
        )));
        registry.register(Arc::new(ChainOfTitleStep::new(
            collaborators.analysis.clone(),
        )));
        registry.register(Arc::new(LienSurvivalStep::new(
            collaborators.analysis.clone(),
        )));
        registry.register(Arc::new(ValuationSummaryStep::new(
            collaborators.analysis.clone(),
        )));
        registry
    }

    /// Add a step; a step number may only be registered once
    pub fn register(&mut self, step: Arc<dyn EnrichStep>) {
        let descriptor = step.descriptor();
        let replaced = self.steps.insert(descriptor.number, step);
        debug_assert!(
            replaced.is_none(),
            "duplicate step number {}",
            descriptor.number
        );
    }

    /// Number of registered steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps in registration order, ready for the orchestrator
    #[must_use]
    pub fn into_steps(self) -> Vec<Arc<dyn EnrichStep>> {
        self.steps.into_values().collect()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}
