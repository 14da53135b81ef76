//! The twelve enrichment steps, grouped by phase

mod phase1;
mod phase2;
mod phase3;

pub use phase1::{
    BusinessRegistryStep, FloodZoneStep, MarketListingStep, PermitsStep, PropertyProfileStep,
    SurveyLookupStep, TaxStatusStep,
};
pub use phase2::{DeedHistoryStep, DocumentIndexStep};
pub use phase3::{ChainOfTitleStep, LienSurvivalStep, ValuationSummaryStep};
