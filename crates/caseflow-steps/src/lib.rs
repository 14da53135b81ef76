//! Caseflow Steps - the twelve enrichment steps and their collaborator seams
//!
//! Defines one client trait per external service category, the concrete
//! step implementations scheduled across the three phases, the registry
//! that assembles the production step set, and a deterministic offline hub
//! used by the CLI's offline mode and the integration tests.

#![warn(unreachable_pub)]

pub mod clients;
pub mod offline;
pub mod registry;
pub mod steps;

pub use clients::{
    AnalysisClient, Collaborators, DocumentIndexClient, GisClient, MarketClient, PermitClient,
    PropertyClient, RegistryClient, SurveyClient, TaxClient,
};
pub use offline::{Behavior, OfflineHub};
pub use registry::StepRegistry;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
