//! Concurrency gates (bulkhead model)
//!
//! One top-level gate bounds how many work items are in flight; one gate
//! per external service category bounds how many requests hit that service
//! at once. Gates are independent: saturating the tax gate never blocks
//! flood lookups. Permits are owned, so release happens on every exit path
//! including panic and cancellation.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// External service categories, one gate each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// County tax roll lookups
    Tax,
    /// Listing/market feeds
    Market,
    /// Assessor property profiles
    Property,
    /// GIS / flood map services
    Gis,
    /// Permit portals
    Permit,
    /// Business registry searches
    Registry,
    /// Survey records
    Survey,
    /// Recorder document index (slow, heavily rate limited)
    DocumentIndex,
    /// Title/lien analysis workers
    Analysis,
}

impl ServiceKind {
    /// Every category, in gate-display order
    pub const ALL: [ServiceKind; 9] = [
        Self::Tax,
        Self::Market,
        Self::Property,
        Self::Gis,
        Self::Permit,
        Self::Registry,
        Self::Survey,
        Self::DocumentIndex,
        Self::Analysis,
    ];

    /// Stable name for logs and config keys
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tax => "tax",
            Self::Market => "market",
            Self::Property => "property",
            Self::Gis => "gis",
            Self::Permit => "permit",
            Self::Registry => "registry",
            Self::Survey => "survey",
            Self::DocumentIndex => "document_index",
            Self::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate sizes, loadable from config
///
/// Defaults follow each service's observed tolerance: cheap lookups run
/// 5-10 wide, the recorder index and analysis workers stay at 1-2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateLimits {
    /// Top-level bound on concurrently processed work items
    pub max_items: usize,
    /// Tax service gate
    pub tax: usize,
    /// Market feed gate
    pub market: usize,
    /// Assessor profile gate
    pub property: usize,
    /// GIS gate
    pub gis: usize,
    /// Permit portal gate
    pub permit: usize,
    /// Business registry gate
    pub registry: usize,
    /// Survey records gate
    pub survey: usize,
    /// Recorder document index gate
    pub document_index: usize,
    /// Analysis worker gate
    pub analysis: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_items: 15,
            tax: 5,
            market: 8,
            property: 10,
            gis: 8,
            permit: 5,
            registry: 5,
            survey: 3,
            document_index: 2,
            analysis: 1,
        }
    }
}

impl GateLimits {
    /// Gate size for one service category
    #[must_use]
    pub fn limit(&self, kind: ServiceKind) -> usize {
        match kind {
            ServiceKind::Tax => self.tax,
            ServiceKind::Market => self.market,
            ServiceKind::Property => self.property,
            ServiceKind::Gis => self.gis,
            ServiceKind::Permit => self.permit,
            ServiceKind::Registry => self.registry,
            ServiceKind::Survey => self.survey,
            ServiceKind::DocumentIndex => self.document_index,
            ServiceKind::Analysis => self.analysis,
        }
    }
}

/// The full set of admission gates for one run
#[derive(Debug)]
pub struct Gates {
    items: Arc<Semaphore>,
    services: HashMap<ServiceKind, Arc<Semaphore>>,
}

impl Gates {
    /// Build gates from configured limits
    #[must_use]
    pub fn new(limits: &GateLimits) -> Self {
        let services = ServiceKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Semaphore::new(limits.limit(kind).max(1)))))
            .collect();
        Self {
            items: Arc::new(Semaphore::new(limits.max_items.max(1))),
            services,
        }
    }

    /// Admit one work item; the permit bounds whole-item concurrency
    pub async fn admit_item(&self) -> Result<OwnedSemaphorePermit, PipelineError> {
        self.items
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::GateClosed)
    }

    /// Admit one request to a service category.
    ///
    /// Hold the permit exactly for the duration of the collaborator call.
    /// Every `ServiceKind` is registered at construction; a missing gate
    /// refuses admission rather than handing out an unbounded permit.
    pub async fn admit(
        &self,
        kind: ServiceKind,
    ) -> Result<OwnedSemaphorePermit, PipelineError> {
        let gate = self
            .services
            .get(&kind)
            .cloned()
            .ok_or(PipelineError::GateClosed)?;
        gate.acquire_owned()
            .await
            .map_err(|_| PipelineError::GateClosed)
    }

    /// Free permits on a service gate right now (diagnostics)
    #[must_use]
    pub fn available(&self, kind: ServiceKind) -> usize {
        self.services
            .get(&kind)
            .map_or(0, |gate| gate.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn defaults_are_bounded_sanely() {
        let limits = GateLimits::default();
        assert_eq!(limits.max_items, 15);
        for kind in ServiceKind::ALL {
            assert!(limits.limit(kind) >= 1);
        }
    }

    #[tokio::test]
    async fn every_service_kind_has_a_gate() {
        let gates = Gates::new(&GateLimits::default());
        for kind in ServiceKind::ALL {
            let permit = gates.admit(kind).await;
            assert!(permit.is_ok(), "no gate registered for {kind}");
        }
    }

    #[tokio::test]
    async fn service_gate_caps_in_flight_calls() {
        let limits = GateLimits {
            document_index: 2,
            ..GateLimits::default()
        };
        let gates = Arc::new(Gates::new(&limits));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let gates = gates.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = gates.admit(ServiceKind::DocumentIndex).await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn gates_are_independent() {
        let gates = Gates::new(&GateLimits {
            tax: 1,
            ..GateLimits::default()
        });

        // Saturate the tax gate, then confirm gis admits immediately.
        let _tax = gates.admit(ServiceKind::Tax).await.unwrap();
        assert_eq!(gates.available(ServiceKind::Tax), 0);
        let _gis = gates.admit(ServiceKind::Gis).await.unwrap();
    }

    #[tokio::test]
    async fn permit_release_on_drop() {
        let gates = Gates::new(&GateLimits {
            analysis: 1,
            ..GateLimits::default()
        });
        {
            let _permit = gates.admit(ServiceKind::Analysis).await.unwrap();
            assert_eq!(gates.available(ServiceKind::Analysis), 0);
        }
        assert_eq!(gates.available(ServiceKind::Analysis), 1);
    }
}
