//! Step interface: descriptors, phases, and the shared step context
//!
//! A step is one named enrichment operation with its own idempotency
//! predicate and collaborator. Steps never talk to each other and never
//! mutate the store directly: data goes out through the write queue, state
//! comes in through the reader.

use crate::error::StepError;
use crate::gates::ServiceKind;
use async_trait::async_trait;
use caseflow_store::{EntityKey, EntityRecord, StoreError, StoreReader, WorkItem, WriteQueue};
use serde::{Deserialize, Serialize};

/// Execution phase, ordered by data dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Inputs known at claim time; steps run concurrently
    One,
    /// Needs the canonical parcel/legal key Phase 1 may have corrected
    Two,
    /// Needs Phase 2's documents; entity-scoped analyses
    Three,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 3] = [Self::One, Self::Two, Self::Three];

    /// 1-based phase number
    #[inline]
    #[must_use]
    pub fn number(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Parse a 1-based phase number
    #[must_use]
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "phase {}", self.number())
    }
}

/// Static description of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Stable 1-based step number
    pub number: u32,
    /// Stable step name
    pub name: &'static str,
    /// Phase the step is scheduled in
    pub phase: Phase,
    /// Gate the step acquires before calling its collaborator
    pub service: ServiceKind,
}

/// What a step reports after invoking its collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Data obtained and enqueued for persistence
    Saved,
    /// Collaborator confirmed there is nothing; still counts as done
    NoData,
}

/// Everything a step may touch while running
///
/// Cheap to clone: the reader and queue are handles. One context is built
/// per claimed work item and shared by all of its steps.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The work item being enriched
    pub item: WorkItem,
    /// Entity key after claim-time validation/fallback; may differ from
    /// the raw key on the item
    pub resolved_key: EntityKey,
    /// Read handle over the store
    pub reader: StoreReader,
    /// Write queue handle
    pub queue: WriteQueue,
}

impl StepContext {
    /// Entity projection for the resolved key, if any writes landed yet
    pub fn entity(&self) -> Result<Option<EntityRecord>, StoreError> {
        self.reader.entity(&self.resolved_key)
    }

    /// Key Phase 2/3 collaborators should use: the canonical key when the
    /// profile step produced one, otherwise the resolved key.
    ///
    /// Only meaningful after the Phase 1 barrier.
    pub fn effective_key(&self) -> Result<EntityKey, StoreError> {
        Ok(self
            .entity()?
            .and_then(|entity| entity.canonical_key)
            .map_or_else(|| self.resolved_key.clone(), EntityKey::new))
    }
}

/// One enrichment step
///
/// Implementations check idempotency from the store, call exactly one
/// collaborator, and enqueue typed write operations. They must not catch
/// store errors: those abort the run.
#[async_trait]
pub trait EnrichStep: Send + Sync {
    /// Static descriptor (number, name, phase, gate)
    fn descriptor(&self) -> StepDescriptor;

    /// Idempotency predicate, answered from the store.
    ///
    /// True means the collaborator is not invoked and the step flag is set
    /// directly; this is the main defense against redundant external calls
    /// across resumed runs.
    async fn already_has_data(&self, ctx: &StepContext) -> Result<bool, StepError>;

    /// Invoke the collaborator and enqueue resulting writes
    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(Phase::One < Phase::Two);
        assert!(Phase::Two < Phase::Three);
        assert_eq!(Phase::from_number(2), Some(Phase::Two));
        assert_eq!(Phase::from_number(4), None);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Three.to_string(), "phase 3");
    }
}
