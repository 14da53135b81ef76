//! Top-level orchestrator
//!
//! Owns every moving part explicitly - reader, write queue, gates, step
//! registry, discovery and fallback collaborators - and passes context to
//! step runners rather than relying on shared globals. A run discovers new
//! items for the requested window, claims everything reclaimable, and
//! drives each item through the phases under the item-level gate.

use crate::error::{PipelineError, SourceResult};
use crate::gates::{GateLimits, Gates};
use crate::phase::{run_phase, steps_for_phase};
use crate::runner::{Disposition, StepReport};
use crate::step::{EnrichStep, Phase, StepContext};
use crate::summary::RunSummary;
use crate::validate::{validate_entity_key, FallbackSearch, KeyVerdict};
use async_trait::async_trait;
use caseflow_store::{
    EntityKey, PropertyProfile, Store, StoreError, StoreReader, WorkItem, WriteOp, WriteQueue,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Upstream discovery collaborator: finds new cases in a date window
#[async_trait]
pub trait CaseDiscovery: Send + Sync {
    /// Cases scheduled within `[from, to]`, inclusive
    async fn discover(&self, from: NaiveDate, to: NaiveDate) -> SourceResult<Vec<WorkItem>>;
}

/// Parameters of one batch run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Discovery window; `None` processes the existing backlog only
    pub window: Option<(NaiveDate, NaiveDate)>,
    /// First phase to execute (partial re-runs)
    pub start_phase: Phase,
    /// Cap on items claimed this run
    pub item_limit: Option<usize>,
    /// Retry cap for failed items
    pub max_retries: u32,
    /// Reclaim failed items even past the retry cap
    pub retry_failed: bool,
    /// Discover and report only; claim nothing
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            window: None,
            start_phase: Phase::One,
            item_limit: None,
            max_retries: 3,
            retry_failed: false,
            dry_run: false,
        }
    }
}

/// How one item ended this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Completed,
    Failed,
    Skipped,
    /// Already terminal or claimed elsewhere; not counted
    NotClaimed,
}

struct Inner {
    reader: StoreReader,
    queue: WriteQueue,
    gates: Gates,
    steps: Vec<Arc<dyn EnrichStep>>,
    discovery: Arc<dyn CaseDiscovery>,
    fallback: Arc<dyn FallbackSearch>,
    options: RunOptions,
}

/// The enrichment pipeline driver
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator over an open store
    #[must_use]
    pub fn new(
        store: &Store,
        steps: Vec<Arc<dyn EnrichStep>>,
        discovery: Arc<dyn CaseDiscovery>,
        fallback: Arc<dyn FallbackSearch>,
        limits: &GateLimits,
        options: RunOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                reader: store.reader().clone(),
                queue: store.queue().clone(),
                gates: Gates::new(limits),
                steps,
                discovery,
                fallback,
                options,
            }),
        }
    }

    /// Execute one batch run to exhaustion of the claimed item set.
    ///
    /// Individual item failures are reported in the summary, not as errors;
    /// only store/write-queue unavailability aborts.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let inner = &self.inner;
        let discovered = self.discover_new_items().await?;
        inner.queue.flush().await?;

        let claimable = inner.reader.claimable_items(
            inner.options.max_retries,
            inner.options.retry_failed,
            inner.options.item_limit,
        )?;
        tracing::info!(
            discovered,
            claimable = claimable.len(),
            dry_run = inner.options.dry_run,
            "run starting"
        );

        if inner.options.dry_run {
            return Ok(RunSummary::collect(
                &inner.reader,
                true,
                discovered,
                claimable.len(),
                0,
                0,
                0,
            )?);
        }

        let mut workers = JoinSet::new();
        for item in claimable.iter().cloned() {
            let permit = inner.gates.admit_item().await?;
            let this = self.clone();
            let span = tracing::info_span!("work_item", item = %item.item_id);
            workers.spawn(
                async move {
                    let _permit = permit;
                    this.process_item(item).await
                }
                .instrument(span),
            );
        }

        let (mut completed, mut failed, mut skipped) = (0usize, 0usize, 0usize);
        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(ItemOutcome::Completed)) => completed += 1,
                Ok(Ok(ItemOutcome::Failed)) => failed += 1,
                Ok(Ok(ItemOutcome::Skipped)) => skipped += 1,
                Ok(Ok(ItemOutcome::NotClaimed)) => {}
                Ok(Err(err)) => fatal = fatal.or(Some(err)),
                Err(join_err) => {
                    fatal = fatal.or(Some(PipelineError::Worker(join_err.to_string())));
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }

        inner.queue.flush().await?;
        let summary = RunSummary::collect(
            &inner.reader,
            false,
            discovered,
            claimable.len(),
            completed,
            failed,
            skipped,
        )?;
        tracing::info!(completed, failed, skipped, "run finished");
        Ok(summary)
    }

    async fn discover_new_items(&self) -> Result<usize, PipelineError> {
        let inner = &self.inner;
        let Some((from, to)) = inner.options.window else {
            return Ok(0);
        };
        match inner.discovery.discover(from, to).await {
            SourceResult::Success(items) => {
                let count = items.len();
                if !inner.options.dry_run {
                    for item in items {
                        inner.queue.enqueue(WriteOp::InsertWorkItem(item))?;
                    }
                }
                Ok(count)
            }
            SourceResult::NoData => Ok(0),
            SourceResult::Failure(err) => Err(PipelineError::Discovery(err)),
        }
    }

    async fn process_item(&self, item: WorkItem) -> Result<ItemOutcome, PipelineError> {
        let inner = &self.inner;
        let item_id = item.item_id;

        // Claim through the write queue so a raced or already-terminal item
        // is rejected by the state machine, not by best-effort checks.
        match inner
            .queue
            .execute_with_result(WriteOp::MarkProcessing { item_id })
            .await
        {
            Ok(()) => {}
            Err(StoreError::IllegalTransition { from, .. }) => {
                tracing::debug!(%from, "item no longer claimable");
                return Ok(ItemOutcome::NotClaimed);
            }
            Err(err) => return Err(err.into()),
        }

        let resolved_key = match self.resolve_entity_key(&item).await? {
            Some(key) => key,
            None => return Ok(ItemOutcome::Skipped),
        };

        let ctx = StepContext {
            item,
            resolved_key,
            reader: inner.reader.clone(),
            queue: inner.queue.clone(),
        };

        let mut reports: Vec<StepReport> = Vec::new();
        for phase in Phase::ALL {
            if phase < inner.options.start_phase {
                continue;
            }
            if phase == Phase::Two {
                self.ensure_canonical_key(&ctx).await?;
            }
            let phase_steps = steps_for_phase(&inner.steps, phase);
            if phase_steps.is_empty() {
                continue;
            }
            tracing::debug!(%phase, steps = phase_steps.len(), "running phase");
            reports.extend(run_phase(&phase_steps, &ctx, &inner.gates).await?);

            // Barrier: the next phase's readers observe this phase's writes.
            inner.queue.flush().await?;
        }

        self.finish_item(&ctx, &reports).await
    }

    /// Validate the discovered key; on failure, try the party-name fallback
    /// before giving up. Returns `None` after marking the item skipped.
    async fn resolve_entity_key(
        &self,
        item: &WorkItem,
    ) -> Result<Option<EntityKey>, PipelineError> {
        let inner = &self.inner;
        let reason = match validate_entity_key(&item.entity_key) {
            KeyVerdict::Valid => return Ok(Some(item.entity_key.clone())),
            KeyVerdict::Invalid(reason) => reason,
        };

        tracing::info!(key = %item.entity_key, "entity key unusable, trying fallback search");
        if let SourceResult::Success(resolved) = inner.fallback.search_by_parties(item).await {
            if validate_entity_key(&resolved) == KeyVerdict::Valid {
                tracing::info!(resolved = %resolved, "fallback search resolved entity key");
                return Ok(Some(resolved));
            }
        }

        inner
            .queue
            .execute_with_result(WriteOp::MarkSkipped {
                item_id: item.item_id,
                reason: format!("{reason}; fallback search found no match"),
            })
            .await?;
        Ok(None)
    }

    /// Phase-2 precondition: make sure a canonical key exists, running the
    /// fallback search once more if Phase 1 did not produce one.
    async fn ensure_canonical_key(&self, ctx: &StepContext) -> Result<(), PipelineError> {
        let inner = &self.inner;
        let has_canonical = ctx.entity()?.and_then(|e| e.canonical_key).is_some();
        if has_canonical {
            return Ok(());
        }
        match inner.fallback.search_by_parties(&ctx.item).await {
            SourceResult::Success(key) if key != ctx.resolved_key => {
                tracing::debug!(canonical = %key, "fallback supplied canonical key");
                inner
                    .queue
                    .execute_with_result(WriteOp::UpdateProfile {
                        entity_key: ctx.resolved_key.clone(),
                        profile: PropertyProfile {
                            canonical_key: Some(key.to_string()),
                            owner_name: None,
                            situs_address: None,
                            legal_description: None,
                            land_use: None,
                        },
                    })
                    .await?;
            }
            _ => {
                tracing::debug!("no canonical key available, continuing with discovered key");
            }
        }
        Ok(())
    }

    async fn finish_item(
        &self,
        ctx: &StepContext,
        reports: &[StepReport],
    ) -> Result<ItemOutcome, PipelineError> {
        let inner = &self.inner;
        let item_id = ctx.item.item_id;

        let first_failure = reports.iter().find_map(|report| {
            if let Disposition::Failed(reason) = &report.disposition {
                Some((report.step, reason.clone()))
            } else {
                None
            }
        });

        if let Some((step, reason)) = first_failure {
            inner
                .queue
                .execute_with_result(WriteOp::MarkFailed {
                    item_id,
                    reason: format!("{}: {reason}", step.name),
                    step_number: step.number,
                })
                .await?;
            return Ok(ItemOutcome::Failed);
        }

        // Completion requires every defined step's flag, including those
        // set by earlier runs when this run started at a later phase.
        let flags = inner.reader.step_flags(item_id)?;
        if flags.len() >= inner.steps.len() {
            inner
                .queue
                .execute_with_result(WriteOp::MarkCompleted { item_id })
                .await?;
            return Ok(ItemOutcome::Completed);
        }

        let done: Vec<u32> = flags.iter().map(|flag| flag.step_number).collect();
        let missing = inner
            .steps
            .iter()
            .map(|step| step.descriptor())
            .find(|descriptor| !done.contains(&descriptor.number));
        let (number, name) = missing.map_or((0, "unknown"), |d| (d.number, d.name));
        inner
            .queue
            .execute_with_result(WriteOp::MarkFailed {
                item_id,
                reason: format!("{name}: step did not run this pass"),
                step_number: number,
            })
            .await?;
        Ok(ItemOutcome::Failed)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.inner.steps.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
