//! Generic step-runner harness
//!
//! Uniform wrapper around every step: short-circuit on the step flag,
//! short-circuit on the idempotency predicate, acquire the service gate,
//! invoke, and convert every outcome into write-queue updates. Collaborator
//! failures become data on the status record; only store failures
//! propagate.

use crate::error::{PipelineError, StepError};
use crate::gates::Gates;
use crate::step::{EnrichStep, StepContext, StepDescriptor, StepOutcome};
use caseflow_store::WriteOp;
use std::sync::Arc;

/// How one step ended for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Collaborator invoked, data saved
    Completed,
    /// Collaborator invoked, confirmed empty
    NoData,
    /// Skipped without a collaborator call (flag set or data present)
    ShortCircuited,
    /// Collaborator failed; diagnostic recorded
    Failed(String),
}

/// Outcome of one step for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// The step that ran
    pub step: StepDescriptor,
    /// How it ended
    pub disposition: Disposition,
}

/// Run one step for one item.
///
/// Returns `Err` only for fatal store failures; collaborator failures are
/// reported in the disposition so sibling steps keep running.
pub(crate) async fn run_step(
    step: &Arc<dyn EnrichStep>,
    ctx: &StepContext,
    gates: &Gates,
) -> Result<StepReport, PipelineError> {
    let descriptor = step.descriptor();
    let item_id = ctx.item.item_id;

    // Flag already set by a previous run: nothing to do, nothing to write.
    if ctx.reader.step_complete(item_id, descriptor.number)? {
        tracing::debug!(step = descriptor.name, "step flag already set");
        return Ok(StepReport {
            step: descriptor,
            disposition: Disposition::ShortCircuited,
        });
    }

    // Data already present (e.g. written under another work item sharing
    // the entity): set the flag without invoking the collaborator.
    match step.already_has_data(ctx).await {
        Ok(true) => {
            tracing::debug!(step = descriptor.name, "data present, skipping collaborator");
            mark_complete(ctx, descriptor)?;
            return Ok(StepReport {
                step: descriptor,
                disposition: Disposition::ShortCircuited,
            });
        }
        Ok(false) => {}
        Err(StepError::Store(err)) => return Err(err.into()),
        Err(StepError::Collaborator(err)) => {
            // Predicates read the store only; a collaborator error here is
            // a step implementation bug. Record it like any failure.
            return Ok(StepReport {
                step: descriptor,
                disposition: Disposition::Failed(err.to_string()),
            });
        }
    }

    // Bulkhead: held exactly for the collaborator call, released on every
    // exit path by permit drop.
    let _permit = gates.admit(descriptor.service).await?;

    match step.run(ctx).await {
        Ok(StepOutcome::Saved) => {
            mark_complete(ctx, descriptor)?;
            Ok(StepReport {
                step: descriptor,
                disposition: Disposition::Completed,
            })
        }
        Ok(StepOutcome::NoData) => {
            mark_complete(ctx, descriptor)?;
            Ok(StepReport {
                step: descriptor,
                disposition: Disposition::NoData,
            })
        }
        Err(StepError::Collaborator(err)) => {
            tracing::warn!(
                step = descriptor.name,
                item = %item_id,
                error = %err,
                "step failed"
            );
            Ok(StepReport {
                step: descriptor,
                disposition: Disposition::Failed(err.to_string()),
            })
        }
        Err(StepError::Store(err)) => Err(err.into()),
    }
}

fn mark_complete(ctx: &StepContext, descriptor: StepDescriptor) -> Result<(), PipelineError> {
    ctx.queue.enqueue(WriteOp::MarkStepComplete {
        item_id: ctx.item.item_id,
        step_number: descriptor.number,
        step_name: descriptor.name.to_string(),
    })?;
    Ok(())
}
