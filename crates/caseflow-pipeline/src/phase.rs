//! Phase scheduler: fan out, wait for all, collect failures
//!
//! Each phase runs its steps concurrently and joins with "wait for all,
//! collect errors" semantics. A failure in one step never cancels its
//! siblings. Between phases the write queue is flushed so later readers
//! observe earlier writes.

use crate::error::PipelineError;
use crate::gates::Gates;
use crate::runner::{run_step, StepReport};
use crate::step::{EnrichStep, Phase, StepContext};
use std::sync::Arc;

/// Steps of one phase, ordered by step number
pub(crate) fn steps_for_phase(
    steps: &[Arc<dyn EnrichStep>],
    phase: Phase,
) -> Vec<Arc<dyn EnrichStep>> {
    let mut selected: Vec<_> = steps
        .iter()
        .filter(|step| step.descriptor().phase == phase)
        .cloned()
        .collect();
    selected.sort_by_key(|step| step.descriptor().number);
    selected
}

/// Run every step of one phase concurrently.
///
/// Waits for all steps regardless of failures. Fatal store errors are
/// surfaced only after every sibling has finished, so no step is cancelled
/// mid-write.
pub(crate) async fn run_phase(
    steps: &[Arc<dyn EnrichStep>],
    ctx: &StepContext,
    gates: &Gates,
) -> Result<Vec<StepReport>, PipelineError> {
    let futures = steps.iter().map(|step| run_step(step, ctx, gates));
    let results = futures::future::join_all(futures).await;

    let mut reports = Vec::with_capacity(results.len());
    let mut fatal = None;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => fatal = Some(err),
        }
    }
    match fatal {
        Some(err) => Err(err),
        None => Ok(reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::ServiceKind;
    use crate::step::StepDescriptor;

    struct Named(StepDescriptor);

    #[async_trait::async_trait]
    impl EnrichStep for Named {
        fn descriptor(&self) -> StepDescriptor {
            self.0
        }
        async fn already_has_data(
            &self,
            _ctx: &StepContext,
        ) -> Result<bool, crate::error::StepError> {
            Ok(false)
        }
        async fn run(
            &self,
            _ctx: &StepContext,
        ) -> Result<crate::step::StepOutcome, crate::error::StepError> {
            Ok(crate::step::StepOutcome::NoData)
        }
    }

    fn step(number: u32, phase: Phase) -> Arc<dyn EnrichStep> {
        Arc::new(Named(StepDescriptor {
            number,
            name: "test",
            phase,
            service: ServiceKind::Tax,
        }))
    }

    #[test]
    fn partition_keeps_number_order() {
        let steps = vec![
            step(7, Phase::One),
            step(10, Phase::Three),
            step(2, Phase::One),
            step(8, Phase::Two),
        ];
        let phase_one = steps_for_phase(&steps, Phase::One);
        let numbers: Vec<u32> = phase_one.iter().map(|s| s.descriptor().number).collect();
        assert_eq!(numbers, vec![2, 7]);
        assert_eq!(steps_for_phase(&steps, Phase::Two).len(), 1);
    }
}
