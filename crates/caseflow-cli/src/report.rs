//! Plain-text rendering for run summaries and backlog status

use caseflow_pipeline::{RunSummary, StepPercent};
use caseflow_store::{FailureSample, StatusCounts};
use std::fmt::Write;

/// Render a finished run
#[must_use]
pub fn render_run(summary: &RunSummary) -> String {
    let mut out = String::new();
    if summary.dry_run {
        let _ = writeln!(out, "dry run: nothing claimed, nothing written");
    }
    let _ = writeln!(
        out,
        "discovered {}  claimed {}  completed {}  failed {}  skipped {}",
        summary.discovered, summary.claimed, summary.completed, summary.failed, summary.skipped
    );
    let _ = writeln!(out);
    render_counts(&mut out, &summary.status_counts);
    render_steps(&mut out, &summary.steps);
    render_failures(&mut out, &summary.failures);
    out
}

/// Render the backlog without running anything
#[must_use]
pub fn render_status(
    counts: &StatusCounts,
    steps: &[StepPercent],
    failures: &[FailureSample],
) -> String {
    let mut out = String::new();
    render_counts(&mut out, counts);
    render_steps(&mut out, steps);
    render_failures(&mut out, failures);
    out
}

fn render_counts(out: &mut String, counts: &StatusCounts) {
    let _ = writeln!(
        out,
        "backlog: {} items  (pending {}, processing {}, completed {}, failed {}, skipped {})",
        counts.total(),
        counts.pending,
        counts.processing,
        counts.completed,
        counts.failed,
        counts.skipped
    );
}

fn render_steps(out: &mut String, steps: &[StepPercent]) {
    if steps.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nstep completion:");
    for step in steps {
        let _ = writeln!(
            out,
            "  {:>2} {:<20} {:>5}/{:<5} {:>5.1}%",
            step.step_number,
            step.step_name,
            step.completed,
            step.total,
            step.percent()
        );
    }
}

fn render_failures(out: &mut String, failures: &[FailureSample]) {
    if failures.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nrecent failures:");
    for failure in failures {
        let step = failure
            .error_step
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let _ = writeln!(
            out,
            "  {}  step {}  {}",
            failure.item_id, step, failure.last_error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> StatusCounts {
        StatusCounts {
            pending: 2,
            processing: 0,
            completed: 5,
            failed: 1,
            skipped: 1,
        }
    }

    #[test]
    fn status_lists_every_bucket() {
        let text = render_status(&counts(), &[], &[]);
        assert!(text.contains("9 items"));
        assert!(text.contains("failed 1"));
    }

    #[test]
    fn steps_render_percentages() {
        let steps = vec![StepPercent {
            step_number: 1,
            step_name: "tax_status".to_string(),
            completed: 3,
            total: 4,
        }];
        let text = render_status(&counts(), &steps, &[]);
        assert!(text.contains("tax_status"));
        assert!(text.contains("75.0%"));
    }
}
