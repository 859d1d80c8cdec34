use super::{EvaluationStep, PassReport};
use itertools::Itertools;

/// Formats pass reports into human-readable text.
pub struct TraceFormatter;

impl TraceFormatter {
    /// One line per evaluation, followed by any effect failures.
    pub fn format_report(report: &PassReport) -> String {
        let mut lines: Vec<String> = report.steps.iter().map(Self::format_step).collect();
        lines.extend(
            report
                .effect_failures
                .iter()
                .map(|f| format!("! {} failed: {}", f.node_id, f.message)),
        );
        if report.deferred > 0 {
            lines.push(format!("~ {} feedback write(s) deferred", report.deferred));
        }
        lines.join("\n")
    }

    /// Formats a single evaluation, e.g. `sum <- input-0 => output-0 = 3`.
    pub fn format_step(step: &EvaluationStep) -> String {
        if step.emitted.is_empty() {
            return format!("{} <- {} (no change)", step.node_id, step.trigger);
        }
        let emitted = step
            .emitted
            .iter()
            .map(|(port, value)| format!("{} = {}", port, value))
            .join(", ");
        format!("{} <- {} => {}", step.node_id, step.trigger, emitted)
    }

    /// A one-line count summary.
    pub fn summarize(report: &PassReport) -> String {
        format!(
            "{} pass(es), {} evaluation(s), {} effect failure(s), {} deferred",
            report.passes,
            report.evaluations,
            report.effect_failures.len(),
            report.deferred
        )
    }
}
