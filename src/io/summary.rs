//! Lines of the batch log file (`kira-segqc.log`).

use std::path::Path;

use crate::batch::{BatchSummary, SubjectOutcome};
use crate::qc::distance::DistanceMetric;
use crate::subject::SubjectStatus;

pub fn format_run_header(
    tool_version: &str,
    main_dir: &Path,
    subjects: usize,
    metric: DistanceMetric,
    k: f64,
    started_unix: u64,
) -> String {
    format!(
        "# kira-segqc v{} run started_unix={} main={} subjects={} metric={} k={}",
        tool_version,
        started_unix,
        main_dir.display(),
        subjects,
        metric.as_str(),
        k
    )
}

/// One line per subject; failures carry the error kind and the stage that raised it.
pub fn format_subject_line(outcome: &SubjectOutcome) -> String {
    let mut fields = vec![
        format!("subject={}", outcome.subject),
        format!("status={}", outcome.status.as_str()),
        format!(
            "modality={}",
            outcome.modality.map(|m| m.as_str()).unwrap_or("-")
        ),
    ];
    match (&outcome.failure, outcome.status) {
        (Some(failure), SubjectStatus::Failed) => {
            fields.push(format!("kind={}", failure.kind.as_str()));
            fields.push(format!("stage={}", failure.stage));
            fields.push(format!("message={}", single_line(&failure.message)));
        }
        _ => {
            if let Some(n) = outcome.at_risk_count {
                fields.push(format!("at_risk={}", n));
            }
        }
    }
    if outcome.skipped {
        fields.push("skipped=previous_run".to_string());
    }
    fields.push(format!("elapsed_ms={}", outcome.elapsed_ms));
    fields.join("\t")
}

pub fn format_run_summary(summary: &BatchSummary) -> String {
    format!(
        "# run finished subjects={} completed={} failed={} flagged={}",
        summary.outcomes.len(),
        summary.completed(),
        summary.failed(),
        summary.flagged()
    )
}

fn single_line(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
