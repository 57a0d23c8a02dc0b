use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::io::write_json_atomic;
use crate::modality::Modality;
use crate::qc::QcResult;
use crate::schema::v1::{RiskReportV1, SCHEMA_VERSION, StatusV1, TOOL_NAME};

pub fn build_risk_report(
    subject: &str,
    modality: Modality,
    qc: &QcResult,
    tool_version: &str,
) -> RiskReportV1 {
    RiskReportV1 {
        tool: TOOL_NAME.to_string(),
        version: tool_version.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        subject: subject.to_string(),
        modality,
        metric: qc.metric,
        k: qc.k,
        clean: qc.is_clean(),
        at_risk_count: qc.at_risk_count(),
        organs: qc.scores.clone(),
        warnings: qc.warnings.clone(),
    }
}

pub fn write_risk_json(path: &Path, report: &RiskReportV1) -> Result<()> {
    write_json_atomic(path, report)
}

pub fn write_status(path: &Path, status: &StatusV1) -> Result<()> {
    write_json_atomic(path, status)
}

/// `None` when no status file exists yet.
pub fn read_status(path: &Path) -> Result<Option<StatusV1>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let status = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(status))
}
