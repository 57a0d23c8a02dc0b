use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::io::json_writer::{build_risk_report, write_risk_json, write_status};
use crate::io::tsv_writer::write_risk_tsv;
use crate::pipeline::Stage;
use crate::schema::v1::StatusV1;
use crate::subject::SubjectStatus;

pub struct Stage5Output;

impl Stage5Output {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage5Output {
    fn name(&self) -> &'static str {
        "stage5_output"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let decision = ctx.decision()?;
        let qc = ctx.qc.as_ref().context("qc result missing")?;
        let version = &ctx.env.config.tool_version;

        write_risk_tsv(&ctx.output.risk_tsv_path, qc)?;
        let report = build_risk_report(&ctx.subject.id, decision.modality, qc, version);
        write_risk_json(&ctx.output.risk_json_path, &report)?;
        let at_risk = qc.at_risk_count();

        // The subject only turns QCComplete once the status file saying so is on disk.
        let mut status = StatusV1::new(version, &ctx.subject.id, SubjectStatus::QcComplete);
        status.modality = Some(decision.modality);
        status.at_risk_count = Some(at_risk);
        status.warnings = ctx.warnings.clone();
        write_status(&ctx.output.status_path, &status)?;
        ctx.subject.advance(SubjectStatus::QcComplete)?;

        info!(
            subject = %ctx.subject.id,
            at_risk,
            report = %ctx.output.risk_tsv_path.display(),
            "subject_outputs_ready"
        );
        Ok(())
    }
}
