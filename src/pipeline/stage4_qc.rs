use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::qc::run_qc;

pub struct Stage4Qc;

impl Stage4Qc {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage4Qc {
    fn name(&self) -> &'static str {
        "stage4_qc"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let decision = ctx.decision()?;
        let ct = ctx.reference_ct()?;
        let mask = ctx.mask.as_ref().context("label mask missing")?;
        let qc = run_qc(
            mask,
            &ct.data,
            ctx.pet_on_ct.as_ref(),
            decision.modality,
            ctx.env.taxonomy,
            ctx.env.atlas,
            &ctx.env.config.qc,
        );
        info!(
            subject = %ctx.subject.id,
            organs = qc.scores.len(),
            at_risk = qc.at_risk_count(),
            warnings = qc.warnings.len(),
            metric = qc.metric.as_str(),
            "qc_scored"
        );
        ctx.qc = Some(qc);
        Ok(())
    }
}
