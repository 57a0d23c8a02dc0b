use anyhow::Result;
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::modality::resolve;
use crate::pipeline::Stage;
use crate::subject::SubjectStatus;

pub struct Stage2Modality;

impl Stage2Modality {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage2Modality {
    fn name(&self) -> &'static str {
        "stage2_modality"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let (decision, warnings) = resolve(&ctx.volumes)?;
        for w in &warnings {
            warn!(subject = %ctx.subject.id, "{}", w);
        }
        ctx.warnings.extend(warnings);
        ctx.decision = Some(decision);
        ctx.subject.modality = Some(decision.modality);
        ctx.subject.advance(SubjectStatus::ModalityResolved)?;
        info!(
            subject = %ctx.subject.id,
            modality = decision.modality.as_str(),
            classes = ctx.env.taxonomy.size(decision.modality),
            "modality_resolved"
        );
        Ok(())
    }
}
