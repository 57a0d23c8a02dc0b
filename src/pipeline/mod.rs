use anyhow::Result;
use std::time::Instant;
use tracing::{info, warn};

use crate::ctx::Ctx;
use crate::error::SubjectError;

pub mod stage0_scaffold;
pub mod stage1_convert;
pub mod stage2_modality;
pub mod stage3_segment;
pub mod stage4_qc;
pub mod stage5_output;

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The full per-subject pipeline in stage order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(stage0_scaffold::Stage0Scaffold::new()),
            Box::new(stage1_convert::Stage1Convert::new()),
            Box::new(stage2_modality::Stage2Modality::new()),
            Box::new(stage3_segment::Stage3Segment::new()),
            Box::new(stage4_qc::Stage4Qc::new()),
            Box::new(stage5_output::Stage5Output::new()),
        ])
    }

    /// Runs stages in order, stopping at the first failure. `ctx.stage` names the
    /// stage that was running when an error is returned; on cancellation it names
    /// the last stage that started, or stays `pending` when none did.
    pub fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        for stage in &self.stages {
            if ctx.env.cancel.is_cancelled() {
                warn!(subject = %ctx.subject.id, stage = stage.name(), "stage skipped: cancelled");
                return Err(SubjectError::Cancelled.into());
            }
            ctx.stage = stage.name();
            let start = Instant::now();
            info!(subject = %ctx.subject.id, stage = stage.name(), "stage started");
            if let Err(err) = stage.run(ctx) {
                let elapsed_ms = start.elapsed().as_millis();
                warn!(
                    subject = %ctx.subject.id,
                    stage = stage.name(),
                    elapsed_ms = elapsed_ms as u64,
                    error = %format!("{:#}", err),
                    "stage failed"
                );
                return Err(err);
            }
            let elapsed_ms = start.elapsed().as_millis();
            info!(
                subject = %ctx.subject.id,
                stage = stage.name(),
                elapsed_ms = elapsed_ms as u64,
                "stage finished"
            );
        }
        Ok(())
    }
}
