use anyhow::Result;
use tracing::info;

use crate::convert::load_series;
use crate::ctx::Ctx;
use crate::error::SubjectError;
use crate::pipeline::Stage;
use crate::subject::SubjectStatus;

pub struct Stage1Convert;

impl Stage1Convert {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage1Convert {
    fn name(&self) -> &'static str {
        "stage1_convert"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let loaded = load_series(
            ctx.env.converter,
            &ctx.subject.series_dirs,
            &ctx.output.temp_dir,
            &ctx.output.out_dir,
        )?;
        ctx.warnings.extend(loaded.warnings);
        if loaded.volumes.is_empty() {
            return Err(SubjectError::ConversionFailed(format!(
                "none of {} series produced a CT or PET volume",
                ctx.subject.series_dirs.len()
            ))
            .into());
        }
        ctx.volumes = loaded.volumes;
        ctx.subject.advance(SubjectStatus::Converted)?;
        info!(
            subject = %ctx.subject.id,
            volumes = ctx.volumes.len(),
            converter = ctx.env.converter.name(),
            "volumes_ready"
        );
        Ok(())
    }
}
