use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use crate::ctx::Ctx;
use crate::error::SubjectError;
use crate::io::json_writer::write_status;
use crate::pipeline::Stage;
use crate::schema::v1::StatusV1;
use crate::subject::discover_series;

pub struct Stage0Scaffold;

impl Stage0Scaffold {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage0Scaffold {
    fn name(&self) -> &'static str {
        "stage0_scaffold"
    }

    fn run(&self, ctx: &mut Ctx<'_>) -> Result<()> {
        let out = &ctx.output;
        for dir in [&out.out_dir, &out.temp_dir, &out.labels_dir, &out.report_dir] {
            fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let status = StatusV1::new(
            &ctx.env.config.tool_version,
            &ctx.subject.id,
            ctx.subject.status(),
        );
        write_status(&out.status_path, &status)?;

        let series = discover_series(&ctx.subject.root, &ctx.env.config.output_dir_name)?;
        if series.is_empty() {
            return Err(SubjectError::ConversionFailed(format!(
                "no series folders under {}",
                ctx.subject.root.display()
            ))
            .into());
        }
        info!(
            subject = %ctx.subject.id,
            series = series.len(),
            out_dir = %ctx.output.out_dir.display(),
            "output_dir_ready"
        );
        ctx.subject.series_dirs = series;
        Ok(())
    }
}
