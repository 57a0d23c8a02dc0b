//! Batch Controller: drives every subject of a main folder through the pipeline.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::ctx::{Ctx, OutputPaths, PENDING_STAGE, RunEnv};
use crate::error::{SubjectErrorKind, classify};
use crate::io::json_writer::{read_status, write_status};
use crate::io::summary::{format_run_header, format_run_summary, format_subject_line};
use crate::io::tsv_writer::{write_batch_qc_report, write_label_table};
use crate::modality::Modality;
use crate::pipeline::Pipeline;
use crate::qc::OrganSimilarityScore;
use crate::schema::v1::StatusV1;
use crate::subject::{FailureRecord, Subject, SubjectStatus, discover_subjects};

/// Final state of one subject after a run.
#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: String,
    pub status: SubjectStatus,
    pub modality: Option<Modality>,
    pub failure: Option<FailureRecord>,
    pub at_risk_count: Option<usize>,
    pub at_risk: Vec<OrganSimilarityScore>,
    pub elapsed_ms: u64,
    /// Already `QCComplete` from an earlier run and left untouched.
    pub skipped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<SubjectOutcome>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == SubjectStatus::QcComplete)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == SubjectStatus::Failed)
            .count()
    }

    /// Completed subjects with at least one at-risk organ.
    pub fn flagged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.at_risk_count.unwrap_or(0) > 0)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn outcome(&self, subject: &str) -> Option<&SubjectOutcome> {
        self.outcomes.iter().find(|o| o.subject == subject)
    }
}

/// Batch-wide files written next to the subject folders.
#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub label_table: PathBuf,
    pub log: PathBuf,
    pub qc_report: PathBuf,
}

impl BatchPaths {
    pub fn new(main_dir: &Path, output_dir_name: &str) -> Self {
        Self {
            label_table: main_dir.join(format!("{}_labels.tsv", output_dir_name)),
            log: main_dir.join(format!("{}.log", output_dir_name)),
            qc_report: main_dir.join(format!("{}_qc_report.tsv", output_dir_name)),
        }
    }
}

/// Append-only batch log; one line per subject.
pub struct BatchLog {
    file: Mutex<File>,
}

impl BatchLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open batch log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, line: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("batch log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

pub struct BatchController<'a> {
    env: RunEnv<'a>,
    pipeline: Pipeline,
}

impl<'a> BatchController<'a> {
    pub fn new(env: RunEnv<'a>) -> Self {
        Self::with_pipeline(env, Pipeline::standard())
    }

    pub fn with_pipeline(env: RunEnv<'a>, pipeline: Pipeline) -> Self {
        Self { env, pipeline }
    }

    /// Processes every subject of `main_dir`. Subject failures are recorded, never
    /// propagated; only batch-level I/O errors end the run early.
    pub fn run(&self, main_dir: &Path) -> Result<BatchSummary> {
        let config = self.env.config;
        let subjects = discover_subjects(main_dir)?;
        let paths = BatchPaths::new(main_dir, &config.output_dir_name);
        write_label_table(&paths.label_table, self.env.taxonomy)?;

        let log = BatchLog::open(&paths.log)?;
        let started_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        log.append(&format_run_header(
            &config.tool_version,
            main_dir,
            subjects.len(),
            config.qc.metric(self.env.atlas),
            config.qc.k,
            started_unix,
        ))?;
        info!(
            main = %main_dir.display(),
            subjects = subjects.len(),
            max_concurrent = config.max_concurrent_subjects,
            "batch started"
        );

        let outcomes = self.run_subjects(subjects, &log)?;
        let summary = BatchSummary { outcomes };

        let flagged = summary
            .outcomes
            .iter()
            .flat_map(|o| o.at_risk.iter().map(move |s| (o.subject.as_str(), s)));
        write_batch_qc_report(&paths.qc_report, flagged)?;
        log.append(&format_run_summary(&summary))?;
        info!(
            completed = summary.completed(),
            failed = summary.failed(),
            flagged = summary.flagged(),
            "batch finished"
        );
        Ok(summary)
    }

    fn run_subjects(&self, subjects: Vec<Subject>, log: &BatchLog) -> Result<Vec<SubjectOutcome>> {
        let workers = self.env.config.max_concurrent_subjects.max(1);
        if workers == 1 {
            return subjects
                .into_iter()
                .map(|s| self.run_and_log(s, log))
                .collect();
        }

        #[cfg(feature = "mt")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .context("failed to build subject worker pool")?;
            pool.install(|| {
                subjects
                    .into_par_iter()
                    .map(|s| self.run_and_log(s, log))
                    .collect()
            })
        }
        #[cfg(not(feature = "mt"))]
        {
            warn!(workers, "built without `mt`; subjects run sequentially");
            subjects
                .into_iter()
                .map(|s| self.run_and_log(s, log))
                .collect()
        }
    }

    fn run_and_log(&self, subject: Subject, log: &BatchLog) -> Result<SubjectOutcome> {
        let outcome = self.process_subject(subject);
        log.append(&format_subject_line(&outcome))?;
        Ok(outcome)
    }

    /// Runs one subject to a terminal state. Never fails: every error becomes a
    /// failure record on the subject.
    pub fn process_subject(&self, subject: Subject) -> SubjectOutcome {
        let start = Instant::now();
        let config = self.env.config;
        let output = OutputPaths::for_subject(&subject.root, &config.output_dir_name);

        if !config.force {
            match read_status(&output.status_path) {
                Ok(Some(prev)) if prev.status == SubjectStatus::QcComplete => {
                    info!(subject = %subject.id, "subject already complete; skipped");
                    return SubjectOutcome {
                        subject: subject.id,
                        status: SubjectStatus::QcComplete,
                        modality: prev.modality,
                        failure: None,
                        at_risk_count: prev.at_risk_count,
                        at_risk: Vec::new(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                        skipped: true,
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(subject = %subject.id, error = %err, "previous status unreadable; reprocessing")
                }
            }
        }

        let mut ctx = Ctx::new(self.env, subject);
        let result = self.pipeline.run(&mut ctx);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if let Err(err) = result {
            let record = FailureRecord {
                kind: classify(&err),
                stage: ctx.stage.to_string(),
                message: format!("{:#}", err),
            };
            // Cancelled before any stage started: nothing on disk belongs to this run.
            let untouched = record.kind == SubjectErrorKind::Cancelled && ctx.stage == PENDING_STAGE;
            error!(
                subject = %ctx.subject.id,
                kind = record.kind.as_str(),
                stage = %record.stage,
                error = %record.message,
                "subject failed"
            );
            if let Err(fail_err) = ctx.subject.fail(record) {
                warn!(subject = %ctx.subject.id, error = %fail_err, "failure not recorded");
            }
            let mut status = StatusV1::new(&config.tool_version, &ctx.subject.id, ctx.subject.status());
            status.modality = ctx.subject.modality;
            status.failure = ctx.subject.failure().cloned();
            status.warnings = ctx.warnings.clone();
            if !untouched && ctx.output.out_dir.is_dir() {
                if let Err(write_err) = write_status(&ctx.output.status_path, &status) {
                    warn!(subject = %ctx.subject.id, error = %format!("{:#}", write_err), "status file not written");
                }
            }
        } else {
            info!(subject = %ctx.subject.id, elapsed_ms, "subject_finished");
        }

        let at_risk = ctx
            .qc
            .as_ref()
            .filter(|_| ctx.subject.status() == SubjectStatus::QcComplete)
            .map(|qc| qc.at_risk().cloned().collect::<Vec<_>>());
        SubjectOutcome {
            status: ctx.subject.status(),
            modality: ctx.subject.modality,
            failure: ctx.subject.failure().cloned(),
            at_risk_count: at_risk.as_ref().map(|a| a.len()),
            at_risk: at_risk.unwrap_or_default(),
            elapsed_ms,
            skipped: false,
            subject: ctx.subject.id,
        }
    }
}
