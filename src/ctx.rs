use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array3;

use crate::atlas::ReferenceAtlas;
use crate::cancel::CancelToken;
use crate::convert::SeriesConverter;
use crate::modality::ModalityDecision;
use crate::qc::{QcParams, QcResult};
use crate::segment::{LabelMask, Predictor};
use crate::subject::Subject;
use crate::taxonomy::ClassTaxonomy;
use crate::volume::Volume;

pub const OUTPUT_DIR_NAME: &str = "kira-segqc";

/// `Ctx::stage` before the first stage has started.
pub const PENDING_STAGE: &str = "pending";

/// Run-wide settings; fixed before the first subject starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub qc: QcParams,
    pub max_concurrent_subjects: usize,
    pub output_dir_name: String,
    /// Reprocess subjects whose status file already reads `QCComplete`.
    pub force: bool,
    pub tool_version: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            qc: QcParams::default(),
            max_concurrent_subjects: 1,
            output_dir_name: OUTPUT_DIR_NAME.to_string(),
            force: false,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub out_dir: PathBuf,
    pub ct_dir: PathBuf,
    pub pt_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub labels_dir: PathBuf,
    pub mask_path: PathBuf,
    pub report_dir: PathBuf,
    pub risk_tsv_path: PathBuf,
    pub risk_json_path: PathBuf,
    pub status_path: PathBuf,
}

impl OutputPaths {
    pub fn for_subject(subject_root: &Path, output_dir_name: &str) -> Self {
        Self::at(subject_root.join(output_dir_name))
    }

    pub fn at(out_dir: PathBuf) -> Self {
        let labels_dir = out_dir.join("labels");
        let report_dir = labels_dir.join("sim_space").join("similarity-space");
        Self {
            ct_dir: out_dir.join("CT"),
            pt_dir: out_dir.join("PT"),
            temp_dir: out_dir.join("temp"),
            mask_path: labels_dir.join("segmentation.nii.gz"),
            risk_tsv_path: report_dir.join("risk_report.tsv"),
            risk_json_path: report_dir.join("risk_report.json"),
            status_path: out_dir.join("status.json"),
            labels_dir,
            report_dir,
            out_dir,
        }
    }
}

/// Shared, read-only collaborators of a batch run.
#[derive(Clone, Copy)]
pub struct RunEnv<'a> {
    pub taxonomy: &'a ClassTaxonomy,
    pub atlas: &'a ReferenceAtlas,
    pub converter: &'a dyn SeriesConverter,
    pub predictor: &'a dyn Predictor,
    pub config: &'a RunConfig,
    pub cancel: &'a CancelToken,
}

/// Per-subject working state threaded through the pipeline stages.
pub struct Ctx<'a> {
    pub env: RunEnv<'a>,
    pub subject: Subject,
    pub output: OutputPaths,
    pub stage: &'static str,
    pub volumes: Vec<Volume>,
    pub decision: Option<ModalityDecision>,
    pub pet_on_ct: Option<Array3<f32>>,
    pub mask: Option<LabelMask>,
    pub qc: Option<QcResult>,
    pub warnings: Vec<String>,
}

impl<'a> Ctx<'a> {
    pub fn new(env: RunEnv<'a>, subject: Subject) -> Self {
        let output = OutputPaths::for_subject(&subject.root, &env.config.output_dir_name);
        Self {
            env,
            subject,
            output,
            stage: PENDING_STAGE,
            volumes: Vec::new(),
            decision: None,
            pet_on_ct: None,
            mask: None,
            qc: None,
            warnings: Vec::new(),
        }
    }

    pub fn decision(&self) -> Result<ModalityDecision> {
        self.decision.context("modality not resolved")
    }

    pub fn reference_ct(&self) -> Result<&Volume> {
        let decision = self.decision()?;
        self.volumes
            .get(decision.ct)
            .context("reference CT volume missing")
    }

    pub fn reference_pet(&self) -> Result<Option<&Volume>> {
        let decision = self.decision()?;
        match decision.pet {
            Some(idx) => Ok(Some(
                self.volumes.get(idx).context("reference PET volume missing")?,
            )),
            None => Ok(None),
        }
    }
}
