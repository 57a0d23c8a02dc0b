use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::error::SubjectError;
use crate::segment::{Predictor, PredictorInput, RawPrediction};
use crate::volume::nifti_io;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// External segmentation model driven through a command template.
///
/// Placeholders: `{ct}`, `{pet}`, `{out}`, `{modality}`, `{model}`. For CT-only
/// input a token holding `{pet}` is dropped together with a flag token right before it.
/// The child's stdout/stderr go to `predictor.log` in the work directory.
#[derive(Debug, Clone)]
pub struct CommandPredictor {
    template: Vec<String>,
    model: String,
    timeout: Duration,
}

impl CommandPredictor {
    pub fn from_template(template: &str, model: &str, timeout: Duration) -> Result<Self> {
        let tokens: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            bail!("predictor command template is empty");
        }
        for required in ["{ct}", "{out}"] {
            if !tokens.iter().any(|t| t.contains(required)) {
                bail!("predictor command template lacks the {} placeholder", required);
            }
        }
        Ok(Self {
            template: tokens,
            model: model.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn render(&self, ct: &Path, pet: Option<&Path>, out: &Path, modality: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::with_capacity(self.template.len());
        for token in &self.template {
            if token.contains("{pet}") {
                match pet {
                    Some(pet) => {
                        args.push(token.replace("{pet}", &pet.to_string_lossy()));
                    }
                    None => {
                        if args.last().is_some_and(|prev| prev.starts_with('-')) {
                            args.pop();
                        }
                    }
                }
                continue;
            }
            args.push(
                token
                    .replace("{ct}", &ct.to_string_lossy())
                    .replace("{out}", &out.to_string_lossy())
                    .replace("{modality}", modality)
                    .replace("{model}", &self.model),
            );
        }
        args
    }
}

impl Predictor for CommandPredictor {
    fn name(&self) -> &str {
        &self.template[0]
    }

    fn predict(&self, input: &PredictorInput<'_>) -> Result<RawPrediction> {
        fs::create_dir_all(input.workdir)
            .with_context(|| format!("failed to create {}", input.workdir.display()))?;
        let ct_path = input.workdir.join("predictor_ct.nii.gz");
        nifti_io::write_f32(&ct_path, &input.ct.geometry, &input.ct.data)?;
        let pet_path: Option<PathBuf> = match input.pet {
            Some(pet) => {
                let path = input.workdir.join("predictor_pet.nii.gz");
                nifti_io::write_f32(&path, &input.ct.geometry, pet)?;
                Some(path)
            }
            None => None,
        };
        let out_path = input.workdir.join("predictor_labels.nii.gz");
        if out_path.exists() {
            fs::remove_file(&out_path)
                .with_context(|| format!("failed to remove stale {}", out_path.display()))?;
        }

        let args = self.render(
            &ct_path,
            pet_path.as_deref(),
            &out_path,
            input.modality.as_str(),
        );
        let log_path = input.workdir.join("predictor.log");
        let log = File::create(&log_path)
            .with_context(|| format!("failed to create {}", log_path.display()))?;
        let log_err = log.try_clone()?;

        let start = Instant::now();
        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| SubjectError::PredictorCrash(format!("failed to launch {}: {}", args[0], e)))?;
        info!(program = %args[0], modality = %input.modality, "predictor_started");

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if input.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SubjectError::Cancelled.into());
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                warn!(timeout_s = self.timeout.as_secs(), "predictor_timeout");
                return Err(SubjectError::PredictorCrash(format!(
                    "predictor timed out after {} s",
                    self.timeout.as_secs()
                ))
                .into());
            }
            thread::sleep(POLL_INTERVAL.min(self.timeout));
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !status.success() {
            return Err(SubjectError::PredictorCrash(format!(
                "predictor exited with {} (see {})",
                status,
                log_path.display()
            ))
            .into());
        }
        if !out_path.exists() {
            return Err(SubjectError::PredictorCrash(format!(
                "predictor finished but wrote no mask at {}",
                out_path.display()
            ))
            .into());
        }
        info!(elapsed_ms, "predictor_finished");

        let (geometry, labels) = nifti_io::read_f32(&out_path)
            .map_err(|e| SubjectError::MalformedOutput(format!("{:#}", e)))?;
        Ok(RawPrediction { geometry, labels })
    }
}
