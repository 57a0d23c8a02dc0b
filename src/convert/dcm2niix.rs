use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::convert::{ConvertedSeries, SeriesConverter};

/// Runs `dcm2niix -z y -b y -f <series> -o <out> <series_dir>` and pairs every
/// NIfTI it writes with the `Modality` field of its JSON sidecar.
#[derive(Debug, Clone)]
pub struct Dcm2niix {
    pub binary: PathBuf,
}

impl Dcm2niix {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-h")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl SeriesConverter for Dcm2niix {
    fn name(&self) -> &'static str {
        "dcm2niix"
    }

    fn convert(
        &self,
        series_dir: &Path,
        out_dir: &Path,
        series: &str,
    ) -> Result<Vec<ConvertedSeries>> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let start = Instant::now();
        let output = Command::new(&self.binary)
            .args(["-z", "y", "-b", "y", "-f"])
            .arg(series)
            .arg("-o")
            .arg(out_dir)
            .arg(series_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to launch {}", self.binary.display()))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let msg = if stderr.trim().is_empty() { stdout } else { stderr };
            bail!("dcm2niix exited with {}: {}", output.status, msg.trim());
        }
        debug!(series, stdout = %String::from_utf8_lossy(&output.stdout), "dcm2niix_output");

        // dcm2niix exits 0 for series it cannot convert (e.g. SR); only trust files.
        let mut converted = Vec::new();
        for nifti in find_outputs(out_dir, series)? {
            let sidecar = sidecar_for(&nifti);
            let modality_code = if sidecar.exists() {
                read_sidecar_modality(&sidecar)?
            } else {
                None
            };
            converted.push(ConvertedSeries {
                nifti,
                modality_code,
            });
        }
        info!(series, files = converted.len(), elapsed_ms, "series_converted");
        Ok(converted)
    }
}

pub fn read_sidecar_modality(path: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read sidecar {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid JSON sidecar {}", path.display()))?;
    Ok(value
        .get("Modality")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string()))
}

fn find_outputs(dir: &Path, series: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        // suffixes like `_e1` or `_ph` still share the series prefix
        if name.starts_with(series) && (name.ends_with(".nii.gz") || name.ends_with(".nii")) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn sidecar_for(nifti: &Path) -> PathBuf {
    let name = nifti
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);
    nifti.with_file_name(format!("{}.json", stem))
}
