//! DICOM series conversion. The converter itself is an external collaborator;
//! this module only drives it and loads what it produced.

mod dcm2niix;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::volume::nifti_io;
use crate::volume::{ModalityTag, Volume};

pub use dcm2niix::{Dcm2niix, read_sidecar_modality};

#[derive(Debug, Clone)]
pub struct ConvertedSeries {
    pub nifti: PathBuf,
    /// Raw DICOM modality code as reported by the converter.
    pub modality_code: Option<String>,
}

pub trait SeriesConverter: Send + Sync {
    fn name(&self) -> &'static str;
    fn convert(&self, series_dir: &Path, out_dir: &Path, series: &str)
    -> Result<Vec<ConvertedSeries>>;
}

#[derive(Debug, Default)]
pub struct LoadedSeries {
    pub volumes: Vec<Volume>,
    pub warnings: Vec<String>,
}

/// Converts every series folder and keeps the CT/PET volumes. Converted files are
/// moved to `<out_root>/CT` or `<out_root>/PT`. A series that fails to convert is
/// a warning, not an error.
pub fn load_series(
    converter: &dyn SeriesConverter,
    series_dirs: &[PathBuf],
    scratch_dir: &Path,
    out_root: &Path,
) -> Result<LoadedSeries> {
    let mut loaded = LoadedSeries::default();
    for series_dir in series_dirs {
        let series = series_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "series".to_string());
        let converted = match converter.convert(series_dir, scratch_dir, &series) {
            Ok(c) => c,
            Err(err) => {
                warn!(series = %series, error = %err, "series_conversion_failed");
                loaded
                    .warnings
                    .push(format!("series '{}' could not be converted: {:#}", series, err));
                continue;
            }
        };
        if converted.is_empty() {
            loaded
                .warnings
                .push(format!("series '{}' produced no volume", series));
        }

        for (idx, item) in converted.into_iter().enumerate() {
            let code = item.modality_code.as_deref().unwrap_or("");
            let Some(tag) = ModalityTag::from_dicom(code) else {
                loaded.warnings.push(format!(
                    "series '{}' has unsupported modality '{}'; skipped",
                    series, code
                ));
                continue;
            };
            let name = if idx == 0 {
                series.clone()
            } else {
                format!("{}_{}", series, idx)
            };
            let dest_dir = out_root.join(tag.folder());
            fs::create_dir_all(&dest_dir)
                .with_context(|| format!("failed to create {}", dest_dir.display()))?;
            let dest = dest_dir.join(format!("{}{}", name, nifti_suffix(&item.nifti)));
            move_file(&item.nifti, &dest)?;

            let (geometry, data) = nifti_io::read_f32(&dest)?;
            info!(
                series = %name,
                modality = tag.folder(),
                dims = ?geometry.dims,
                "series_loaded"
            );
            loaded.volumes.push(Volume::new(&name, tag, geometry, data));
        }
    }
    Ok(loaded)
}

fn nifti_suffix(path: &Path) -> &'static str {
    if path.to_string_lossy().ends_with(".gz") {
        ".nii.gz"
    } else {
        ".nii"
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))?;
    Ok(())
}
