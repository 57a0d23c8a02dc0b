use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::SubjectErrorKind;
use crate::modality::Modality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectStatus {
    Pending,
    Converted,
    ModalityResolved,
    Segmented,
    #[serde(rename = "QCComplete")]
    QcComplete,
    Failed,
}

impl SubjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Converted => "Converted",
            Self::ModalityResolved => "ModalityResolved",
            Self::Segmented => "Segmented",
            Self::QcComplete => "QCComplete",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::QcComplete | Self::Failed)
    }

    /// Successor on the happy path.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Converted),
            Self::Converted => Some(Self::ModalityResolved),
            Self::ModalityResolved => Some(Self::Segmented),
            Self::Segmented => Some(Self::QcComplete),
            Self::QcComplete | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: SubjectStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl std::fmt::Display for SubjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: SubjectErrorKind,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: String,
    pub root: PathBuf,
    pub series_dirs: Vec<PathBuf>,
    pub modality: Option<Modality>,
    status: SubjectStatus,
    failure: Option<FailureRecord>,
}

impl Subject {
    pub fn new(root: PathBuf) -> Self {
        let id = root
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        Self {
            id,
            root,
            series_dirs: Vec::new(),
            modality: None,
            status: SubjectStatus::Pending,
            failure: None,
        }
    }

    pub fn status(&self) -> SubjectStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    pub fn advance(&mut self, to: SubjectStatus) -> Result<()> {
        if to == SubjectStatus::Failed {
            bail!("use Subject::fail to enter the Failed state");
        }
        if !self.status.can_transition_to(to) {
            bail!(
                "subject '{}': invalid transition {} -> {}",
                self.id,
                self.status,
                to
            );
        }
        self.status = to;
        Ok(())
    }

    pub fn fail(&mut self, record: FailureRecord) -> Result<()> {
        if self.status.is_terminal() {
            bail!(
                "subject '{}' is already terminal ({})",
                self.id,
                self.status
            );
        }
        self.status = SubjectStatus::Failed;
        self.failure = Some(record);
        Ok(())
    }
}

/// One subject per visible subdirectory of `main_dir`, in name order.
pub fn discover_subjects(main_dir: &Path) -> Result<Vec<Subject>> {
    let dirs = sorted_subdirs(main_dir, None)
        .with_context(|| format!("failed to list main folder {}", main_dir.display()))?;
    Ok(dirs.into_iter().map(Subject::new).collect())
}

/// Series folders of a subject, skipping hidden entries and the tool's own output folder.
pub fn discover_series(subject_root: &Path, output_dir_name: &str) -> Result<Vec<PathBuf>> {
    sorted_subdirs(subject_root, Some(output_dir_name))
        .with_context(|| format!("failed to list subject folder {}", subject_root.display()))
}

fn sorted_subdirs(dir: &Path, skip: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || Some(name.as_str()) == skip {
            continue;
        }
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}
