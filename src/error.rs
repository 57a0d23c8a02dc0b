use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories recorded against a single subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectErrorKind {
    UnsupportedModality,
    PredictorCrash,
    MalformedOutput,
    ConversionFailed,
    Cancelled,
    Io,
}

impl SubjectErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedModality => "UnsupportedModality",
            Self::PredictorCrash => "PredictorCrash",
            Self::MalformedOutput => "MalformedOutput",
            Self::ConversionFailed => "ConversionFailed",
            Self::Cancelled => "Cancelled",
            Self::Io => "Io",
        }
    }
}

impl std::fmt::Display for SubjectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SubjectError {
    #[error("unsupported modality: {0}")]
    UnsupportedModality(String),
    #[error("predictor crashed: {0}")]
    PredictorCrash(String),
    #[error("malformed predictor output: {0}")]
    MalformedOutput(String),
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("cancelled before completion")]
    Cancelled,
}

impl SubjectError {
    pub fn kind(&self) -> SubjectErrorKind {
        match self {
            Self::UnsupportedModality(_) => SubjectErrorKind::UnsupportedModality,
            Self::PredictorCrash(_) => SubjectErrorKind::PredictorCrash,
            Self::MalformedOutput(_) => SubjectErrorKind::MalformedOutput,
            Self::ConversionFailed(_) => SubjectErrorKind::ConversionFailed,
            Self::Cancelled => SubjectErrorKind::Cancelled,
        }
    }
}

/// Recovers the subject-level kind from a stage error. Anything without a typed
/// cause is an I/O style failure.
pub fn classify(err: &anyhow::Error) -> SubjectErrorKind {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SubjectError>())
        .map(SubjectError::kind)
        .unwrap_or(SubjectErrorKind::Io)
}

/// Any of these is fatal for the whole batch (AtlasCorrupt).
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("AtlasCorrupt: failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("AtlasCorrupt: {path} is not a valid atlas document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("AtlasCorrupt: {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}
