use serde::{Deserialize, Serialize};

use crate::modality::Modality;
use crate::qc::OrganSimilarityScore;
use crate::qc::distance::DistanceMetric;
use crate::subject::{FailureRecord, SubjectStatus};

pub const TOOL_NAME: &str = "kira-segqc";
pub const SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReportV1 {
    pub tool: String,
    pub version: String,
    pub schema_version: String,
    pub subject: String,
    pub modality: Modality,
    pub metric: DistanceMetric,
    pub k: f64,
    pub clean: bool,
    pub at_risk_count: usize,
    pub organs: Vec<OrganSimilarityScore>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusV1 {
    pub tool: String,
    pub version: String,
    pub schema_version: String,
    pub subject: String,
    pub status: SubjectStatus,
    pub modality: Option<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_risk_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StatusV1 {
    pub fn new(tool_version: &str, subject: &str, status: SubjectStatus) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            version: tool_version.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            subject: subject.to_string(),
            status,
            modality: None,
            at_risk_count: None,
            failure: None,
            warnings: Vec::new(),
        }
    }
}
