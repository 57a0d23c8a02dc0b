//! Similarity-space quality control.
//!
//! Every organ of the active taxonomy that is either labelled in the mask or
//! described by the atlas receives exactly one score.

pub mod distance;
pub mod features;

use std::collections::BTreeSet;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::atlas::ReferenceAtlas;
use crate::modality::Modality;
use crate::qc::distance::{DistanceMetric, distance};
use crate::qc::features::{ClassFeatures, Feature, extract_features};
use crate::segment::LabelMask;
use crate::taxonomy::ClassTaxonomy;

pub const DEFAULT_K: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreStatus {
    Scored,
    Absent,
    NoReferenceAvailable,
}

impl ScoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scored => "Scored",
            Self::Absent => "Absent",
            Self::NoReferenceAvailable => "NoReferenceAvailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganSimilarityScore {
    pub class_id: u8,
    pub region: String,
    pub status: ScoreStatus,
    pub voxels: u64,
    pub distance: Option<f64>,
    pub threshold: Option<f64>,
    pub at_risk: bool,
    pub dominant_feature: Option<Feature>,
    pub dominant_z: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcParams {
    pub k: f64,
    pub metric_override: Option<DistanceMetric>,
}

impl Default for QcParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            metric_override: None,
        }
    }
}

impl QcParams {
    pub fn metric(&self, atlas: &ReferenceAtlas) -> DistanceMetric {
        self.metric_override.unwrap_or(atlas.metric)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QcResult {
    pub metric: DistanceMetric,
    pub k: f64,
    pub scores: Vec<OrganSimilarityScore>,
    pub warnings: Vec<String>,
}

impl QcResult {
    pub fn at_risk_count(&self) -> usize {
        self.scores.iter().filter(|s| s.at_risk).count()
    }

    pub fn is_clean(&self) -> bool {
        self.at_risk_count() == 0
    }

    pub fn at_risk(&self) -> impl Iterator<Item = &OrganSimilarityScore> {
        self.scores.iter().filter(|s| s.at_risk)
    }
}

/// Scores a validated mask against the atlas. `ct` and `pet` must share the mask grid.
pub fn run_qc(
    mask: &LabelMask,
    ct: &Array3<f32>,
    pet: Option<&Array3<f32>>,
    modality: Modality,
    taxonomy: &ClassTaxonomy,
    atlas: &ReferenceAtlas,
    params: &QcParams,
) -> QcResult {
    let features = extract_features(mask, ct, pet);
    let candidates: Vec<u8> = features
        .keys()
        .copied()
        .chain(atlas.class_ids())
        .filter(|id| taxonomy.contains(modality, *id))
        .collect::<BTreeSet<u8>>()
        .into_iter()
        .collect();

    let metric = params.metric(atlas);
    let score_one = |id: &u8| {
        let region = taxonomy.name(*id).unwrap_or("unknown");
        score_class(*id, region, features.get(id), atlas, metric, params.k)
    };

    #[cfg(feature = "mt")]
    let scored: Vec<(OrganSimilarityScore, Option<String>)> =
        candidates.par_iter().map(score_one).collect();
    #[cfg(not(feature = "mt"))]
    let scored: Vec<(OrganSimilarityScore, Option<String>)> =
        candidates.iter().map(score_one).collect();

    let mut scores = Vec::with_capacity(scored.len());
    let mut warnings = Vec::new();
    for (score, warning) in scored {
        scores.push(score);
        warnings.extend(warning);
    }
    QcResult {
        metric,
        k: params.k,
        scores,
        warnings,
    }
}

fn score_class(
    class_id: u8,
    region: &str,
    features: Option<&ClassFeatures>,
    atlas: &ReferenceAtlas,
    metric: DistanceMetric,
    k: f64,
) -> (OrganSimilarityScore, Option<String>) {
    let mut score = OrganSimilarityScore {
        class_id,
        region: region.to_string(),
        status: ScoreStatus::NoReferenceAvailable,
        voxels: features.map(|f| f.voxels).unwrap_or(0),
        distance: None,
        threshold: None,
        at_risk: false,
        dominant_feature: None,
        dominant_z: None,
    };

    let reference = atlas.get(class_id);
    match (features.filter(|f| f.voxels > 0), reference) {
        (Some(f), Some(reference)) => match distance(&f.vector, reference, metric) {
            Some(d) => {
                let threshold = reference.threshold(k);
                score.status = ScoreStatus::Scored;
                score.distance = Some(d.value);
                score.threshold = Some(threshold);
                score.at_risk = d.value > threshold;
                score.dominant_feature = Some(d.dominant);
                score.dominant_z = Some(d.dominant_z);
                (score, None)
            }
            None => {
                let warning = format!(
                    "class {} ({}): atlas entry shares no feature with the mask",
                    class_id, region
                );
                (score, Some(warning))
            }
        },
        (Some(_), None) => {
            let warning = format!("class {} ({}): no atlas entry", class_id, region);
            (score, Some(warning))
        }
        (None, Some(reference)) => {
            score.status = ScoreStatus::Absent;
            score.at_risk = reference.always_expected;
            (score, None)
        }
        (None, None) => (score, None),
    }
}
