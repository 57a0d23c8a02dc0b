//! Reference population statistics in similarity space.

mod builder;
mod loader;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::qc::distance::DistanceMetric;
use crate::qc::features::{Feature, N_FEATURES};

pub use builder::{ReferenceCase, build_atlas, load_reference_case};
pub use loader::{load_atlas, parse_atlas, validate_document, write_atlas};

pub const ATLAS_SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStat {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceStat {
    pub mean: f64,
    pub std: f64,
}

/// On-disk form of one class entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasClassDoc {
    pub class_id: u16,
    #[serde(default)]
    pub always_expected: bool,
    pub features: BTreeMap<String, FeatureStat>,
    pub distance: DistanceStat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_cases: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasDocument {
    pub schema_version: String,
    pub metric: DistanceMetric,
    pub classes: Vec<AtlasClassDoc>,
}

/// Validated statistics for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassReference {
    pub always_expected: bool,
    pub distance: DistanceStat,
    features: [Option<FeatureStat>; N_FEATURES],
}

impl ClassReference {
    pub fn new(
        always_expected: bool,
        distance: DistanceStat,
        features: [Option<FeatureStat>; N_FEATURES],
    ) -> Self {
        Self {
            always_expected,
            distance,
            features,
        }
    }

    pub fn feature(&self, feature: Feature) -> Option<&FeatureStat> {
        self.features[feature.index()].as_ref()
    }

    pub fn threshold(&self, k: f64) -> f64 {
        self.distance.mean + k * self.distance.std
    }
}

/// Immutable for the lifetime of a run; shared by reference across subjects.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAtlas {
    pub metric: DistanceMetric,
    classes: BTreeMap<u8, ClassReference>,
}

impl ReferenceAtlas {
    pub fn new(metric: DistanceMetric, classes: BTreeMap<u8, ClassReference>) -> Self {
        Self { metric, classes }
    }

    pub fn get(&self, class_id: u8) -> Option<&ClassReference> {
        self.classes.get(&class_id)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.classes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
