use serde::{Deserialize, Serialize};

use crate::atlas::ClassReference;
use crate::qc::features::{Feature, FeatureVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Diagonal Mahalanobis, i.e. Euclidean norm of the per-feature z-scores.
    Mahalanobis,
    /// Root mean square z-score; insensitive to how many features overlap.
    Rms,
    /// Largest absolute z-score.
    Chebyshev,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mahalanobis => "mahalanobis",
            Self::Rms => "rms",
            Self::Chebyshev => "chebyshev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub value: f64,
    pub features_used: usize,
    /// Feature with the largest |z|.
    pub dominant: Feature,
    pub dominant_z: f64,
}

/// `None` when no feature is available on both sides.
pub fn distance(
    vector: &FeatureVector,
    reference: &ClassReference,
    metric: DistanceMetric,
) -> Option<Distance> {
    let mut sum_sq = 0.0;
    let mut max_abs = 0.0;
    let mut used = 0usize;
    let mut dominant: Option<(Feature, f64)> = None;

    for feature in Feature::ALL {
        let (Some(x), Some(stat)) = (vector.get(feature), reference.feature(feature)) else {
            continue;
        };
        let z = (x - stat.mean) / stat.std;
        if !z.is_finite() {
            continue;
        }
        used += 1;
        sum_sq += z * z;
        if z.abs() > max_abs {
            max_abs = z.abs();
        }
        match dominant {
            Some((_, best)) if best.abs() >= z.abs() => {}
            _ => dominant = Some((feature, z)),
        }
    }

    let (dominant, dominant_z) = dominant?;
    let value = match metric {
        DistanceMetric::Mahalanobis => sum_sq.sqrt(),
        DistanceMetric::Rms => (sum_sq / used as f64).sqrt(),
        DistanceMetric::Chebyshev => max_abs,
    };
    Some(Distance {
        value,
        features_used: used,
        dominant,
        dominant_z,
    })
}
