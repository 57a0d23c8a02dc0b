//! Per-organ feature extraction.
//!
//! One pass over the mask accumulates integer moments per label. Slices are
//! processed in parallel and merged in slice order, so the floating-point sums
//! (and therefore every feature) are identical from run to run.

use std::collections::BTreeMap;

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::segment::LabelMask;

pub const N_FEATURES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    LogVolumeMl,
    CentroidXMm,
    CentroidYMm,
    CentroidZMm,
    Extent,
    Compactness,
    GyrationMm,
    CtMeanHu,
    PetMean,
}

impl Feature {
    pub const ALL: [Feature; N_FEATURES] = [
        Feature::LogVolumeMl,
        Feature::CentroidXMm,
        Feature::CentroidYMm,
        Feature::CentroidZMm,
        Feature::Extent,
        Feature::Compactness,
        Feature::GyrationMm,
        Feature::CtMeanHu,
        Feature::PetMean,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LogVolumeMl => "log_volume_ml",
            Self::CentroidXMm => "centroid_x_mm",
            Self::CentroidYMm => "centroid_y_mm",
            Self::CentroidZMm => "centroid_z_mm",
            Self::Extent => "extent",
            Self::Compactness => "compactness",
            Self::GyrationMm => "gyration_mm",
            Self::CtMeanHu => "ct_mean_hu",
            Self::PetMean => "pet_mean",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Feature values in `Feature::ALL` order; `None` when not measurable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [Option<f64>; N_FEATURES]);

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.0[feature.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFeatures {
    pub voxels: u64,
    pub vector: FeatureVector,
}

#[derive(Debug, Clone, Copy)]
struct ClassAccum {
    count: u64,
    sum: [u64; 3],
    sum_sq: [u64; 3],
    min: [usize; 3],
    max: [usize; 3],
    surface: u64,
    ct_sum: f64,
    pet_sum: f64,
}

impl ClassAccum {
    fn empty() -> Self {
        Self {
            count: 0,
            sum: [0; 3],
            sum_sq: [0; 3],
            min: [usize::MAX; 3],
            max: [0; 3],
            surface: 0,
            ct_sum: 0.0,
            pet_sum: 0.0,
        }
    }

    fn merge(&mut self, other: &ClassAccum) {
        self.count += other.count;
        for d in 0..3 {
            self.sum[d] += other.sum[d];
            self.sum_sq[d] += other.sum_sq[d];
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
        self.surface += other.surface;
        self.ct_sum += other.ct_sum;
        self.pet_sum += other.pet_sum;
    }
}

type SliceAccum = BTreeMap<u8, ClassAccum>;

/// Features of every non-zero label in `mask`. `ct` and `pet` must share the mask grid.
pub fn extract_features(
    mask: &LabelMask,
    ct: &Array3<f32>,
    pet: Option<&Array3<f32>>,
) -> BTreeMap<u8, ClassFeatures> {
    let nz = mask.data.len_of(Axis(2));

    #[cfg(feature = "mt")]
    let slices: Vec<SliceAccum> = (0..nz)
        .into_par_iter()
        .map(|k| accumulate_slice(&mask.data, ct, pet, k))
        .collect();
    #[cfg(not(feature = "mt"))]
    let slices: Vec<SliceAccum> = (0..nz)
        .map(|k| accumulate_slice(&mask.data, ct, pet, k))
        .collect();

    let mut totals: SliceAccum = BTreeMap::new();
    for slice in &slices {
        for (label, acc) in slice {
            totals
                .entry(*label)
                .or_insert_with(ClassAccum::empty)
                .merge(acc);
        }
    }

    let anchor = body_anchor(&totals);
    let voxel_ml = mask.geometry.voxel_volume_ml();
    totals
        .iter()
        .map(|(label, acc)| {
            let vector = finish(acc, anchor, mask, voxel_ml, pet.is_some());
            (
                *label,
                ClassFeatures {
                    voxels: acc.count,
                    vector,
                },
            )
        })
        .collect()
}

fn accumulate_slice(
    mask: &Array3<u8>,
    ct: &Array3<f32>,
    pet: Option<&Array3<f32>>,
    k: usize,
) -> SliceAccum {
    let (nx, ny, nz) = mask.dim();
    let mut out: SliceAccum = BTreeMap::new();
    for j in 0..ny {
        for i in 0..nx {
            let label = mask[[i, j, k]];
            if label == 0 {
                continue;
            }
            let acc = out.entry(label).or_insert_with(ClassAccum::empty);
            let idx = [i, j, k];
            acc.count += 1;
            for d in 0..3 {
                acc.sum[d] += idx[d] as u64;
                acc.sum_sq[d] += (idx[d] * idx[d]) as u64;
                acc.min[d] = acc.min[d].min(idx[d]);
                acc.max[d] = acc.max[d].max(idx[d]);
            }
            if is_surface(mask, label, i, j, k, [nx, ny, nz]) {
                acc.surface += 1;
            }
            acc.ct_sum += f64::from(ct[[i, j, k]]);
            if let Some(pet) = pet {
                acc.pet_sum += f64::from(pet[[i, j, k]]);
            }
        }
    }
    out
}

/// 6-connected boundary voxel; the volume edge counts as boundary.
fn is_surface(mask: &Array3<u8>, label: u8, i: usize, j: usize, k: usize, dims: [usize; 3]) -> bool {
    let idx = [i, j, k];
    for d in 0..3 {
        if idx[d] == 0 || idx[d] + 1 == dims[d] {
            return true;
        }
        let mut lo = idx;
        lo[d] -= 1;
        let mut hi = idx;
        hi[d] += 1;
        if mask[lo] != label || mask[hi] != label {
            return true;
        }
    }
    false
}

/// Centroid of all labelled voxels, in voxel coordinates.
fn body_anchor(totals: &SliceAccum) -> [f64; 3] {
    let count: u64 = totals.values().map(|a| a.count).sum();
    if count == 0 {
        return [0.0; 3];
    }
    let mut anchor = [0.0; 3];
    for d in 0..3 {
        let s: u64 = totals.values().map(|a| a.sum[d]).sum();
        anchor[d] = s as f64 / count as f64;
    }
    anchor
}

fn finish(
    acc: &ClassAccum,
    anchor: [f64; 3],
    mask: &LabelMask,
    voxel_ml: f64,
    has_pet: bool,
) -> FeatureVector {
    let n = acc.count as f64;
    let mut values = [None; N_FEATURES];

    values[Feature::LogVolumeMl.index()] = Some((n * voxel_ml).ln());

    let mut centroid = [0.0; 3];
    for d in 0..3 {
        centroid[d] = acc.sum[d] as f64 / n;
    }
    let affine = &mask.geometry.affine;
    let c_world = affine.apply(centroid);
    let a_world = affine.apply(anchor);
    values[Feature::CentroidXMm.index()] = Some(c_world[0] - a_world[0]);
    values[Feature::CentroidYMm.index()] = Some(c_world[1] - a_world[1]);
    values[Feature::CentroidZMm.index()] = Some(c_world[2] - a_world[2]);

    let bbox: f64 = (0..3)
        .map(|d| (acc.max[d] - acc.min[d] + 1) as f64)
        .product();
    values[Feature::Extent.index()] = Some(n / bbox);
    values[Feature::Compactness.index()] = Some(acc.surface as f64 / n.powf(2.0 / 3.0));

    let mut gyration_sq = 0.0;
    for d in 0..3 {
        let var = (acc.sum_sq[d] as f64 / n - centroid[d] * centroid[d]).max(0.0);
        let sp = f64::from(mask.geometry.spacing[d]);
        gyration_sq += var * sp * sp;
    }
    values[Feature::GyrationMm.index()] = Some(gyration_sq.sqrt());

    values[Feature::CtMeanHu.index()] = Some(acc.ct_sum / n);
    if has_pet {
        values[Feature::PetMean.index()] = Some(acc.pet_sum / n);
    }
    FeatureVector(values)
}
