use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::atlas::{
    ATLAS_SCHEMA_VERSION, AtlasClassDoc, AtlasDocument, ClassReference, DistanceStat,
    FeatureStat,
};
use crate::ctx::OutputPaths;
use crate::math::stats::{mean, sample_std};
use crate::modality::Modality;
use crate::qc::distance::{DistanceMetric, distance};
use crate::qc::features::{ClassFeatures, Feature, FeatureVector, N_FEATURES, extract_features};
use crate::segment::{RawPrediction, validate_prediction};
use crate::taxonomy::ClassTaxonomy;
use crate::volume::resample::resample_nearest;
use crate::volume::{ModalityTag, Volume, nifti_io};

const MIN_FEATURE_STD: f64 = 1e-6;

/// Features of one known-good, previously processed subject.
#[derive(Debug, Clone)]
pub struct ReferenceCase {
    pub name: String,
    pub features: BTreeMap<u8, ClassFeatures>,
}

/// `out_root` is a completed subject output folder (the one holding `labels/`, `CT/`, `PT/`).
pub fn load_reference_case(out_root: &Path, taxonomy: &ClassTaxonomy) -> Result<ReferenceCase> {
    let paths = OutputPaths::at(out_root.to_path_buf());
    let (geometry, labels) = nifti_io::read_f32(&paths.mask_path)?;
    let ct_path = first_volume(&paths.ct_dir)?
        .with_context(|| format!("no CT volume in {}", paths.ct_dir.display()))?;
    let (ct_geometry, ct) = nifti_io::read_f32(&ct_path)?;
    let mask = validate_prediction(
        RawPrediction { geometry, labels },
        &ct_geometry,
        Modality::PetCt,
        taxonomy,
    )
    .with_context(|| format!("reference mask in {} is unusable", out_root.display()))?;

    let pet = match first_volume(&paths.pt_dir)? {
        Some(pet_path) => {
            let (pet_geometry, pet_data) = nifti_io::read_f32(&pet_path)?;
            let pet = Volume::new("pet", ModalityTag::Pet, pet_geometry, pet_data);
            Some(resample_nearest(&pet, &ct_geometry, 0.0)?)
        }
        None => None,
    };

    let features = extract_features(&mask, &ct, pet.as_ref());
    let name = out_root
        .parent()
        .and_then(|p| p.file_name())
        .or_else(|| out_root.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| out_root.display().to_string());
    info!(case = %name, classes = features.len(), "reference_case_loaded");
    Ok(ReferenceCase { name, features })
}

fn first_volume(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        let name = path.to_string_lossy();
        if name.ends_with(".nii.gz") || name.ends_with(".nii") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Builds per-class statistics from at least two reference cases. Classes seen in
/// fewer than two cases are skipped and reported in the returned warnings.
pub fn build_atlas(
    cases: &[ReferenceCase],
    metric: DistanceMetric,
) -> Result<(AtlasDocument, Vec<String>)> {
    if cases.len() < 2 {
        bail!("at least 2 reference cases are required, got {}", cases.len());
    }

    let mut per_class: BTreeMap<u8, Vec<&FeatureVector>> = BTreeMap::new();
    for case in cases {
        for (id, cf) in &case.features {
            if cf.voxels > 0 {
                per_class.entry(*id).or_default().push(&cf.vector);
            }
        }
    }

    let mut warnings = Vec::new();
    let mut classes = Vec::new();
    for (id, vectors) in per_class {
        if vectors.len() < 2 {
            warnings.push(format!(
                "class {} present in {} reference case(s); skipped",
                id,
                vectors.len()
            ));
            continue;
        }

        let mut stats: [Option<FeatureStat>; N_FEATURES] = [None; N_FEATURES];
        for feature in Feature::ALL {
            let values: Vec<f64> = vectors.iter().filter_map(|v| v.get(feature)).collect();
            if values.len() < 2 {
                continue;
            }
            stats[feature.index()] = Some(FeatureStat {
                mean: mean(&values),
                std: sample_std(&values).max(MIN_FEATURE_STD),
            });
        }

        let probe = ClassReference::new(false, DistanceStat { mean: 0.0, std: 0.0 }, stats);
        let distances: Vec<f64> = vectors
            .iter()
            .filter_map(|v| distance(v, &probe, metric))
            .map(|d| d.value)
            .collect();
        if distances.is_empty() {
            warnings.push(format!("class {} has no usable feature statistics; skipped", id));
            continue;
        }

        let features = Feature::ALL
            .iter()
            .filter_map(|f| stats[f.index()].map(|s| (f.name().to_string(), s)))
            .collect();
        classes.push(AtlasClassDoc {
            class_id: u16::from(id),
            always_expected: vectors.len() == cases.len(),
            features,
            distance: DistanceStat {
                mean: mean(&distances),
                std: sample_std(&distances),
            },
            n_cases: Some(vectors.len() as u32),
        });
    }

    Ok((
        AtlasDocument {
            schema_version: ATLAS_SCHEMA_VERSION.to_string(),
            metric,
            classes,
        },
        warnings,
    ))
}
