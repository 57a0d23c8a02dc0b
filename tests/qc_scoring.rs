use std::collections::BTreeMap;

use kira_segqc::atlas::{
    AtlasClassDoc, AtlasDocument, DistanceStat, FeatureStat, ReferenceAtlas, validate_document,
};
use kira_segqc::modality::Modality;
use kira_segqc::qc::distance::DistanceMetric;
use kira_segqc::qc::features::{ClassFeatures, Feature, extract_features};
use kira_segqc::qc::{QcParams, ScoreStatus, run_qc};
use kira_segqc::segment::LabelMask;
use kira_segqc::taxonomy::ClassTaxonomy;
use kira_segqc::volume::{Affine, Geometry};
use ndarray::{Array3, s};

const LIVER: u8 = 7;
const SPLEEN: u8 = 14;
const KIDNEY_LEFT: u8 = 5;
const HEART: u8 = 19;

struct Scene {
    mask: LabelMask,
    ct: Array3<f32>,
    pet: Array3<f32>,
}

fn scene() -> Scene {
    let spacing = [2.0, 2.0, 2.0];
    let geometry = Geometry {
        dims: [16, 16, 16],
        spacing,
        affine: Affine::from_spacing(spacing),
    };
    let mut labels = Array3::<u8>::zeros((16, 16, 16));
    labels.slice_mut(s![2..8, 2..8, 2..8]).fill(LIVER);
    labels.slice_mut(s![10..13, 10..13, 10..13]).fill(SPLEEN);
    labels.slice_mut(s![2..4, 10..12, 10..12]).fill(KIDNEY_LEFT);

    let ct = labels.mapv(|l| match l {
        LIVER => 60.0,
        SPLEEN => 45.0,
        KIDNEY_LEFT => 30.0,
        _ => -100.0,
    });
    let pet = Array3::from_elem((16, 16, 16), 2.0f32);
    Scene {
        mask: LabelMask {
            geometry,
            data: labels,
        },
        ct,
        pet,
    }
}

fn observed(scene: &Scene) -> BTreeMap<u8, ClassFeatures> {
    extract_features(&scene.mask, &scene.ct, Some(&scene.pet))
}

/// Entry centred `offset` standard deviations away from the observed features on
/// every axis, so the Mahalanobis distance is `3 * offset` over nine features.
fn entry(features: &ClassFeatures, class_id: u8, offset: f64, always_expected: bool) -> AtlasClassDoc {
    let features = Feature::ALL
        .iter()
        .filter_map(|f| {
            features.vector.get(*f).map(|x| {
                (
                    f.name().to_string(),
                    FeatureStat {
                        mean: x - offset,
                        std: 1.0,
                    },
                )
            })
        })
        .collect();
    AtlasClassDoc {
        class_id: u16::from(class_id),
        always_expected,
        features,
        distance: DistanceStat {
            mean: 1.0,
            std: 0.5,
        },
        n_cases: None,
    }
}

fn absent_entry(class_id: u8, always_expected: bool) -> AtlasClassDoc {
    let mut features = BTreeMap::new();
    features.insert(
        "log_volume_ml".to_string(),
        FeatureStat {
            mean: 6.0,
            std: 0.3,
        },
    );
    AtlasClassDoc {
        class_id: u16::from(class_id),
        always_expected,
        features,
        distance: DistanceStat {
            mean: 1.0,
            std: 0.5,
        },
        n_cases: None,
    }
}

fn atlas(classes: Vec<AtlasClassDoc>) -> ReferenceAtlas {
    validate_document(&AtlasDocument {
        schema_version: "v1".to_string(),
        metric: DistanceMetric::Mahalanobis,
        classes,
    })
    .unwrap()
}

fn spread_atlas(scene: &Scene) -> ReferenceAtlas {
    let f = observed(scene);
    atlas(vec![
        entry(&f[&LIVER], LIVER, 0.3, true),
        entry(&f[&SPLEEN], SPLEEN, 0.6, true),
        entry(&f[&KIDNEY_LEFT], KIDNEY_LEFT, 1.2, false),
    ])
}

fn params(k: f64) -> QcParams {
    QcParams {
        k,
        metric_override: None,
    }
}

#[test]
fn liver_within_tolerance_is_not_at_risk() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![entry(&f[&LIVER], LIVER, 0.0, true)]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    let liver = qc.scores.iter().find(|s| s.class_id == LIVER).unwrap();
    assert_eq!(liver.status, ScoreStatus::Scored);
    assert_eq!(liver.region, "liver");
    assert_eq!(liver.voxels, 216);
    assert!(liver.distance.unwrap() < 1e-9);
    assert!((liver.threshold.unwrap() - 2.5).abs() < 1e-12);
    assert!(!liver.at_risk);
    assert!(liver.dominant_feature.is_some());
}

#[test]
fn displaced_organ_is_flagged_with_dominant_feature() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![entry(&f[&SPLEEN], SPLEEN, 2.0, true)]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    let spleen = qc.scores.iter().find(|s| s.class_id == SPLEEN).unwrap();
    assert!((spleen.distance.unwrap() - 6.0).abs() < 1e-6);
    assert!(spleen.at_risk);
    assert!((spleen.dominant_z.unwrap() - 2.0).abs() < 1e-6);
    assert!(!qc.is_clean());
}

#[test]
fn scoring_is_idempotent() {
    let sc = scene();
    let atlas = spread_atlas(&sc);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let run = || {
        run_qc(
            &sc.mask,
            &sc.ct,
            Some(&sc.pet),
            Modality::PetCt,
            &taxonomy,
            &atlas,
            &params(1.0),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn raising_k_never_flags_more_organs() {
    let sc = scene();
    let atlas = spread_atlas(&sc);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let counts: Vec<usize> = [0.0, 0.5, 1.0, 2.0, 3.0, 10.0]
        .iter()
        .map(|k| {
            run_qc(
                &sc.mask,
                &sc.ct,
                Some(&sc.pet),
                Modality::PetCt,
                &taxonomy,
                &atlas,
                &params(*k),
            )
            .at_risk_count()
        })
        .collect();
    assert_eq!(counts, vec![2, 2, 2, 1, 1, 0]);
    assert!(counts.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn class_missing_from_atlas_is_no_reference_and_never_at_risk() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![entry(&f[&LIVER], LIVER, 0.0, true)]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(0.0),
    );
    let spleen = qc.scores.iter().find(|s| s.class_id == SPLEEN).unwrap();
    assert_eq!(spleen.status, ScoreStatus::NoReferenceAvailable);
    assert!(!spleen.at_risk);
    assert!(spleen.distance.is_none());
    assert_eq!(spleen.voxels, 27);
    assert!(qc.warnings.iter().any(|w| w.contains("class 14")));
}

#[test]
fn absent_always_expected_organ_is_at_risk() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![
        entry(&f[&LIVER], LIVER, 0.0, true),
        absent_entry(HEART, true),
        absent_entry(4, false),
    ]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    let heart = qc.scores.iter().find(|s| s.class_id == HEART).unwrap();
    assert_eq!(heart.status, ScoreStatus::Absent);
    assert_eq!(heart.voxels, 0);
    assert!(heart.at_risk);

    let gallbladder = qc.scores.iter().find(|s| s.class_id == 4).unwrap();
    assert_eq!(gallbladder.status, ScoreStatus::Absent);
    assert!(!gallbladder.at_risk);
    assert_eq!(qc.at_risk_count(), 1);
}

#[test]
fn every_present_class_gets_exactly_one_score() {
    let sc = scene();
    let atlas = spread_atlas(&sc);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    let ids: Vec<u8> = qc.scores.iter().map(|s| s.class_id).collect();
    assert_eq!(ids, vec![KIDNEY_LEFT, LIVER, SPLEEN]);
}

#[test]
fn ct_only_ignores_cerebral_atlas_entries() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![
        entry(&f[&LIVER], LIVER, 0.0, true),
        absent_entry(60, true),
    ]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();

    let ct_only = run_qc(
        &sc.mask,
        &sc.ct,
        None,
        Modality::CtOnly,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    assert!(ct_only.scores.iter().all(|s| s.class_id != 60));
    let liver = ct_only.scores.iter().find(|s| s.class_id == LIVER).unwrap();
    assert_eq!(liver.status, ScoreStatus::Scored);

    let pet_ct = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &params(3.0),
    );
    let cerebral = pet_ct.scores.iter().find(|s| s.class_id == 60).unwrap();
    assert_eq!(cerebral.status, ScoreStatus::Absent);
    assert!(cerebral.at_risk);
}

#[test]
fn metric_override_changes_the_distance() {
    let sc = scene();
    let f = observed(&sc);
    let atlas = atlas(vec![entry(&f[&SPLEEN], SPLEEN, 2.0, true)]);
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let qc = run_qc(
        &sc.mask,
        &sc.ct,
        Some(&sc.pet),
        Modality::PetCt,
        &taxonomy,
        &atlas,
        &QcParams {
            k: 3.0,
            metric_override: Some(DistanceMetric::Chebyshev),
        },
    );
    assert_eq!(qc.metric, DistanceMetric::Chebyshev);
    let spleen = qc.scores.iter().find(|s| s.class_id == SPLEEN).unwrap();
    assert!((spleen.distance.unwrap() - 2.0).abs() < 1e-6);
    assert!(!spleen.at_risk);
}
