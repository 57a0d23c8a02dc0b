use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use kira_segqc::cancel::CancelToken;
use kira_segqc::error::{SubjectError, SubjectErrorKind, classify};
use kira_segqc::modality::Modality;
use kira_segqc::segment::{Predictor, PredictorInput, RawPrediction, segment, validate_prediction};
use kira_segqc::taxonomy::ClassTaxonomy;
use kira_segqc::volume::{Affine, Geometry, ModalityTag, Volume};
use ndarray::Array3;

fn geometry(dims: [usize; 3], spacing: [f32; 3]) -> Geometry {
    Geometry {
        dims,
        spacing,
        affine: Affine::from_spacing(spacing),
    }
}

fn raw(dims: [usize; 3], spacing: [f32; 3], fill: f32) -> RawPrediction {
    RawPrediction {
        geometry: geometry(dims, spacing),
        labels: Array3::from_elem((dims[0], dims[1], dims[2]), fill),
    }
}

fn kind(err: SubjectError) -> SubjectErrorKind {
    err.kind()
}

#[test]
fn matching_mask_is_accepted() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let ct = geometry([4, 4, 4], [1.5, 1.5, 3.0]);
    let mut prediction = raw([4, 4, 4], [1.5, 1.5, 3.0], 0.0);
    prediction.labels[[1, 1, 1]] = 7.0;
    prediction.labels[[2, 2, 2]] = 14.0;
    let mask = validate_prediction(prediction, &ct, Modality::CtOnly, &taxonomy).unwrap();
    assert_eq!(mask.present_ids().into_iter().collect::<Vec<_>>(), vec![7, 14]);
    assert_eq!(mask.geometry, ct);
}

#[test]
fn spacing_within_tolerance_is_accepted() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let ct = geometry([2, 2, 2], [1.5, 1.5, 3.0]);
    let prediction = raw([2, 2, 2], [1.5005, 1.5, 3.0], 7.0);
    assert!(validate_prediction(prediction, &ct, Modality::PetCt, &taxonomy).is_ok());
}

#[test]
fn dims_or_spacing_mismatch_is_malformed() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let ct = geometry([4, 4, 4], [1.5, 1.5, 3.0]);

    let wrong_dims = raw([4, 4, 3], [1.5, 1.5, 3.0], 0.0);
    let err = validate_prediction(wrong_dims, &ct, Modality::PetCt, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);

    let wrong_spacing = raw([4, 4, 4], [1.5, 1.5, 2.0], 0.0);
    let err = validate_prediction(wrong_spacing, &ct, Modality::PetCt, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);
}

#[test]
fn labels_outside_the_taxonomy_are_malformed() {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let ct = geometry([2, 2, 2], [1.0, 1.0, 1.0]);

    let cerebral = raw([2, 2, 2], [1.0, 1.0, 1.0], 37.0);
    let err = validate_prediction(cerebral.clone(), &ct, Modality::CtOnly, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);
    assert!(validate_prediction(cerebral, &ct, Modality::PetCt, &taxonomy).is_ok());

    let beyond = raw([2, 2, 2], [1.0, 1.0, 1.0], 121.0);
    let err = validate_prediction(beyond, &ct, Modality::PetCt, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);

    let fractional = raw([2, 2, 2], [1.0, 1.0, 1.0], 6.5);
    let err = validate_prediction(fractional, &ct, Modality::PetCt, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);

    let negative = raw([2, 2, 2], [1.0, 1.0, 1.0], -1.0);
    let err = validate_prediction(negative, &ct, Modality::PetCt, &taxonomy).unwrap_err();
    assert_eq!(kind(err), SubjectErrorKind::MalformedOutput);
}

struct Failing {
    typed: bool,
    calls: AtomicUsize,
}

impl Predictor for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict(&self, _input: &PredictorInput<'_>) -> Result<RawPrediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.typed {
            return Err(SubjectError::Cancelled.into());
        }
        bail!("model weights not found")
    }
}

fn run_failing(typed: bool) -> SubjectErrorKind {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let ct = Volume::new(
        "ct",
        ModalityTag::Ct,
        geometry([2, 2, 2], [1.0, 1.0, 1.0]),
        Array3::zeros((2, 2, 2)),
    );
    let cancel = CancelToken::new();
    let predictor = Failing {
        typed,
        calls: AtomicUsize::new(0),
    };
    let input = PredictorInput {
        ct: &ct,
        pet: None,
        modality: Modality::CtOnly,
        workdir: Path::new("unused"),
        cancel: &cancel,
    };
    let err = segment(&predictor, &input, &taxonomy).unwrap_err();
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 1);
    classify(&err)
}

#[test]
fn untyped_predictor_errors_become_crashes() {
    assert_eq!(run_failing(false), SubjectErrorKind::PredictorCrash);
}

#[test]
fn typed_predictor_errors_keep_their_kind() {
    assert_eq!(run_failing(true), SubjectErrorKind::Cancelled);
}
