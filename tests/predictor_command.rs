#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kira_segqc::cancel::CancelToken;
use kira_segqc::error::{SubjectErrorKind, classify};
use kira_segqc::modality::Modality;
use kira_segqc::segment::{CommandPredictor, PredictorInput, segment};
use kira_segqc::taxonomy::ClassTaxonomy;
use kira_segqc::volume::{Affine, Geometry, ModalityTag, Volume};
use ndarray::Array3;
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// CT whose voxel values are themselves valid labels, so a predictor that copies
/// its input produces a valid mask.
fn label_like_ct() -> Volume {
    let spacing = [2.0, 2.0, 2.0];
    let mut data = Array3::<f32>::zeros((4, 4, 4));
    data[[1, 1, 1]] = 7.0;
    data[[2, 2, 2]] = 14.0;
    Volume::new(
        "ct",
        ModalityTag::Ct,
        Geometry {
            dims: [4, 4, 4],
            spacing,
            affine: Affine::from_spacing(spacing),
        },
        data,
    )
}

fn run(template: String, timeout: Duration, work: &Path) -> anyhow::Result<Vec<u8>> {
    let taxonomy = ClassTaxonomy::builtin().unwrap();
    let predictor = CommandPredictor::from_template(&template, "test_model", timeout).unwrap();
    let ct = label_like_ct();
    let cancel = CancelToken::new();
    let input = PredictorInput {
        ct: &ct,
        pet: None,
        modality: Modality::CtOnly,
        workdir: work,
        cancel: &cancel,
    };
    let mask = segment(&predictor, &input, &taxonomy)?;
    Ok(mask.present_ids().into_iter().collect())
}

#[test]
fn copying_predictor_yields_a_valid_mask() {
    let tmp = TempDir::new().unwrap();
    let bin = script(tmp.path(), "copy.sh", "echo \"model=$3\"\ncp \"$1\" \"$2\"");
    let work = tmp.path().join("work");
    let ids = run(
        format!("{} {{ct}} {{out}} {{model}}", bin.display()),
        Duration::from_secs(30),
        &work,
    )
    .unwrap();
    assert_eq!(ids, vec![7, 14]);
    let log = fs::read_to_string(work.join("predictor.log")).unwrap();
    assert!(log.contains("model=test_model"));
}

#[test]
fn slow_predictor_times_out_as_crash() {
    let tmp = TempDir::new().unwrap();
    let bin = script(tmp.path(), "slow.sh", "sleep 30");
    let start = Instant::now();
    let err = run(
        format!("{} {{ct}} {{out}}", bin.display()),
        Duration::from_millis(500),
        &tmp.path().join("work"),
    )
    .unwrap_err();
    assert_eq!(classify(&err), SubjectErrorKind::PredictorCrash);
    assert!(err.to_string().contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(20));
}

#[test]
fn non_zero_exit_is_a_crash() {
    let tmp = TempDir::new().unwrap();
    let bin = script(tmp.path(), "fail.sh", "echo boom >&2\nexit 3");
    let work = tmp.path().join("work");
    let err = run(
        format!("{} {{ct}} {{out}}", bin.display()),
        Duration::from_secs(30),
        &work,
    )
    .unwrap_err();
    assert_eq!(classify(&err), SubjectErrorKind::PredictorCrash);
    assert!(fs::read_to_string(work.join("predictor.log")).unwrap().contains("boom"));
}

#[test]
fn missing_output_is_a_crash() {
    let tmp = TempDir::new().unwrap();
    let bin = script(tmp.path(), "noop.sh", "exit 0");
    let err = run(
        format!("{} {{ct}} {{out}}", bin.display()),
        Duration::from_secs(30),
        &tmp.path().join("work"),
    )
    .unwrap_err();
    assert_eq!(classify(&err), SubjectErrorKind::PredictorCrash);
}
