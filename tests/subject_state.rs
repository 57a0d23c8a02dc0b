use std::fs;

use kira_segqc::error::SubjectErrorKind;
use kira_segqc::subject::{
    FailureRecord, Subject, SubjectStatus, discover_series, discover_subjects,
};
use tempfile::TempDir;

fn failure() -> FailureRecord {
    FailureRecord {
        kind: SubjectErrorKind::PredictorCrash,
        stage: "stage3_segment".to_string(),
        message: "timeout".to_string(),
    }
}

#[test]
fn happy_path_walks_every_state() {
    let mut s = Subject::new("/data/P001".into());
    assert_eq!(s.id, "P001");
    assert_eq!(s.status(), SubjectStatus::Pending);
    for next in [
        SubjectStatus::Converted,
        SubjectStatus::ModalityResolved,
        SubjectStatus::Segmented,
        SubjectStatus::QcComplete,
    ] {
        s.advance(next).unwrap();
    }
    assert!(s.status().is_terminal());
    assert!(s.fail(failure()).is_err());
    assert_eq!(s.status(), SubjectStatus::QcComplete);
}

#[test]
fn skipping_a_state_is_rejected() {
    let mut s = Subject::new("/data/P002".into());
    assert!(s.advance(SubjectStatus::Segmented).is_err());
    assert!(s.advance(SubjectStatus::Failed).is_err());
    assert_eq!(s.status(), SubjectStatus::Pending);
}

#[test]
fn failed_is_reachable_from_any_non_terminal_state_and_final() {
    let mut s = Subject::new("/data/P003".into());
    s.advance(SubjectStatus::Converted).unwrap();
    s.fail(failure()).unwrap();
    assert_eq!(s.status(), SubjectStatus::Failed);
    assert_eq!(s.failure().unwrap().kind, SubjectErrorKind::PredictorCrash);
    assert!(s.advance(SubjectStatus::ModalityResolved).is_err());
    assert!(s.fail(failure()).is_err());
}

#[test]
fn status_serializes_with_qc_complete_spelling() {
    let json = serde_json::to_string(&SubjectStatus::QcComplete).unwrap();
    assert_eq!(json, "\"QCComplete\"");
    assert_eq!(SubjectStatus::QcComplete.as_str(), "QCComplete");
}

#[test]
fn discovery_skips_hidden_and_output_folders() {
    let main = TempDir::new().unwrap();
    fs::create_dir_all(main.path().join("B")).unwrap();
    fs::create_dir_all(main.path().join("A/ct_series")).unwrap();
    fs::create_dir_all(main.path().join("A/pet_series")).unwrap();
    fs::create_dir_all(main.path().join("A/kira-segqc")).unwrap();
    fs::create_dir_all(main.path().join("A/.cache")).unwrap();
    fs::create_dir_all(main.path().join(".hidden")).unwrap();
    fs::write(main.path().join("kira-segqc.log"), "").unwrap();

    let subjects = discover_subjects(main.path()).unwrap();
    let ids: Vec<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);

    let series = discover_series(&main.path().join("A"), "kira-segqc").unwrap();
    let names: Vec<String> = series
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["ct_series", "pet_series"]);
}
