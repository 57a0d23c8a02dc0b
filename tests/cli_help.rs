use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

#[test]
fn cli_help_smoke() {
    let mut cmd = Command::cargo_bin("kira-segqc").unwrap();
    cmd.arg("--help");
    cmd.assert().success();
}

#[test]
fn labels_show_lists_the_ct_taxonomy() {
    let mut cmd = Command::cargo_bin("kira-segqc").unwrap();
    cmd.args(["labels", "show", "--modality", "ct"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("7\tliver\tbody"));
    assert!(!text.contains("cerebral"));
    assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 36);
}

#[test]
fn atlas_validate_rejects_garbage() {
    let tmp = TempDir::new().unwrap();
    let atlas = tmp.path().join("atlas.json");
    fs::write(&atlas, "{not json").unwrap();

    let mut cmd = Command::cargo_bin("kira-segqc").unwrap();
    cmd.arg("atlas").arg("validate").arg("--atlas").arg(&atlas);
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("AtlasCorrupt"));
}

#[test]
fn corrupt_atlas_aborts_before_any_subject() {
    let tmp = TempDir::new().unwrap();
    let main = tmp.path().join("main");
    fs::create_dir_all(main.join("P01/ct_series")).unwrap();
    let atlas = tmp.path().join("atlas.json");
    fs::write(&atlas, r#"{"schema_version": "v0", "metric": "rms", "classes": []}"#).unwrap();

    let mut cmd = Command::cargo_bin("kira-segqc").unwrap();
    cmd.arg("run")
        .arg("--main")
        .arg(&main)
        .arg("--atlas")
        .arg(&atlas)
        .arg("--predictor-cmd")
        .arg("predict {ct} {out}");
    cmd.assert().failure();
    assert!(!main.join("kira-segqc.log").exists());
    assert!(!main.join("P01/kira-segqc").exists());
}
