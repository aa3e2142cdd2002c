//! CLI and scan integration tests.

use pk_model::config::LoadConfig;
use pk_model::{load_case, ErrorKind, LoadError};
use std::path::PathBuf;
use std::process::Command;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn cases_dir() -> PathBuf {
    fixtures_dir().join("cases")
}

fn tank_manifest() -> PathBuf {
    cases_dir().join("tank_run1_45-300-0.out")
}

#[test]
fn fixture_case_assembles() {
    let model = load_case(&tank_manifest(), &LoadConfig::default()).expect("load tank case");
    assert_eq!(model.case_name(), "tank_run1_45-300-0");
    assert_eq!(model.components().len(), 4);
    assert_eq!(model.active_kill(), Some(1));
    assert_eq!(
        model.kill_components().iter().copied().collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let classes = model.classes();
    assert!(classes.direct_hit.contains(&1));
    assert!(classes.blast.contains(&3));
    assert!(classes.fragment.is_empty(), "crew is invulnerable");

    let grid = model.matrix().expect("matrix");
    assert_eq!(grid.gridlines_range, vec![11.0, 1.0, -9.0]);
    assert_eq!(grid.gridlines_defl, vec![6.0, 2.0, -2.0, -6.0]);
    assert_eq!(grid.pk(1, 1), Some(1.0));
    assert!(model.notices().iter().any(|n| n.code == "PK_CLIPPED"));

    assert_eq!(model.volume_radius(), 10.0);
    assert_eq!(model.azimuth_index(), Some(0));
    assert_eq!(model.vulnerability().av(0, 0, 0, 0, 1), Some(2.5));

    let detail = model.detail().expect("detail");
    assert_eq!(detail.records.len(), 2);
    let rec = detail.record(1, 45.0).expect("bp 1");
    assert_eq!(rec.component_pk[&1], 0.40);
    assert_eq!(rec.component_pk[&2], 0.05);
    assert_eq!(rec.component_pk[&3], 0.60);
    assert_eq!(model.surfaces().name_for_hit(rec.surface_hit), Some("Left hull"));
}

#[test]
fn incomplete_run_is_not_usable() {
    let err = load_case(
        &cases_dir().join("truck_run1_45-300-0.out"),
        &LoadConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::RunIncomplete { .. }));
    assert_eq!(err.kind(), ErrorKind::MissingFile);
    assert!(err.to_string().contains("case not usable"));
}

#[test]
fn load_command_prints_summary_and_json() {
    let out = tempfile::tempdir().expect("tempdir");
    let json = out.path().join("tank.json");
    let output = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "--config",
            fixtures_dir().join("cases").join("load.toml").to_str().unwrap(),
            "load",
            tank_manifest().to_str().unwrap(),
            "--json",
            json.to_str().unwrap(),
        ])
        .output()
        .expect("run load");
    assert!(
        output.status.success(),
        "load should succeed: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Kill: k1 (Mobility kill)"));
    assert!(stdout.contains("Volume radius: 7.00"), "margin comes from load.toml");
    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).expect("json written")).unwrap();
    assert_eq!(v["active_kill"], 1);
    assert_eq!(v["detail_records"], 2);
}

#[test]
fn kill_command_resolves_components() {
    let output = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "kill",
            cases_dir().join("tank.kill").to_str().unwrap(),
            "K1",
        ])
        .output()
        .expect("run kill");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("resolved: 1 2 3"));

    let output = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "kill",
            cases_dir().join("tank.kill").to_str().unwrap(),
            "k9",
        ])
        .output()
        .expect("run kill");
    assert!(!output.status.success(), "unknown kill should fail");
}

#[test]
fn scan_fixtures_produces_output() {
    let out = tempfile::tempdir().expect("tempdir");
    let out_path = out.path().to_path_buf();
    let status = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "scan",
            "--dir",
            cases_dir().to_str().unwrap(),
            "--out",
            out_path.to_str().unwrap(),
        ])
        .status()
        .expect("run scan");
    assert!(status.success(), "scan should succeed");
    assert!(out_path.join("scan.sqlite").exists(), "scan.sqlite should exist");
    assert!(out_path.join("report.json").exists(), "report.json should exist");
    assert!(
        out_path.join("html").join("index.html").exists(),
        "html/index.html should exist"
    );
    assert!(out_path
        .join("html")
        .join("case_tank_run1_45-300-0.html")
        .exists());

    let output = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "cases",
            "--scan-db",
            out_path.join("scan.sqlite").to_str().unwrap(),
        ])
        .output()
        .expect("run cases");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tank_run1_45-300-0  components=4  kill=k1"));
    assert!(stdout.contains("truck_run1_45-300-0  FAILED: case not usable"));
}

#[test]
fn find_command_matches_single_case() {
    let output = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "find",
            "--dir",
            cases_dir().to_str().unwrap(),
            "--case",
            "tank",
            "--aof",
            "45",
            "--term-vel",
            "300",
            "--burst-height",
            "0",
        ])
        .output()
        .expect("run find");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tank_run1_45-300-0.out"));

    let status = Command::new(env!("CARGO_BIN_EXE_pk-model"))
        .args([
            "find",
            "--dir",
            cases_dir().to_str().unwrap(),
            "--case",
            "tank",
            "--aof",
            "60",
            "--term-vel",
            "300",
            "--burst-height",
            "0",
        ])
        .status()
        .expect("run find");
    assert!(!status.success());
}
