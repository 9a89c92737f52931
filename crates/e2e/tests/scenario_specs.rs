use rcsel_e2e::spec::{ScenarioSpec, ScenarioStep};
use std::path::PathBuf;

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("specs")
}

/// Bundled Scenarios Parse
///
/// Every scenario shipped in `tests/specs` must load, and the data-entry
/// scenario must check the log after entering data.
#[test]
fn bundled_scenarios_load() {
    let specs = ScenarioSpec::load_all(&specs_dir()).unwrap();
    assert!(specs.len() >= 2, "expected bundled scenarios, got {}", specs.len());

    let smoke = ScenarioSpec::filter_by_tag(&specs, "smoke");
    assert_eq!(smoke.len(), 1);
    let spec = smoke[0];
    assert_eq!(spec.name, "my-first-instrument");

    let data_entry = spec
        .steps
        .iter()
        .position(|s| matches!(s, ScenarioStep::DataEntry))
        .expect("data_entry step");
    let log_entry = spec
        .steps
        .iter()
        .position(|s| matches!(s, ScenarioStep::LogEntry { .. }))
        .expect("log_entry step");
    assert!(data_entry < log_entry);
}

#[test]
fn load_all_reports_the_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("broken.yaml"),
        "name: broken\nproject:\n  pid: 1\nsteps:\n  - action: teleport\n",
    )
    .unwrap();

    let err = ScenarioSpec::load_all(dir.path()).unwrap_err();
    assert!(err.to_string().contains("broken.yaml"), "{}", err);
}
