use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn lybunt(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lybunt").unwrap();
    cmd.env("HOME", home.path()).env_remove("RUST_LOG");
    cmd
}

fn initialized() -> TempDir {
    let home = tempfile::tempdir().unwrap();
    let data = home.path().join("data");
    lybunt(&home)
        .args(["init", "--data-dir", data.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized lybunt"));
    assert!(data.join("lybunt.db").exists());
    assert!(!data.join("exports").exists());
    home
}

#[test]
fn report_without_database_fails() {
    let home = tempfile::tempdir().unwrap();
    lybunt(&home)
        .args(["report", "lapsed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: No database found"));
}

#[test]
fn demo_then_lapsed_report() {
    let home = initialized();
    lybunt(&home)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo data loaded"));
    lybunt(&home)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("already loaded"));

    lybunt(&home)
        .args(["report", "lapsed", "--chart", "bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Harbor Light Foundation"))
        .stdout(predicate::str::contains("Okafor, Maya"))
        .stdout(predicate::str::contains("Ferreira, Lucia").not())
        .stdout(predicate::str::contains("Total LifeTime"))
        .stdout(predicate::str::contains("Life Time"));

    // a charted run is never cut down to one page
    lybunt(&home)
        .args(["report", "lapsed", "--chart", "bar", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Harbor Light Foundation"))
        .stdout(predicate::str::contains("Okafor, Maya"));
}

#[test]
fn donors_report_with_filters_and_csv() {
    let home = initialized();
    lybunt(&home).arg("demo").assert().success();
    let csv = home.path().join("donors.csv");

    lybunt(&home)
        .args([
            "report",
            "donors",
            "--filter",
            "gender=Female",
            "--sort",
            "sort_name:asc",
            "--no-rollup",
            "--csv",
            csv.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ferreira, Lucia"))
        .stdout(predicate::str::contains("Abernathy, Jonah").not());

    let written = std::fs::read_to_string(&csv).unwrap();
    assert!(written.contains("Ferreira, Lucia"));
    assert!(!written.contains("Whitfield"));
}

#[test]
fn unknown_column_is_reported() {
    let home = initialized();
    lybunt(&home)
        .args(["report", "lapsed", "--column", "shoe_size"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown field 'shoe_size'"));
}

#[test]
fn status_shows_settings() {
    let home = initialized();
    lybunt(&home)
        .args(["init", "--fiscal-year-start", "07-01", "--currency", "eur"])
        .assert()
        .success();
    lybunt(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fiscal start: 07-01"))
        .stdout(predicate::str::contains("Currency:     EUR"))
        .stdout(predicate::str::contains("Tags:           3"));
}
