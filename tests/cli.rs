mod common;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::str::contains;

fn importer(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("csv-sqlite-import").expect("binary exists");
    cmd.current_dir(ws.path()).env("RUST_LOG", "off");
    cmd
}

#[test]
fn default_paths_import_csv_dir_into_brix_database() {
    let ws = TestWorkspace::new();
    ws.write_csv("colors.csv", "id,name\n1,Red\n2,Blue\n");

    importer(&ws)
        .assert()
        .success()
        .stdout(contains("colors.csv"))
        .stdout(contains("1 file(s): 2 row(s) inserted, 0 skipped, 0 failed"));

    assert!(ws.path().join("Brix.sqlite").exists());
}

#[test]
fn flags_limit_and_skip_files() {
    let ws = TestWorkspace::new();
    ws.write_generated("hundred.csv", "id,name,score", 100);
    ws.write_generated("twenty.csv", "id,name,score", 20);

    importer(&ws)
        .args([
            "--db",
            ws.db_path().to_str().unwrap(),
            "--csv-dir",
            ws.csv_dir().to_str().unwrap(),
            "--max-rows",
            "5",
            "--skip-large",
            "50",
        ])
        .assert()
        .success()
        .stdout(contains("100 rows > 50"));

    assert!(!ws.table_exists("hundred"));
    assert_eq!(ws.row_count("twenty"), 5);
}

#[test]
fn rerun_with_detect_pk_reports_ignored_duplicates() {
    let ws = TestWorkspace::new();
    ws.write_csv("sets.csv", "set_num,name\n001-1,Gears\n002-1,Trains\n");
    let db = ws.db_path();
    let csv_dir = ws.csv_dir();
    let args = [
        "--db",
        db.to_str().unwrap(),
        "--csv-dir",
        csv_dir.to_str().unwrap(),
        "--detect-pk",
    ];

    importer(&ws).args(args).assert().success();
    importer(&ws)
        .args(args)
        .assert()
        .success()
        .stdout(contains("2 duplicate row(s) ignored"));

    assert_eq!(ws.row_count("sets"), 2);
}

#[test]
fn missing_csv_dir_exits_with_error() {
    let ws = TestWorkspace::new();
    importer(&ws)
        .args(["--csv-dir", "nowhere"])
        .assert()
        .failure()
        .stderr(contains("CSV directory not found"));
}

#[test]
fn failed_file_sets_nonzero_exit_but_imports_the_rest() {
    let ws = TestWorkspace::new();
    std::fs::write(ws.csv_dir().join("bad.csv"), b"id,name\n1,\xc3\x28\n").expect("write bad csv");
    ws.write_csv("good.csv", "id,name\n1,ok\n");

    importer(&ws)
        .args([
            "--db",
            ws.db_path().to_str().unwrap(),
            "--csv-dir",
            ws.csv_dir().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(contains("failed"))
        .stderr(contains("1 of 2 file(s) failed to import"));

    assert_eq!(ws.row_count("good"), 1);
}

#[test]
fn invalid_batch_size_is_rejected_by_parser() {
    let ws = TestWorkspace::new();
    importer(&ws)
        .args(["--batch-size", "0"])
        .assert()
        .failure()
        .stderr(contains("at least 1"));
}
