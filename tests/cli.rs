use assert_cmd::Command;
use chrono::{Datelike, Local};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

const BIN_NAME: &str = "billkeeper";

/// Runs the binary with HOME and the data directory inside `home`.
fn billkeeper(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin(BIN_NAME).unwrap();
    cmd.env("HOME", home.path())
        .env("BILLKEEPER_DATA_DIR", home.path().join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn initialized() -> TempDir {
    let home = tempfile::tempdir().unwrap();
    billkeeper(&home).arg("init").assert().success().stdout(contains("Initialized billkeeper"));
    billkeeper(&home).args(["household", "add", "Home"]).assert().success();
    home
}

#[test]
fn help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    billkeeper(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("sweep").and(contains("payment")).and(contains("cashflow")));
}

#[test]
fn commands_require_init() {
    let home = tempfile::tempdir().unwrap();
    billkeeper(&home)
        .args(["bill", "list"])
        .assert()
        .failure()
        .stderr(contains("No database found"));
}

#[test]
fn bill_validation_errors_surface() {
    let home = initialized();
    billkeeper(&home)
        .args(["bill", "add", "Internet", "--amount", "100", "--due-day", "32"])
        .assert()
        .failure()
        .stderr(contains("Invalid due_day"));
    billkeeper(&home)
        .args(["bill", "add", "Internet", "--amount", "0", "--due-day", "15"])
        .assert()
        .failure()
        .stderr(contains("Invalid expected_amount"));
}

#[test]
fn oversized_amounts_are_rejected_cleanly() {
    let home = initialized();
    let huge = "79228162514264337593543950335";
    billkeeper(&home)
        .args(["bill", "add", "Rent", "--amount", huge, "--due-day", "1"])
        .assert()
        .code(1)
        .stderr(contains("Error: Invalid amount").and(contains("out of range")));
    billkeeper(&home)
        .args(["txn", "add", "--date", "2025-01-15", "--name", "RENT", "--amount", huge])
        .assert()
        .code(1)
        .stderr(contains("Error: Invalid amount"));
    billkeeper(&home)
        .args(["bill", "list"])
        .assert()
        .success()
        .stdout(contains("Rent").not());
}

#[test]
fn sweep_then_match_by_hand() {
    let home = initialized();
    billkeeper(&home)
        .args(["bill", "add", "Internet", "--amount", "100", "--due-day", "15"])
        .assert()
        .success()
        .stdout(contains("Added bill #1"));

    billkeeper(&home)
        .arg("sweep")
        .assert()
        .success()
        .stdout(contains("Home: 0 overdue, 1 generated, 0 matched"));
    billkeeper(&home)
        .args(["payment", "list"])
        .assert()
        .success()
        .stdout(contains("Internet").and(contains("pending")));

    let today = Local::now().date_naive();
    let due = format!("{:04}-{:02}-15", today.year(), today.month());
    billkeeper(&home)
        .args(["txn", "add", "--date", &due, "--name", "COMCAST", "--amount", "99.50"])
        .assert()
        .success()
        .stdout(contains("Added transaction #1"));

    billkeeper(&home)
        .args(["payment", "candidates", "1"])
        .assert()
        .success()
        .stdout(contains("COMCAST"));
    billkeeper(&home)
        .args(["payment", "auto-match", "--household", "Home"])
        .assert()
        .success()
        .stdout(contains("1 payments matched for Home"));
    billkeeper(&home)
        .args(["payment", "show", "1"])
        .assert()
        .success()
        .stdout(contains("paid").and(contains("$99.50")));

    billkeeper(&home)
        .args(["payment", "reject", "1", "1"])
        .assert()
        .success()
        .stdout(contains("will no longer be suggested"));
    billkeeper(&home)
        .args(["payment", "candidates", "1"])
        .assert()
        .success()
        .stdout(contains("No candidate transactions"));
}

#[test]
fn skipped_payment_refuses_links() {
    let home = initialized();
    billkeeper(&home)
        .args(["bill", "add", "Gym", "--amount", "40", "--due-day", "3"])
        .assert()
        .success();
    billkeeper(&home).arg("sweep").assert().success();
    let today = Local::now().date_naive();
    let date = format!("{:04}-{:02}-03", today.year(), today.month());
    billkeeper(&home)
        .args(["txn", "add", "--date", &date, "--name", "GYM", "--amount", "40"])
        .assert()
        .success();

    billkeeper(&home)
        .args(["payment", "skip", "1"])
        .assert()
        .success()
        .stdout(contains("skipped"));
    billkeeper(&home)
        .args(["payment", "match", "1", "1"])
        .assert()
        .failure()
        .stderr(contains("is skipped"));
    billkeeper(&home)
        .args(["payment", "unmatch", "1"])
        .assert()
        .success()
        .stdout(contains("pending"));
}

#[test]
fn import_detects_duplicate_file() {
    let home = initialized();
    let csv = home.path().join("statement.csv");
    std::fs::write(&csv, "date,name,amount\n2025-01-14,Water,30.00\n01/20/2025,Paycheck,(2500.00)\n").unwrap();
    let path = csv.to_string_lossy().to_string();

    billkeeper(&home)
        .args(["import", &path, "--household", "Home"])
        .assert()
        .success()
        .stdout(contains("2 imported, 0 skipped"));
    billkeeper(&home)
        .args(["import", &path, "--household", "Home"])
        .assert()
        .success()
        .stdout(contains("already been imported"));
}

#[test]
fn status_and_demo() {
    let home = initialized();
    billkeeper(&home)
        .arg("demo")
        .assert()
        .success()
        .stdout(contains("Loaded Demo Household"));
    billkeeper(&home)
        .arg("demo")
        .assert()
        .success()
        .stdout(contains("already loaded"));
    billkeeper(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Households:    2").and(contains("Last sweep:")));
    billkeeper(&home)
        .args(["cashflow", "--household", "Demo Household"])
        .assert()
        .success()
        .stdout(contains("Cash Flow Projection"));
}
