//! Integration tests for the `bloqueos` CLI binary.
//!
//! These use `assert_cmd` and `predicates` to run the expand, rrule and check
//! subcommands through the actual binary, including stdin piping, file I/O,
//! exit codes and error reporting.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn bloqueos() -> Command {
    Command::cargo_bin("bloqueos").unwrap()
}

const DAILY_UTC: &str = r#"{
    "site_id": "sede-centro",
    "resource_type": "SALA",
    "resource_id": "sala-1",
    "start": "2025-03-03T12:00:00Z",
    "end": "2025-03-03T13:00:00Z",
    "reason": "Mantención",
    "recurrence": { "kind": "DAILY", "interval": 1, "count": 5 }
}"#;

// ─────────────────────────────────────────────────────────────────────────────
// expand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expand_file_prints_one_line_per_occurrence() {
    let output = bloqueos()
        .args(["expand", "-i", &fixture("weekly_block.json"), "--tz", "America/Santiago"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wed 2025-03-05 11:00"))
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[3].contains("2025-03-26T14:00:00Z"));
}

#[test]
fn expand_stdin_as_json() {
    let output = bloqueos()
        .args(["expand", "--json"])
        .write_stdin(DAILY_UTC)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let occurrences: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let occurrences = occurrences.as_array().unwrap();
    assert_eq!(occurrences.len(), 5);
    assert_eq!(occurrences[0]["index"], 0);
    assert_eq!(occurrences[4]["window"]["start"], "2025-03-07T12:00:00Z");
}

#[test]
fn expand_window_keeps_sequence_indices() {
    bloqueos()
        .args([
            "expand",
            "--from",
            "2025-03-05T00:00:00Z",
            "--to",
            "2025-03-06T00:00:00Z",
        ])
        .write_stdin(DAILY_UTC)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("   2  2025-03-05T12:00:00Z"))
        .stdout(predicate::str::contains("2025-03-04").not());
}

#[test]
fn expand_limit_truncates() {
    let output = bloqueos()
        .args(["expand", "--limit", "2"])
        .write_stdin(DAILY_UTC)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().lines().count(), 2);
}

#[test]
fn expand_full_day_uses_site_zone() {
    bloqueos()
        .args([
            "expand",
            "-i",
            &fixture("full_day_block.json"),
            "--site-tz",
            "sede-madrid=Europe/Madrid",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2025-06-09T22:00:00Z  2025-06-10T22:00:00Z",
        ))
        .stdout(predicate::str::contains("2025-08-09T22:00:00Z"));
}

#[test]
fn expand_to_file() {
    let dir = std::env::temp_dir().join("bloqueos-cli-expand");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("occurrences.json");
    let _ = std::fs::remove_file(&path);

    bloqueos()
        .args(["expand", "--json", "-o", path.to_str().unwrap()])
        .write_stdin(DAILY_UTC)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.as_array().unwrap().len(), 5);
}

#[test]
fn invalid_rule_reports_field() {
    let block = DAILY_UTC.replace(r#""count": 5"#, r#""count": 5, "by_weekday": [1]"#);
    bloqueos()
        .arg("expand")
        .write_stdin(block)
        .assert()
        .failure()
        .stderr(predicate::str::contains("by_weekday"));
}

#[test]
fn malformed_json_fails() {
    bloqueos()
        .arg("expand")
        .write_stdin("{not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse block JSON"));
}

// ─────────────────────────────────────────────────────────────────────────────
// rrule
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn rrule_prints_rfc5545_text() {
    bloqueos()
        .args(["rrule", "-i", &fixture("weekly_block.json")])
        .assert()
        .success()
        .stdout("FREQ=WEEKLY;INTERVAL=1;WKST=SU;BYDAY=WE;COUNT=4\n");
}

#[test]
fn rrule_dates_match_expansion() {
    bloqueos()
        .args(["rrule", "--dates", "10"])
        .write_stdin(DAILY_UTC)
        .assert()
        .success()
        .stdout(
            "FREQ=DAILY;INTERVAL=1;COUNT=5\n\
             2025-03-03T12:00:00Z\n\
             2025-03-04T12:00:00Z\n\
             2025-03-05T12:00:00Z\n\
             2025-03-06T12:00:00Z\n\
             2025-03-07T12:00:00Z\n",
        );
}

// ─────────────────────────────────────────────────────────────────────────────
// check
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn check_reports_conflicting_occurrence_and_exits_2() {
    bloqueos()
        .args([
            "check",
            "-i",
            &fixture("weekly_block.json"),
            "--appointments",
            &fixture("citas.json"),
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("occurrence 1"))
        .stdout(predicate::str::contains("cita-1"))
        // cita-2 is cancelled.
        .stdout(predicate::str::contains("cita-2").not());
}

#[test]
fn check_json_report() {
    let output = bloqueos()
        .args([
            "check",
            "--json",
            "-i",
            &fixture("weekly_block.json"),
            "-a",
            &fixture("citas.json"),
        ])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["has_conflict"], true);
    assert_eq!(
        report["conflicts"][0]["conflicting_appointment_ids"],
        serde_json::json!(["cita-1"])
    );
}

#[test]
fn check_outside_horizon_is_clear() {
    bloqueos()
        .args([
            "check",
            "--horizon-days",
            "5",
            "-i",
            &fixture("weekly_block.json"),
            "-a",
            &fixture("citas.json"),
        ])
        .assert()
        .success()
        .stdout("No conflicts\n");
}

#[test]
fn check_missing_appointments_file_fails() {
    bloqueos()
        .args(["check", "-a", "/nonexistent/citas.json"])
        .write_stdin(DAILY_UTC)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

// ─────────────────────────────────────────────────────────────────────────────
// arguments
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    bloqueos()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("expand"))
        .stdout(predicate::str::contains("rrule"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn unknown_time_zone_is_rejected() {
    bloqueos()
        .args(["expand", "--tz", "Mars/Olympus"])
        .write_stdin(DAILY_UTC)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an IANA time zone"));
}

#[test]
fn unknown_subcommand_fails() {
    bloqueos().arg("encode").assert().failure();
}
