//! Command-line behaviour of the ad-archive-scraper binary

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn bin() -> Command {
    Command::cargo_bin("ad-archive-scraper").unwrap()
}

#[test]
fn test_validate_advertiser_id() {
    let output = bin()
        .args(["validate", "advertiser", "ar13676304484790173697"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Valid advertiser id: AR13676304484790173697"));
}

#[test]
fn test_validate_rejects_bad_advertiser_id() {
    bin()
        .args(["validate", "advertiser", "CR123"])
        .assert()
        .failure();
}

#[test]
fn test_validate_archive_link() {
    let output = bin()
        .args([
            "validate",
            "url",
            "https://adstransparency.google.com/advertiser/AR14306592000630063105/creative/CR10449877755155283969?region=ae",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Advertiser: AR14306592000630063105"));
    assert!(stdout.contains("Creative: CR10449877755155283969"));
    assert!(stdout.contains("Region: AE"));
}

#[test]
fn test_fields_prints_builtin_table() {
    let output = bin().arg("fields").output().unwrap();

    assert!(output.status.success());
    let table: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(table.get("version").is_some());
    assert_eq!(table["items"], "1");
}

#[test]
fn test_field_table_override_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fields.json");

    let output = bin().arg("fields").output().unwrap();
    let mut table: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    table["version"] = serde_json::json!("2099-01");
    table["items"] = serde_json::json!("9");
    fs::write(&path, table.to_string()).unwrap();

    bin()
        .args(["validate", "field-table", path.to_str().unwrap()])
        .assert()
        .success();

    let output = bin()
        .args(["fields", "--field-table", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let loaded: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(loaded["version"], "2099-01");
    assert_eq!(loaded["items"], "9");
}

#[test]
fn test_invalid_field_table_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    bin()
        .args(["validate", "field-table", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_scrape_rejects_bad_target_without_network() {
    bin()
        .args(["scrape", "not-an-advertiser"])
        .assert()
        .failure();
}

#[test]
fn test_scrape_unreachable_archive_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("records.jsonl");

    bin()
        .env("AD_ARCHIVE_BASE_URL", "http://127.0.0.1:9")
        .args([
            "scrape",
            "AR13676304484790173697",
            "--max-retries",
            "0",
            "--output-format",
            "json",
            "-o",
            output_path.to_str().unwrap(),
        ])
        .assert()
        .failure();
}

#[test]
fn test_concurrency_limit_enforced() {
    bin()
        .args(["--concurrency", "20", "scrape", "AR1"])
        .assert()
        .failure();
}
