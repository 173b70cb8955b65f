//! Integration tests for the vapetrack binary.
//!
//! These tests verify end-to-end behavior including:
//! - Puff logging and juice conversion
//! - Rewards and XP spending
//! - Data persistence between runs
//! - Offline behavior of account commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI bound to an isolated data and config directory, with remote sync off
fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vapetrack"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .env_remove("VAPETRACK_REMOTE_URL")
        .env_remove("VAPETRACK_API_KEY")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn status_json(data_dir: &Path) -> serde_json::Value {
    let output = cli(data_dir)
        .args(["status", "--json"])
        .output()
        .expect("Failed to run status");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("status --json is valid JSON")
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("vapetrack"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vaping cessation tracker"));
}

#[test]
fn test_default_command_is_status() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Guest User"))
        .stdout(predicate::str::contains("vapetrack onboard"));
}

#[test]
fn test_log_persists_events() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["log", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged 3 puffs"))
        .stdout(predicate::str::contains("Badge unlocked: first_step"));

    cli(data_dir).arg("log").assert().success();

    let logs = fs::read_to_string(data_dir.join("vapetrack_logs.json")).unwrap();
    let events: Vec<serde_json::Value> = serde_json::from_str(&logs).unwrap();
    assert_eq!(events.len(), 4);

    let status = status_json(data_dir);
    assert_eq!(status["total_puffs"], 4);
    assert_eq!(status["badges"], serde_json::json!(["first_step"]));
}

#[test]
fn test_log_rejects_zero() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path()).args(["log", "0"]).assert().failure();
    assert!(!temp_dir.path().join("vapetrack_logs.json").exists());
}

#[test]
fn test_juice_drop_converts_to_puffs() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    // Scores the empty yesterday first so the juice XP is isolated
    let before = status_json(data_dir)["xp"].as_u64().unwrap();

    cli(data_dir)
        .args(["juice", "set", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 300 puffs (+3000 XP)"));

    let status = status_json(data_dir);
    assert_eq!(status["total_puffs"], 300);
    assert_eq!(status["xp"].as_u64().unwrap(), before + 3000);
    assert_eq!(
        status["badges"],
        serde_json::json!(["first_step", "century_club"])
    );
}

#[test]
fn test_juice_level_out_of_range_fails() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["juice", "set", "150"])
        .assert()
        .failure();
}

#[test]
fn test_juice_purchase_history() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["log", "5"]).assert().success();
    cli(data_dir)
        .args(["juice", "buy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5 puffs since the last one"));

    cli(data_dir)
        .args(["juice", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Average: 5 puffs per bottle"));
}

#[test]
fn test_smoke_free_toggle_and_puff_resets() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .arg("smoke-free")
        .assert()
        .success()
        .stdout(predicate::str::contains("streak started"));
    assert_eq!(status_json(data_dir)["smoke_free"], true);

    cli(data_dir).arg("log").assert().success();
    assert_eq!(status_json(data_dir)["smoke_free"], false);
}

#[test]
fn test_onboard_enables_savings() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    assert!(status_json(data_dir)["savings"].is_null());

    cli(data_dir)
        .args([
            "onboard",
            "--name",
            "Sam",
            "--cigarettes-per-day",
            "20",
            "--nicotine",
            "20",
            "--vape-size",
            "2",
            "--vape-cost",
            "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Onboarding complete"))
        .stdout(predicate::str::contains("30 puffs per cigarette"))
        .stdout(predicate::str::contains("600 puffs/day"));

    let status = status_json(data_dir);
    assert_eq!(status["name"], "Sam");
    assert!(status["savings"].is_object());
    assert_eq!(status["today"]["baseline"], 600);
}

#[test]
fn test_profile_update_current_vaper() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["profile", "--user-type", "current-vaper", "--puff-goal", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile updated"))
        .stdout(predicate::str::contains("Daily goal:     50 puffs"));

    cli(data_dir)
        .args(["profile", "--user-type", "sometimes"])
        .assert()
        .failure();
}

#[test]
fn test_rewards_require_xp_and_ownership() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir)
        .args(["rewards", "equip", "icon_star"])
        .assert()
        .success()
        .stdout(predicate::str::contains("buy it first"));

    cli(data_dir)
        .args(["rewards", "buy", "border_rainbow"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cannot buy"));

    // 100% -> 0% of a 2 mL bottle is 600 puffs, 6000 XP
    cli(data_dir).args(["juice", "set", "0"]).assert().success();

    cli(data_dir)
        .args(["rewards", "buy", "icon_star"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bought Star"));
    cli(data_dir)
        .args(["rewards", "buy", "icon_star"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cannot buy"));
    cli(data_dir)
        .args(["rewards", "equip", "icon_star"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Equipped"));

    cli(data_dir)
        .args(["rewards"])
        .assert()
        .success()
        .stdout(predicate::str::contains("equipped"));

    cli(data_dir)
        .args(["rewards", "unequip", "icon"])
        .assert()
        .success();
    cli(data_dir)
        .args(["rewards", "buy", "icon_unicorn"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown reward"));
}

#[test]
fn test_week_and_health_render() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["log", "2"]).assert().success();

    cli(data_dir)
        .arg("week")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily average: 2 puffs"));

    cli(data_dir)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("Time since last puff"))
        .stdout(predicate::str::contains("Heart Disease Risk Halved"));
}

#[test]
fn test_clear_requires_confirmation() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["log", "2"]).assert().success();

    cli(data_dir)
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
    assert!(data_dir.join("vapetrack_logs.json").exists());

    cli(data_dir)
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All local data cleared"));
    assert!(!data_dir.join("vapetrack_logs.json").exists());
    assert!(!data_dir.join("vapetrack_user.json").exists());
}

#[test]
fn test_signout_offline_still_clears() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["log", "2"]).assert().success();
    cli(data_dir)
        .arg("signout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Local data cleared"));

    assert_eq!(status_json(data_dir)["total_puffs"], 0);
}

#[test]
fn test_signin_without_remote_is_an_error() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["signin", "--email", "a@example.com", "--password", "secret1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NotConfigured"));
}

#[test]
fn test_signup_validation_runs_before_remote() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args([
            "signup",
            "--email",
            "a@example.com",
            "--password",
            "secret1",
            "--confirm",
            "secret2",
            "--name",
            "Sam",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("passwords do not match"));
}

#[test]
fn test_corrupt_profile_falls_back_to_defaults() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::write(data_dir.join("vapetrack_user.json"), "{not json").unwrap();

    let status = status_json(data_dir);
    assert_eq!(status["name"], "Guest User");
}

#[test]
fn test_watch_stops_after_ticks() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .args(["watch", "--ticks", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("since last puff").count(2));
}
