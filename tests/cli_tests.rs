//! Command-line smoke tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sizefit() -> Command {
    let mut cmd = Command::cargo_bin("sizefit").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("SIZEFIT_CONFIG")
        .env_remove("SIZEFIT_LOG_LEVEL");
    cmd
}

#[test]
fn test_help_lists_commands() {
    sizefit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compress"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_version() {
    sizefit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_compress_requires_target() {
    sizefit()
        .args(["compress", "--input", "clip.mov"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target-mb"));
}

#[test]
fn test_non_positive_target_rejected() {
    sizefit()
        .args(["compress", "--input", "clip.mov", "--target-mb", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("positive"));
}

#[test]
fn test_probe_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    sizefit()
        .current_dir(dir.path())
        .args(["probe", "--input", "does-not-exist.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.mp4"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    sizefit()
        .current_dir(dir.path())
        .args(["--config", "absent.toml", "probe", "--input", "x.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_bad_environment_value_fails() {
    let dir = TempDir::new().unwrap();
    sizefit()
        .current_dir(dir.path())
        .env("SIZEFIT_HARDWARE_ACCELERATION", "warp-drive")
        .args(["probe", "--input", "x.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warp-drive"));
}
