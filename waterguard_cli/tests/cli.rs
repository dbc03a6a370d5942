use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the user's configuration and environment
fn waterguard(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("waterguard").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_dir.path())
        .env_remove("WATERGUARD_HUB__HOST")
        .env_remove("WATERGUARD_HUB__PORT")
        .env_remove("WATERGUARD_HUB__DEVICE_ID")
        .env_remove("WATERGUARD_POLL__SCAN_INTERVAL");
    cmd
}

#[test]
fn test_version() {
    let temp_dir = TempDir::new().unwrap();
    waterguard(&temp_dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_commands() {
    let temp_dir = TempDir::new().unwrap();
    waterguard(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("monitor"))
        .stdout(predicate::str::contains("reset-alarm"))
        .stdout(predicate::str::contains("discover-sensors"));
}

#[cfg(not(target_os = "windows"))]
#[test]
fn test_config_path_honors_xdg() {
    let temp_dir = TempDir::new().unwrap();
    let expected = temp_dir.path().join("waterguard").join("config.toml");
    waterguard(&temp_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_config_show_reads_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    fs::write(
        &path,
        "[hub]\nhost = \"10.1.2.3\"\n\n[poll]\nscan_interval = 15\n",
    )
    .unwrap();

    waterguard(&temp_dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("host = \"10.1.2.3\""))
        .stdout(predicate::str::contains("scan_interval = 15"))
        .stdout(predicate::str::contains("port = 47808"));
}

#[test]
fn test_env_and_flags_override_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[hub]\nhost = \"file-host\"\nport = 47810\n").unwrap();

    waterguard(&temp_dir)
        .env("WATERGUARD_HUB__PORT", "47900")
        .arg("--config")
        .arg(&path)
        .args(["--host", "flag-host", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("host = \"flag-host\""))
        .stdout(predicate::str::contains("port = 47900"));
}

#[test]
fn test_config_set_then_get() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    waterguard(&temp_dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "set", "poll.scan_interval", "30"])
        .assert()
        .success();
    assert!(path.exists());

    waterguard(&temp_dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "get", "poll.scan_interval"])
        .assert()
        .success()
        .stdout(predicate::str::diff("30\n"));
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    waterguard(&temp_dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "set", "hub.colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
    assert!(!path.exists());
}

#[test]
fn test_invalid_valve_action() {
    let temp_dir = TempDir::new().unwrap();
    waterguard(&temp_dir)
        .args(["--host", "127.0.0.1", "valve", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid valve action 'sideways'"));
}

#[test]
fn test_status_requires_host() {
    let temp_dir = TempDir::new().unwrap();
    waterguard(&temp_dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Hub is not configured"));
}

#[test]
fn test_unknown_command() {
    let temp_dir = TempDir::new().unwrap();
    waterguard(&temp_dir)
        .arg("flood")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
