//! Configuration integration tests.
//!
//! These tests verify config discovery, format parsing, and precedence
//! from an end-to-end perspective using the compiled binary. `info --json`
//! echoes the effective package and remote, so each test can check which
//! file won.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Returns a Command configured to run our binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

/// Run `info --json` from `dir` and return the parsed `config` object.
fn effective_config(dir: &Path) -> serde_json::Value {
    let output = cmd()
        .args(["-C", dir.to_str().unwrap(), "--json", "info"])
        .env_remove("DROVER_RELEASE_PATH")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("info --json output");
    json["config"].clone()
}

// =============================================================================
// Config File Discovery
// =============================================================================

#[test]
fn runs_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = effective_config(tmp.path());
    assert_eq!(config["package"], "silverstripe/installer");
    assert_eq!(config["remote"], "origin");
}

#[test]
fn discovers_dotfile_config_in_current_dir() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        "[project]\npackage = \"acme/installer\"\n",
    )
    .unwrap();

    assert_eq!(effective_config(tmp.path())["package"], "acme/installer");
}

#[test]
fn discovers_regular_config_in_current_dir() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("drover.toml"),
        "[project]\nremote = \"upstream\"\n",
    )
    .unwrap();

    assert_eq!(effective_config(tmp.path())["remote"], "upstream");
}

#[test]
fn discovers_config_in_parent_directory() {
    let tmp = TempDir::new().unwrap();
    let sub_dir = tmp.path().join("releases").join("deep");
    fs::create_dir_all(&sub_dir).unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        "[project]\nremote = \"upstream\"\n",
    )
    .unwrap();

    assert_eq!(effective_config(&sub_dir)["remote"], "upstream");
}

#[test]
fn explicit_config_flag_is_loaded() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("elsewhere.yaml");
    fs::write(&file, "project:\n  package: acme/cms\n").unwrap();

    let output = cmd()
        .args([
            "-C",
            tmp.path().to_str().unwrap(),
            "--config",
            file.to_str().unwrap(),
            "--json",
            "info",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["config"]["package"], "acme/cms");
}

// =============================================================================
// Config Format Parsing
// =============================================================================

#[test]
fn parses_yaml_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.yaml"),
        "log_level: warn\nproject:\n  remote: fork\n",
    )
    .unwrap();

    let config = effective_config(tmp.path());
    assert_eq!(config["log_level"], "warn");
    assert_eq!(config["remote"], "fork");
}

#[test]
fn parses_yml_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".drover.yml"), "log_level: debug\n").unwrap();

    assert_eq!(effective_config(tmp.path())["log_level"], "debug");
}

#[test]
fn parses_json_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.json"),
        r#"{"project": {"package": "acme/json"}}"#,
    )
    .unwrap();

    assert_eq!(effective_config(tmp.path())["package"], "acme/json");
}

#[test]
fn release_path_is_reported() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        "[project]\nrelease_path = \"/srv/releases\"\n",
    )
    .unwrap();

    assert_eq!(effective_config(tmp.path())["release_path"], "/srv/releases");
}

// =============================================================================
// Config Precedence
// =============================================================================

#[test]
fn closer_config_takes_precedence() {
    let tmp = TempDir::new().unwrap();
    let sub_dir = tmp.path().join("project");
    fs::create_dir_all(&sub_dir).unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        "[project]\nremote = \"parent\"\n",
    )
    .unwrap();
    fs::write(sub_dir.join(".drover.toml"), "[project]\nremote = \"child\"\n").unwrap();

    assert_eq!(effective_config(&sub_dir)["remote"], "child");
}

#[test]
fn toml_preferred_over_yaml_in_same_directory() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".drover.toml"), "[project]\nremote = \"toml\"\n").unwrap();
    fs::write(tmp.path().join(".drover.yaml"), "project:\n  remote: yaml\n").unwrap();

    assert_eq!(effective_config(tmp.path())["remote"], "toml");
}

// =============================================================================
// Error Cases
// =============================================================================

#[test]
fn invalid_toml_config_shows_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".drover.toml"), "this is not valid toml [[[").unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration").or(predicate::str::contains("config")));
}

#[test]
fn invalid_json_config_shows_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".drover.json"), "{not valid json}").unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "info"])
        .assert()
        .failure();
}

#[test]
fn bad_translation_minimum_fails_the_command_that_needs_it() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        "[translations]\nmin_version = \"not-a-version\"\n",
    )
    .unwrap();
    fs::write(tmp.path().join("composer.json"), r#"{"name": "acme/installer"}"#).unwrap();

    // Loading succeeds; only translation commands validate the value.
    effective_config(tmp.path());
    cmd()
        .args([
            "-C",
            tmp.path().to_str().unwrap(),
            "release:translate",
            "4.1.0",
            "-d",
            ".",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn unknown_config_field_is_ignored() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".drover.toml"),
        r#"
log_level = "info"
unknown_field = "should be ignored"
another_unknown = 42
"#,
    )
    .unwrap();

    assert_eq!(effective_config(tmp.path())["log_level"], "info");
}

// =============================================================================
// Boundary Marker Tests
// =============================================================================

#[test]
fn git_boundary_stops_config_search() {
    let tmp = TempDir::new().unwrap();
    let parent = tmp.path().join("parent");
    let repo = parent.join("repo");
    let src = repo.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(parent.join(".drover.toml"), "[project]\nremote = \"outside\"\n").unwrap();
    fs::create_dir(repo.join(".git")).unwrap();

    assert_eq!(effective_config(&src)["remote"], "origin");
}

#[test]
fn config_in_same_dir_as_git_is_found() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repo");
    let src = repo.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir(repo.join(".git")).unwrap();
    fs::write(repo.join(".drover.toml"), "[project]\nremote = \"inside\"\n").unwrap();

    assert_eq!(effective_config(&src)["remote"], "inside");
}
