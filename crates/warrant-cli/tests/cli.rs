//! End-to-end tests for the `warrant` binary.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A `warrant` command isolated from the user's config and log settings.
fn warrant(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("warrant").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG")
        .current_dir(home.path());
    cmd
}

fn eval(home: &TempDir, fixture_name: &str, subject: &str, action: &str, resource: &str) -> Command {
    let mut cmd = warrant(home);
    cmd.arg("eval")
        .arg("--fixture")
        .arg(fixture(fixture_name))
        .args(["--zone", "zone-1", "--subject", subject, "--action", action, "--resource", resource]);
    cmd
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn version_command_succeeds() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("warrant"));
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("eval"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn eval_requires_subject() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("eval")
        .arg("--fixture")
        .arg(fixture("alarms.json"))
        .args(["--action", "GET", "--resource", "/alarms/sites/sanramon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

// ============================================================================
// Eval
// ============================================================================

#[test]
fn admin_is_permitted() {
    let home = TempDir::new().unwrap();
    eval(&home, "alarms.json", "bob", "GET", "/alarms/sites/sanramon")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "PERMIT""#))
        .stdout(predicate::str::contains("site-admins"));
}

#[test]
fn non_admin_falls_through_to_deny() {
    let home = TempDir::new().unwrap();
    eval(&home, "alarms.json", "alice", "GET", "/alarms/sites/sanramon")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "DENY""#))
        .stdout(predicate::str::contains("everyone-else"));
}

#[test]
fn unmatched_resource_is_not_applicable() {
    let home = TempDir::new().unwrap();
    eval(&home, "alarms.json", "bob", "GET", "/reports/monthly")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "NOT_APPLICABLE""#));
}

#[test]
fn resource_uri_is_canonicalized() {
    let home = TempDir::new().unwrap();
    eval(&home, "alarms.json", "bob", "GET", "/alarms/sites/../sites/sanramon")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "PERMIT""#));
}

#[test]
fn several_sets_need_an_order() {
    let home = TempDir::new().unwrap();
    eval(&home, "two-sets.json", "bob", "GET", "/anything")
        .assert()
        .failure()
        .stderr(predicate::str::contains("evaluation order is required"));
}

#[test]
fn order_decides_which_set_wins() {
    let home = TempDir::new().unwrap();
    eval(&home, "two-sets.json", "bob", "GET", "/anything")
        .args(["--order", "permit-all,deny-all"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "PERMIT""#));

    eval(&home, "two-sets.json", "bob", "GET", "/anything")
        .args(["--order", "deny-all,permit-all"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""effect": "DENY""#));
}

#[test]
fn unknown_set_in_order_fails() {
    let home = TempDir::new().unwrap();
    eval(&home, "two-sets.json", "bob", "GET", "/anything")
        .args(["--order", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn adapter_failure_is_an_error() {
    let home = TempDir::new().unwrap();
    eval(&home, "external-failure.json", "bob", "GET", "/anything")
        .assert()
        .failure()
        .stdout(predicate::str::contains("PERMIT").not())
        .stderr(predicate::str::contains("503 Service Unavailable"));
}

#[test]
fn missing_fixture_fails() {
    let home = TempDir::new().unwrap();
    eval(&home, "does-not-exist.json", "bob", "GET", "/anything")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load fixture"));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn valid_policy_set_passes() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("validate")
        .arg(fixture("valid-set.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("'alarms' is valid"));
}

#[test]
fn invalid_policy_set_reports_every_issue() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("validate")
        .arg(fixture("invalid-set.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported action 'FETCH'"))
        .stderr(predicate::str::contains("System.exit(0)"))
        .stderr(predicate::str::contains("2 error(s)"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_defaults_render_as_toml() {
    let home = TempDir::new().unwrap();
    warrant(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[decision_cache]"))
        .stdout(predicate::str::contains("ttl_seconds = 600"));
}

#[test]
fn config_reads_project_file_and_environment() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(
        project.path().join("warrant.toml"),
        "[attribute_cache]\nttl_minutes = 60\n\n[decision_cache]\nttl_seconds = 30\n",
    )
    .unwrap();

    warrant(&home)
        .arg("config")
        .arg("--project")
        .arg(project.path())
        .args(["--format", "json"])
        .env("WARRANT_DECISION_CACHE__TTL_SECONDS", "42")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""ttl_minutes": 60"#))
        .stdout(predicate::str::contains(r#""ttl_seconds": 42"#));
}

#[test]
fn invalid_config_is_rejected() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("warrant.toml"), "[attribute_cache]\nttl_minutes = 0\n").unwrap();

    warrant(&home)
        .arg("config")
        .arg("--project")
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
