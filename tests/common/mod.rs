//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Project config used by every test project
pub const TEST_CONFIG: &str = "server_url: https://eb.example.com\nsuper_roles: [admin]\ndefault_tenant: acme\n";

/// Helper to get an eb command isolated from the user's environment
pub fn eb() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("eb"));
    for var in ["EB_TENANT", "EB_USER", "EB_API_KEY", "EB_SERVER_URL", "EB_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

/// eb command run inside a project, with its own config home
pub fn eb_in(dir: &Path) -> Command {
    let mut cmd = eb();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config-home"));
    cmd
}

/// eb command acting as the tenant super-role user `root`
pub fn admin(dir: &Path) -> Command {
    let mut cmd = eb_in(dir);
    cmd.args(["--user", "root", "--role", "admin"]);
    cmd
}

/// eb command acting as a plain member of tenant acme
pub fn member(dir: &Path, user: &str) -> Command {
    let mut cmd = eb_in(dir);
    cmd.args(["--user", user]);
    cmd
}

/// Helper to create a test project in a temp directory
pub fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    eb_in(tmp.path()).arg("init").assert().success();
    fs::write(tmp.path().join(".eb/config.yaml"), TEST_CONFIG).unwrap();
    tmp
}

/// Define `clients` and `contracts` (workflow and API enabled, tenant-visible)
pub fn setup_contracts(tmp: &TempDir) {
    let dir = tmp.path();
    admin(dir)
        .args(["entity", "new", "Client", "clients", "CLI"])
        .assert()
        .success();
    admin(dir)
        .args([
            "entity", "new", "Contract", "contracts", "CON", "--workflow", "--api", "--visibility",
            "tenant",
        ])
        .assert()
        .success();
    admin(dir)
        .args(["prop", "add", "clients", "name", "--type", "TEXT", "--required"])
        .assert()
        .success();
    admin(dir)
        .args([
            "prop", "add", "contracts", "title", "--type", "TEXT", "--required", "--attr",
            "pattern=[A-Z].*",
        ])
        .assert()
        .success();
    admin(dir)
        .args(["prop", "add", "contracts", "amount", "--type", "NUMBER", "--attr", "min=0"])
        .assert()
        .success();
    admin(dir)
        .args([
            "prop", "add", "contracts", "status", "--type", "SELECT", "--option", "draft:Draft",
            "--option", "sent:Sent",
        ])
        .assert()
        .success();
    admin(dir)
        .args(["prop", "add", "contracts", "client", "--type", "ENTITY", "--related", "clients"])
        .assert()
        .success();
}

/// Add a Draft/Sent workflow with Start and Send steps to `contracts`
pub fn setup_contract_workflow(tmp: &TempDir) {
    let dir = tmp.path();
    for state in ["Draft", "Sent"] {
        admin(dir)
            .args(["workflow", "state", "add", "contracts", state])
            .assert()
            .success();
    }
    admin(dir)
        .args(["workflow", "step", "add", "contracts", "Start", "--to", "Draft"])
        .assert()
        .success();
    admin(dir)
        .args(["workflow", "step", "add", "contracts", "Send", "--from", "Draft", "--to", "Sent"])
        .assert()
        .success();
}

/// Create a row and return its id
pub fn create_row(cmd: &mut Command, entity: &str, values: &[&str]) -> String {
    let output = cmd
        .args(["-q", "row", "new", entity])
        .args(values)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "row new failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
