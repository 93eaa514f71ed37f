#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use predicates::prelude::*;
use tempfile::TempDir;

const BACKUP_FIXTURE: &str = "V0JVSQAAAT5xxW76YX91IgLvJwXeC5x+q/8To15mBzbsA6rc5Dzf7xRyWH+LYv+bscKxj3c7Fl7trr/9qt78lgA5ZtyjK7d2ZBdSYl4HLskPjyUIseTjAZjGKt+7MEXp8aVBey8ooGep";
const BACKUP_PASSWORD: &str = "1235678";

/// A scratch directory holding the fixture backup and an empty config dir.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("backup.bin"),
            STANDARD.decode(BACKUP_FIXTURE).unwrap(),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn backup(&self) -> PathBuf {
        self.path("backup.bin")
    }

    fn write_config(&self, content: &str) {
        fs::write(self.path("config").join("config.toml"), content).unwrap();
    }

    fn wirebackup(&self) -> Command {
        let mut cmd = Command::cargo_bin("wirebackup").unwrap();
        cmd.env("WIREBACKUP_CONFIG_DIR", self.path("config"));
        cmd.env_remove("WIREBACKUP_PASSWORD");
        cmd.env_remove("RUST_LOG");
        cmd
    }
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

// =============================================================================
// Successful decryption
// =============================================================================

#[test]
fn test_decrypts_fixture() {
    let ws = Workspace::new();
    let output = ws.path("plain.txt");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(&output)
        .arg(BACKUP_PASSWORD)
        .assert()
        .success()
        .stdout(predicate::str::contains("Start decrypting"))
        .stdout(predicate::str::contains("Decrypting successful (9 bytes)"));

    assert_eq!(read(&output), b"123456789");
}

#[test]
fn test_password_from_env() {
    let ws = Workspace::new();
    let output = ws.path("plain.txt");

    ws.wirebackup()
        .env("WIREBACKUP_PASSWORD", BACKUP_PASSWORD)
        .arg(ws.backup())
        .arg(&output)
        .assert()
        .success();

    assert_eq!(read(&output), b"123456789");
}

#[test]
fn test_quiet_prints_nothing() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_identity_mismatch_warns_by_default() {
    let ws = Workspace::new();
    let output = ws.path("plain.txt");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(&output)
        .arg(BACKUP_PASSWORD)
        .arg("some-other-account")
        .assert()
        .success();

    assert_eq!(read(&output), b"123456789");
}

// =============================================================================
// Failures and exit codes
// =============================================================================

#[test]
fn test_wrong_password() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg("not-the-password")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Start decrypting"))
        .stdout(predicate::str::contains("Decrypting successful").not())
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_missing_input() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.path("does-not-exist.bin"))
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(7)
        .stderr(predicate::str::contains("does-not-exist.bin"));
}

#[test]
fn test_truncated_header() {
    let ws = Workspace::new();
    let short = ws.path("short.bin");
    fs::write(&short, &read(&ws.backup())[..40]).unwrap();

    ws.wirebackup()
        .arg(&short)
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("expected 55 bytes, got 40"));
}

#[test]
fn test_strict_rejects_unknown_platform() {
    let ws = Workspace::new();
    let mut backup = read(&ws.backup());
    backup[..4].copy_from_slice(b"XXXX");
    let foreign = ws.path("foreign.bin");
    fs::write(&foreign, backup).unwrap();

    ws.wirebackup()
        .arg(&foreign)
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .arg("--strict")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Unsupported backup format"));
}

#[test]
fn test_enforced_identity_without_uuid() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .args(["--identity-check", "enforce"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Identity check failed"));
}

#[test]
fn test_zero_chunk_size() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .args(["--chunk-size", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("chunk size"));
}

#[test]
fn test_oversized_chunk_size() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .args(["--chunk-size", &usize::MAX.to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exceeds the maximum"));
}

// =============================================================================
// Argument handling
// =============================================================================

#[test]
fn test_too_few_arguments() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .assert()
        .code(2);
}

#[test]
fn test_too_many_arguments() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .args([BACKUP_PASSWORD, "uuid", "extra"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_identity_check_value() {
    let ws = Workspace::new();

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .args(["--identity-check", "sometimes"])
        .assert()
        .code(2);
}

// =============================================================================
// Config file
// =============================================================================

#[test]
fn test_config_defaults_apply() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\nidentity_check = \"enforce\"\n");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(3);
}

#[test]
fn test_flag_overrides_config() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\nidentity_check = \"enforce\"\n");
    let output = ws.path("plain.txt");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(&output)
        .arg(BACKUP_PASSWORD)
        .args(["--identity-check", "skip"])
        .assert()
        .success();

    assert_eq!(read(&output), b"123456789");
}

#[test]
fn test_malformed_config() {
    let ws = Workspace::new();
    ws.write_config("[defaults\n");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_config_chunk_size_is_validated() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\nchunk_size = 1000000000\n");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exceeds the maximum"));
}

#[test]
fn test_config_rejects_unknown_identity_check() {
    let ws = Workspace::new();
    ws.write_config("[defaults]\nidentity_check = \"sometimes\"\n");

    ws.wirebackup()
        .arg(ws.backup())
        .arg(ws.path("plain.txt"))
        .arg(BACKUP_PASSWORD)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown identity check 'sometimes'"));
}
