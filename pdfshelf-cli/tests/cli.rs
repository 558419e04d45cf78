use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Env {
    home: TempDir,
    library: PathBuf,
}

impl Env {
    fn new() -> Self {
        let home = tempfile::tempdir().unwrap();
        let library = home.path().join("library");
        Self { home, library }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("pdfshelf").unwrap();
        cmd.env("HOME", self.home.path())
            .env("XDG_DATA_HOME", self.home.path().join("data"))
            .env("XDG_CONFIG_HOME", self.home.path().join("config"))
            .env_remove("RUST_LOG")
            .arg("--library")
            .arg(&self.library);
        cmd
    }

    fn write_source(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let dir = self.home.path().join("incoming");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn upload(&self, path: &Path) {
        self.cmd().arg("upload").arg(path).assert().success();
    }
}

#[test]
fn list_reports_empty_library() {
    let env = Env::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No books available."));
}

#[test]
fn upload_then_list_shows_document() {
    let env = Env::new();
    let source = env.write_source("Rust Book.pdf", b"%PDF-1.7 rust");

    env.cmd()
        .arg("upload")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("uploaded Rust Book.pdf"));

    assert_eq!(
        fs::read(env.library.join("Rust Book.pdf")).unwrap(),
        b"%PDF-1.7 rust"
    );
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust Book.pdf"));
}

#[test]
fn upload_rejects_non_pdf_names() {
    let env = Env::new();
    let source = env.write_source("notes.txt", b"plain text");

    env.cmd()
        .arg("upload")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid document name"));
    assert!(!env.library.join("notes.txt").exists());
}

#[test]
fn upload_replaces_existing_document() {
    let env = Env::new();
    env.upload(&env.write_source("paper.pdf", b"first"));
    env.upload(&env.write_source("paper.pdf", b"second"));

    assert_eq!(fs::read(env.library.join("paper.pdf")).unwrap(), b"second");
}

#[test]
fn list_search_is_case_insensitive() {
    let env = Env::new();
    env.upload(&env.write_source("Rust Book.pdf", b"a"));
    env.upload(&env.write_source("Cooking.pdf", b"b"));

    env.cmd()
        .args(["list", "--search", "rUsT"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust Book.pdf"))
        .stdout(predicate::str::contains("Cooking.pdf").not());
}

#[test]
fn list_json_includes_sizes() {
    let env = Env::new();
    env.upload(&env.write_source("b.pdf", b"12345"));
    env.upload(&env.write_source("a.pdf", b"1"));

    let output = env
        .cmd()
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: Value = serde_json::from_slice(&output).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["name"], "a.pdf");
    assert_eq!(entries[0]["bytes"], 1);
    assert_eq!(entries[1]["name"], "b.pdf");
    assert_eq!(entries[1]["bytes"], 5);
}

#[test]
fn download_exports_exact_bytes() {
    let env = Env::new();
    let bytes = b"%PDF-1.4\x00\x01binary";
    env.upload(&env.write_source("doc.pdf", bytes));
    let target = env.home.path().join("out/copy.pdf");

    env.cmd()
        .args(["download", "doc.pdf", "--output"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("saved doc.pdf"));

    assert_eq!(fs::read(&target).unwrap(), bytes);
}

#[test]
fn download_missing_document_fails() {
    let env = Env::new();
    env.cmd()
        .args(["download", "missing.pdf", "-o"])
        .arg(env.home.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn explicit_config_must_exist() {
    let env = Env::new();
    env.cmd()
        .arg("--config")
        .arg(env.home.path().join("nope.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_config_is_rejected() {
    let env = Env::new();
    let config = env.home.path().join("pdfshelf.toml");
    fs::write(&config, "[zoom]\nmin = 2.0\nmax = 1.0\n").unwrap();

    env.cmd()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure();
}
