//! Command-line runs against a temporary library.

use std::fs;
use std::path::Path;

use clap::Parser;
use mediadupe::actions::{Action, TokenSigner};
use mediadupe::cli::Cli;
use mediadupe::config::Config;
use mediadupe::error::ExitCode;
use mediadupe::scanner::Digest;
use mediadupe::store::{ItemCatalog, Library};
use tempfile::{tempdir, TempDir};

struct Env {
    media: TempDir,
    state: TempDir,
}

impl Env {
    fn new(files: &[(&str, &str)]) -> Self {
        let media = tempdir().unwrap();
        for (name, content) in files {
            fs::write(media.path().join(name), content).unwrap();
        }
        Self {
            media,
            state: tempdir().unwrap(),
        }
    }

    fn config(&self) -> std::path::PathBuf {
        self.state.path().join("config.toml")
    }

    fn write_config(&self, toml: &str) {
        fs::write(self.config(), toml).unwrap();
    }

    fn token(&self, group: &str) -> String {
        let library = Library::open(Path::new(&self.library())).unwrap();
        TokenSigner::load_or_create(&library, self.state.path())
            .unwrap()
            .mint(Action::DeleteOrphans, group)
            .to_string()
    }

    fn library(&self) -> String {
        self.state.path().join("library.db").display().to_string()
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<ExitCode> {
        let config = self.config().display().to_string();
        let library = self.library();
        let mut argv = vec!["mediadupe", "-q", "--config", &config, "--library", &library];
        argv.extend_from_slice(args);
        mediadupe::run_app(Cli::try_parse_from(argv)?)
    }

    fn code(&self, args: &[&str]) -> ExitCode {
        match self.run(args) {
            Ok(code) => code,
            Err(err) => ExitCode::for_error(&err),
        }
    }

    fn import(&self) {
        let media = self.media.path().display().to_string();
        assert_eq!(self.code(&["import", &media]), ExitCode::Success);
    }
}

fn photos() -> Env {
    Env::new(&[("a.jpg", "photo"), ("b.jpg", "photo"), ("c.jpg", "other")])
}

#[test]
fn test_status_before_any_scan() {
    let env = photos();
    assert_eq!(env.code(&["status"]), ExitCode::Success);
    assert_eq!(env.code(&["report"]), ExitCode::NoDuplicates);
}

#[test]
fn test_full_scan_and_report() {
    let env = photos();
    env.import();

    assert_eq!(env.code(&["scan"]), ExitCode::Success);
    assert_eq!(env.code(&["report", "--output", "json"]), ExitCode::Success);
    assert_eq!(env.code(&["status", "--output", "json"]), ExitCode::Success);
}

#[test]
fn test_scan_without_duplicates() {
    let env = Env::new(&[("a.jpg", "one"), ("b.jpg", "two")]);
    env.import();
    assert_eq!(env.code(&["scan"]), ExitCode::NoDuplicates);
}

#[test]
fn test_stepping_reports_partial_results() {
    let env = photos();
    env.import();

    assert_eq!(
        env.code(&["scan", "--step", "--page-size", "1"]),
        ExitCode::PartialResults
    );
    assert_eq!(
        env.code(&["scan", "--resume", "--step", "--page-size", "1"]),
        ExitCode::PartialResults
    );
    assert_eq!(env.code(&["stop"]), ExitCode::Success);
    assert_eq!(env.code(&["scan", "--resume"]), ExitCode::Success);
}

#[test]
fn test_stop_without_scan_is_rejected() {
    let env = photos();
    let err = env.run(&["stop"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::Rejected);
}

#[test]
fn test_delete_requires_valid_token() {
    let env = photos();
    env.import();
    env.code(&["scan"]);

    let group = Digest::of_bytes(b"photo").to_string();
    assert_eq!(
        env.code(&["delete-orphans", &group, "--token", "deadbeef", "--permanent"]),
        ExitCode::Rejected
    );
    assert!(env.media.path().join("a.jpg").exists());
    assert!(env.media.path().join("b.jpg").exists());
}

#[test]
fn test_reference_then_delete_orphans() {
    let env = photos();
    env.import();
    env.code(&["scan"]);

    let library = Library::open(Path::new(&env.library())).unwrap();
    let ids: Vec<_> = library.list_items(0, 10).unwrap().into_iter().map(|i| i.id).collect();
    drop(library);
    let keep = ids[0].to_string();
    assert_eq!(env.code(&["reference", &keep, "cover photo"]), ExitCode::Success);

    let group = Digest::of_bytes(b"photo").to_string();
    let token = env.token(&group);

    assert_eq!(
        env.code(&["delete-orphans", &group, "--token", &token, "--permanent"]),
        ExitCode::Success
    );
    assert!(env.media.path().join("a.jpg").exists());
    assert!(!env.media.path().join("b.jpg").exists());

    // The cached group was invalidated by the deletion.
    assert_eq!(
        env.code(&["delete-orphans", &group, "--token", &token, "--permanent"]),
        ExitCode::NoDuplicates
    );
}

#[test]
fn test_reference_to_unknown_item_fails() {
    let env = photos();
    assert_eq!(env.code(&["reference", "42"]), ExitCode::GeneralError);
}

#[test]
fn test_zero_page_size_is_rejected() {
    let env = photos();
    assert_eq!(env.code(&["scan", "--page-size", "0"]), ExitCode::Rejected);
}

#[test]
fn test_token_command() {
    let env = photos();
    let group = Digest::of_bytes(b"photo").to_string();
    assert_eq!(env.code(&["token", &group]), ExitCode::Success);
}

#[test]
fn test_delete_keeps_last_copy_of_orphan_group() {
    let env = photos();
    env.import();
    env.code(&["scan"]);

    let group = Digest::of_bytes(b"photo").to_string();
    let token = env.token(&group);
    assert_eq!(
        env.code(&["delete-orphans", &group, "--token", &token, "--permanent"]),
        ExitCode::Success
    );
    assert!(env.media.path().join("a.jpg").exists());
    assert!(!env.media.path().join("b.jpg").exists());
}

#[test]
fn test_scan_requires_manage_scans() {
    let env = photos();
    env.import();
    env.write_config("capabilities = [\"delete_items\"]\n");

    let err = env.run(&["scan"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::Rejected);
    assert_eq!(env.code(&["clear"]), ExitCode::Rejected);
    assert_eq!(env.code(&["status"]), ExitCode::Success);
    assert_eq!(env.code(&["report"]), ExitCode::NoDuplicates);
}

#[test]
fn test_delete_requires_delete_items() {
    let env = photos();
    env.import();
    env.write_config("capabilities = [\"manage_scans\"]\n");
    assert_eq!(env.code(&["scan"]), ExitCode::Success);

    let group = Digest::of_bytes(b"photo").to_string();
    let token = env.token(&group);
    assert_eq!(
        env.code(&["delete-orphans", &group, "--token", &token, "--permanent"]),
        ExitCode::Rejected
    );
    assert!(env.media.path().join("a.jpg").exists());
    assert!(env.media.path().join("b.jpg").exists());
}

#[test]
fn test_init_config_writes_effective_settings() {
    let env = photos();
    assert_eq!(env.code(&["init-config"]), ExitCode::Success);

    let written = Config::load_from_path(env.config(), None);
    assert_eq!(written.library_path().unwrap().display().to_string(), env.library());
    assert_eq!(written.capabilities, Config::default().capabilities);

    assert_eq!(env.code(&["init-config"]), ExitCode::GeneralError);
    assert_eq!(env.code(&["init-config", "--force"]), ExitCode::Success);
}
