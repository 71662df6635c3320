use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn reporter(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("patch-reporter").unwrap();
    cmd.current_dir(dir)
        .env_remove("DISCORD_TOKEN")
        .env_remove("CHROMIUM_BIN")
        .env_remove("DISCORD_WEBHOOK")
        .env_remove("RUST_LOG");
    cmd
}

fn write_transcript(dir: &std::path::Path, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join("run.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

const DONE: &str = r#"{"level":"log","args":["[PUPPETEER_TEST_DONE_SIGNAL]"]}"#;

#[test]
fn run_without_token_fails_before_reporting() {
    let dir = tempfile::tempdir().unwrap();

    reporter(dir.path())
        .arg("run")
        .env("CHROMIUM_BIN", "/usr/bin/chromium")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("DISCORD_TOKEN"))
        .stdout(predicate::str::contains("# Vencord Report").not());
}

#[test]
fn run_without_browser_fails_before_reporting() {
    let dir = tempfile::tempdir().unwrap();

    reporter(dir.path())
        .arg("run")
        .env("DISCORD_TOKEN", "token")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CHROMIUM_BIN"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn report_with_bad_patch_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &[
            r#"{"level":"warning","args":["[Vencord]","WebpackInterceptor:","Patch by Foo (errored) (Module id is 42): /abc/"]}"#,
            DONE,
        ],
    );

    reporter(dir.path())
        .arg("report")
        .arg(&transcript)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("- Foo (errored)"))
        .stdout(predicate::str::contains("  - ID: `42`"));
}

#[test]
fn report_with_only_ignored_errors_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &[
            r#"{"level":"error","args":["Downloading the full bad domains file"]}"#,
            r#"{"level":"log","args":["just chatter"]}"#,
            DONE,
        ],
    );

    reporter(dir.path())
        .arg("report")
        .arg(&transcript)
        .assert()
        .success()
        .stdout(predicate::str::contains("## Ignored Discord Errors"))
        .stdout(predicate::str::contains("Downloading the full bad domains file"));
}

#[test]
fn report_uses_config_ignore_list() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("reporter.toml"),
        "[ignore]\nsubstrings = [\"Known flake\"]\n",
    )
    .unwrap();
    let transcript = write_transcript(
        dir.path(),
        &[r#"{"level":"error","args":["Known flake in store"]}"#, DONE],
    );

    reporter(dir.path()).arg("report").arg(&transcript).assert().success();
}

#[test]
fn report_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = write_transcript(
        dir.path(),
        &[r#"{"level":"log","args":["[PUP_WEBPACK_FIND_FAIL]","findByProps(\"gone\")"]}"#, DONE],
    );

    let output = reporter(dir.path())
        .args(["report", "--json"])
        .arg(&transcript)
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["bad_webpack_finds"][0], "findByProps(\"gone\")");
}

#[test]
fn init_writes_config_once() {
    let dir = tempfile::tempdir().unwrap();

    reporter(dir.path()).args(["init", "--channel", "canary"]).assert().success();
    let written = fs::read_to_string(dir.path().join("reporter.toml")).unwrap();
    assert!(written.contains("channel = \"canary\""));

    reporter(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    reporter(dir.path()).args(["init", "--force"]).assert().success();
}
