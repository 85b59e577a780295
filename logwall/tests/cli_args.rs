//! CLI arg parsing tests for logwall (client)
use std::process::Command;

fn run(args: &[&str]) -> (bool, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_logwall"))
        .args(args)
        .output()
        .expect("run logwall");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (output.status.success(), text)
}

#[test]
fn test_help_mentions_short_and_long_flags() {
    let (ok, text) = run(&["--help"]);
    assert!(ok);
    assert!(
        text.contains("--token") && text.contains("-k") && text.contains("--profile") && text.contains("-P"),
        "help text missing expected flags (--token/-k, --profile/-P)\n{text}"
    );
    assert!(text.contains("--stats"));
}

#[test]
fn test_flags_accepted_before_help() {
    for args in [
        &["--token", "pw", "--help"][..],
        &["-k", "pw", "--help"][..],
        &["--profile", "dev", "--stats", "--help"][..],
    ] {
        let (ok, text) = run(args);
        assert!(ok, "{args:?} did not succeed");
        assert!(text.contains("Usage:"), "{args:?}: {text}");
    }
}

#[test]
fn test_dry_run_prints_url_without_token() {
    let td = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_logwall"))
        .env("XDG_CONFIG_HOME", td.path())
        .args(["-k", "secret", "--dry-run", "ws://127.0.0.1:1/ws"])
        .output()
        .expect("run logwall");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "ws://127.0.0.1:1/ws");
}
