//! Smoke-tests the `relayq` binary's subcommands end to end.

use std::io::Write;
use std::process::{Command, Stdio};

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_relayq")
}

#[test]
fn resolve_model_prints_internal_id() {
    let output = Command::new(binary())
        .args(["resolve-model", "claude-sonnet-4-5-20250929"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "CLAUDE_SONNET_4_5_20250929_V1_0");
}

#[test]
fn resolve_model_fails_for_unknown_model() {
    let output = Command::new(binary())
        .args(["resolve-model", "gpt-5"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn translate_reads_stdin_and_prints_wire_body() {
    let mut child = Command::new(binary())
        .args(["translate", "--model", "claude-sonnet-4-5-20250929"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let request = r#"{"model":"claude-sonnet-4-5-20250929","messages":[{"role":"user","content":"hi"}]}"#;
    child.stdin.take().unwrap().write_all(request.as_bytes()).unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        body["conversationState"]["currentMessage"]["userInputMessage"]["content"],
        "hi"
    );
}
