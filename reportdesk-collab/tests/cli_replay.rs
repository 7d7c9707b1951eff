use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const SCRIPT: &str = r#"{
  "peer": "alice",
  "fields": {"title": "Hello"},
  "steps": [
    {"action": "type", "at": 0, "field": "title", "value": "Hello "},
    {"action": "type", "at": 300, "field": "title", "value": "Hello World"},
    {"action": "presence", "at": 400, "sender": "bob", "senderName": "Bob"},
    {"action": "remote", "at": 500, "sender": "bob",
     "operation": {"field": "title", "position": 0, "deletedLength": 0, "insertedText": ">> "}},
    {"action": "undo", "at": 600}
  ]
}"#;

#[allow(deprecated)]
fn bin() -> Command {
    let mut cmd = Command::cargo_bin("reportdesk-collab").expect("binary builds");
    cmd.env_remove("REPORTDESK_CONFIG")
        .env_remove("REPORTDESK_BATCH_DELAY_MS")
        .env_remove("REPORTDESK_PRESENCE_TIMEOUT_SECS")
        .env_remove("REPORTDESK_MAX_UNDO_DEPTH")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn replay_prints_report() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("session.json");
    fs::write(&script, SCRIPT)?;

    let assert = bin().arg("replay").arg(&script).assert().success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let report: Value = serde_json::from_str(&stdout)?;
    // the local typing is undone, bob's prefix survives
    assert_eq!(report["fields"]["title"], ">> Hello");
    assert_eq!(report["canUndo"], false);
    assert_eq!(report["canRedo"], true);
    assert_eq!(report["history"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["history"][0]["operationCount"], 2);
    assert_eq!(report["collaborators"][0]["userName"], "Bob");
    Ok(())
}

#[test]
fn replay_history_only_emits_json_lines() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("session.json");
    fs::write(&script, SCRIPT)?;

    let assert = bin()
        .args(["--batch-delay-ms", "100", "replay", "--history-only"])
        .arg(&script)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let lines: Vec<Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    // a 100ms window splits the two keystrokes
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["field"], "title");
    assert_eq!(lines[1]["preview"], "Hello World");
    Ok(())
}

#[test]
fn config_reads_yaml_and_env_override() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("engine.yml");
    fs::write(&path, "batch_delay_ms: 800\nmax_undo_depth: 20\n")?;

    bin()
        .arg("--config")
        .arg(&path)
        .env("REPORTDESK_MAX_UNDO_DEPTH", "5")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("batch_delay_ms: 800"))
        .stdout(predicate::str::contains("max_undo_depth: 5"))
        .stdout(predicate::str::contains("presence_timeout_secs: 30"));
    Ok(())
}

#[test]
fn replay_rejects_out_of_order_script() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("bad.json");
    fs::write(
        &script,
        r#"{"steps": [{"action": "flush", "at": 50}, {"action": "flush", "at": 10}]}"#,
    )?;

    bin()
        .arg("replay")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("goes back in time"));
    Ok(())
}

#[test]
fn config_rejects_oversized_presence_timeout() -> Result<(), Box<dyn std::error::Error>> {
    bin()
        .env("REPORTDESK_PRESENCE_TIMEOUT_SECS", "10000000000000000")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("presence_timeout_secs"));
    Ok(())
}
