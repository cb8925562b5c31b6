use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_bulletind");
    let mut child = Command::new(exe)
        .env_remove("BULLETIND_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bulletind");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn settings_default_then_persist_across_restarts() {
    let workspace = temp_dir("bulletind-settings");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let defaults = request_ok(&mut stdin, &mut reader, "1", "settings.get", json!({}));
    assert_eq!(defaults, json!({ "passThreshold": 10.0, "publishedOnly": true }));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({ "passThreshold": 11.5, "publishedOnly": false }),
    );
    assert_eq!(updated, json!({ "passThreshold": 11.5, "publishedOnly": false }));
    drop(stdin);
    let _ = child.wait();

    // Reopen through the environment-configured workspace.
    let exe = env!("CARGO_BIN_EXE_bulletind");
    let mut child = Command::new(exe)
        .env("BULLETIND_WORKSPACE", &workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn bulletind");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(
        health["workspacePath"].as_str().map(PathBuf::from),
        Some(workspace.clone())
    );
    let reloaded = request_ok(&mut stdin, &mut reader, "5", "settings.get", json!({}));
    assert_eq!(reloaded["passThreshold"], json!(11.5));
    assert_eq!(reloaded["publishedOnly"], json!(false));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn out_of_scale_threshold_is_rejected() {
    let workspace = temp_dir("bulletind-settings-bad");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let payload = json!({ "id": "2", "method": "settings.update", "params": { "passThreshold": 25 } });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value["error"]["code"], json!("bad_params"));

    let current = request_ok(&mut stdin, &mut reader, "3", "settings.get", json!({}));
    assert_eq!(current["passThreshold"], json!(10.0));

    drop(stdin);
    let _ = child.wait();
}
