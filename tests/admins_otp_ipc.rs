use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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

fn spawn_sidecar(outbox: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .env("RESULTSD_SYSTEM_EMAIL", "results@example.edu")
        .env("RESULTSD_OUTBOX_DIR", outbox)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Code from the only OTP message in the outbox.
fn read_otp(outbox: &Path) -> String {
    let envelopes: Vec<serde_json::Value> = std::fs::read_dir(outbox)
        .expect("outbox exists")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .map(|p| serde_json::from_str(&std::fs::read_to_string(p).expect("read")).expect("json"))
        .collect();
    assert_eq!(envelopes.len(), 1, "exactly one otp message");
    let body = envelopes[0]["body"].as_str().expect("body");
    body.rsplit(' ').next().expect("code").trim().to_string()
}

#[test]
fn register_login_and_reset_password_with_otp() {
    let workspace = temp_dir("resultsd-admins-otp");
    let outbox = workspace.join("mail-out");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&outbox);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let registered = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admins.register",
        json!({ "email": "hod@example.edu", "password": "old-pass", "department": "CSE" }),
    );
    assert_eq!(
        registered["message"].as_str(),
        Some("Department Registered Successfully!")
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "admins.register",
        json!({ "email": "hod@example.edu", "password": "x", "department": "ME" }),
    );
    assert_eq!(error_code(&dup), "conflict");

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "admins.login",
        json!({ "email": "hod@example.edu", "password": "old-pass" }),
    );
    assert_eq!(login["department"].as_str(), Some("CSE"));

    let wrong = request(
        &mut stdin,
        &mut reader,
        "5",
        "admins.login",
        json!({ "email": "hod@example.edu", "password": "nope" }),
    );
    assert_eq!(error_code(&wrong), "invalid_credentials");

    let unknown = request(
        &mut stdin,
        &mut reader,
        "6",
        "admins.sendOtp",
        json!({ "email": "stranger@example.edu" }),
    );
    assert_eq!(error_code(&unknown), "not_found");

    let sent = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "admins.sendOtp",
        json!({ "email": "hod@example.edu" }),
    );
    assert_eq!(sent["message"].as_str(), Some("OTP Sent"));
    assert!(sent["expiresAt"].as_str().is_some());
    let code = read_otp(&outbox);
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "admins.resetPassword",
        json!({ "email": "hod@example.edu", "otp": code, "newPassword": "new-pass" }),
    );
    assert_eq!(reset["message"].as_str(), Some("Password Changed"));

    let reused = request(
        &mut stdin,
        &mut reader,
        "9",
        "admins.resetPassword",
        json!({ "email": "hod@example.edu", "otp": code, "newPassword": "again" }),
    );
    assert_eq!(error_code(&reused), "invalid_otp");

    let old = request(
        &mut stdin,
        &mut reader,
        "10",
        "admins.login",
        json!({ "email": "hod@example.edu", "password": "old-pass" }),
    );
    assert_eq!(error_code(&old), "invalid_credentials");
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "admins.login",
        json!({ "email": "hod@example.edu", "password": "new-pass" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
