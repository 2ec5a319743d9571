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

fn spawn_sidecar(system_email: Option<&str>) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut cmd = Command::new(exe);
    cmd.env("RESULTSD_INSTITUTION", "Test Institute")
        .env_remove("RESULTSD_SYSTEM_EMAIL")
        .env_remove("RESULTSD_OUTBOX_DIR");
    if let Some(addr) = system_email {
        cmd.env("RESULTSD_SYSTEM_EMAIL", addr);
    }
    let mut child = cmd
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

fn seed_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    email: &str,
) -> String {
    request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "seed-student",
        "students.upsert",
        json!({
            "enrollmentNumber": "0101CS201",
            "studentName": "Asha Verma",
            "email": email,
            "password": "pw1",
            "department": "CSE",
            "course": "B.Tech",
            "semester": "5",
            "subjects": "Math (E:80+I:15), Physics (E:70+I:10)",
            "attendanceMarks": 8,
            "internshipMarks": 9,
            "projectMarks": 10
        }),
    );
    created["studentId"].as_str().expect("studentId").to_string()
}

fn outbox_envelopes(dir: &Path) -> Vec<serde_json::Value> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
        .map(|p| {
            let text = std::fs::read_to_string(&p).expect("read envelope");
            serde_json::from_str(&text).expect("envelope json")
        })
        .collect()
}

#[test]
fn render_inline_and_to_file() {
    let workspace = temp_dir("resultsd-marksheet-render");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some("results@example.edu"));
    let student_id = seed_student(&mut stdin, &mut reader, &workspace, "asha@example.edu");

    let inline = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "marksheets.render",
        json!({ "studentId": student_id }),
    );
    let markup = inline["markup"].as_str().expect("markup");
    assert!(markup.contains("TEST INSTITUTE"));
    assert!(markup.contains("Department of CSE"));
    assert!(markup.contains("Total: 202"));
    assert!(markup.contains("RESULT: PASS (65.16%)"));
    assert_eq!(inline["aggregate"]["verdict"].as_str(), Some("PASS"));

    let out = workspace.join("sheets").join("asha.html");
    let written = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marksheets.render",
        json!({ "studentId": student_id, "outPath": out.to_string_lossy() }),
    );
    assert_eq!(written["fileName"].as_str(), Some("Asha Verma_Marksheet.html"));
    assert_eq!(
        written["contentType"].as_str(),
        Some("text/html; charset=utf-8")
    );
    let on_disk = std::fs::read_to_string(&out).expect("rendered file");
    assert_eq!(written["bytes"].as_u64(), Some(on_disk.len() as u64));
    assert!(on_disk.contains("Computer Generated Report - Test Institute"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "marksheets.render",
        json!({ "studentId": "nobody" }),
    );
    assert_eq!(missing["error"]["code"].as_str(), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn send_uses_department_admin_as_reply_to() {
    let workspace = temp_dir("resultsd-marksheet-send");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some("results@example.edu"));
    let student_id = seed_student(&mut stdin, &mut reader, &workspace, "asha@example.edu");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "marksheets.send",
        json!({ "studentId": student_id }),
    );
    assert_eq!(first["replyTo"].as_str(), Some("results@example.edu"));
    assert_eq!(
        first["message"].as_str(),
        Some("Email Sent Successfully to asha@example.edu!")
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "admins.register",
        json!({ "email": "hod.cse@example.edu", "password": "pw", "department": "CSE" }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marksheets.send",
        json!({ "studentId": student_id }),
    );
    assert_eq!(second["replyTo"].as_str(), Some("hod.cse@example.edu"));
    let message_id = second["messageId"].as_str().expect("messageId").to_string();

    let outbox = workspace.join("outbox");
    let envelopes = outbox_envelopes(&outbox);
    assert_eq!(envelopes.len(), 2);
    let sent = envelopes
        .iter()
        .find(|e| e["messageId"].as_str() == Some(message_id.as_str()))
        .expect("second envelope");
    assert_eq!(sent["to"].as_str(), Some("asha@example.edu"));
    assert_eq!(sent["from"].as_str(), Some("Test Institute CSE <results@example.edu>"));
    assert_eq!(sent["subject"].as_str(), Some("Result: Asha Verma (CSE)"));
    let stored = sent["attachment"]["storedAs"].as_str().expect("storedAs");
    let attachment = std::fs::read_to_string(outbox.join(stored)).expect("attachment");
    assert!(attachment.contains("RESULT: PASS"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn send_rejects_bad_address_and_missing_sender() {
    let workspace = temp_dir("resultsd-marksheet-send-errors");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some("results@example.edu"));
    let student_id = seed_student(&mut stdin, &mut reader, &workspace, "not-an-address");
    let bad = request(
        &mut stdin,
        &mut reader,
        "1",
        "marksheets.send",
        json!({ "studentId": student_id }),
    );
    assert_eq!(bad["error"]["code"].as_str(), Some("bad_params"));
    assert!(outbox_envelopes(&workspace.join("outbox")).is_empty());
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar(None);
    let student_id = seed_student(&mut stdin, &mut reader, &workspace, "asha@example.edu");
    let unconfigured = request(
        &mut stdin,
        &mut reader,
        "2",
        "marksheets.send",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        unconfigured["error"]["code"].as_str(),
        Some("external_service_failed")
    );
    assert_eq!(
        unconfigured["error"]["details"]["service"].as_str(),
        Some("delivery")
    );
    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
