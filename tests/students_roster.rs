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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_feedbackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn feedbackd");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn principal_token(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> String {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-boot",
        "auth.bootstrapPrincipal",
        json!({ "email": "head@school.test", "password": "pw" }),
    );
    let login = request_ok(
        stdin,
        reader,
        "setup-login",
        "auth.login",
        json!({ "email": "head@school.test", "password": "pw" }),
    );
    login
        .get("token")
        .and_then(|v| v.as_str())
        .expect("principal token")
        .to_string()
}

#[test]
fn student_creation_enforces_section_and_uniqueness() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = principal_token(&mut stdin, &mut reader, "feedbackd-students-create");

    // No such section yet.
    let orphan = request(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "token": &token,
            "email": "kid@school.test",
            "password": "pw",
            "studentId": "S-1",
            "section": "A1"
        }),
    );
    assert_eq!(error_code(&orphan), "not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sections.create",
        json!({ "token": &token, "name": "A1" }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "token": &token,
            "email": "kid@school.test",
            "password": "pw",
            "studentId": "S-1",
            "section": "a1"
        }),
    );
    assert_eq!(created.get("section").and_then(|v| v.as_str()), Some("A1"));
    assert!(created.get("passwordHash").is_none());
    assert!(created.get("password").is_none());

    // Duplicate email, then duplicate student number.
    let dup_email = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "token": &token,
            "email": "kid@school.test",
            "password": "pw",
            "studentId": "S-2",
            "section": "A1"
        }),
    );
    assert_eq!(error_code(&dup_email), "conflict");

    let dup_number = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "token": &token,
            "email": "kid2@school.test",
            "password": "pw",
            "studentId": "S-1",
            "section": "A1"
        }),
    );
    assert_eq!(error_code(&dup_number), "conflict");

    let missing_field = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "token": &token,
            "email": "kid3@school.test",
            "password": "pw",
            "section": "A1"
        }),
    );
    assert_eq!(error_code(&missing_field), "bad_params");
}

#[test]
fn student_listing_filters_by_section_and_hides_secrets() {
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let token = principal_token(&mut stdin, &mut reader, "feedbackd-students-list");

    for (id, name) in [("1", "A1"), ("2", "B2")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "sections.create",
            json!({ "token": &token, "name": name }),
        );
    }
    for (id, email, number, section) in [
        ("3", "ana@school.test", "S-1", "A1"),
        ("4", "ben@school.test", "S-2", "A1"),
        ("5", "cyn@school.test", "S-3", "B2"),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.create",
            json!({
                "token": &token,
                "email": email,
                "password": "pw",
                "studentId": number,
                "section": section
            }),
        );
    }

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "token": &token }),
    );
    let all_rows = all
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(all_rows.len(), 3);
    for row in &all_rows {
        let text = row.to_string();
        assert!(
            !text.contains("hash") && !text.contains("salt") && !text.contains("password"),
            "secret material leaked: {}",
            text
        );
    }

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "token": &token, "section": "a1" }),
    );
    let rows = filtered
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.get("section").and_then(|v| v.as_str()), Some("A1"));
    }
}
