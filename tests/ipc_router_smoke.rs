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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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

#[test]
fn full_surface_smoke_from_bootstrap_to_analysis() {
    let workspace = temp_dir("feedbackd-smoke");
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.bootstrapPrincipal",
        json!({ "email": "head@school.test", "password": "pr1ncipal" }),
    );
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "email": "head@school.test", "password": "pr1ncipal" }),
    );
    let principal_token = login
        .get("token")
        .and_then(|v| v.as_str())
        .expect("principal token")
        .to_string();
    assert_eq!(login.get("role").and_then(|v| v.as_str()), Some("principal"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.create",
        json!({ "token": &principal_token, "name": "b1" }),
    );
    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "sections.list",
        json!({ "token": &principal_token }),
    );
    assert_eq!(sections.get("sections"), Some(&json!(["B1"])));

    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.create",
        json!({ "token": &principal_token, "name": "Mathematics", "section": "B1" }),
    );
    let subject_id = subject
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.create",
        json!({
            "token": &principal_token,
            "email": "amel@school.test",
            "password": "s3cret",
            "studentId": "S-001",
            "section": "B1"
        }),
    );

    let student_login = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "email": "amel@school.test", "password": "s3cret" }),
    );
    let student_token = student_login
        .get("token")
        .and_then(|v| v.as_str())
        .expect("student token")
        .to_string();

    let me = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "auth.me",
        json!({ "token": &student_token }),
    );
    assert_eq!(me.get("role").and_then(|v| v.as_str()), Some("student"));
    assert_eq!(me.get("section").and_then(|v| v.as_str()), Some("B1"));

    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "subjects.mine",
        json!({ "token": &student_token }),
    );
    assert_eq!(
        mine.get("subjects")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "feedback.submit",
        json!({
            "token": &student_token,
            "subjectId": subject_id,
            "teachingRating": 4,
            "knowledgeRating": 5,
            "behaviorRating": 4,
            "comment": "clear lectures"
        }),
    );

    let my_feedback = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "feedback.mine",
        json!({ "token": &student_token }),
    );
    let entries = my_feedback
        .get("feedback")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].get("subjectName").and_then(|v| v.as_str()),
        Some("Mathematics")
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "feedback.analysis",
        json!({ "token": &principal_token, "subjectId": subject_id }),
    );
    assert_eq!(
        report.get("totalFeedbackEntries").and_then(|v| v.as_u64()),
        Some(1)
    );
    let sentiment = report
        .pointer("/analysis/overallSentiment")
        .cloned()
        .expect("sentiment");
    assert_eq!(
        sentiment,
        json!({ "positive": 1, "neutral": 0, "negative": 0 })
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "15",
        "no.such.method",
        json!({}),
    );
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );
}

#[test]
fn workspace_select_failure_reports_only_a_generic_error() {
    let parent = temp_dir("feedbackd-bad-workspace");
    let blocker = parent.join("occupied");
    std::fs::write(&blocker, b"not a directory").expect("write blocker file");

    let (_child, mut stdin, mut reader) = spawn_daemon();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": blocker.to_string_lossy() }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("internal")
    );
    assert_eq!(
        resp.pointer("/error/status").and_then(|v| v.as_u64()),
        Some(500)
    );
    // OS detail stays in the server log.
    assert_eq!(
        resp.pointer("/error/message").and_then(|v| v.as_str()),
        Some("internal error")
    );
}

#[test]
fn malformed_request_lines_get_a_parseable_bad_json_reply() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    for garbage in [
        "{\"id\": \"1\", \"method\": }",
        "not json at all \"with quotes\"",
    ] {
        writeln!(stdin, "{}", garbage).expect("write garbage line");
        stdin.flush().expect("flush garbage line");

        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("reply must itself be valid json");
        assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            value.pointer("/error/code").and_then(|v| v.as_str()),
            Some("bad_json")
        );
        assert!(value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .is_some_and(|m| !m.is_empty()));
    }
}
