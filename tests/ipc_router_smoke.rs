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
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoold-router-smoke");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health
        .get("result")
        .and_then(|r| r.get("workspacePath"))
        .map(|v| v.is_null())
        .unwrap_or(false));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "settings.set",
        json!({ "key": "school.name", "value": "Smoke School" }),
    );
    let setting = request(
        &mut stdin,
        &mut reader,
        "4",
        "settings.get",
        json!({ "key": "school.name" }),
    );
    assert_eq!(
        setting
            .get("result")
            .and_then(|r| r.get("value"))
            .and_then(|v| v.as_str()),
        Some("Smoke School")
    );

    let teacher = request(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "name": "Smoke Teacher", "email": "smoke@example.org" }),
    );
    let teacher_id = teacher
        .get("result")
        .and_then(|v| v.get("teacherId"))
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let created = request(
        &mut stdin,
        &mut reader,
        "6",
        "classes.create",
        json!({ "name": "Smoke Class", "grade": "8", "homeroomTeacherId": teacher_id }),
    );
    let class_id = created
        .get("result")
        .and_then(|v| v.get("classId"))
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let subject = request(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.create",
        json!({ "name": "Smoke Subject" }),
    );
    let subject_id = subject
        .get("result")
        .and_then(|v| v.get("subjectId"))
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "8", "classes.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "9", "subjects.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "10", "teachers.list", json!({}));
    let assignment = request(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.create",
        json!({ "classId": class_id, "subjectId": subject_id, "teacherId": teacher_id }),
    );
    let assignment_id = assignment
        .get("result")
        .and_then(|v| v.get("assignmentId"))
        .and_then(|v| v.as_str())
        .expect("assignmentId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "assignments.list",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "timetable.generate",
        json!({ "persist": true }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "timetable.get",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "timetable.teacher",
        json!({ "teacherId": teacher_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "assignments.delete",
        json!({ "assignmentId": assignment_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "subjects.delete",
        json!({ "subjectId": subject_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    let unknown = send(&mut stdin, &mut reader, "19", "grades.list", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
