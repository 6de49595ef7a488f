#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_with_args(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classtrackd");
    let mut child = Command::new(exe)
        .args(args)
        .env_remove("CLASSTRACK_CONFIG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classtrackd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_with_args(&[])
}

/// Writes `toml` next to the workspace and starts the daemon with `--config`.
pub fn spawn_sidecar_with_config(
    dir: &Path,
    toml: &str,
) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let cfg_path = dir.join("classtrack.toml");
    std::fs::write(&cfg_path, toml).expect("write config");
    let arg = cfg_path.to_string_lossy().to_string();
    spawn_with_args(&["--config", arg.as_str()])
}

pub fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");

    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, token);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Returns the `error` object after asserting the call failed.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    token: Option<&str>,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params, token);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    username: &str,
    password: &str,
    role: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "auth.login",
        json!({ "username": username, "password": password, "role": role }),
        None,
    );
    res.get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string()
}

/// Selects `workspace` and logs in as the bootstrap admin.
pub fn open_as_admin(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    login(stdin, reader, "login-admin", "admin", "admin", "admin")
}

pub fn id_of(v: &serde_json::Value, key: &str) -> i64 {
    v.get(key)
        .and_then(|x| x.as_i64())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
}

pub const NO_DEMO_CONFIG: &str = "[seed]\ndemo_students = false\n";

pub fn subject_named(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    token: &str,
    name: &str,
) -> i64 {
    let res = request_ok(stdin, reader, "subjects", "subjects.list", json!({}), Some(token));
    res["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["name"] == name)
        .map(|s| id_of(s, "id"))
        .unwrap_or_else(|| panic!("subject {} not seeded", name))
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    token: &str,
    roll_no: &str,
    name: &str,
) -> i64 {
    let res = request_ok(
        stdin,
        reader,
        &format!("student-{}", roll_no),
        "students.create",
        json!({ "rollNo": roll_no, "name": name }),
        Some(token),
    );
    id_of(&res, "studentId")
}

/// Creates a student account linked to `student_id` and logs in with it.
pub fn student_login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admin_token: &str,
    username: &str,
    student_id: i64,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        &format!("user-{}", username),
        "users.create",
        json!({
            "username": username,
            "password": "pw-123",
            "role": "student",
            "studentId": student_id,
        }),
        Some(admin_token),
    );
    login(
        stdin,
        reader,
        &format!("login-{}", username),
        username,
        "pw-123",
        "student",
    )
}
