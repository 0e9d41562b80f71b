#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    /// Spawns the daemon and selects a fresh workspace.
    pub fn start() -> Self {
        let exe = env!("CARGO_BIN_EXE_gradeledgerd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn gradeledgerd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        let workspace = tempfile::tempdir().expect("workspace dir");
        let mut sidecar = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace,
        };
        let path = sidecar.workspace.path().to_string_lossy().to_string();
        sidecar.ok("workspace.select", json!({ "path": path }));
        sidecar
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response");
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Expects a failure and returns the error object.
    pub fn fail(&mut self, method: &str, params: Value, code: &str) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let error = value.get("error").cloned().expect("error object");
        assert_eq!(
            error.get("code").and_then(|v| v.as_str()),
            Some(code),
            "{}: {}",
            method,
            error
        );
        error
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

pub fn f64_field(v: &Value, key: &str) -> f64 {
    v.get(key)
        .and_then(|x| x.as_f64())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
}

/// A year with one period, class "Grade 1" studying Mathematics (budget 100)
/// and Science (budget 50), and one enrolled student.
pub struct School {
    pub year_id: String,
    pub period_id: String,
    pub class_id: String,
    pub math_id: String,
    pub science_id: String,
    pub student_id: String,
    pub enrollment_id: String,
}

pub fn seed_school(sc: &mut Sidecar) -> School {
    let year = sc.ok("years.create", json!({ "name": "2025-2026" }));
    let year_id = str_field(&year, "id");
    let period = sc.ok(
        "periods.create",
        json!({ "schoolYearId": year_id, "name": "Term 1" }),
    );
    let class = sc.ok("classes.create", json!({ "name": "Grade 1" }));
    let class_id = str_field(&class, "id");
    let math = sc.ok("subjects.create", json!({ "name": "Mathematics" }));
    let science = sc.ok("subjects.create", json!({ "name": "Science" }));
    let math_id = str_field(&math, "id");
    let science_id = str_field(&science, "id");
    sc.ok(
        "curriculum.assign",
        json!({ "schoolYearId": year_id, "classId": class_id, "subjectId": math_id }),
    );
    sc.ok(
        "curriculum.assign",
        json!({ "schoolYearId": year_id, "className": "Grade 1", "subjectId": science_id, "budget": 50 }),
    );
    let (student_id, enrollment_id) = enroll(sc, &year_id, &class_id, "Doe", "Ada");

    School {
        year_id,
        period_id: str_field(&period, "id"),
        class_id,
        math_id,
        science_id,
        student_id,
        enrollment_id,
    }
}

/// Creates a student in a class and enrolls them; returns (student, enrollment).
pub fn enroll(sc: &mut Sidecar, year_id: &str, class_id: &str, last: &str, first: &str) -> (String, String) {
    let student = sc.ok(
        "students.create",
        json!({ "lastName": last, "firstName": first, "classId": class_id }),
    );
    let student_id = str_field(&student, "id");
    let enrollment = sc.ok(
        "enrollments.create",
        json!({ "studentId": student_id, "schoolYearId": year_id }),
    );
    (student_id, str_field(&enrollment, "id"))
}

pub fn record(
    sc: &mut Sidecar,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
    name: &str,
    score: f64,
    max_score: f64,
) -> Value {
    sc.request(
        "grades.record",
        json!({
            "enrollmentId": enrollment_id,
            "subjectId": subject_id,
            "periodId": period_id,
            "name": name,
            "score": score,
            "maxScore": max_score,
        }),
    )
}
