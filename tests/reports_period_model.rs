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
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
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
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    class_group_id: &str,
    name: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "classGroupId": class_group_id, "name": name }),
    );
    created["studentId"].as_str().expect("studentId").to_string()
}

/// Adulto meets on Jan 7 (three attendees, offering 100.00, two visitors);
/// Juvenil meets on May 5 (one attendee, offering 65.50, one visitor).
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let workspace = temp_dir("attendanced-reports");
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let a = create_student(stdin, reader, "seed-a", "adulto", "Ana");
    let b = create_student(stdin, reader, "seed-b", "adulto", "Bruno");
    let c = create_student(stdin, reader, "seed-c", "adulto", "Carla");
    let d = create_student(stdin, reader, "seed-d", "juvenil", "Davi");
    let _ = request_ok(
        stdin,
        reader,
        "seed-1",
        "attendance.saveSession",
        json!({
            "classGroupId": "adulto",
            "date": "2024-01-07",
            "offering": "100.00",
            "visitors": 2,
            "attendances": [
                { "studentId": a, "status": "present", "bible": true },
                { "studentId": b, "status": "present", "bible": true, "magazine": true },
                { "studentId": c, "status": "absent" }
            ]
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-2",
        "attendance.saveSession",
        json!({
            "classGroupId": "juvenil",
            "date": "2024-05-05",
            "offering": 65.5,
            "visitors": 1,
            "attendances": [{ "studentId": d, "status": "present" }]
        }),
    );
}

#[test]
fn quarterly_report_counts_each_session_once() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.periodReport",
        json!({ "role": "secretaria", "periodType": "quarterly", "year": 2024 }),
    );
    assert_eq!(report["periodType"], "quarterly");
    assert!(report["classGroupId"].is_null());
    let periods = report["periods"].as_array().expect("periods");
    assert_eq!(periods.len(), 4);

    let q1 = &periods[0];
    assert_eq!(q1["period"]["label"], "Jan - Mar");
    assert_eq!(q1["stats"]["presents"], 2);
    assert_eq!(q1["stats"]["absents"], 1);
    assert_eq!(q1["stats"]["withBible"], 2);
    assert_eq!(q1["stats"]["withMagazine"], 1);
    assert_eq!(q1["stats"]["totalOffering"], "100.00");
    assert_eq!(q1["stats"]["totalVisitors"], 2);
    assert_eq!(q1["stats"]["uniqueSessionCount"], 1);
    assert_eq!(q1["details"].as_array().map(|d| d.len()), Some(1));

    assert_eq!(periods[1]["stats"]["totalOffering"], "65.50");
    assert_eq!(periods[2]["stats"]["uniqueSessionCount"], 0);
    assert_eq!(periods[3]["stats"]["totalOffering"], "0.00");

    assert_eq!(report["totals"]["totalOffering"], "165.50");
    assert_eq!(report["totals"]["totalVisitors"], 3);
    assert_eq!(report["totals"]["uniqueSessionCount"], 2);
    assert_eq!(report["totals"]["presents"], 3);
    assert_eq!(report["availableClassGroups"].as_array().map(|g| g.len()), Some(4));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn class_filter_and_all_alias() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader);

    let adulto = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.periodReport",
        json!({ "role": "staff", "periodType": "anual", "year": 2024, "classGroupId": "adulto" }),
    );
    assert_eq!(adulto["classGroupId"], "adulto");
    assert_eq!(adulto["periods"].as_array().map(|p| p.len()), Some(1));
    assert_eq!(adulto["totals"]["totalOffering"], "100.00");
    assert_eq!(adulto["totals"]["uniqueSessionCount"], 1);

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.periodReport",
        json!({ "role": "staff", "periodType": "yearly", "year": 2024, "classGroupId": "todas" }),
    );
    assert!(all["classGroupId"].is_null());
    assert_eq!(all["totals"]["totalOffering"], "165.50");

    let monthly = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.periodReport",
        json!({ "role": "staff", "periodType": "monthly", "year": 2024, "classGroupId": "all" }),
    );
    let periods = monthly["periods"].as_array().expect("periods");
    assert_eq!(periods.len(), 12);
    assert_eq!(periods[0]["stats"]["totalOffering"], "100.00");
    assert_eq!(periods[4]["stats"]["totalOffering"], "65.50");
    assert_eq!(periods[1]["period"]["end"], "2024-02-29");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn report_rejections() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader);

    let cases = vec![
        (json!({ "periodType": "yearly", "year": 2024 }), "unauthorized"),
        (json!({ "role": "aluno", "periodType": "yearly", "year": 2024 }), "unauthorized"),
        (json!({ "role": "staff", "periodType": "weekly", "year": 2024 }), "invalid_period_type"),
        (json!({ "role": "staff", "year": 2024 }), "bad_params"),
        (json!({ "role": "staff", "periodType": "yearly", "year": 1999 }), "bad_params"),
        (json!({ "role": "staff", "periodType": "yearly", "year": 2101 }), "bad_params"),
        (
            json!({
                "role": "staff",
                "periodType": "yearly",
                "year": 2024,
                "classGroupId": "senior"
            }),
            "invalid_class_group",
        ),
    ];
    for (i, (params, code)) in cases.into_iter().enumerate() {
        let id = format!("err-{}", i);
        let resp = request(&mut stdin, &mut reader, &id, "reports.periodReport", params);
        assert_eq!(error_code(&resp), code, "case {}", i);
    }

    let partition = request_ok(
        &mut stdin,
        &mut reader,
        "p",
        "periods.partition",
        json!({ "periodType": "quarterly", "year": 2023 }),
    );
    let ends: Vec<&str> = partition["periods"]
        .as_array()
        .expect("periods")
        .iter()
        .filter_map(|p| p["end"].as_str())
        .collect();
    assert_eq!(ends, vec!["2023-03-31", "2023-06-30", "2023-09-30", "2023-12-31"]);

    drop(stdin);
    let _ = child.wait();
}
