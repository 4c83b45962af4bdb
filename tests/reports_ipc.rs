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
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
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
    assert_eq!(value["ok"], json!(true), "{} failed: {}", method, value);
    value["result"].clone()
}

fn upload(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    category: &str,
    period: &str,
    semester: &str,
    rows: &[(&str, &str, f64, &str)],
) {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|(roll, code, credits, grade)| {
            json!({
                "RollNumber": roll,
                "StudentName": format!("Student {}", &roll[roll.len() - 2..]),
                "SubjectCode": code,
                "SubjectName": format!("Subject {}", code),
                "Credits": credits,
                "Grade": grade
            })
        })
        .collect();
    let result = request_ok(
        stdin,
        reader,
        id,
        "results.ingest",
        json!({
            "rows": rows,
            "metadata": {
                "examCategory": category,
                "academicPeriod": period,
                "semester": semester,
                "branch": "CSE",
                "batch": "2023-2027"
            }
        }),
    );
    assert_eq!(result["errors"], json!([]), "upload {} had errors", id);
}

fn rolls(rows: &serde_json::Value) -> Vec<String> {
    rows.as_array()
        .expect("rows")
        .iter()
        .map(|r| r["student"]["rollNumber"].as_str().unwrap_or("").to_string())
        .collect()
}

#[test]
fn reports_follow_latest_attempts() {
    let workspace = temp_dir("resultsd-reports-ipc");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    upload(
        &mut stdin,
        &mut reader,
        "u1",
        "REGULAR",
        "Nov 2023",
        "I",
        &[
            ("23JK1A0501", "MA101", 2.0, "O"),
            ("23JK1A0501", "PH101", 2.0, "A"),
            ("23JK1A0502", "MA101", 2.0, "A"),
            ("23JK1A0502", "PH101", 2.0, "O"),
            ("23JK1A0503", "MA101", 2.0, "A"),
            ("23JK1A0503", "PH101", 2.0, "A"),
            ("23JK1A0504", "MA101", 2.0, "F"),
            ("23JK1A0504", "PH101", 2.0, "O"),
            ("23JK1A0505", "MA101", 2.0, "F"),
            ("23JK1A0505", "PH101", 2.0, "ABSENT"),
        ],
    );
    upload(
        &mut stdin,
        &mut reader,
        "u2",
        "SUPPLY",
        "Feb 2024",
        "I",
        &[("23JK1A0504", "MA101", 2.0, "O"), ("23JK1A0505", "MA101", 2.0, "F")],
    );

    let backlogs = request_ok(
        &mut stdin,
        &mut reader,
        "b",
        "reports.backlogs",
        json!({ "filters": { "branch": "CSE", "batch": "2023-2027" } }),
    );
    assert_eq!(rolls(&backlogs["rows"]), vec!["23JK1A0505"]);
    assert_eq!(backlogs["rows"][0]["backlogCount"], json!(2));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "s",
        "reports.cumulativeSummary",
        json!({ "year": "1st" }),
    );
    assert_eq!(summary["summary"][0]["semester"], json!("I"));
    assert_eq!(summary["summary"][0]["registered"], json!(5));
    assert_eq!(summary["summary"][0]["passed"], json!(4));
    assert_eq!(summary["summary"][0]["failed"], json!(1));
    assert_eq!(summary["failed"][0]["rollNumber"], json!("23JK1A0505"));

    let toppers = request_ok(
        &mut stdin,
        &mut reader,
        "t",
        "reports.toppers",
        json!({ "type": "Semester", "semester": "I" }),
    );
    let ranked = toppers["rows"].as_array().expect("rows");
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0]["gpa"], json!(9.5));
    assert_eq!(ranked[0]["rank"], json!(1));
    assert_eq!(ranked[1]["rank"], json!(1));
    assert_eq!(ranked[2]["gpa"], json!(9.0));
    assert_eq!(ranked[2]["rank"], json!(3));
    assert!(!rolls(&toppers["rows"]).contains(&"23JK1A0504".to_string()));

    let year_toppers = request_ok(
        &mut stdin,
        &mut reader,
        "ty",
        "reports.toppers",
        json!({ "type": "Year", "year": "1st" }),
    );
    assert_eq!(year_toppers["rows"], json!([]));

    let bad_scope = request(
        &mut stdin,
        &mut reader,
        "tb",
        "reports.toppers",
        json!({ "type": "Decade" }),
    );
    assert_eq!(bad_scope["error"]["code"], json!("bad_params"));

    let cumulative = request_ok(
        &mut stdin,
        &mut reader,
        "c",
        "reports.cumulativeBacklogs",
        json!({ "filters": { "batch": "2023-2027" } }),
    );
    let entries = cumulative["rows"].as_array().expect("rows");
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[4]["totalBacklogs"], json!(2));
    assert_eq!(entries[4]["cgpa"], json!(0.0));

    let analytics = request_ok(&mut stdin, &mut reader, "a", "reports.analytics", json!({}));
    assert_eq!(analytics["passPercentage"], json!(80.0));
    assert_eq!(analytics["totalStudents"], json!(5));
    assert_eq!(analytics["branchWiseBacklogs"][0]["name"], json!("CSE"));
    assert_eq!(analytics["branchWiseBacklogs"][0]["value"], json!(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bundle_roundtrip_restores_results() {
    let workspace = temp_dir("resultsd-bundle-src");
    let restored = temp_dir("resultsd-bundle-dst");
    let bundle = workspace.join("backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    upload(
        &mut stdin,
        &mut reader,
        "u1",
        "REGULAR",
        "Nov 2023",
        "I",
        &[("23JK1A0501", "MA101", 3.0, "F")],
    );
    let export = request_ok(
        &mut stdin,
        &mut reader,
        "e",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], json!("resultsd-workspace-v1"));

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "i",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": restored.to_string_lossy() }),
    );
    assert_eq!(import["checksumVerified"], json!(true));

    let backlogs = request_ok(&mut stdin, &mut reader, "b", "reports.backlogs", json!({}));
    assert_eq!(rolls(&backlogs["rows"]), vec!["23JK1A0501"]);

    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(
        health["workspacePath"],
        json!(restored.to_string_lossy().to_string())
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(restored);
}
