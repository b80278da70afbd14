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
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("TIMETABLED_WORKSPACE")
        .spawn()
        .expect("spawn timetabled");
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

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn open_workspace(prefix: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (child, stdin, reader)
}

fn add_lecture(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    day: usize,
    slot: usize,
    subject: &str,
) {
    let _ = request_ok(
        stdin,
        reader,
        "lec-open",
        "schedule.activate",
        json!({ "day": day, "slot": slot }),
    );
    let _ = request_ok(stdin, reader, "lec-kind", "schedule.submit", json!({ "kind": "lecture" }));
    let done = request_ok(
        stdin,
        reader,
        "lec-details",
        "schedule.submit",
        json!({ "subject": subject, "faculty": "Dr. Rao", "room": "101" }),
    );
    assert_eq!(done["status"], "committed");
}

#[test]
fn lunch_activation_and_lecture_wizard() {
    let (mut child, mut stdin, mut reader) = open_workspace("timetabled-schedule-lecture");
    let empty = request_ok(&mut stdin, &mut reader, "0", "schedule.get", json!({}));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.activate",
        json!({ "day": "Monday", "slot": "12:00 PM" }),
    );
    assert_eq!(e["code"], "lunch_break");
    let wizard = request_ok(&mut stdin, &mut reader, "2", "schedule.wizard", json!({}));
    assert_eq!(wizard["open"], false);
    let after = request_ok(&mut stdin, &mut reader, "3", "schedule.get", json!({}));
    assert_eq!(after, empty);
    assert_eq!(after["rows"][3]["isLunch"], true);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.activate",
        json!({ "day": "tuesday", "slot": 0 }),
    );
    assert_eq!(opened["step"], "kind");
    assert_eq!(opened["dayLabel"], "Tuesday");

    let next = request_ok(&mut stdin, &mut reader, "5", "schedule.submit", json!({ "kind": "lecture" }));
    assert_eq!(next["step"], "lectureDetails");

    // A blank field keeps the wizard on the same step.
    let e = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.submit",
        json!({ "subject": "  ", "faculty": "Dr. Rao", "room": "101" }),
    );
    assert_eq!(e["code"], "validation_error");
    let wizard = request_ok(&mut stdin, &mut reader, "7", "schedule.wizard", json!({}));
    assert_eq!(wizard["step"], "lectureDetails");

    let done = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.submit",
        json!({ "subject": "Mathematics", "faculty": "Dr. Rao", "room": "101" }),
    );
    assert_eq!(done["status"], "committed");
    let cell = &done["cells"][0];
    assert_eq!(cell["kind"], "lecture");
    assert_eq!(cell["day"], 1);
    assert_eq!(cell["slot"], 0);
    assert_eq!(cell["time"], "9:00 AM");
    let color = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.colorFor",
        json!({ "subject": "Mathematics", "kind": "lecture" }),
    );
    assert_eq!(cell["color"], color["color"]);

    let wizard = request_ok(&mut stdin, &mut reader, "10", "schedule.wizard", json!({}));
    assert_eq!(wizard["open"], false);
    let e = request_err(&mut stdin, &mut reader, "11", "schedule.submit", json!({ "kind": "lecture" }));
    assert_eq!(e["code"], "wrong_step");

    let grid = request_ok(&mut stdin, &mut reader, "12", "schedule.get", json!({ "view": "grid" }));
    assert_eq!(grid["rows"][0]["cells"][1]["subject"], "Mathematics");
    assert!(grid["rows"][0]["cells"][0].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn split_practical_fills_both_halves() {
    let (mut child, mut stdin, mut reader) = open_workspace("timetabled-schedule-practical");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.activate",
        json!({ "day": 0, "slot": 1 }),
    );
    let next = request_ok(&mut stdin, &mut reader, "2", "schedule.submit", json!({ "kind": "practical" }));
    assert_eq!(next["step"], "practicalStart");

    // 2 and 4 sit next to lunch at 3.
    for (id, start) in [("3a", 2), ("3b", 4)] {
        let e = request_err(&mut stdin, &mut reader, id, "schedule.submit", json!({ "start": start }));
        assert_eq!(e["code"], "validation_error");
    }

    // Omitted start defaults to the activated slot.
    let next = request_ok(&mut stdin, &mut reader, "4", "schedule.submit", json!({}));
    assert_eq!(next["step"], "practicalSplit");
    assert_eq!(next["wizard"]["start"], 1);

    let next = request_ok(&mut stdin, &mut reader, "5", "schedule.submit", json!({ "split": true }));
    assert_eq!(next["wizard"]["group"], "B1");
    for (id, subject, group) in [("6", "DBMS Lab", "B2"), ("7", "OS Lab", "B3")] {
        let next = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "schedule.submit",
            json!({ "subject": subject, "faculty": "Prof. Iyer", "room": "Lab 1" }),
        );
        assert_eq!(next["status"], "next");
        assert_eq!(next["wizard"]["group"], group);
    }
    let done = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.submit",
        json!({ "subject": "CN Lab", "faculty": "Prof. Iyer", "room": "Lab 2" }),
    );
    assert_eq!(done["status"], "committed");
    let cells = done["cells"].as_array().expect("cells");
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0]["half"], "first");
    assert_eq!(cells[1]["half"], "second");
    assert_eq!(cells[0]["groups"], cells[1]["groups"]);
    assert_eq!(cells[0]["groups"]["mode"], "split");
    let batches = cells[0]["groups"]["batches"].as_array().expect("batches");
    let groups: Vec<_> = batches.iter().map(|b| b["group"].as_str().unwrap_or("")).collect();
    assert_eq!(groups, vec!["B1", "B2", "B3"]);
    assert_eq!(batches[2]["room"], "Lab 2");

    let list = request_ok(&mut stdin, &mut reader, "9", "schedule.get", json!({ "view": "list" }));
    let monday = list["days"][0]["entries"].as_array().expect("entries");
    assert_eq!(monday.len(), 2);
    assert_eq!(monday[0]["slot"], 1);
    assert_eq!(monday[1]["slot"], 2);

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "schedule.clear",
        json!({ "day": 0, "slot": 2 }),
    );
    assert_eq!(cleared["removed"], json!([{ "day": 0, "slot": 1 }, { "day": 0, "slot": 2 }]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn occupied_cells_reject_practicals_without_changes() {
    let (mut child, mut stdin, mut reader) = open_workspace("timetabled-schedule-conflict");
    add_lecture(&mut stdin, &mut reader, 2, 6, "English");
    let before = request_ok(&mut stdin, &mut reader, "1", "schedule.get", json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.activate",
        json!({ "day": 2, "slot": 5 }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "3", "schedule.submit", json!({ "kind": "practical" }));
    let e = request_err(&mut stdin, &mut reader, "4", "schedule.submit", json!({ "start": 5 }));
    assert_eq!(e["code"], "conflict");
    assert_eq!(e["details"]["cells"], json!([{ "day": 2, "slot": 6 }]));

    // Conflict closes the wizard.
    let wizard = request_ok(&mut stdin, &mut reader, "5", "schedule.wizard", json!({}));
    assert_eq!(wizard["open"], false);
    let after = request_ok(&mut stdin, &mut reader, "6", "schedule.get", json!({}));
    assert_eq!(after, before);

    // A lecture may replace a lecture.
    add_lecture(&mut stdin, &mut reader, 2, 6, "History");
    let grid = request_ok(&mut stdin, &mut reader, "7", "schedule.get", json!({}));
    assert_eq!(grid["rows"][6]["cells"][2]["subject"], "History");

    let _ = request_ok(&mut stdin, &mut reader, "8", "schedule.activate", json!({ "day": 2, "slot": 0 }));
    let cancelled = request_ok(&mut stdin, &mut reader, "9", "schedule.cancel", json!({}));
    assert_eq!(cancelled["cancelled"], true);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn layout_changes_require_an_empty_grid() {
    let (mut child, mut stdin, mut reader) = open_workspace("timetabled-schedule-layout");
    add_lecture(&mut stdin, &mut reader, 0, 0, "Physics");

    let patch = json!({
        "section": "schedule",
        "patch": {
            "days": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
            "slots": ["8:00", "9:00", "10:00", "11:00", "12:00"],
            "lunchSlot": 2
        }
    });
    let e = request_err(&mut stdin, &mut reader, "1", "setup.update", patch.clone());
    assert_eq!(e["code"], "conflict");

    let _ = request_ok(&mut stdin, &mut reader, "2", "schedule.clear", json!({ "day": 0, "slot": 0 }));
    let updated = request_ok(&mut stdin, &mut reader, "3", "setup.update", patch);
    assert_eq!(updated["lunchSlot"], 2);

    let grid = request_ok(&mut stdin, &mut reader, "4", "schedule.get", json!({}));
    assert_eq!(grid["days"].as_array().map(|d| d.len()), Some(6));
    assert_eq!(grid["rows"].as_array().map(|r| r.len()), Some(5));
    assert_eq!(grid["rows"][2]["isLunch"], true);

    let bad = json!({ "section": "schedule", "patch": { "lunchSlot": 9 } });
    let e = request_err(&mut stdin, &mut reader, "5", "setup.update", bad);
    assert_eq!(e["code"], "validation_error");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn out_of_range_practical_start_keeps_the_wizard_open() {
    let (mut child, mut stdin, mut reader) = open_workspace("timetabled-schedule-huge-start");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.activate",
        json!({ "day": 0, "slot": 0 }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "2", "schedule.submit", json!({ "kind": "practical" }));
    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.submit",
        json!({ "start": u64::MAX }),
    );
    assert_eq!(e["code"], "validation_error");

    let wizard = request_ok(&mut stdin, &mut reader, "4", "schedule.wizard", json!({}));
    assert_eq!(wizard["open"], true);
    assert_eq!(wizard["step"], "practicalStart");
    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health.is_object());

    let next = request_ok(&mut stdin, &mut reader, "6", "schedule.submit", json!({ "start": 0 }));
    assert_eq!(next["step"], "practicalSplit");

    drop(stdin);
    let _ = child.wait();
}
