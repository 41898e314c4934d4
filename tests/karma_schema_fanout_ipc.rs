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
    let exe = env!("CARGO_BIN_EXE_classkitd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classkitd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_raw(
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
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

struct Fixture {
    group_id: String,
    alice_id: String,
}

/// Group "Test Group" with Alice and Bob and one positive numeric column
/// "homework", scored 15 for Alice.
fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, title: &str) -> Fixture {
    let created = request_ok(
        stdin,
        reader,
        "seed-1",
        "groups.create",
        json!({ "ownerId": "teacher-1", "title": title, "membersText": "Alice, Bob" }),
    );
    let group_id = created["group"]["id"].as_str().expect("group id").to_string();

    let _ = request_ok(
        stdin,
        reader,
        "seed-2",
        "karma.fields.add",
        json!({
            "ownerId": "teacher-1",
            "groupId": group_id,
            "name": "homework",
            "type": "number",
            "sign": "positive"
        }),
    );

    let listed = request_ok(
        stdin,
        reader,
        "seed-3",
        "groups.members",
        json!({ "ownerId": "teacher-1", "groupId": group_id }),
    );
    let rows = listed["members"].as_array().expect("members");
    let find = |name: &str| {
        rows.iter()
            .find(|m| m["name"] == json!(name))
            .and_then(|m| m["id"].as_str())
            .unwrap_or_else(|| panic!("member {name}"))
            .to_string()
    };
    let alice_id = find("Alice");

    let _ = request_ok(
        stdin,
        reader,
        "seed-4",
        "karma.scores.save",
        json!({
            "ownerId": "teacher-1",
            "groupId": group_id,
            "sign": "positive",
            "entries": { format!("{}_positive_homework", alice_id): "15" }
        }),
    );

    Fixture { group_id, alice_id }
}

fn members_of(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    group_id: &str,
) -> Vec<serde_json::Value> {
    let listed = request_ok(
        stdin,
        reader,
        id,
        "groups.members",
        json!({ "ownerId": "teacher-1", "groupId": group_id }),
    );
    listed["members"].as_array().expect("members").clone()
}

#[test]
fn add_field_fans_out_defaults_to_every_member() {
    let workspace = temp_dir("classkit-fields-add");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader, "Fanout Add");

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "karma.fields.add",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "notes",
            "type": "text",
            "sign": "negative"
        }),
    );
    assert_eq!(added["membersUpdated"], json!(2));

    for m in members_of(&mut stdin, &mut reader, "3", &fx.group_id) {
        assert_eq!(m["negativeData"]["notes"], json!(""));
    }

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn duplicate_add_fails_and_leaves_member_data_alone() {
    let workspace = temp_dir("classkit-fields-dup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader, "Fanout Duplicate");

    let dup = request_raw(
        &mut stdin,
        &mut reader,
        "2",
        "karma.fields.add",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "homework",
            "type": "number",
            "sign": "positive"
        }),
    );
    assert_eq!(error_code(&dup), "duplicate_field");

    // Same name on the other sign is fine.
    let other_sign = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "karma.fields.add",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "homework",
            "type": "number",
            "sign": "negative"
        }),
    );
    assert_eq!(other_sign["membersUpdated"], json!(2));

    for m in members_of(&mut stdin, &mut reader, "4", &fx.group_id) {
        let expected = if m["id"] == json!(fx.alice_id.as_str()) { 15 } else { 0 };
        assert_eq!(m["positiveData"]["homework"], json!(expected));
        assert_eq!(m["negativeData"]["homework"], json!(0));
    }

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rename_preserves_values_exactly() {
    let workspace = temp_dir("classkit-fields-rename");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader, "Fanout Rename");

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "karma.fields.rename",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "oldName": "homework",
            "newName": "assignments",
            "sign": "positive"
        }),
    );
    assert_eq!(renamed["field"]["name"], json!("assignments"));
    assert_eq!(renamed["membersRenamed"], json!(2));

    for m in members_of(&mut stdin, &mut reader, "3", &fx.group_id) {
        let expected = if m["id"] == json!(fx.alice_id.as_str()) { 15 } else { 0 };
        assert_eq!(m["positiveData"]["assignments"], json!(expected));
        assert!(m["positiveData"].get("homework").is_none());
    }

    // Totals survive the rename untouched.
    let totals = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "karma.totals",
        json!({ "ownerId": "teacher-1", "groupId": fx.group_id }),
    );
    assert_eq!(totals["totalPositive"], json!(15));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rename_rejects_missing_source_and_taken_target() {
    let workspace = temp_dir("classkit-fields-rename-err");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader, "Fanout Rename Errors");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "karma.fields.add",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "effort",
            "type": "number",
            "sign": "positive"
        }),
    );

    let missing = request_raw(
        &mut stdin,
        &mut reader,
        "3",
        "karma.fields.rename",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "oldName": "attendance",
            "newName": "presence",
            "sign": "positive"
        }),
    );
    assert_eq!(error_code(&missing), "field_not_found");

    let clash = request_raw(
        &mut stdin,
        &mut reader,
        "4",
        "karma.fields.rename",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "oldName": "homework",
            "newName": "effort",
            "sign": "positive"
        }),
    );
    assert_eq!(error_code(&clash), "duplicate_field");

    // Renaming onto itself succeeds without touching member rows.
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "karma.fields.rename",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "oldName": "homework",
            "newName": "homework",
            "sign": "positive"
        }),
    );
    assert_eq!(noop["membersRenamed"], json!(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn remove_drops_the_key_everywhere_and_the_definition() {
    let workspace = temp_dir("classkit-fields-remove");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let fx = seed(&mut stdin, &mut reader, "Fanout Remove");

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "karma.fields.remove",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "homework",
            "sign": "positive"
        }),
    );
    assert_eq!(removed["membersUpdated"], json!(2));

    for m in members_of(&mut stdin, &mut reader, "3", &fx.group_id) {
        assert!(m["positiveData"].get("homework").is_none());
        assert_eq!(m["positiveTotal"], json!(0));
    }
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "karma.open",
        json!({ "ownerId": "teacher-1", "groupId": fx.group_id }),
    );
    assert_eq!(opened["positiveFields"], json!([]));

    // The definition is gone, so a second remove is field_not_found.
    let again = request_raw(
        &mut stdin,
        &mut reader,
        "5",
        "karma.fields.remove",
        json!({
            "ownerId": "teacher-1",
            "groupId": fx.group_id,
            "name": "homework",
            "sign": "positive"
        }),
    );
    assert_eq!(error_code(&again), "field_not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
