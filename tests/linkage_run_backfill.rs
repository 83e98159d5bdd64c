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
    let exe = env!("CARGO_BIN_EXE_autodocsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn autodocsd");
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

const TRIGGER: &str = "JÁ CADASTREI MEUS DADOS PESSOAIS, QUERO CADASTRAR OUTRO VEÍCULO";

fn import_pf(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let _ = request_ok(
        stdin,
        reader,
        "import-pf",
        "sheets.import",
        json!({
            "kind": "PF",
            "header": [
                "Status",
                "CADASTRO",
                "CPF (somente número)",
                "CPF - (SOMENTE NÚMERO)",
                "NOME COMPLETO",
                "PLACA",
                "CEP"
            ],
            "rows": [
                ["", "NOVO", "01234567890", "", "ANA SOUZA", "ABC-1234", "01001000"],
                [TRIGGER, TRIGGER, "", "01234567890", "", "XYZ-9876", ""],
                ["", TRIGGER, "", "99999999999", "", "", ""],
                ["", TRIGGER, "", "", "", "", ""]
            ]
        }),
    );
}

fn import_pj(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let _ = request_ok(
        stdin,
        reader,
        "import-pj",
        "sheets.import",
        json!({
            "kind": "PJ",
            "header": [
                "Carimbo de data/hora",
                "Status",
                "CADASTRO",
                "CNPJ (somente número)",
                "CNPJ - (SOMENTE NÚMERO)",
                "RAZÃO SOCIAL"
            ],
            "rows": [
                ["2024-01-01 10:00", "", "NOVO", "12345678000190", "", "ACME LTDA"],
                ["2024-02-01 10:00", "", TRIGGER, "", "12345678000190", ""]
            ]
        }),
    );
}

fn sheet_for<'a>(result: &'a serde_json::Value, kind: &str) -> &'a serde_json::Value {
    result["sheets"]
        .as_array()
        .expect("sheets")
        .iter()
        .find(|s| s["kind"] == kind)
        .expect("sheet summary")
}

#[test]
fn run_backfills_continuation_rows_and_persists_one_batch_per_sheet() {
    let workspace = temp_dir("autodocs-backfill");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    import_pf(&mut stdin, &mut reader);
    import_pj(&mut stdin, &mut reader);

    let run = request_ok(&mut stdin, &mut reader, "2", "linkage.run", json!({}));
    assert!(run["runId"].as_str().is_some_and(|s| !s.is_empty()));

    let pf = sheet_for(&run, "PF");
    assert_eq!(pf["rows"], 4);
    assert_eq!(pf["sources"], 1);
    assert_eq!(pf["targets"], 2);
    assert_eq!(pf["filledRows"], 2);
    assert_eq!(pf["unmatched"], 1);
    assert_eq!(pf["configError"], serde_json::Value::Null);
    assert_eq!(pf["mergedOk"], true);
    assert_eq!(pf["remoteOk"], true);
    assert_eq!(pf["write"]["status"], "sent");
    assert_eq!(pf["write"]["cells"], 4);
    let warnings = pf["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["rowNumber"], 5);

    let pj = sheet_for(&run, "PJ");
    assert_eq!(pj["write"]["status"], "sent");
    assert_eq!(pj["write"]["cells"], 2);

    let pf_sheet = request_ok(&mut stdin, &mut reader, "3", "sheets.get", json!({ "kind": "PF" }));
    let rows = pf_sheet["rows"].as_array().expect("rows");
    assert_eq!(
        rows[1],
        json!([TRIGGER, TRIGGER, "01234567890", "01234567890", "ANA SOUZA", "XYZ-9876", "01001000"])
    );
    assert_eq!(rows[2][2], "99999999999");
    assert_eq!(rows[2][4], "");
    assert_eq!(rows[3][2], "");

    let pj_sheet = request_ok(&mut stdin, &mut reader, "4", "sheets.get", json!({ "kind": "PJ" }));
    let rows = pj_sheet["rows"].as_array().expect("rows");
    assert_eq!(rows[1][0], "2024-02-01 10:00");
    assert_eq!(rows[1][3], "12345678000190");
    assert_eq!(rows[1][5], "ACME LTDA");

    let again = request_ok(&mut stdin, &mut reader, "5", "linkage.run", json!({}));
    assert_eq!(sheet_for(&again, "PF")["write"]["status"], "nothing_to_send");
    assert_eq!(sheet_for(&again, "PJ")["write"]["status"], "nothing_to_send");

    let runs = request_ok(&mut stdin, &mut reader, "6", "runs.list", json!({}));
    let runs = runs["runs"].as_array().expect("runs");
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().any(|r| r["writeStatus"] == "sent" && r["writes"] == 4));
    assert_eq!(
        runs.iter().filter(|r| r["writeStatus"] == "nothing_to_send").count(),
        2
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn preview_reports_planned_writes_without_touching_the_sheet() {
    let workspace = temp_dir("autodocs-preview");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    import_pf(&mut stdin, &mut reader);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "linkage.preview",
        json!({ "kind": "PF" }),
    );
    let sheet = &preview["sheets"][0];
    assert_eq!(
        sheet["writes"],
        json!([
            { "cell": "C3", "value": "01234567890" },
            { "cell": "E3", "value": "ANA SOUZA" },
            { "cell": "G3", "value": "01001000" },
            { "cell": "C4", "value": "99999999999" }
        ])
    );

    let pf_sheet = request_ok(&mut stdin, &mut reader, "3", "sheets.get", json!({ "kind": "PF" }));
    assert_eq!(pf_sheet["rows"][1][4], "");

    let runs = request_ok(&mut stdin, &mut reader, "4", "runs.list", json!({}));
    assert_eq!(runs["runs"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
