//! Episode-level tests: drive `SpreadsheetEnv` through reset/step/close the
//! way a remote caller would and check the observable contract.

use std::fs;

use serde_json::json;
use sheetenv::core::types::{CellValue, ObservationData};
use sheetenv::episode::{Phase, SpreadsheetEnv};
use sheetenv::registry::CommandRegistry;
use sheetenv::test_support::{
    ScriptedConnector, action, fast_config, ready_env, write_base_document,
};

#[test]
fn unknown_commands_fail_and_still_count_as_steps() {
    let mut env = ready_env();
    for name in ["sort_range", "create_chart", "", "SET_CELL"] {
        let before = env.state().step_count;
        let obs = env.step(&action(name, json!({})));
        assert!(!obs.success, "{name:?} should fail");
        assert!(
            obs.error_message
                .as_deref()
                .is_some_and(|msg| msg.contains(name)),
            "{name:?} should be named in the error"
        );
        assert_eq!(env.state().step_count, before + 1);
    }
}

#[test]
fn omitting_any_required_parameter_fails_without_panicking() {
    let registry = CommandRegistry::standard();
    let mut env = ready_env();
    for spec in registry.specs() {
        for missing in spec.required {
            let mut params = serde_json::Map::new();
            for name in spec.required.iter().filter(|name| *name != missing) {
                params.insert((*name).to_string(), json!("A1"));
            }
            let obs = env.step(&action(spec.name, serde_json::Value::Object(params)));
            assert!(!obs.success, "{} without {missing}", spec.name);
            assert!(obs.error_message.is_some());
            assert_eq!(obs.reward, Some(-0.1));
        }
    }
}

#[test]
fn get_cell_returns_what_set_cell_wrote() {
    let mut env = ready_env();
    env.step(&action("set_cell", json!({"cell": "A1", "value": "hello"})));
    env.step(&action("set_cell", json!({"cell": "B1", "value": 42})));

    let text = env.step(&action("get_cell", json!({"cell": "A1"})));
    assert_eq!(text.data, Some(ObservationData::Scalar(CellValue::Text("hello".into()))));

    let number = env.step(&action("get_cell", json!({"cell": "B1"})));
    assert_eq!(number.data, Some(ObservationData::Scalar(CellValue::Number(42.0))));
}

#[test]
fn set_range_then_get_range_preserves_numbers() {
    let mut env = ready_env();
    let values = json!([["Name", "Age", "City"], ["Alice", 25, "NY"]]);
    let set = env.step(&action("set_range", json!({"range": "A1:C2", "values": values})));
    assert!(set.success, "{:?}", set.error_message);

    let got = env.step(&action("get_range", json!({"range": "A1:C2"})));
    let data = serde_json::to_value(got.data.expect("grid")).expect("serialize");
    assert_eq!(data, json!([["Name", "Age", "City"], ["Alice", 25.0, "NY"]]));
}

#[test]
fn get_formula_returns_the_literal_formula() {
    let mut env = ready_env();
    env.step(&action("set_range", json!({"range": "B1:B2", "values": [[1], [2]]})));
    env.step(&action("set_formula", json!({"cell": "D1", "formula": "=B1+B2"})));

    let formula = env.step(&action("get_formula", json!({"cell": "D1"})));
    assert_eq!(formula.data, Some(ObservationData::Scalar(CellValue::Text("=B1+B2".into()))));

    let value = env.step(&action("get_cell", json!({"cell": "D1"})));
    assert_eq!(value.data, Some(ObservationData::Scalar(CellValue::Number(3.0))));
}

#[test]
fn added_sheets_get_unique_names_and_deleting_current_moves_to_first() {
    let mut env = ready_env();
    let first = env.step(&action("add_sheet", json!({})));
    let second = env.step(&action("add_sheet", json!({})));
    let names = second.sheet_names.clone().expect("names");
    assert_eq!(names, vec!["Sheet1", "Sheet2", "Sheet3"]);
    assert!(first.success && second.success);

    let deleted = env.step(&action("delete_sheet", json!({"name": "Sheet1"})));
    assert!(deleted.success);
    assert_eq!(deleted.current_sheet.as_deref(), Some("Sheet2"));

    let next = env.step(&action("create_sheet", json!({})));
    assert_eq!(next.current_sheet.as_deref(), Some("Sheet2"));
}

#[test]
fn step_count_tracks_every_step_until_reset() {
    let mut env = ready_env();
    for n in 1..=7u64 {
        let command = if n % 2 == 0 { "get_cell" } else { "no_such_command" };
        let obs = env.step(&action(command, json!({"cell": "A1"})));
        assert_eq!(obs.metadata["step"], json!(n));
        assert_eq!(env.state().step_count, n);
    }
    env.reset();
    assert_eq!(env.state().step_count, 0);
}

#[test]
fn every_reset_issues_a_fresh_episode_id() {
    let mut env = SpreadsheetEnv::in_memory(fast_config());
    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let obs = env.reset();
        let id = obs.metadata["episode_id"].as_str().expect("id").to_string();
        assert_eq!(id, env.state().episode_id);
        assert!(seen.insert(id), "episode ids must not repeat");
    }
    assert_eq!(env.state().resets, 5);
}

#[test]
fn close_twice_succeeds_both_times() {
    let mut env = ready_env();
    let first = env.close();
    let second = env.close();
    assert!(first.success);
    assert!(second.success);
    assert_eq!(env.phase(), Phase::Closed);

    let never_reset = SpreadsheetEnv::in_memory(fast_config()).close();
    assert!(never_reset.success);
}

#[test]
fn reset_retries_transient_connection_failures() {
    let connector = ScriptedConnector::failing(3);
    let attempts = connector.attempt_counter();
    let mut env = SpreadsheetEnv::new(Box::new(connector), fast_config());

    let obs = env.reset();
    assert!(obs.success, "{:?}", obs.error_message);
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
}

#[test]
fn reset_reports_failure_when_the_engine_never_answers() {
    let mut cfg = fast_config();
    cfg.connect.attempts = 2;
    let connector = ScriptedConnector::failing(5);
    let attempts = connector.attempt_counter();
    let mut env = SpreadsheetEnv::new(Box::new(connector), cfg);

    let obs = env.reset();
    assert!(!obs.success);
    assert_eq!(obs.result, "Failed to initialize spreadsheet engine");
    assert_eq!(obs.reward, Some(0.0));
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(env.phase(), Phase::Uninitialized);
    assert!(!env.step(&action("create_sheet", json!({}))).success);
}

#[test]
fn non_retryable_connect_errors_stop_immediately() {
    let connector = ScriptedConnector::broken();
    let attempts = connector.attempt_counter();
    let mut env = SpreadsheetEnv::new(Box::new(connector), fast_config());

    assert!(!env.reset().success);
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn failing_teardown_does_not_fail_close_or_reset() {
    let connector = ScriptedConnector::failing(0).with_faulty_teardown();
    let terminated = connector.terminated_flag();
    let mut env = SpreadsheetEnv::new(Box::new(connector), fast_config());

    assert!(env.reset().success);
    assert!(env.reset().success, "reset tears down the previous connection");
    assert!(terminated.load(std::sync::atomic::Ordering::SeqCst));
    assert!(env.close().success);
}

#[test]
fn reset_loads_the_base_document_when_configured() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = temp.path().join("base.json");
    write_base_document(&base, "Inputs", "seed");

    let mut cfg = fast_config();
    cfg.base_document = Some(base);
    let mut env = SpreadsheetEnv::in_memory(cfg);

    let obs = env.reset();
    assert!(obs.success);
    assert_eq!(obs.current_sheet.as_deref(), Some("Inputs"));
    let cell = env.step(&action("get_cell", json!({"cell": "A1"})));
    assert_eq!(cell.data, Some(ObservationData::Scalar(CellValue::Text("seed".into()))));

    // Edits never leak into the next episode.
    env.step(&action("set_cell", json!({"cell": "A1", "value": "changed"})));
    env.reset();
    let cell = env.step(&action("get_cell", json!({"cell": "A1"})));
    assert_eq!(cell.data, Some(ObservationData::Scalar(CellValue::Text("seed".into()))));
}

#[test]
fn unreadable_base_document_falls_back_to_blank() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = fast_config();
    cfg.base_document = Some(temp.path().join("missing.json"));
    let mut env = SpreadsheetEnv::in_memory(cfg);

    let obs = env.reset();
    assert!(obs.success);
    assert_eq!(obs.sheet_names, Some(vec!["Sheet1".to_string()]));
}

#[test]
fn close_saves_the_final_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = temp.path().join("out").join("final.json");
    let mut cfg = fast_config();
    cfg.output_document = Some(output.clone());
    let mut env = SpreadsheetEnv::in_memory(cfg);

    env.reset();
    env.step(&action("set_cell", json!({"cell": "C3", "value": 7})));
    let obs = env.close();
    assert!(obs.success);
    assert!(obs.result.contains("saved"), "{}", obs.result);

    let mut reopened = ready_env();
    let opened = reopened.step(&action("open_file", json!({"file_path": output.display().to_string()})));
    assert!(opened.success, "{:?}", opened.error_message);
    let cell = reopened.step(&action("get_cell", json!({"cell": "C3"})));
    assert_eq!(cell.data, Some(ObservationData::Scalar(CellValue::Number(7.0))));
}

#[test]
fn reset_does_not_save_the_abandoned_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = temp.path().join("final.json");
    let mut cfg = fast_config();
    cfg.output_document = Some(output.clone());
    let mut env = SpreadsheetEnv::in_memory(cfg);

    env.reset();
    env.reset();
    assert!(!output.exists());
}

#[test]
fn export_csv_writes_the_requested_sheet() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("sheet.csv");
    let mut env = ready_env();
    env.step(&action(
        "set_range",
        json!({"range": "A1:B2", "values": [["name", "note"], ["a,b", 3]]}),
    ));

    let obs = env.step(&action("export_csv", json!({"file_path": path.display().to_string()})));
    assert!(obs.success, "{:?}", obs.error_message);
    assert_eq!(
        fs::read_to_string(&path).expect("read csv"),
        "name,note\n\"a,b\",3\n"
    );
}

#[cfg(unix)]
#[test]
fn export_pdf_reports_converter_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = fast_config();
    cfg.export.pdf_command = vec!["false".to_string()];
    let mut env = SpreadsheetEnv::in_memory(cfg);
    env.reset();

    let target = temp.path().join("report.pdf");
    let obs = env.step(&action("export_pdf", json!({"file_path": target.display().to_string()})));
    assert!(!obs.success);
    assert!(obs.result.starts_with("Error executing export_pdf"), "{}", obs.result);
    assert!(!target.exists());
}

#[cfg(unix)]
#[test]
fn export_pdf_copies_the_converter_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = fast_config();
    cfg.export.pdf_command = [
        "sh",
        "-c",
        "cp \"$0\" \"$1/$(basename \"$0\" .csv).pdf\"",
        "{input}",
        "{outdir}",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    let mut env = SpreadsheetEnv::in_memory(cfg);
    env.reset();
    env.step(&action("set_cell", json!({"cell": "A1", "value": "printed"})));

    let target = temp.path().join("nested").join("report.pdf");
    let obs = env.step(&action("export_pdf", json!({"file_path": target.display().to_string()})));
    assert!(obs.success, "{:?}", obs.error_message);
    assert_eq!(
        obs.data,
        Some(ObservationData::Map(
            [("exported_file".to_string(), json!(target.display().to_string()))]
                .into_iter()
                .collect()
        ))
    );
    assert_eq!(fs::read_to_string(&target).expect("read pdf"), "printed\n");
}

#[test]
fn formula_evaluating_to_empty_text_reads_as_zero() {
    let mut env = ready_env();
    env.step(&action("set_formula", json!({"cell": "A1", "formula": "=IF(1>0, \"\", \"x\")"})));
    env.step(&action("set_formula", json!({"cell": "A2", "formula": "=\"\""})));

    for cell in ["A1", "A2"] {
        let obs = env.step(&action("get_cell", json!({"cell": cell})));
        assert!(obs.success, "{:?}", obs.error_message);
        assert_eq!(obs.data, Some(ObservationData::Scalar(CellValue::Number(0.0))), "{cell}");
    }
}

#[test]
fn format_cell_applies_to_every_cell_and_is_saved() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("styled.json");
    let mut env = ready_env();
    env.step(&action("set_cell", json!({"cell": "A1", "value": "Title"})));

    let obs = env.step(&action(
        "format_cell",
        json!({"cell": "A1:B1", "format_options": {"bold": true, "color": "#FF0000"}}),
    ));
    assert!(obs.success, "{:?}", obs.error_message);
    assert_eq!(obs.result, "Cell A1:B1 formatted successfully");
    assert_eq!(obs.current_sheet.as_deref(), Some("Sheet1"));

    let bad = env.step(&action(
        "format_cell",
        json!({"cell": "A1", "format_options": {"color": "red"}}),
    ));
    assert!(!bad.success);

    let title = env.step(&action("get_cell", json!({"cell": "A1"})));
    assert_eq!(title.data, Some(ObservationData::Scalar(CellValue::Text("Title".into()))));

    let saved = env.step(&action("save_file", json!({"file_path": path.display().to_string()})));
    assert!(saved.success, "{:?}", saved.error_message);
    let stored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    let cells = &stored["sheets"][0]["cells"];
    assert_eq!(cells["A1"], json!({"text": "Title", "bold": true, "color": 0xFF0000}));
    assert_eq!(cells["B1"], json!({"bold": true, "color": 0xFF0000}));
}

#[test]
fn deeply_nested_formula_reads_as_an_error_without_crashing() {
    let depth = 100_000;
    let formula = format!("={}1{}", "(".repeat(depth), ")".repeat(depth));
    let mut env = ready_env();
    let set = env.step(&action("set_formula", json!({"cell": "A1", "formula": formula})));
    assert!(set.success, "{:?}", set.error_message);

    let got = env.step(&action("get_cell", json!({"cell": "A1"})));
    assert_eq!(got.data, Some(ObservationData::Scalar(CellValue::Text("#NAME?".into()))));

    env.step(&action("set_formula", json!({"cell": "B1", "formula": "=((2))*3"})));
    let next = env.step(&action("get_cell", json!({"cell": "B1"})));
    assert_eq!(next.data, Some(ObservationData::Scalar(CellValue::Number(6.0))));
}

#[test]
fn doubling_reference_chain_reads_in_linear_time() {
    let mut env = ready_env();
    env.step(&action("set_cell", json!({"cell": "A1", "value": 1})));
    for row in 2..=40 {
        let formula = format!("=A{prev}+A{prev}", prev = row - 1);
        env.step(&action("set_formula", json!({"cell": format!("A{row}"), "formula": formula})));
    }

    let started = std::time::Instant::now();
    let top = env.step(&action("get_cell", json!({"cell": "A40"})));
    assert_eq!(top.data, Some(ObservationData::Scalar(CellValue::Number(2f64.powi(39)))));
    let column = env.step(&action("get_range", json!({"range": "A1:A40"})));
    assert!(column.success, "{:?}", column.error_message);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

#[test]
fn whole_sheet_ranges_fail_as_ordinary_step_errors() {
    let mut env = ready_env();
    let read = env.step(&action("get_range", json!({"range": "A1:XFD1048576"})));
    assert!(!read.success);
    assert!(
        read.error_message
            .as_deref()
            .is_some_and(|msg| msg.contains("at most")),
        "{:?}",
        read.error_message
    );

    let format = env.step(&action(
        "format_cell",
        json!({"cell": "A1:XFD1048576", "format_options": {"bold": true}}),
    ));
    assert!(!format.success);
    assert_eq!(env.state().step_count, 2);
    assert_eq!(env.phase(), Phase::Ready);
}
