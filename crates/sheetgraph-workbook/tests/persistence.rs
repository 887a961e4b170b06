use std::fs;
use std::path::{Path, PathBuf};

use sheetgraph_workbook::{
    CellData, CompiledWorkbook, IoError, JsonAdapter, LiteralValue, SaveFormat, StoredCell,
};

/// A1:A3 = 2, 3, 4; B1 = A1*3; C1 = B1+1; D1 = A2*100; E1 = SUM(A1:A3);
/// F1 = SUM(A:A).
fn write_model(dir: &Path) -> PathBuf {
    let mut adapter = JsonAdapter::new();
    adapter.write_cell("Sheet1", 1, 1, CellData::from_value(2));
    adapter.write_cell("Sheet1", 2, 1, CellData::from_value(3));
    adapter.write_cell("Sheet1", 3, 1, CellData::from_value(4));
    adapter.write_cell("Sheet1", 1, 2, CellData::from_formula("=A1*3").with_value(6));
    adapter.write_cell("Sheet1", 1, 3, CellData::from_formula("=B1+1").with_value(7));
    adapter.write_cell("Sheet1", 1, 4, CellData::from_formula("=A2*100"));
    adapter.write_cell("Sheet1", 1, 5, CellData::from_formula("=SUM(A1:A3)"));
    adapter.write_cell("Sheet1", 1, 6, CellData::from_formula("=SUM(A:A)"));
    let path = dir.join("model.json");
    adapter.save_to_path(&path).unwrap();
    path
}

fn num(n: f64) -> LiteralValue {
    LiteralValue::Number(n)
}

fn evaluate_all(wb: &mut CompiledWorkbook) {
    for addr in ["Sheet1!C1", "Sheet1!D1", "Sheet1!E1", "Sheet1!F1"] {
        wb.evaluate(addr).unwrap();
    }
}

fn keys(wb: &CompiledWorkbook) -> Vec<String> {
    let mut keys: Vec<String> = wb.engine().addresses().map(str::to_string).collect();
    keys.sort();
    keys
}

#[test]
fn chain_scenario_through_a_json_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();

    assert_eq!(wb.evaluate("Sheet1!C1").unwrap(), num(7.0));
    wb.set_value("Sheet1!A1", 5).unwrap();
    assert_eq!(wb.evaluate("Sheet1!C1").unwrap(), num(16.0));

    wb.evaluate("Sheet1!D1").unwrap();
    let report = wb.trim(&["Sheet1!A1"], &["Sheet1!C1"]).unwrap();
    assert_eq!(keys(&wb), ["Sheet1!A1", "Sheet1!B1", "Sheet1!C1"]);
    assert!(report.removed.contains(&"Sheet1!D1".to_string()));
    assert_eq!(wb.evaluate("Sheet1!C1").unwrap(), num(16.0));
}

#[test]
fn text_save_is_a_fixed_point() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();
    evaluate_all(&mut wb);
    wb.save(dir.path().join("first.yml"), &[]).unwrap();

    let loaded = CompiledWorkbook::load(dir.path().join("first")).unwrap();
    loaded.save(dir.path().join("second.yml"), &[]).unwrap();

    let first = fs::read_to_string(dir.path().join("first.yml")).unwrap();
    let second = fs::read_to_string(dir.path().join("second.yml")).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("cell_map:"));
    assert!(first.find("excel_hash").unwrap() < first.find("cell_map").unwrap());
}

#[test]
fn loaded_graph_evaluates_without_the_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let mut wb = CompiledWorkbook::open(&model).unwrap();
    evaluate_all(&mut wb);
    wb.save(dir.path().join("model.json.out.yml"), &[]).unwrap();
    fs::remove_file(&model).unwrap();

    let mut loaded = CompiledWorkbook::load(dir.path().join("model.json.out.yml")).unwrap();
    assert!(!loaded.engine().has_source());
    assert_eq!(loaded.evaluate("Sheet1!E1").unwrap(), num(9.0));
    assert_eq!(loaded.evaluate("Sheet1!F1").unwrap(), num(9.0));
    assert_eq!(loaded.evaluate("C1").unwrap(), num(7.0));

    loaded.set_value("Sheet1!A1", 5).unwrap();
    assert_eq!(loaded.evaluate("Sheet1!C1").unwrap(), num(16.0));
    assert_eq!(loaded.evaluate("Sheet1!F1").unwrap(), num(12.0));
}

#[test]
fn cell_map_is_sorted_and_holds_formulas_or_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();
    evaluate_all(&mut wb);
    let record = wb.to_record();

    let keys: Vec<&str> = record.cell_map.0.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        keys,
        [
            "Sheet1!A:A",
            "Sheet1!A1",
            "Sheet1!A2",
            "Sheet1!A3",
            "Sheet1!B1",
            "Sheet1!C1",
            "Sheet1!D1",
            "Sheet1!E1",
            "Sheet1!F1",
        ]
    );
    assert_eq!(
        record.cell_map.get("Sheet1!A:A"),
        Some(&StoredCell::Formula("=_REF_(\"Sheet1!A1:A3\")".into()))
    );
    assert_eq!(
        record.cell_map.get("Sheet1!B1"),
        Some(&StoredCell::Formula("=A1*3".into()))
    );
    assert_eq!(
        record.cell_map.get("Sheet1!A2"),
        Some(&StoredCell::Value(Some(LiteralValue::Int(3))))
    );
}

#[test]
fn text_to_binary_keeps_the_cell_map() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();
    evaluate_all(&mut wb);
    wb.extra_data_mut()
        .insert("author".into(), serde_json::json!({"name": "model team"}));
    let stem = dir.path().join("model-out");
    wb.save(&stem, &[SaveFormat::Yaml, SaveFormat::Binary]).unwrap();
    assert!(dir.path().join("model-out.yml").is_file());
    assert!(dir.path().join("model-out.cbor").is_file());

    let from_text = CompiledWorkbook::load(dir.path().join("model-out.yml")).unwrap();
    let mut from_binary = CompiledWorkbook::load(dir.path().join("model-out.cbor")).unwrap();
    assert_eq!(from_binary.to_record(), from_text.to_record());
    assert_eq!(
        from_binary.extra_data()["author"],
        serde_json::json!({"name": "model team"})
    );
    assert_eq!(from_binary.excel_hash(), wb.excel_hash());
    assert_eq!(from_binary.evaluate("Sheet1!C1").unwrap(), num(7.0));
}

#[test]
fn binary_only_save_leaves_no_text_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();
    wb.evaluate("Sheet1!C1").unwrap();
    wb.save(dir.path().join("snap.bin"), &[]).unwrap();

    assert!(dir.path().join("snap.bin").is_file());
    assert!(!dir.path().join("snap.yml").exists());
    let mut loaded = CompiledWorkbook::load(dir.path().join("snap")).unwrap();
    assert_eq!(loaded.evaluate("Sheet1!C1").unwrap(), num(7.0));
}

#[test]
fn snapshot_is_only_rewritten_when_the_text_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut wb = CompiledWorkbook::open(write_model(dir.path())).unwrap();
    wb.evaluate("Sheet1!C1").unwrap();
    let stem = dir.path().join("out");
    let snapshot = dir.path().join("out.cbor");
    wb.save(&stem, &[SaveFormat::Json, SaveFormat::Binary]).unwrap();

    fs::write(&snapshot, b"placeholder").unwrap();
    wb.save(&stem, &[SaveFormat::Json, SaveFormat::Binary]).unwrap();
    assert_eq!(fs::read(&snapshot).unwrap(), b"placeholder");

    wb.set_value("Sheet1!A1", 10).unwrap();
    wb.save(&stem, &[SaveFormat::Json, SaveFormat::Binary]).unwrap();
    let mut loaded = CompiledWorkbook::load(&snapshot).unwrap();
    assert_eq!(loaded.evaluate("Sheet1!C1").unwrap(), num(31.0));
}

#[test]
fn stale_fingerprints_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_model(dir.path());
    let mut wb = CompiledWorkbook::open(&model).unwrap();
    wb.evaluate("Sheet1!C1").unwrap();
    assert!(wb.hash_matches());
    wb.save(dir.path().join("out.yml"), &[]).unwrap();

    let mut adapter = JsonAdapter::open_path(&model).unwrap();
    adapter.write_cell("Sheet1", 1, 1, CellData::from_value(99));
    adapter.save_to_path(&model).unwrap();

    let loaded = CompiledWorkbook::load(dir.path().join("out.yml")).unwrap();
    let stale = loaded.staleness().expect("workbook changed");
    assert_eq!(stale.stored, wb.excel_hash().unwrap());
    assert_ne!(stale.current.as_deref(), Some(stale.stored.as_str()));
    assert!(!loaded.hash_matches());
}

#[test]
fn missing_artifacts_and_formats_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        CompiledWorkbook::load(dir.path().join("nothing")),
        Err(IoError::NotFound(_))
    ));

    let wb = CompiledWorkbook::default();
    assert!(matches!(
        wb.save(dir.path().join("out.txt"), &[]),
        Err(IoError::UnknownFormat(_))
    ));
    assert!(matches!(
        CompiledWorkbook::open(dir.path().join("model.ods")),
        Err(IoError::UnknownFormat(_))
    ));
}

#[test]
fn validation_against_stored_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut adapter = JsonAdapter::new();
    adapter.write_cell("Sheet1", 1, 1, CellData::from_value(2));
    adapter.write_cell("Sheet1", 1, 2, CellData::from_formula("=A1*3").with_value(6));
    adapter.write_cell("Sheet1", 1, 3, CellData::from_formula("=B1+1").with_value(8));
    let path = dir.path().join("stored.json");
    adapter.save_to_path(&path).unwrap();

    let mut wb = CompiledWorkbook::open(&path).unwrap();
    let report = wb.validate::<&str>(None);
    assert_eq!(report.verified, 2);
    assert_eq!(
        report.mismatch.keys().collect::<Vec<_>>(),
        ["Sheet1!C1"]
    );
    assert_eq!(report.mismatch["Sheet1!C1"].calced, num(7.0));
}
