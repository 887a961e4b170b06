//! Common test helpers
use sheetgraph_common::LiteralValue;

use crate::engine::{Engine, EngineConfig};
use crate::test_workbook::TestWorkbook;

/// Route engine logs through the test harness. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A1 = 2, B1 = A1*3, C1 = B1+1
pub fn chain_workbook() -> TestWorkbook {
    TestWorkbook::new()
        .with_cell_a1("Sheet1", "A1", 2)
        .with_formula_a1("Sheet1", "B1", "=A1*3")
        .with_formula_a1("Sheet1", "C1", "=B1+1")
}

pub fn engine_for(wb: TestWorkbook) -> Engine {
    init_tracing();
    Engine::with_source(wb, EngineConfig::default())
}

pub fn num(n: f64) -> LiteralValue {
    LiteralValue::Number(n)
}

/// Sorted node keys.
pub fn keys(engine: &Engine) -> Vec<String> {
    let mut keys: Vec<String> = engine.addresses().map(str::to_string).collect();
    keys.sort();
    keys
}
