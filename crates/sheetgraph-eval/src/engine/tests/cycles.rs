//! Circular references and evaluation limits.
use sheetgraph_common::LiteralValue;

use super::common::{engine_for, num};
use crate::engine::{Engine, EngineConfig, EngineError};
use crate::test_workbook::TestWorkbook;

#[test]
fn two_cell_cycle_is_reported_with_its_path() {
    let wb = TestWorkbook::new()
        .with_formula_a1("Sheet1", "A1", "=B1+1")
        .with_formula_a1("Sheet1", "B1", "=A1+1");
    let mut engine = engine_for(wb);
    // building tolerates the cycle
    engine.build("Sheet1!A1").unwrap();
    match engine.evaluate("Sheet1!A1") {
        Err(EngineError::CircularReference(path)) => {
            assert_eq!(path, vec!["Sheet1!A1", "Sheet1!B1", "Sheet1!A1"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn self_reference_through_indirect_is_a_cycle() {
    let wb = TestWorkbook::new().with_formula_a1("Sheet1", "A1", "=INDIRECT(\"A1\")+1");
    let mut engine = engine_for(wb);
    assert!(matches!(
        engine.evaluate("Sheet1!A1"),
        Err(EngineError::CircularReference(_))
    ));
}

#[test]
fn reference_loops_are_cycles() {
    let wb = TestWorkbook::new()
        .with_formula_a1("Sheet1", "A1", "=INDIRECT(\"B1\")")
        .with_formula_a1("Sheet1", "B1", "=INDIRECT(\"A1\")");
    let mut engine = engine_for(wb);
    match engine.evaluate("Sheet1!A1") {
        Err(EngineError::CircularReference(path)) => {
            assert_eq!(path, vec!["Sheet1!A1", "Sheet1!B1", "Sheet1!A1"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn long_reference_chains_hit_the_hop_limit() {
    let mut wb = TestWorkbook::new().with_cell_a1("Sheet1", "A5", 7);
    for row in 1..=4 {
        wb = wb.with_formula("Sheet1", row, 1, format!("=INDIRECT(\"A{}\")", row + 1));
    }
    let mut engine =
        Engine::with_source(wb, EngineConfig::default().with_max_reference_hops(3));
    assert!(matches!(
        engine.evaluate("Sheet1!A1"),
        Err(EngineError::DepthExceeded { limit: 3, .. })
    ));
    assert_eq!(engine.evaluate("Sheet1!A3").unwrap(), LiteralValue::Int(7));
}

#[test]
fn depth_limit_applies_to_unevaluated_chains() {
    let mut wb = TestWorkbook::new().with_cell("Sheet1", 1, 1, 0);
    for row in 2..=10 {
        wb = wb.with_formula("Sheet1", row, 1, format!("=A{}+1", row - 1));
    }
    let mut engine = Engine::with_source(wb, EngineConfig::default().with_max_eval_depth(5));
    assert!(matches!(
        engine.evaluate("Sheet1!A10"),
        Err(EngineError::DepthExceeded { limit: 5, .. })
    ));
    // evaluating bottom-up keeps every walk shallow
    for row in 2..=10 {
        engine.evaluate(&format!("Sheet1!A{row}")).unwrap();
    }
    assert_eq!(engine.evaluate("Sheet1!A10").unwrap(), num(9.0));
}
