use sheetgraph_common::LiteralValue;

use super::common::{chain_workbook, engine_for, keys, num};
use crate::engine::{CachedValue, Engine, EngineConfig, EngineError, Node};
use crate::test_workbook::TestWorkbook;

#[test]
fn building_a_seed_pulls_in_its_precedents() {
    let mut engine = engine_for(chain_workbook());
    engine.build("Sheet1!C1").unwrap();

    assert_eq!(keys(&engine), vec!["Sheet1!A1", "Sheet1!B1", "Sheet1!C1"]);
    let g = engine.graph();
    let a1 = g.get("Sheet1!A1").unwrap();
    let b1 = g.get("Sheet1!B1").unwrap();
    let c1 = g.get("Sheet1!C1").unwrap();
    assert_eq!(g.dependents(a1), &[b1]);
    assert_eq!(g.dependents(b1), &[c1]);
    assert_eq!(g.dependencies(c1), &[b1]);
    assert_eq!(g.edge_count(), 2);

    // creation order: the seed first, then precedents as discovered
    assert_eq!(g.node(c1).unwrap().id(), 1);
    assert!(g.node(b1).unwrap().id() < g.node(a1).unwrap().id());
}

#[test]
fn building_is_idempotent() {
    let mut engine = engine_for(chain_workbook());
    engine.build("Sheet1!C1").unwrap();
    engine.build("Sheet1!C1").unwrap();
    engine.build("Sheet1!B1").unwrap();
    assert_eq!(engine.graph().len(), 3);
    assert_eq!(engine.graph().edge_count(), 2);
}

#[test]
fn unqualified_seeds_use_the_active_sheet() {
    let wb = chain_workbook().with_sheet("Other");
    let mut engine = engine_for(wb);
    engine.build("C1").unwrap();
    assert!(engine.contains("Sheet1!C1"));
    assert!(engine.contains("C1"));
    assert!(!engine.contains("Other!C1"));
}

#[test]
fn ranges_get_every_member_and_are_evaluated_after_build() {
    let wb = TestWorkbook::new()
        .with_cell_a1("Sheet1", "A1", 1)
        .with_cell_a1("Sheet1", "A3", 3)
        .with_formula_a1("Sheet1", "B1", "=SUM(A1:A3)");
    let mut engine = engine_for(wb);
    engine.build("Sheet1!B1").unwrap();

    // A2 is blank in the source but still gets a node
    assert_eq!(
        keys(&engine),
        vec!["Sheet1!A1", "Sheet1!A1:A3", "Sheet1!A2", "Sheet1!A3", "Sheet1!B1"]
    );
    let range = engine.node("Sheet1!A1:A3").unwrap();
    assert!(matches!(range, Node::Range(_)));
    assert_eq!(
        range.value().get(),
        Some(&LiteralValue::Array(vec![
            vec![LiteralValue::Int(1)],
            vec![LiteralValue::Empty],
            vec![LiteralValue::Int(3)],
        ]))
    );
    assert_eq!(engine.stats().ranges_evaluated, 1);
    // the formula itself is still lazy
    assert!(!engine.node("Sheet1!B1").unwrap().value().is_set());
}

#[test]
fn unbounded_ranges_become_indirection_cells() {
    let wb = TestWorkbook::new()
        .with_cell_a1("Sheet1", "A1", 1)
        .with_cell_a1("Sheet1", "A2", 2)
        .with_cell_a1("Sheet1", "A3", 3)
        .with_formula_a1("Sheet1", "C1", "=SUM(A:A)");
    let mut engine = engine_for(wb);
    engine.build("Sheet1!C1").unwrap();

    let indirection = engine.node("Sheet1!A:A").unwrap().as_cell().unwrap();
    assert_eq!(
        indirection.formula_text(),
        Some("=_REF_(\"Sheet1!A1:A3\")")
    );
    assert!(engine.contains("Sheet1!A1:A3"));
    assert_eq!(engine.evaluate("Sheet1!C1").unwrap(), num(6.0));
    assert_eq!(
        engine.evaluate_range("Sheet1!A:A").unwrap(),
        vec![
            vec![LiteralValue::Int(1)],
            vec![LiteralValue::Int(2)],
            vec![LiteralValue::Int(3)]
        ]
    );
}

#[test]
fn stored_values_on_formula_cells_are_computed_values() {
    let wb = TestWorkbook::new()
        .with_cell_a1("Sheet1", "A1", 2)
        .with_computed_a1("Sheet1", "B1", "=A1*3", 6);
    let mut engine = engine_for(wb);
    engine.build("Sheet1!B1").unwrap();
    assert_eq!(
        engine.node("Sheet1!A1").unwrap().value(),
        &CachedValue::Literal(LiteralValue::Int(2))
    );
    assert_eq!(
        engine.node("Sheet1!B1").unwrap().value(),
        &CachedValue::Computed(LiteralValue::Int(6))
    );
}

#[test]
fn failed_build_leaves_the_graph_untouched() {
    let wb = chain_workbook()
        .with_formula_a1("Sheet1", "D1", "=SUM(E1")
        .with_formula_a1("Sheet1", "F1", "=C1+D1");
    let mut engine = engine_for(wb);
    engine.build("Sheet1!B1").unwrap();
    let before = keys(&engine);

    let err = engine.build("Sheet1!F1").unwrap_err();
    assert!(
        matches!(&err, EngineError::UnsupportedFormula { address, .. } if address == "Sheet1!D1"),
        "unexpected {err:?}"
    );
    assert_eq!(keys(&engine), before);
    assert_eq!(engine.graph().edge_count(), 1);

    // the rest of the workbook is still usable
    assert_eq!(engine.evaluate("Sheet1!C1").unwrap(), num(7.0));
}

#[test]
fn building_without_a_source_fails() {
    let mut engine = Engine::new(EngineConfig::default());
    assert!(matches!(
        engine.build("Sheet1!A1"),
        Err(EngineError::NoSource(_))
    ));
    assert!(matches!(engine.build("A1"), Err(EngineError::NoSource(_))));
}

#[test]
fn source_errors_carry_the_address() {
    let mut engine = engine_for(TestWorkbook::new().with_sheet("Sheet1"));
    let err = engine.build("Missing!A1").unwrap_err();
    match err {
        EngineError::Source { address, .. } => assert_eq!(address, "Missing!A1"),
        other => panic!("unexpected {other:?}"),
    }
}
