use sheetgraph_common::{ExcelErrorKind, LiteralValue};

use super::common::{chain_workbook, engine_for, num};
use crate::engine::{Engine, EngineConfig};
use crate::test_workbook::TestWorkbook;

#[test]
fn evaluates_a_formula_chain() {
    let mut engine = engine_for(chain_workbook());
    assert_eq!(engine.evaluate("Sheet1!C1").unwrap(), num(7.0));
    assert_eq!(engine.evaluate("Sheet1!B1").unwrap(), num(6.0));
    assert_eq!(engine.evaluate("A1").unwrap(), LiteralValue::Int(2));
}

#[test]
fn results_are_memoized() {
    let mut engine = engine_for(chain_workbook());
    engine.evaluate("Sheet1!C1").unwrap();
    assert_eq!(engine.stats().formulas_evaluated, 2);
    engine.evaluate("Sheet1!C1").unwrap();
    engine.evaluate("Sheet1!B1").unwrap();
    assert_eq!(engine.stats().formulas_evaluated, 2);
}

#[test]
fn evaluate_each_preserves_order() {
    let mut engine = engine_for(chain_workbook());
    let values: Vec<LiteralValue> = engine
        .evaluate_each(["Sheet1!C1", "Sheet1!A1", "Sheet1!B1"])
        .unwrap();
    assert_eq!(values, vec![num(7.0), LiteralValue::Int(2), num(6.0)]);
}

#[test]
fn evaluate_range_returns_the_matrix() {
    let mut engine = engine_for(chain_workbook());
    assert_eq!(
        engine.evaluate_range("Sheet1!A1:C1").unwrap(),
        vec![vec![LiteralValue::Int(2), num(6.0), num(7.0)]]
    );
    // a single cell is a 1x1 matrix
    assert_eq!(
        engine.evaluate_range("Sheet1!C1").unwrap(),
        vec![vec![num(7.0)]]
    );
}

#[test]
fn range_value_matches_member_values() {
    let wb = TestWorkbook::new()
        .with_range(
            "Sheet1",
            1,
            1,
            vec![
                vec![LiteralValue::Int(1), LiteralValue::Int(2)],
                vec![LiteralValue::Int(3), LiteralValue::Int(4)],
            ],
        )
        .with_formula_a1("Sheet1", "C1", "=A1*10")
        .with_formula_a1("Sheet1", "D1", "=SUM(A1:C2)");
    let mut engine = engine_for(wb);
    assert_eq!(engine.evaluate("Sheet1!D1").unwrap(), num(20.0));
    let matrix = engine.evaluate_range("Sheet1!A1:C2").unwrap();
    for (r, row) in matrix.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            let addr = format!("Sheet1!{}{}", (b'A' + c as u8) as char, r + 1);
            assert_eq!(v, &engine.evaluate(&addr).unwrap(), "{addr}");
        }
    }
}

#[test]
fn reference_results_are_followed() {
    let wb = chain_workbook()
        .with_formula_a1("Sheet1", "D1", "=INDIRECT(\"B1\")")
        .with_formula_a1("Sheet1", "E1", "=OFFSET(A1,0,2)+1");
    let mut engine = engine_for(wb);
    assert_eq!(engine.evaluate("Sheet1!D1").unwrap(), num(6.0));
    assert_eq!(engine.evaluate("Sheet1!E1").unwrap(), num(8.0));
}

#[test]
fn offset_beyond_the_sheet_is_a_ref_error() {
    let wb = chain_workbook()
        .with_formula_a1("Sheet1", "D1", "=OFFSET(A1,0,0,5000000000,1)")
        .with_formula_a1("Sheet1", "E1", "=OFFSET(A1,1048576,0)");
    let mut engine = engine_for(wb);
    let r = LiteralValue::error(ExcelErrorKind::Ref);
    assert_eq!(engine.evaluate("Sheet1!D1").unwrap(), r);
    assert_eq!(engine.evaluate("Sheet1!E1").unwrap(), r);
}

#[test]
fn multi_cell_array_in_a_scalar_cell_is_a_value_error() {
    let wb = chain_workbook().with_formula_a1("Sheet1", "D1", "=A1:B1");
    let mut engine = engine_for(wb);
    assert_eq!(
        engine.evaluate("Sheet1!D1").unwrap(),
        LiteralValue::error(ExcelErrorKind::Value)
    );
}

#[test]
fn excel_errors_are_values_not_failures() {
    let wb = chain_workbook().with_formula_a1("Sheet1", "D1", "=C1/0");
    let mut engine = engine_for(wb);
    assert_eq!(
        engine.evaluate("Sheet1!D1").unwrap(),
        LiteralValue::error(ExcelErrorKind::Div)
    );
}

#[test]
fn unread_precedent_failures_do_not_fail_the_dependent() {
    let wb = TestWorkbook::new()
        .with_cell_a1("Sheet1", "A1", true)
        .with_formula_a1("Sheet1", "B1", "=IF(A1,1,C1)")
        .with_formula_a1("Sheet1", "C1", "=VLOOKUP(1,D1:E2,2)");
    let mut engine = engine_for(wb);
    assert_eq!(engine.evaluate("Sheet1!B1").unwrap(), num(1.0));

    let err = engine.evaluate("Sheet1!C1").unwrap_err();
    assert_eq!(err.not_implemented(), Some("VLOOKUP"));

    // once the branch is taken the failure surfaces, tagged with C1
    engine.set_value("Sheet1!A1", false).unwrap();
    let err = engine.evaluate("Sheet1!B1").unwrap_err();
    assert!(err.to_string().starts_with("Sheet1!C1:"), "{err}");
}

#[test]
fn recalculate_recomputes_everything() {
    let mut engine = engine_for(chain_workbook());
    engine.evaluate("Sheet1!C1").unwrap();
    engine.reset_stats();
    engine.recalculate().unwrap();
    assert_eq!(engine.stats().formulas_evaluated, 2);
    assert_eq!(engine.evaluate("Sheet1!C1").unwrap(), num(7.0));
    // inputs survive
    assert_eq!(engine.evaluate("Sheet1!A1").unwrap(), LiteralValue::Int(2));
}

#[test]
fn long_chains_do_not_recurse() {
    const N: u32 = 3000;
    let mut wb = TestWorkbook::new().with_cell("Sheet1", 1, 1, 1);
    for row in 2..=N {
        wb = wb.with_formula("Sheet1", row, 1, format!("=A{}+1", row - 1));
    }
    let mut engine = engine_for(wb);
    assert_eq!(
        engine.evaluate(&format!("Sheet1!A{N}")).unwrap(),
        num(N as f64)
    );
}

#[test]
fn value_tree_lists_precedents() {
    let mut engine = engine_for(chain_workbook());
    engine.evaluate("Sheet1!C1").unwrap();
    let tree = engine.value_tree("Sheet1!C1").unwrap();
    assert_eq!(tree, "Sheet1!C1 = 7\n  Sheet1!B1 = 6\n    Sheet1!A1 = 2\n");
}

#[test]
fn default_sheet_overrides_the_source() {
    let wb = chain_workbook().with_sheet("Other");
    let mut engine = Engine::with_source(wb, EngineConfig::default().with_default_sheet("Other"));
    assert_eq!(engine.evaluate("A1").unwrap(), LiteralValue::Empty);
    assert!(engine.contains("Other!A1"));
}
