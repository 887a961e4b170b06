use std::collections::HashMap;

use sheetgraph_parse::{
    Address, CellAddress, CompiledExpression, EvaluationContext, ExcelErrorKind, FormulaError,
    LiteralValue, RangeAddress, reference_formula,
};

/// Cells keyed by canonical address; anything missing reads as blank.
#[derive(Default)]
struct MapContext {
    cells: HashMap<String, LiteralValue>,
    reads: Vec<String>,
}

impl MapContext {
    fn with(mut self, addr: &str, v: impl Into<LiteralValue>) -> Self {
        self.cells.insert(addr.to_string(), v.into());
        self
    }
}

impl EvaluationContext for MapContext {
    type Error = FormulaError;

    fn resolve_cell(&mut self, address: &CellAddress) -> Result<LiteralValue, FormulaError> {
        let key = address.to_string();
        self.reads.push(key.clone());
        Ok(self.cells.get(&key).cloned().unwrap_or(LiteralValue::Empty))
    }

    fn resolve_range(
        &mut self,
        address: &RangeAddress,
    ) -> Result<Vec<Vec<LiteralValue>>, FormulaError> {
        let rows = address.resolve_range().map_err(|e| FormulaError::Arguments {
            name: "range".into(),
            message: e.to_string(),
        })?;
        rows.iter()
            .map(|row| row.iter().map(|c| self.resolve_cell(c)).collect())
            .collect()
    }
}

fn eval(formula: &str, ctx: &mut MapContext) -> LiteralValue {
    CompiledExpression::compile(formula, "Sheet1")
        .unwrap()
        .evaluate(ctx)
        .unwrap()
}

#[test]
fn needed_addresses_are_qualified_and_deduplicated() {
    let expr = CompiledExpression::compile("=A1+SUM(A1:B2)*A1+Other!C3", "Sheet1").unwrap();
    let needed: Vec<String> = expr
        .needed_addresses()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(needed, vec!["Sheet1!A1", "Sheet1!A1:B2", "Other!C3"]);
}

#[test]
fn compile_is_deterministic() {
    let a = CompiledExpression::compile("=B1*3", "S").unwrap();
    let b = CompiledExpression::compile("B1*3", "S").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.formula(), "=B1*3");
    assert_eq!(a.needed_addresses(), b.needed_addresses());
}

#[test]
fn evaluates_arithmetic_over_context() {
    let mut ctx = MapContext::default()
        .with("Sheet1!A1", 2)
        .with("Sheet1!B1", 3.5);
    assert_eq!(eval("=A1*3+1", &mut ctx), LiteralValue::Number(7.0));
    assert_eq!(eval("=SUM(A1:B1)", &mut ctx), LiteralValue::Number(5.5));
    assert_eq!(eval("=A1/0", &mut ctx), LiteralValue::error(ExcelErrorKind::Div));
    assert_eq!(eval("=-A1^2", &mut ctx), LiteralValue::Number(4.0));
    assert_eq!(eval("=\"n=\"&A1", &mut ctx), LiteralValue::Text("n=2".into()));
}

#[test]
fn if_only_reads_the_taken_branch() {
    let mut ctx = MapContext::default().with("Sheet1!A1", true);
    assert_eq!(eval("=IF(A1,B1+1,C1)", &mut ctx), LiteralValue::Number(1.0));
    assert!(ctx.reads.contains(&"Sheet1!B1".to_string()));
    assert!(!ctx.reads.contains(&"Sheet1!C1".to_string()));
}

#[test]
fn reference_functions_return_references() {
    let mut ctx = MapContext::default().with("Sheet1!B2", 9);
    assert_eq!(
        eval("=INDIRECT(\"B2\")", &mut ctx),
        LiteralValue::Reference(Address::parse("Sheet1!B2").unwrap())
    );
    assert_eq!(
        eval("=OFFSET(A1,1,1,2,2)", &mut ctx),
        LiteralValue::Reference(Address::parse("Sheet1!B2:C3").unwrap())
    );
    // dereferenced when consumed by an operator
    assert_eq!(eval("=INDIRECT(\"B2\")+1", &mut ctx), LiteralValue::Number(10.0));
    assert_eq!(eval("=OFFSET(A1,-1,0)", &mut ctx), LiteralValue::error(ExcelErrorKind::Ref));
}

#[test]
fn offset_past_the_sheet_edge_is_a_ref_error() {
    let mut ctx = MapContext::default();
    let r = LiteralValue::error(ExcelErrorKind::Ref);
    assert_eq!(eval("=OFFSET(A1,0,0,5000000000,1)", &mut ctx), r);
    assert_eq!(eval("=OFFSET(A1,0,0,1,5000000000)", &mut ctx), r);
    assert_eq!(eval("=OFFSET(A1,1048576,0)", &mut ctx), r);
    assert_eq!(eval("=OFFSET(A1,0,16383,1,2)", &mut ctx), r);
    assert_eq!(
        eval("=OFFSET(A1,1048575,0)", &mut ctx),
        LiteralValue::Reference(Address::parse("Sheet1!A1048576").unwrap())
    );
}

#[test]
fn indirection_formula_declares_its_target() {
    let target = Address::parse("'My Sheet'!A1:A3").unwrap();
    let formula = reference_formula(&target);
    assert_eq!(formula, "=_REF_(\"'My Sheet'!A1:A3\")");
    let expr = CompiledExpression::compile(&formula, "Sheet1").unwrap();
    assert_eq!(expr.needed_addresses(), &[target.clone()]);
    assert_eq!(expr.reference_target(), Some(&target));
}

#[test]
fn unknown_function_is_not_implemented() {
    let expr = CompiledExpression::compile("=VLOOKUP(A1,B1:C3,2)", "Sheet1").unwrap();
    let err = expr.evaluate(&mut MapContext::default()).unwrap_err();
    assert_eq!(err, FormulaError::NotImplemented("VLOOKUP".into()));
    assert!(err.to_string().contains("has not been implemented"));
}

#[test]
fn parse_failures_surface_at_compile_time() {
    assert!(CompiledExpression::compile("=SUM(A1", "S").is_err());
    assert!(CompiledExpression::compile("=_REF_(A1)", "S").is_err());
}
