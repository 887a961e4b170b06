use sheetgraph_eval::test_workbook::TestWorkbook;

use crate::{Engine, EngineConfig, EngineError, LiteralValue};

/// Evaluate a formula placed in `Sheet1!A1` of an otherwise empty workbook.
///
/// This helper is intended for documentation examples to avoid repetitive setup.
///
/// # Example
///
/// ```rust
/// # use sheetgraph::doc_examples::eval_scalar;
/// let value = eval_scalar("=SUM(1,2,3)")?;
/// assert_eq!(value, sheetgraph::LiteralValue::Number(6.0));
/// # Ok::<(), sheetgraph::EngineError>(())
/// ```
pub fn eval_scalar(formula: &str) -> Result<LiteralValue, EngineError> {
    let workbook = TestWorkbook::new().with_formula_a1("Sheet1", "A1", formula);
    let mut engine = Engine::with_source(workbook, EngineConfig::default());
    engine.evaluate("Sheet1!A1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_formulas_evaluate() {
        assert_eq!(eval_scalar("=2*3+1").unwrap(), LiteralValue::Number(7.0));
        assert!(eval_scalar("=1/0").unwrap().is_error());
    }
}
