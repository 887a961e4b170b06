use smallvec::SmallVec;

use sheetgraph_common::{Address, CellAddress, LiteralValue, RangeAddress};

use crate::error::{FormulaError, ParserError};
use crate::interpreter::Interpreter;
use crate::parser::{ASTNode, ASTNodeType, parse};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name of the reference-returning pseudo function used for indirection cells.
pub const REF_FUNCTION: &str = "_REF_";

/// `=_REF_("Sheet1!A1:B3")`: a formula that evaluates to a reference to `target`.
pub fn reference_formula(target: &Address) -> String {
    format!(
        "={REF_FUNCTION}(\"{}\")",
        target.to_string().replace('"', "\"\"")
    )
}

/// Supplies cell and range values while an expression runs.
pub trait EvaluationContext {
    type Error: From<FormulaError>;

    fn resolve_cell(&mut self, address: &CellAddress) -> Result<LiteralValue, Self::Error>;

    /// Row-major values of a range.
    fn resolve_range(
        &mut self,
        address: &RangeAddress,
    ) -> Result<Vec<Vec<LiteralValue>>, Self::Error>;
}

/// A formula compiled for a host sheet: its text, AST, and the addresses it
/// reads.
///
/// Serializes as just the formula text and host sheet; deserializing compiles
/// again, which yields the same expression because compilation is
/// deterministic.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "StoredFormula", into = "StoredFormula")
)]
pub struct CompiledExpression {
    formula: String,
    sheet: String,
    ast: ASTNode,
    needed: SmallVec<[Address; 4]>,
}

impl PartialEq for CompiledExpression {
    fn eq(&self, other: &Self) -> bool {
        self.formula == other.formula && self.sheet == other.sheet
    }
}

impl CompiledExpression {
    /// Compile `formula` (a leading `=` is added if missing). Unqualified
    /// references are qualified with `sheet`.
    pub fn compile(formula: &str, sheet: &str) -> Result<Self, ParserError> {
        let trimmed = formula.trim();
        let formula = if trimmed.starts_with('=') {
            trimmed.to_string()
        } else {
            format!("={trimmed}")
        };
        let ast = parse(&formula)?;
        let needed = collect_needed(&ast, sheet)?;
        Ok(Self {
            formula,
            sheet: sheet.to_string(),
            ast,
            needed,
        })
    }

    /// Formula text including the leading `=`.
    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn ast(&self) -> &ASTNode {
        &self.ast
    }

    /// Precedents in first-appearance order, deduplicated and sheet-qualified.
    pub fn needed_addresses(&self) -> &[Address] {
        &self.needed
    }

    /// Target of an `=_REF_("...")` indirection formula.
    pub fn reference_target(&self) -> Option<&Address> {
        match &self.ast.node_type {
            ASTNodeType::Function { name, .. } if name == REF_FUNCTION => self.needed.first(),
            _ => None,
        }
    }

    /// Run the expression. A reference-returning formula yields
    /// [`LiteralValue::Reference`]; dereferencing it is the caller's job.
    pub fn evaluate<C>(&self, ctx: &mut C) -> Result<LiteralValue, C::Error>
    where
        C: EvaluationContext + ?Sized,
    {
        Interpreter::new(&self.sheet, ctx).evaluate_root(&self.ast)
    }
}

fn collect_needed(ast: &ASTNode, sheet: &str) -> Result<SmallVec<[Address; 4]>, ParserError> {
    let mut needed: SmallVec<[Address; 4]> = SmallVec::new();
    let mut push = |addr: Address| {
        let addr = if addr.has_sheet() {
            addr
        } else {
            addr.with_sheet(sheet)
        };
        if !needed.contains(&addr) {
            needed.push(addr);
        }
    };

    let mut stack = vec![ast];
    while let Some(node) = stack.pop() {
        match &node.node_type {
            ASTNodeType::Literal(_) => {}
            ASTNodeType::Reference { address, .. } => push(address.clone()),
            ASTNodeType::UnaryOp { expr, .. } => stack.push(expr),
            ASTNodeType::BinaryOp { left, right, .. } => {
                stack.push(right);
                stack.push(left);
            }
            ASTNodeType::Function { name, args } if name == REF_FUNCTION => {
                let [arg] = args.as_slice() else {
                    return Err(ParserError::new(
                        format!("{REF_FUNCTION} takes exactly one argument"),
                        None,
                    ));
                };
                let ASTNodeType::Literal(LiteralValue::Text(text)) = &arg.node_type else {
                    return Err(ParserError::new(
                        format!("{REF_FUNCTION} argument must be a string literal"),
                        None,
                    ));
                };
                let addr = Address::parse(text)
                    .map_err(|e| ParserError::new(format!("{REF_FUNCTION}: {e}"), None))?;
                push(addr);
            }
            ASTNodeType::Function { args, .. } => stack.extend(args.iter().rev()),
            ASTNodeType::Array(rows) => {
                stack.extend(rows.iter().rev().flat_map(|row| row.iter().rev()))
            }
        }
    }
    Ok(needed)
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct StoredFormula {
    formula: String,
    sheet: String,
}

#[cfg(feature = "serde")]
impl From<CompiledExpression> for StoredFormula {
    fn from(expr: CompiledExpression) -> Self {
        StoredFormula {
            formula: expr.formula,
            sheet: expr.sheet,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<StoredFormula> for CompiledExpression {
    type Error = ParserError;

    fn try_from(stored: StoredFormula) -> Result<Self, Self::Error> {
        CompiledExpression::compile(&stored.formula, &stored.sheet)
    }
}
