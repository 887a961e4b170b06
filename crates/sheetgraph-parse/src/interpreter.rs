use std::cmp::Ordering;

use sheetgraph_common::{
    Address, CellAddress, ExcelErrorKind, LiteralValue, MAX_COL, MAX_ROW, RangeAddress,
};

use crate::builtins;
use crate::compile::{EvaluationContext, REF_FUNCTION};
use crate::error::FormulaError;
use crate::parser::{ASTNode, ASTNodeType};

/// Tree-walking evaluator for one expression.
pub(crate) struct Interpreter<'a, C: EvaluationContext + ?Sized> {
    sheet: &'a str,
    ctx: &'a mut C,
}

impl<'a, C> Interpreter<'a, C>
where
    C: EvaluationContext + ?Sized,
{
    pub(crate) fn new(sheet: &'a str, ctx: &'a mut C) -> Self {
        Self { sheet, ctx }
    }

    /// Evaluate a whole expression. A reference result is returned as is.
    pub(crate) fn evaluate_root(&mut self, node: &ASTNode) -> Result<LiteralValue, C::Error> {
        self.evaluate(node)
    }

    fn qualify(&self, address: &Address) -> Address {
        if address.has_sheet() {
            address.clone()
        } else {
            address.clone().with_sheet(self.sheet)
        }
    }

    /// May return `LiteralValue::Reference`.
    fn evaluate(&mut self, node: &ASTNode) -> Result<LiteralValue, C::Error> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Reference { address, .. } => {
                let address = self.qualify(address);
                self.read(&address)
            }
            ASTNodeType::UnaryOp { op, expr } => {
                let v = self.value(expr)?.into_scalar();
                Ok(unary_op(op, v))
            }
            ASTNodeType::BinaryOp { op, left, right } => {
                let l = self.value(left)?.into_scalar();
                let r = self.value(right)?.into_scalar();
                Ok(binary_op(op, l, r))
            }
            ASTNodeType::Function { name, args } => self.call(name, args),
            ASTNodeType::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut vals = Vec::with_capacity(row.len());
                    for item in row {
                        vals.push(self.value(item)?.into_scalar());
                    }
                    out.push(vals);
                }
                Ok(LiteralValue::Array(out))
            }
        }
    }

    /// Evaluate and dereference any reference result.
    fn value(&mut self, node: &ASTNode) -> Result<LiteralValue, C::Error> {
        match self.evaluate(node)? {
            LiteralValue::Reference(addr) => self.read(&addr),
            other => Ok(other),
        }
    }

    fn read(&mut self, address: &Address) -> Result<LiteralValue, C::Error> {
        match address {
            Address::Cell(cell) => self.ctx.resolve_cell(cell),
            Address::Range(range) => Ok(LiteralValue::Array(self.ctx.resolve_range(range)?)),
        }
    }

    fn call(&mut self, name: &str, args: &[ASTNode]) -> Result<LiteralValue, C::Error> {
        match name {
            "IF" => {
                check_arity(name, args, 2, 3)?;
                let cond = self.value(&args[0])?.into_scalar();
                let take_then = match cond {
                    LiteralValue::Error(e) => return Ok(LiteralValue::Error(e)),
                    other => match other.as_bool() {
                        Ok(b) => b,
                        Err(e) => return Ok(LiteralValue::Error(e)),
                    },
                };
                if take_then {
                    self.evaluate(&args[1])
                } else if let Some(otherwise) = args.get(2) {
                    self.evaluate(otherwise)
                } else {
                    Ok(LiteralValue::Boolean(false))
                }
            }
            "IFERROR" => {
                check_arity(name, args, 2, 2)?;
                let v = self.value(&args[0])?;
                if v.clone().into_scalar().is_error() {
                    self.value(&args[1])
                } else {
                    Ok(v)
                }
            }
            REF_FUNCTION | "INDIRECT" => {
                check_arity(name, args, 1, 2)?;
                let text = match self.value(&args[0])?.into_scalar().as_text() {
                    Ok(t) => t,
                    Err(e) => return Ok(LiteralValue::Error(e)),
                };
                Ok(match Address::parse_with_sheet(&text, self.sheet) {
                    Ok(addr) => LiteralValue::Reference(addr),
                    Err(_) => LiteralValue::error(ExcelErrorKind::Ref),
                })
            }
            "OFFSET" => self.offset(args),
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.value(arg)?);
                }
                Ok(builtins::call(name, &values)?)
            }
        }
    }

    /// `OFFSET(reference, rows, cols, [height], [width])`
    fn offset(&mut self, args: &[ASTNode]) -> Result<LiteralValue, C::Error> {
        check_arity("OFFSET", args, 3, 5)?;
        let base = match &args[0].node_type {
            ASTNodeType::Reference { address, .. } => self.qualify(address),
            _ => match self.evaluate(&args[0])? {
                LiteralValue::Reference(addr) => addr,
                LiteralValue::Error(e) => return Ok(LiteralValue::Error(e)),
                _ => return Ok(LiteralValue::error(ExcelErrorKind::Value)),
            },
        };
        let (sheet, row, col, height, width) = match &base {
            Address::Cell(c) => (c.sheet.clone(), c.row, c.col, 1, 1),
            Address::Range(r) if r.is_bounded() => {
                let start = r.start();
                let (h, w) = r.size();
                (start.sheet, start.row, start.col, h, w)
            }
            Address::Range(_) => return Ok(LiteralValue::error(ExcelErrorKind::Ref)),
        };

        let mut nums = [0.0f64; 4];
        let defaults = [0.0, 0.0, height as f64, width as f64];
        for (i, slot) in nums.iter_mut().enumerate() {
            *slot = match args.get(i + 1) {
                Some(arg) => match self.value(arg)?.into_scalar() {
                    LiteralValue::Empty => defaults[i],
                    v => match v.as_number() {
                        Ok(n) => n.trunc(),
                        Err(e) => return Ok(LiteralValue::Error(e)),
                    },
                },
                None => defaults[i],
            };
        }
        let [drow, dcol, h, w] = nums;
        let new_row = row as f64 + drow;
        let new_col = col as f64 + dcol;
        if new_row < 1.0 || new_col < 1.0 || h < 1.0 || w < 1.0 {
            return Ok(LiteralValue::error(ExcelErrorKind::Ref));
        }
        // Bounds are checked in f64 so the u32 casts below cannot saturate.
        let (end_row, end_col) = (new_row + h - 1.0, new_col + w - 1.0);
        if end_row > MAX_ROW as f64 || end_col > MAX_COL as f64 {
            return Ok(LiteralValue::error(ExcelErrorKind::Ref));
        }
        let (r0, c0) = (new_row as u32, new_col as u32);
        let (r1, c1) = (end_row as u32, end_col as u32);
        let target = if r0 == r1 && c0 == c1 {
            Address::Cell(CellAddress::new(sheet, r0, c0))
        } else {
            Address::Range(RangeAddress::new(sheet, r0, c0, r1, c1))
        };
        Ok(LiteralValue::Reference(target))
    }
}

fn check_arity(name: &str, args: &[ASTNode], min: usize, max: usize) -> Result<(), FormulaError> {
    if args.len() < min || args.len() > max {
        return Err(FormulaError::arguments(
            name,
            format!("expected {min}..={max} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

fn unary_op(op: &str, v: LiteralValue) -> LiteralValue {
    if v.is_error() {
        return v;
    }
    if op == "+" {
        return v;
    }
    match v.as_number() {
        Ok(n) if op == "-" => LiteralValue::Number(-n),
        Ok(n) => LiteralValue::Number(n / 100.0),
        Err(e) => LiteralValue::Error(e),
    }
}

pub(crate) fn binary_op(op: &str, l: LiteralValue, r: LiteralValue) -> LiteralValue {
    if l.is_error() {
        return l;
    }
    if r.is_error() {
        return r;
    }
    match op {
        "&" => match (l.as_text(), r.as_text()) {
            (Ok(a), Ok(b)) => LiteralValue::Text(a + &b),
            (Err(e), _) | (_, Err(e)) => LiteralValue::Error(e),
        },
        "=" => LiteralValue::Boolean(compare(&l, &r) == Ordering::Equal),
        "<>" => LiteralValue::Boolean(compare(&l, &r) != Ordering::Equal),
        "<" => LiteralValue::Boolean(compare(&l, &r) == Ordering::Less),
        ">" => LiteralValue::Boolean(compare(&l, &r) == Ordering::Greater),
        "<=" => LiteralValue::Boolean(compare(&l, &r) != Ordering::Greater),
        ">=" => LiteralValue::Boolean(compare(&l, &r) != Ordering::Less),
        _ => {
            let (a, b) = match (l.as_number(), r.as_number()) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return LiteralValue::Error(e),
            };
            let result = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" if b == 0.0 => return LiteralValue::error(ExcelErrorKind::Div),
                "/" => a / b,
                "^" => a.powf(b),
                _ => return LiteralValue::error(ExcelErrorKind::Value),
            };
            if result.is_finite() {
                LiteralValue::Number(result)
            } else {
                LiteralValue::error(ExcelErrorKind::Num)
            }
        }
    }
}

/// Excel ordering: numbers < text < booleans; text compares case-insensitively;
/// blanks take the type of the other side.
fn compare(l: &LiteralValue, r: &LiteralValue) -> Ordering {
    fn blank_like(other: &LiteralValue) -> LiteralValue {
        match other {
            LiteralValue::Text(_) => LiteralValue::Text(String::new()),
            LiteralValue::Boolean(_) => LiteralValue::Boolean(false),
            _ => LiteralValue::Number(0.0),
        }
    }
    fn rank(v: &LiteralValue) -> u8 {
        match v {
            LiteralValue::Text(_) => 1,
            LiteralValue::Boolean(_) => 2,
            _ => 0,
        }
    }

    let l = if l.is_empty() { blank_like(r) } else { l.clone() };
    let r = if r.is_empty() { blank_like(&l) } else { r.clone() };
    match (&l, &r) {
        (LiteralValue::Text(a), LiteralValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (LiteralValue::Boolean(a), LiteralValue::Boolean(b)) => a.cmp(b),
        _ if rank(&l) != rank(&r) => rank(&l).cmp(&rank(&r)),
        _ => {
            let a = l.as_number().unwrap_or(0.0);
            let b = r.as_number().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_propagates_errors_left_first() {
        let div = LiteralValue::error(ExcelErrorKind::Div);
        let na = LiteralValue::error(ExcelErrorKind::Na);
        assert_eq!(binary_op("+", div.clone(), na.clone()), div);
        assert_eq!(binary_op("+", LiteralValue::Int(1), na.clone()), na);
        assert_eq!(
            binary_op("/", LiteralValue::Int(1), LiteralValue::Int(0)),
            LiteralValue::error(ExcelErrorKind::Div)
        );
        assert_eq!(
            binary_op("*", LiteralValue::from("x"), LiteralValue::Int(2)),
            LiteralValue::error(ExcelErrorKind::Value)
        );
    }

    #[test]
    fn comparisons_follow_excel_rules() {
        let t = |op, l: LiteralValue, r: LiteralValue| binary_op(op, l, r);
        assert_eq!(t("=", "abc".into(), "ABC".into()), LiteralValue::Boolean(true));
        assert_eq!(t("<", LiteralValue::Int(99), "a".into()), LiteralValue::Boolean(true));
        assert_eq!(t(">", true.into(), "z".into()), LiteralValue::Boolean(true));
        assert_eq!(t("=", LiteralValue::Empty, LiteralValue::Int(0)), LiteralValue::Boolean(true));
        assert_eq!(t("=", LiteralValue::Empty, "".into()), LiteralValue::Boolean(true));
    }

    #[test]
    fn concatenation_uses_display_text() {
        assert_eq!(
            binary_op("&", LiteralValue::Number(2.0), "x".into()),
            LiteralValue::Text("2x".into())
        );
    }
}
