//! Builtin worksheet functions.
//!
//! Each entry declares its arity and receives already-evaluated arguments;
//! range arguments arrive as `LiteralValue::Array`. Excel errors are returned as
//! values. `IF`, `IFERROR`, `INDIRECT`, `OFFSET` and `_REF_` need unevaluated
//! arguments and live in the interpreter instead.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use sheetgraph_common::{ExcelError, ExcelErrorKind, LiteralValue};

use crate::compile::REF_FUNCTION;
use crate::error::FormulaError;

pub type BuiltinFn = fn(&[LiteralValue]) -> LiteralValue;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
    pub eval: BuiltinFn,
}

const SPECIAL_FORMS: &[&str] = &["IF", "IFERROR", "INDIRECT", "OFFSET", REF_FUNCTION];

static BUILTINS: Lazy<FxHashMap<&'static str, Builtin>> = Lazy::new(|| {
    let table = [
        Builtin { name: "SUM", min_args: 1, max_args: None, eval: sum },
        Builtin { name: "AVERAGE", min_args: 1, max_args: None, eval: average },
        Builtin { name: "MIN", min_args: 1, max_args: None, eval: min },
        Builtin { name: "MAX", min_args: 1, max_args: None, eval: max },
        Builtin { name: "PRODUCT", min_args: 1, max_args: None, eval: product },
        Builtin { name: "COUNT", min_args: 1, max_args: None, eval: count },
        Builtin { name: "COUNTA", min_args: 1, max_args: None, eval: counta },
        Builtin { name: "ABS", min_args: 1, max_args: Some(1), eval: abs },
        Builtin { name: "ROUND", min_args: 2, max_args: Some(2), eval: round },
        Builtin { name: "INT", min_args: 1, max_args: Some(1), eval: int },
        Builtin { name: "MOD", min_args: 2, max_args: Some(2), eval: modulo },
        Builtin { name: "SQRT", min_args: 1, max_args: Some(1), eval: sqrt },
        Builtin { name: "POWER", min_args: 2, max_args: Some(2), eval: power },
        Builtin { name: "AND", min_args: 1, max_args: None, eval: and },
        Builtin { name: "OR", min_args: 1, max_args: None, eval: or },
        Builtin { name: "NOT", min_args: 1, max_args: Some(1), eval: not },
        Builtin { name: "CONCATENATE", min_args: 1, max_args: None, eval: concatenate },
        Builtin { name: "LEN", min_args: 1, max_args: Some(1), eval: len },
        Builtin { name: "UPPER", min_args: 1, max_args: Some(1), eval: upper },
        Builtin { name: "LOWER", min_args: 1, max_args: Some(1), eval: lower },
        Builtin { name: "ISBLANK", min_args: 1, max_args: Some(1), eval: isblank },
        Builtin { name: "ISERROR", min_args: 1, max_args: Some(1), eval: iserror },
        Builtin { name: "ISNUMBER", min_args: 1, max_args: Some(1), eval: isnumber },
        Builtin { name: "ISTEXT", min_args: 1, max_args: Some(1), eval: istext },
    ];
    table.into_iter().map(|b| (b.name, b)).collect()
});

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.get(name)
}

/// True for table entries and the interpreter's special forms.
pub fn is_supported(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SPECIAL_FORMS.contains(&upper.as_str()) || BUILTINS.contains_key(upper.as_str())
}

pub fn call(name: &str, args: &[LiteralValue]) -> Result<LiteralValue, FormulaError> {
    let builtin = lookup(name).ok_or_else(|| FormulaError::NotImplemented(name.to_string()))?;
    let too_many = builtin.max_args.is_some_and(|max| args.len() > max);
    if args.len() < builtin.min_args || too_many {
        return Err(FormulaError::arguments(
            name,
            format!("wrong number of arguments ({})", args.len()),
        ));
    }
    Ok((builtin.eval)(args))
}

macro_rules! tri {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return LiteralValue::Error(e),
        }
    };
}

/// Numbers for aggregate functions. Direct arguments are coerced; values that
/// came from a range only count when already numeric.
fn numbers(args: &[LiteralValue]) -> Result<Vec<f64>, ExcelError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            LiteralValue::Array(rows) => {
                for v in rows.iter().flatten() {
                    match v {
                        LiteralValue::Int(i) => out.push(*i as f64),
                        LiteralValue::Number(n) => out.push(*n),
                        LiteralValue::Error(e) => return Err(e.clone()),
                        _ => {}
                    }
                }
            }
            LiteralValue::Empty => {}
            other => out.push(other.as_number()?),
        }
    }
    Ok(out)
}

fn scalar_number(v: &LiteralValue) -> Result<f64, ExcelError> {
    v.clone().into_scalar().as_number()
}

fn scalar_text(v: &LiteralValue) -> Result<String, ExcelError> {
    v.clone().into_scalar().as_text()
}

fn finite(n: f64) -> LiteralValue {
    if n.is_finite() {
        LiteralValue::Number(n)
    } else {
        LiteralValue::error(ExcelErrorKind::Num)
    }
}

fn sum(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Number(tri!(numbers(args)).iter().sum())
}

fn average(args: &[LiteralValue]) -> LiteralValue {
    let nums = tri!(numbers(args));
    if nums.is_empty() {
        return LiteralValue::error(ExcelErrorKind::Div);
    }
    LiteralValue::Number(nums.iter().sum::<f64>() / nums.len() as f64)
}

fn min(args: &[LiteralValue]) -> LiteralValue {
    let nums = tri!(numbers(args));
    LiteralValue::Number(nums.into_iter().reduce(f64::min).unwrap_or(0.0))
}

fn max(args: &[LiteralValue]) -> LiteralValue {
    let nums = tri!(numbers(args));
    LiteralValue::Number(nums.into_iter().reduce(f64::max).unwrap_or(0.0))
}

fn product(args: &[LiteralValue]) -> LiteralValue {
    let nums = tri!(numbers(args));
    if nums.is_empty() {
        return LiteralValue::Number(0.0);
    }
    finite(nums.iter().product())
}

fn count(args: &[LiteralValue]) -> LiteralValue {
    let mut n = 0i64;
    for arg in args {
        match arg {
            LiteralValue::Array(rows) => {
                n += rows.iter().flatten().filter(|v| v.is_number()).count() as i64;
            }
            LiteralValue::Text(s) if s.trim().parse::<f64>().is_ok() => n += 1,
            LiteralValue::Int(_) | LiteralValue::Number(_) | LiteralValue::Boolean(_) => n += 1,
            _ => {}
        }
    }
    LiteralValue::Int(n)
}

fn counta(args: &[LiteralValue]) -> LiteralValue {
    let mut n = 0i64;
    for arg in args {
        match arg {
            LiteralValue::Array(rows) => {
                n += rows.iter().flatten().filter(|v| !v.is_empty()).count() as i64;
            }
            LiteralValue::Empty => {}
            _ => n += 1,
        }
    }
    LiteralValue::Int(n)
}

fn abs(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Number(tri!(scalar_number(&args[0])).abs())
}

fn round(args: &[LiteralValue]) -> LiteralValue {
    let n = tri!(scalar_number(&args[0]));
    let digits = tri!(scalar_number(&args[1])).trunc() as i32;
    if digits < 0 {
        let factor = 10f64.powi(-digits);
        return finite((n / factor).round() * factor);
    }
    let factor = 10f64.powi(digits);
    finite((n * factor).round() / factor)
}

fn int(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Number(tri!(scalar_number(&args[0])).floor())
}

fn modulo(args: &[LiteralValue]) -> LiteralValue {
    let n = tri!(scalar_number(&args[0]));
    let d = tri!(scalar_number(&args[1]));
    if d == 0.0 {
        return LiteralValue::error(ExcelErrorKind::Div);
    }
    finite(n - d * (n / d).floor())
}

fn sqrt(args: &[LiteralValue]) -> LiteralValue {
    let n = tri!(scalar_number(&args[0]));
    if n < 0.0 {
        return LiteralValue::error(ExcelErrorKind::Num);
    }
    LiteralValue::Number(n.sqrt())
}

fn power(args: &[LiteralValue]) -> LiteralValue {
    let base = tri!(scalar_number(&args[0]));
    let exp = tri!(scalar_number(&args[1]));
    finite(base.powf(exp))
}

/// Booleans for AND/OR; text and blanks inside ranges are skipped.
fn logicals(args: &[LiteralValue]) -> Result<Vec<bool>, ExcelError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            LiteralValue::Array(rows) => {
                for v in rows.iter().flatten() {
                    match v {
                        LiteralValue::Text(_) | LiteralValue::Empty => {}
                        other => out.push(other.as_bool()?),
                    }
                }
            }
            LiteralValue::Empty => {}
            other => out.push(other.as_bool()?),
        }
    }
    if out.is_empty() {
        return Err(ExcelError::new(ExcelErrorKind::Value));
    }
    Ok(out)
}

fn and(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(tri!(logicals(args)).into_iter().all(|b| b))
}

fn or(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(tri!(logicals(args)).into_iter().any(|b| b))
}

fn not(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(!tri!(args[0].clone().into_scalar().as_bool()))
}

fn concatenate(args: &[LiteralValue]) -> LiteralValue {
    let mut out = String::new();
    for arg in args {
        out.push_str(&tri!(scalar_text(arg)));
    }
    LiteralValue::Text(out)
}

fn len(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Int(tri!(scalar_text(&args[0])).chars().count() as i64)
}

fn upper(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Text(tri!(scalar_text(&args[0])).to_uppercase())
}

fn lower(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Text(tri!(scalar_text(&args[0])).to_lowercase())
}

fn isblank(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(args[0].clone().into_scalar().is_empty())
}

fn iserror(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(args[0].clone().into_scalar().is_error())
}

fn isnumber(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(args[0].clone().into_scalar().is_number())
}

fn istext(args: &[LiteralValue]) -> LiteralValue {
    LiteralValue::Boolean(matches!(args[0].clone().into_scalar(), LiteralValue::Text(_)))
}
