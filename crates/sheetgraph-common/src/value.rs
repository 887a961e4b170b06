use std::fmt::{self, Display};

use crate::{Address, ExcelError, ExcelErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A value held by a cell or produced by a formula.
///
/// `Reference` is what a reference-returning formula (`INDIRECT`, `OFFSET`,
/// `_REF_`) evaluates to; the engine dereferences it before handing the value to
/// callers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum LiteralValue {
    Int(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    Array(Vec<Vec<LiteralValue>>),
    Empty,
    Error(ExcelError),
    Reference(Address),
}

/// `Int` and `Number` compare numerically, so a stored `2` equals a computed `2.0`.
impl PartialEq for LiteralValue {
    fn eq(&self, other: &Self) -> bool {
        use LiteralValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Int(a), Number(b)) | (Number(b), Int(a)) => (*a as f64) == *b,
            (Text(a), Text(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Empty, Empty) => true,
            (Error(a), Error(b)) => a.kind == b.kind,
            (Reference(a), Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(i) => write!(f, "{i}"),
            LiteralValue::Number(n) => f.write_str(&format_number(*n)),
            LiteralValue::Text(s) => write!(f, "{s}"),
            LiteralValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            LiteralValue::Error(e) => write!(f, "{}", e.kind),
            LiteralValue::Array(a) => write!(f, "{a:?}"),
            LiteralValue::Empty => Ok(()),
            LiteralValue::Reference(addr) => write!(f, "{addr}"),
        }
    }
}

/// Whole floats print without a fractional part, the way a cell shows them.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl LiteralValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, LiteralValue::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LiteralValue::Error(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, LiteralValue::Int(_) | LiteralValue::Number(_))
    }

    pub fn error(kind: ExcelErrorKind) -> Self {
        LiteralValue::Error(ExcelError::new(kind))
    }

    /// Collapse a 1x1 array to its element; larger arrays cannot stand in for a
    /// scalar and become `#VALUE!`.
    pub fn into_scalar(self) -> LiteralValue {
        match self {
            LiteralValue::Array(mut rows) => {
                if rows.len() == 1 && rows[0].len() == 1 {
                    rows.remove(0).remove(0)
                } else {
                    LiteralValue::error(ExcelErrorKind::Value)
                }
            }
            other => other,
        }
    }

    /// Numeric coercion with Excel rules: booleans are 0/1, blanks are 0, numeric
    /// text parses, anything else is `#VALUE!`.
    pub fn as_number(&self) -> Result<f64, ExcelError> {
        match self {
            LiteralValue::Int(i) => Ok(*i as f64),
            LiteralValue::Number(n) => Ok(*n),
            LiteralValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            LiteralValue::Empty => Ok(0.0),
            LiteralValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                ExcelError::new(ExcelErrorKind::Value)
                    .with_message(format!("cannot convert '{s}' to a number"))
            }),
            LiteralValue::Error(e) => Err(e.clone()),
            LiteralValue::Array(_) => self.clone().into_scalar().as_number(),
            LiteralValue::Reference(_) => Err(ExcelError::new(ExcelErrorKind::Value)),
        }
    }

    pub fn as_text(&self) -> Result<String, ExcelError> {
        match self {
            LiteralValue::Error(e) => Err(e.clone()),
            LiteralValue::Array(_) => self.clone().into_scalar().as_text(),
            other => Ok(other.to_string()),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ExcelError> {
        match self {
            LiteralValue::Boolean(b) => Ok(*b),
            LiteralValue::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
            LiteralValue::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
            LiteralValue::Text(_) => Err(ExcelError::new(ExcelErrorKind::Value)),
            other => other.as_number().map(|n| n != 0.0),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Boolean(b) => *b,
            LiteralValue::Int(i) => *i != 0,
            LiteralValue::Number(n) => *n != 0.0,
            LiteralValue::Text(s) => !s.is_empty(),
            LiteralValue::Array(arr) => !arr.is_empty(),
            LiteralValue::Reference(_) => true,
            LiteralValue::Error(_) | LiteralValue::Empty => false,
        }
    }

    /// Equality with a relative tolerance of 1e-6 for numbers, used when
    /// comparing recomputed values against stored ones.
    pub fn approx_eq(&self, other: &LiteralValue) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => {
                let (Ok(x), Ok(y)) = (a.as_number(), b.as_number()) else {
                    return false;
                };
                let diff = (x - y).abs();
                diff <= 1e-12 || diff <= 1e-6 * x.abs().max(y.abs())
            }
            (LiteralValue::Array(a), LiteralValue::Array(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(ra, rb)| {
                        ra.len() == rb.len() && ra.iter().zip(rb).all(|(x, y)| x.approx_eq(y))
                    })
            }
            (a, b) => a == b,
        }
    }
}

impl From<f64> for LiteralValue {
    fn from(value: f64) -> Self {
        LiteralValue::Number(value)
    }
}

impl From<i64> for LiteralValue {
    fn from(value: i64) -> Self {
        LiteralValue::Int(value)
    }
}

impl From<i32> for LiteralValue {
    fn from(value: i32) -> Self {
        LiteralValue::Int(value as i64)
    }
}

impl From<bool> for LiteralValue {
    fn from(value: bool) -> Self {
        LiteralValue::Boolean(value)
    }
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        LiteralValue::Text(value.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(value: String) -> Self {
        LiteralValue::Text(value)
    }
}

impl From<ExcelError> for LiteralValue {
    fn from(error: ExcelError) -> Self {
        LiteralValue::Error(error)
    }
}

impl From<ExcelErrorKind> for LiteralValue {
    fn from(kind: ExcelErrorKind) -> Self {
        LiteralValue::error(kind)
    }
}

impl From<Vec<Vec<LiteralValue>>> for LiteralValue {
    fn from(rows: Vec<Vec<LiteralValue>>) -> Self {
        LiteralValue::Array(rows)
    }
}
