//! Excel error values.
//!
//! `ExcelErrorKind` names are CamelCase while `Display` renders them exactly as
//! Excel shows them (`#DIV/0!`, `#N/A`, ...). The textual form is also what the
//! persisted cell map stores for error-valued cells.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognised Excel error codes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExcelErrorKind {
    Null,
    Ref,
    Name,
    Value,
    Div,
    Na,
    Num,
    Error,
    NImpl,
    Calc,
    Circ,
}

impl fmt::Display for ExcelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl ExcelErrorKind {
    pub const ALL: [ExcelErrorKind; 11] = [
        Self::Null,
        Self::Ref,
        Self::Name,
        Self::Value,
        Self::Div,
        Self::Na,
        Self::Num,
        Self::Error,
        Self::NImpl,
        Self::Calc,
        Self::Circ,
    ];

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Null => "#NULL!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Div => "#DIV/0!",
            Self::Na => "#N/A",
            Self::Num => "#NUM!",
            Self::Error => "#ERROR!",
            Self::NImpl => "#N/IMPL!",
            Self::Calc => "#CALC!",
            Self::Circ => "#CIRC!",
        }
    }

    /// Case-insensitive lookup of an error code such as `#div/0!`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_code().eq_ignore_ascii_case(s))
    }
}

/// An error value with an optional human explanation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExcelError {
    pub kind: ExcelErrorKind,
    pub message: Option<String>,
}

impl From<ExcelErrorKind> for ExcelError {
    fn from(kind: ExcelErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl ExcelError {
    pub fn new(kind: ExcelErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn from_error_string(s: &str) -> Option<Self> {
        ExcelErrorKind::parse(s).map(Self::new)
    }
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExcelError {}

impl PartialEq<str> for ExcelErrorKind {
    fn eq(&self, other: &str) -> bool {
        self.as_code() == other
    }
}

impl PartialEq<&str> for ExcelError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.as_code() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for kind in ExcelErrorKind::ALL {
            assert_eq!(ExcelErrorKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(ExcelErrorKind::parse(" #div/0! "), Some(ExcelErrorKind::Div));
        assert_eq!(ExcelErrorKind::parse("#BOGUS!"), None);
    }

    #[test]
    fn message_is_rendered_after_code() {
        let err = ExcelError::new(ExcelErrorKind::Value).with_message("bad operand");
        assert_eq!(err.to_string(), "#VALUE!: bad operand");
        assert_eq!(err, "#VALUE!");
    }
}
