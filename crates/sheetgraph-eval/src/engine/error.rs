use sheetgraph_common::{AddressError, ExcelError, ExcelErrorKind};
use sheetgraph_parse::FormulaError;

use super::source::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("address {0} is not in the graph")]
    UnknownAddress(String),

    #[error("cannot write {values} value(s) to {addresses} address(es)")]
    ShapeMismatch { addresses: usize, values: usize },

    #[error("{rows}x{cols} array cannot be stored in scalar cell {address}")]
    ArrayOverflow {
        address: String,
        rows: usize,
        cols: usize,
    },

    #[error("{address}: cannot compile {formula}: {message}")]
    UnsupportedFormula {
        address: String,
        formula: String,
        message: String,
    },

    #[error("malformed range {address}: {reason}")]
    MalformedRange { address: String, reason: String },

    #[error("invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("node {0} already exists")]
    DuplicateNode(String),

    #[error("circular reference: {}", .0.join(" -> "))]
    CircularReference(Vec<String>),

    #[error("evaluating {address} exceeded the depth limit of {limit}")]
    DepthExceeded { address: String, limit: usize },

    #[error("input {0} is not in the graph but is also requested as an output")]
    MissingInput(String),

    #[error("no data source attached; cannot fetch {0}")]
    NoSource(String),

    #[error("data source failed for {address}: {source}")]
    Source {
        address: String,
        #[source]
        source: SourceError,
    },

    #[error("{}: {source}", .address.as_deref().unwrap_or("<formula>"))]
    Formula {
        address: Option<String>,
        formula: Option<String>,
        #[source]
        source: FormulaError,
    },
}

impl From<FormulaError> for EngineError {
    fn from(source: FormulaError) -> Self {
        EngineError::Formula {
            address: None,
            formula: None,
            source,
        }
    }
}

impl EngineError {
    pub(crate) fn invalid_address(address: &str, source: AddressError) -> Self {
        EngineError::InvalidAddress {
            address: address.to_string(),
            source,
        }
    }

    /// Tag an untagged formula failure with the cell it happened in. The
    /// innermost cell wins.
    pub(crate) fn at(self, address: &str, formula: &str) -> Self {
        match self {
            EngineError::Formula {
                address: None,
                source,
                ..
            } => EngineError::Formula {
                address: Some(address.to_string()),
                formula: Some(formula.to_string()),
                source,
            },
            other => other,
        }
    }

    /// Function name when the failure is a call to an unimplemented function.
    pub fn not_implemented(&self) -> Option<&str> {
        match self {
            EngineError::Formula {
                source: FormulaError::NotImplemented(name),
                ..
            } => Some(name),
            _ => None,
        }
    }

    /// Grouping key used by validation reports: the underlying cause without
    /// the cell it occurred in.
    pub fn cause(&self) -> String {
        match self {
            EngineError::Formula { source, .. } => source.to_string(),
            EngineError::CircularReference(_) => "circular reference".to_string(),
            EngineError::DepthExceeded { limit, .. } => {
                format!("depth limit of {limit} exceeded")
            }
            other => other.to_string(),
        }
    }

    /// The spreadsheet error a cell shows in place of a value it could not
    /// compute.
    pub fn to_excel_error(&self) -> ExcelError {
        let kind = match self {
            EngineError::Formula {
                source: FormulaError::NotImplemented(_),
                ..
            } => ExcelErrorKind::Name,
            EngineError::Formula { .. } => ExcelErrorKind::Value,
            EngineError::CircularReference(_) => ExcelErrorKind::Circ,
            EngineError::DepthExceeded { .. } => ExcelErrorKind::Calc,
            _ => ExcelErrorKind::Ref,
        };
        ExcelError::new(kind).with_message(self.to_string())
    }

    pub(crate) fn is_formula_failure(&self) -> bool {
        matches!(self, EngineError::Formula { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_location_is_kept() {
        let err: EngineError = FormulaError::NotImplemented("VLOOKUP".into()).into();
        let err = err.at("Sheet1!B1", "=VLOOKUP(A1,C1:D2,2)");
        let err = err.at("Sheet1!C9", "=B1+1");
        match &err {
            EngineError::Formula { address, .. } => {
                assert_eq!(address.as_deref(), Some("Sheet1!B1"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.not_implemented(), Some("VLOOKUP"));
        assert!(err.to_string().starts_with("Sheet1!B1: "));
        assert_eq!(err.to_excel_error().kind, ExcelErrorKind::Name);
    }

    #[test]
    fn cycles_show_as_circ() {
        let err = EngineError::CircularReference(vec!["S!A1".into(), "S!A1".into()]);
        assert_eq!(err.to_excel_error().kind, ExcelErrorKind::Circ);
    }

    #[test]
    fn cycle_message_lists_the_path() {
        let err = EngineError::CircularReference(vec!["S!A1".into(), "S!B1".into(), "S!A1".into()]);
        assert_eq!(err.to_string(), "circular reference: S!A1 -> S!B1 -> S!A1");
    }
}
