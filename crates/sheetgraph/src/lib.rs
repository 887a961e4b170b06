//! Meta crate re-exporting the sheetgraph layers. Depend on this crate and
//! pick layers with feature flags, or reach for the underlying crates when
//! deeper integration is needed.

#[cfg(feature = "common")]
pub use sheetgraph_common as common;

#[cfg(feature = "parse")]
pub use sheetgraph_parse as parse;

#[cfg(feature = "eval")]
pub use sheetgraph_eval as eval;

#[cfg(feature = "workbook")]
pub use sheetgraph_workbook as workbook;

#[cfg(feature = "common")]
pub use sheetgraph_common::{
    Address, CellAddress, ExcelError, ExcelErrorKind, LiteralValue, RangeAddress,
};

#[cfg(feature = "parse")]
pub use sheetgraph_parse::{CompiledExpression, FormulaError, ParserError};

#[cfg(feature = "eval")]
pub use sheetgraph_eval::{
    DataSource, Engine, EngineConfig, EngineError, TrimReport, ValidationReport,
};

#[cfg(feature = "workbook")]
pub use sheetgraph_workbook::{CompiledWorkbook, IoError, SaveFormat, StaleArtifact};

#[cfg(feature = "eval")]
pub mod doc_examples;
