//! Spreadsheet dependency-graph engine.
//!
//! The [`Engine`] pulls cells and ranges from a [`DataSource`] on demand,
//! compiles their formulas, wires precedent edges, and evaluates values lazily
//! with memoization. Writing an input invalidates everything downstream of it.

pub mod engine;
pub mod test_workbook;

pub use engine::{
    CachedValue, Cell, CellRange, DataSource, DependencyGraph, Engine, EngineConfig, EngineError,
    EngineStats, Failure, Mismatch, Node, NodeId, RangeData, SourceError, TrimReport,
    ValidationReport,
};

pub use sheetgraph_common::{
    Address, CellAddress, ExcelError, ExcelErrorKind, LiteralValue, RangeAddress,
};
pub use sheetgraph_parse::CompiledExpression;
