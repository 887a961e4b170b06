//! Workbook sources and persistence for sheetgraph.
//!
//! [`CompiledWorkbook`] pairs an [`Engine`](sheetgraph_eval::Engine) with the
//! fingerprint of the workbook it was compiled from. It saves to a sorted text
//! cell map (YAML or JSON) that reloads by replaying the builder, or to a CBOR
//! snapshot that restores the graph directly.

pub mod backends;
pub mod error;
pub mod format;
pub mod record;
pub mod replay;
pub mod workbook;

#[cfg(feature = "calamine")]
pub use backends::CalamineAdapter;
pub use backends::{CellData, JsonAdapter};
pub use error::IoError;
pub use format::SaveFormat;
pub use record::{CellMap, StoredCell, TextRecord};
pub use replay::ReplaySource;
pub use workbook::{CompiledWorkbook, StaleArtifact, fingerprint};

pub use sheetgraph_common::LiteralValue;
pub use sheetgraph_eval::{EngineConfig, EngineError};
