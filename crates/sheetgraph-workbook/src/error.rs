use std::path::PathBuf;

use sheetgraph_eval::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("snapshot encoding failed: {0}")]
    SnapshotEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("snapshot decoding failed: {0}")]
    SnapshotDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("unknown save format: {0}")]
    UnknownFormat(String),

    #[error("no saved graph found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("{backend} backend: {message}")]
    Backend { backend: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IoError {
    pub(crate) fn backend(backend: &str, message: impl ToString) -> Self {
        IoError::Backend {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }
}
