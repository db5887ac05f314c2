// error.rs — errors specific to persisting change records, converted
// into the workspace's `CieError` at the crate boundary.

use cie_core::{ChangeId, CieError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("change not found: {0}")]
    NotFound(ChangeId),
}

impl From<StoreError> for CieError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { path, source } => CieError::Io { path, source },
            StoreError::Serialization(source) => CieError::Serialization(source),
            StoreError::NotFound(id) => CieError::NotFound {
                kind: "change",
                id: id.to_string(),
            },
        }
    }
}
