// error.rs — errors for the audit journal subsystem.

use std::path::PathBuf;

use cie_core::CieError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit journal at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The journal has been tampered with — hash chain is broken.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}

impl From<AuditError> for CieError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::OpenFailed { path, source } => CieError::Io {
                path: path.display().to_string(),
                source,
            },
            AuditError::WriteFailed(source) => CieError::Io {
                path: "<audit journal>".to_string(),
                source,
            },
            AuditError::SerializationError(source) => CieError::Serialization(source),
            AuditError::IntegrityViolation { line, expected, actual } => CieError::Validation(
                format!("audit journal tampered at line {line}: expected {expected}, got {actual}"),
            ),
        }
    }
}
