// error.rs — error types for the impact analyzer.

use cie_core::{CieError, NodeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImpactError {
    /// The analyzer cannot produce a meaningful snapshot with no targets
    /// (spec §4.I "Failure").
    #[error("impact analysis has no targets to analyze")]
    EmptyTargetImpact,
}

impl From<ImpactError> for CieError {
    fn from(err: ImpactError) -> Self {
        match err {
            ImpactError::EmptyTargetImpact => CieError::EmptyTargetImpact,
        }
    }
}

/// Non-fatal: targets referencing nodes that do not exist in the snapshot
/// are excluded from analysis and reported here instead (spec §4.I
/// "Failure" — `UnknownTargetWarning` is attached, not raised).
pub fn unknown_targets_to_cie_error(unknown: Vec<NodeId>) -> CieError {
    CieError::UnknownTargetWarning(unknown)
}
