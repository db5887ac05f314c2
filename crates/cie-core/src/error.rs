// error.rs — the workspace-wide error type.
//
// Every subsystem (`cie-graph`, `cie-store`, `cie-impact`, ...) owns a
// narrow error enum for its own failure modes; `CieError` is the umbrella
// the workflow controller and callers at the top of the stack propagate
// with `?`, the same "each subsystem owns a narrow error enum, the
// orchestrator owns the umbrella" shape as `GoalError` in the teacher.

use thiserror::Error;

use crate::ids::{ApprovalId, ChangeId, NodeId};

/// Errors the core surfaces, matching every kind named in spec §7.
#[derive(Debug, Error)]
pub enum CieError {
    /// Input is malformed or semantically invalid (empty targets, action
    /// not allowed for change_type, maintenance end before start, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// A change, approval, node, or policy referenced by id does not exist.
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    /// Non-fatal: attached to an impact snapshot, not a refusal to process.
    #[error("unknown target(s) excluded from analysis: {0:?}")]
    UnknownTargetWarning(Vec<NodeId>),

    /// The analyzer cannot produce a meaningful snapshot (empty target set).
    #[error("impact analysis has no targets to analyze")]
    EmptyTargetImpact,

    /// Submit refused by policy guardrails.
    #[error("policy blocked submit: {policies:?}")]
    PolicyBlocked {
        policies: Vec<String>,
        reasons: Vec<String>,
    },

    /// A workflow state machine transition is not legal.
    #[error("cannot transition change {change_id} from {from:?} to {to:?}")]
    TransitionForbidden {
        change_id: ChangeId,
        from: crate::types::ChangeStatus,
        to: crate::types::ChangeStatus,
    },

    /// A concurrent approval decision lost the race.
    #[error("approval {0} was already decided")]
    ApprovalAlreadyDecided(ApprovalId),

    /// `execute` was attempted outside the maintenance window with no
    /// admin override.
    #[error("change {0} is outside its maintenance window")]
    MaintenanceWindowViolation(ChangeId),

    /// A connector sync failed after exhausting its retry budget.
    #[error("connector sync failed after {attempt} attempts: {cause}")]
    ConnectorSyncFailed { attempt: u32, cause: String },

    /// A graph mutation was rejected because it would violate an invariant;
    /// the graph is left untouched.
    #[error("graph invariant violated: {0}")]
    GraphInvariantViolation(String),

    /// Failed to serialize or deserialize a persisted record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_blocked_display_includes_policy_names() {
        let err = CieError::PolicyBlocked {
            policies: vec!["No prod changes in biz hours".to_string()],
            reasons: vec!["outside allowed window".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("No prod changes in biz hours"));
    }

    #[test]
    fn not_found_display_includes_kind_and_id() {
        let err = CieError::NotFound {
            kind: "change",
            id: "01ABC".to_string(),
        };
        assert_eq!(err.to_string(), "not found: change 01ABC");
    }
}
