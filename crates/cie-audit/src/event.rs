// event.rs — AuditEntry data model (spec §3.5), generalized from the
// teacher's agent/tool-call vocabulary (`AuditAction::{ToolCall,
// PolicyDecision, Approval, Apply, Error}`) to a change/workflow vocabulary.
// Events still form a hash chain via `previous_hash`, same as
// `ta-audit::AuditEvent`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{AuditId, ChangeId};

/// The verb naming what happened, spec §3.5's literal list plus the
/// ambient entries SPEC_FULL adds for policy/risk/sync observability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Submitted,
    Analyzed,
    RiskCalculated,
    PolicyTriggered,
    Approved,
    Rejected,
    ApprovalExpired,
    AnalysisSuperseded,
    Executed,
    Completed,
    RolledBack,
    SyncCompleted,
    IncidentReported,
}

/// A single audit entry — one line in the JSONL audit journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_id: Option<ChangeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub action: AuditAction,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Hash of the previous entry in the journal, `None` for the first
    /// (spec §9 "append-only... owned by no feature").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
}

impl AuditEntry {
    /// `id` and `timestamp` are assigned by `AuditJournal::append`, which
    /// owns the id sequence and the system clock reference; callers build
    /// the rest of the entry with this constructor plus the builder
    /// methods below.
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: AuditId(0),
            timestamp: Utc::now(),
            change_id: None,
            user_id: None,
            action,
            details: serde_json::Value::Null,
            previous_hash: None,
        }
    }

    pub fn with_change(mut self, change_id: ChangeId) -> Self {
        self.change_id = Some(change_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
