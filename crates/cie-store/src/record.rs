// record.rs — ChangeRecord: the persistent unit of change management
// (spec §3.2). State transitions delegate to `ChangeStatus::can_transition_to`
// (cie-core::types), the same "state enum owns its own legality check"
// shape as the teacher's `GoalRunState::can_transition_to`, rather than
// duplicating the matrix in this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{
    ChangeAction, ChangeId, ChangeStatus, ChangeType, CieError, Environment, NodeId, RiskLevel,
};
use cie_impact::ImpactSnapshot;

use crate::approval::Approval;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ChangeId,
    pub title: String,
    pub change_type: ChangeType,
    pub action: ChangeAction,
    pub environment: Environment,
    pub description: String,
    #[serde(default)]
    pub execution_plan: String,
    #[serde(default)]
    pub rollback_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window_end: Option<DateTime<Utc>>,
    pub target_components: Vec<NodeId>,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_snapshot: Option<ImpactSnapshot>,
    /// Embedded per §5.1's "approvals are stored embedded on the change
    /// record, per §3.3's `change_id` foreign key" — one `Mutex` over the
    /// whole record covers approval decisions too.
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

impl ChangeRecord {
    /// `target_components` may be empty here: spec §3.2 only requires it
    /// non-empty "for any status > Draft", and every record starts in
    /// Draft, to be filled in later via `edit_targets` (spec §4.W "author
    /// edit still allowed while Draft or Pending"). The non-empty
    /// invariant is enforced in `transition()`, at the point a record
    /// actually leaves Draft.
    pub fn new(
        id: ChangeId,
        title: impl Into<String>,
        change_type: ChangeType,
        action: ChangeAction,
        environment: Environment,
        target_components: Vec<NodeId>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, CieError> {
        change_type.validate_action(action)?;
        Ok(Self {
            id,
            title: title.into(),
            change_type,
            action,
            environment,
            description: String::new(),
            execution_plan: String::new(),
            rollback_plan: String::new(),
            maintenance_window_start: None,
            maintenance_window_end: None,
            target_components,
            status: ChangeStatus::Draft,
            risk_score: None,
            risk_level: None,
            reject_reason: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            impact_snapshot: None,
            approvals: Vec::new(),
        })
    }

    /// Validate and set the maintenance window (spec §3.2 "start < end").
    pub fn set_maintenance_window(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), CieError> {
        if start >= end {
            return Err(CieError::Validation(
                "maintenance window start must be before end".to_string(),
            ));
        }
        self.maintenance_window_start = Some(start);
        self.maintenance_window_end = Some(end);
        Ok(())
    }

    pub fn is_within_maintenance_window(&self, now: DateTime<Utc>) -> bool {
        match (self.maintenance_window_start, self.maintenance_window_end) {
            (Some(start), Some(end)) => now >= start && now <= end,
            _ => true,
        }
    }

    /// Drive this record to `next`, validating the transition against
    /// `ChangeStatus::can_transition_to`, the invariant that
    /// `target_components` is non-empty for any status beyond Draft, and
    /// the invariant that Analyzing-or-later statuses carry a risk score
    /// and impact snapshot (spec §3.2).
    pub fn transition(&mut self, next: ChangeStatus, now: DateTime<Utc>) -> Result<(), CieError> {
        if !self.status.can_transition_to(next) {
            return Err(CieError::TransitionForbidden {
                change_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        if next != ChangeStatus::Draft && self.target_components.is_empty() {
            return Err(CieError::Validation(format!(
                "change {} cannot leave Draft with empty target_components",
                self.id
            )));
        }
        if next.requires_analysis() && (self.risk_score.is_none() || self.impact_snapshot.is_none())
        {
            return Err(CieError::Validation(format!(
                "change {} cannot enter {:?} without a risk score and impact snapshot",
                self.id, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the record is immutable except for audit linkage (spec
    /// §3.2 "once Completed or RolledBack").
    pub fn is_immutable(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn record_impact(&mut self, snapshot: ImpactSnapshot, now: DateTime<Utc>) {
        self.impact_snapshot = Some(snapshot);
        self.updated_at = now;
    }

    pub fn record_risk(&mut self, score: u8, level: RiskLevel, now: DateTime<Utc>) {
        self.risk_score = Some(score);
        self.risk_level = Some(level);
        self.updated_at = now;
    }

    /// Invalidate the cached impact/risk values, e.g. because
    /// `target_components` or `action` changed (spec §4.I "Caching").
    pub fn invalidate_analysis(&mut self, now: DateTime<Utc>) {
        self.impact_snapshot = None;
        self.risk_score = None;
        self.risk_level = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::Environment;

    fn sample() -> ChangeRecord {
        ChangeRecord::new(
            ChangeId::generate(1_700_000_000_000),
            "Open port 443",
            ChangeType::Firewall,
            ChangeAction::AddRule,
            Environment::Prod,
            vec![NodeId::from("fw-1")],
            "alice",
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_record_starts_in_draft() {
        let record = sample();
        assert_eq!(record.status, ChangeStatus::Draft);
        assert!(record.risk_score.is_none());
    }

    #[test]
    fn new_record_rejects_action_not_allowed_for_type() {
        let err = ChangeRecord::new(
            ChangeId::generate(1_700_000_000_000),
            "bad",
            ChangeType::Firewall,
            ChangeAction::DeleteVlan,
            Environment::Prod,
            vec![NodeId::from("fw-1")],
            "alice",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, CieError::Validation(_)));
    }

    #[test]
    fn new_record_allows_empty_targets_while_draft() {
        let record = ChangeRecord::new(
            ChangeId::generate(1_700_000_000_000),
            "bad",
            ChangeType::Firewall,
            ChangeAction::AddRule,
            Environment::Prod,
            vec![],
            "alice",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.status, ChangeStatus::Draft);
        assert!(record.target_components.is_empty());
    }

    #[test]
    fn transition_out_of_draft_rejects_empty_targets() {
        let mut record = ChangeRecord::new(
            ChangeId::generate(1_700_000_000_000),
            "bad",
            ChangeType::Firewall,
            ChangeAction::AddRule,
            Environment::Prod,
            vec![],
            "alice",
            Utc::now(),
        )
        .unwrap();
        let err = record
            .transition(ChangeStatus::Pending, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CieError::Validation(_)));
    }

    #[test]
    fn transition_to_analyzing_requires_risk_and_impact() {
        let mut record = sample();
        record.transition(ChangeStatus::Pending, Utc::now()).unwrap();
        let err = record
            .transition(ChangeStatus::Analyzing, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CieError::Validation(_)));
    }

    #[test]
    fn transition_skip_is_rejected() {
        let mut record = sample();
        let err = record
            .transition(ChangeStatus::Analyzing, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CieError::TransitionForbidden { .. }));
    }

    #[test]
    fn maintenance_window_requires_start_before_end() {
        let mut record = sample();
        let now = Utc::now();
        let err = record.set_maintenance_window(now, now).unwrap_err();
        assert!(matches!(err, CieError::Validation(_)));
    }

    #[test]
    fn terminal_status_is_immutable() {
        let mut record = sample();
        record.status = ChangeStatus::Completed;
        assert!(record.is_immutable());
    }
}
