// approval.rs — Approval: a single approval slot on a change (spec §3.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{ApprovalId, ApprovalRole, ApprovalStatus, ChangeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub change_id: ChangeId,
    pub role_required: ApprovalRole,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(
        id: ApprovalId,
        change_id: ChangeId,
        role_required: ApprovalRole,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            change_id,
            role_required,
            status: ApprovalStatus::Pending,
            decided_by: None,
            decided_at: None,
            comment: None,
            expires_at,
        }
    }

    /// Mark this slot decided. Returns `false` if it was already decided
    /// (and thus left untouched) — callers translate that into
    /// `CieError::ApprovalAlreadyDecided`.
    pub fn decide(
        &mut self,
        status: ApprovalStatus,
        decided_by: impl Into<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status != ApprovalStatus::Pending {
            return false;
        }
        self.status = status;
        self.decided_by = Some(decided_by.into());
        self.decided_at = Some(now);
        self.comment = comment;
        true
    }

    /// Expire this slot if it is still pending and past its deadline
    /// (spec §4.W "Expiration" — expired counts as rejected for quorum).
    pub fn expire_if_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ApprovalStatus::Pending && now >= self.expires_at {
            self.status = ApprovalStatus::Expired;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Approval {
        Approval::new(
            ApprovalId(1),
            ChangeId::generate(1_700_000_000_000),
            ApprovalRole::NetworkLead,
            Utc::now() + Duration::hours(24),
        )
    }

    #[test]
    fn decide_sets_fields_once() {
        let mut approval = sample();
        let now = Utc::now();
        assert!(approval.decide(ApprovalStatus::Approved, "alice", None, now));
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.decided_by.as_deref(), Some("alice"));
    }

    #[test]
    fn decide_twice_loses_the_race() {
        let mut approval = sample();
        let now = Utc::now();
        assert!(approval.decide(ApprovalStatus::Approved, "alice", None, now));
        assert!(!approval.decide(ApprovalStatus::Rejected, "bob", None, now));
        assert_eq!(approval.status, ApprovalStatus::Approved);
    }

    #[test]
    fn expire_if_overdue_only_affects_pending() {
        let mut approval = sample();
        approval.expires_at = Utc::now() - Duration::hours(1);
        assert!(approval.expire_if_overdue(Utc::now()));
        assert_eq!(approval.status, ApprovalStatus::Expired);

        let mut decided = sample();
        decided.decide(ApprovalStatus::Approved, "alice", None, Utc::now());
        decided.expires_at = Utc::now() - Duration::hours(1);
        assert!(!decided.expire_if_overdue(Utc::now()));
    }
}
