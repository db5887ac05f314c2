// approvals.rs — approval-role derivation and the expiration reaper
// (spec §4.W "Approval derivation" and "Expiration").
//
// `derive_approval_roles` is a pure function so its outcome for scenario A
// (Admin + SecurityLead, doubled) can be asserted against literal inputs in
// `tests/scenarios.rs` without constructing a graph. The reaper walks the
// store the way `ta-goal::store`'s housekeeping passes do: read every
// record, mutate the ones that need it, persist, audit.

use chrono::{DateTime, Utc};
use serde_json::json;

use cie_audit::{AuditAction, AuditEntry, AuditJournal};
use cie_core::{ApprovalRole, ChangeAction, ChangeId, ChangeStatus, CieError, RiskLevel};
use cie_policy::PolicyVerdict;
use cie_store::ChangeStore;

/// Derive the approval roles required for a change, per spec §4.W.
///
/// `touches_switch_or_router` and `touches_firewall_rule_or_any_any` are
/// read off the topology by the caller (the controller, which already has
/// the graph snapshot in hand from impact analysis).
pub fn derive_approval_roles(
    risk_level: RiskLevel,
    policy_verdict: PolicyVerdict,
    action: ChangeAction,
    touches_switch_or_router: bool,
    touches_firewall_rule_or_any_any: bool,
) -> Vec<ApprovalRole> {
    let mut roles = risk_level.base_approval_roles();

    if touches_switch_or_router && !roles.contains(&ApprovalRole::NetworkLead) {
        roles.push(ApprovalRole::NetworkLead);
    }
    if touches_firewall_rule_or_any_any && !roles.contains(&ApprovalRole::SecurityLead) {
        roles.push(ApprovalRole::SecurityLead);
    }
    if action == ChangeAction::Decommission && !roles.contains(&ApprovalRole::DcManager) {
        roles.push(ApprovalRole::DcManager);
    }

    if policy_verdict == PolicyVerdict::RequireDoubleApproval {
        if let Some(highest) = ApprovalRole::highest(&roles) {
            roles.push(highest);
        }
    }

    roles
}

/// Expire any overdue pending approvals on one change, writing an
/// `approval_expired` audit entry per row expired. Returns the number of
/// rows expired.
pub fn reap_expired_approvals_for(
    store: &ChangeStore,
    audit: &AuditJournal,
    change_id: &ChangeId,
    now: DateTime<Utc>,
) -> Result<usize, CieError> {
    let expired_ids = store.mutate(change_id, |record| {
        let mut expired = Vec::new();
        for approval in record.approvals.iter_mut() {
            if approval.expire_if_overdue(now) {
                expired.push(approval.id);
            }
        }
        Ok(expired)
    })?;

    for approval_id in &expired_ids {
        let _ = audit.append(
            AuditEntry::new(AuditAction::ApprovalExpired)
                .with_change(change_id.clone())
                .with_details(json!({ "approval_id": approval_id.0 })),
        );
        tracing::warn!(%change_id, approval_id = approval_id.0, "approval expired");
    }

    Ok(expired_ids.len())
}

/// Sweep every change still awaiting a decision (Pending/Analyzing) for
/// overdue approvals. Run periodically by the daemon's reaper task.
pub fn reap_all_expired_approvals(
    store: &ChangeStore,
    audit: &AuditJournal,
    now: DateTime<Utc>,
) -> Result<usize, CieError> {
    let mut total = 0;
    for status in [ChangeStatus::Pending, ChangeStatus::Analyzing] {
        for record in store.list_by_status(status) {
            total += reap_expired_approvals_for(store, audit, &record.id, now)?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::ApprovalRole::*;

    #[test]
    fn scenario_a_decommission_core_firewall_doubles_highest_role() {
        let roles = derive_approval_roles(
            RiskLevel::Critical,
            PolicyVerdict::RequireDoubleApproval,
            ChangeAction::Decommission,
            false,
            true,
        );
        assert_eq!(roles.iter().filter(|r| **r == SecurityLead).count(), 2);
        assert!(roles.contains(&Admin));
        assert!(roles.contains(&DcManager));
    }

    #[test]
    fn low_risk_add_rule_needs_no_approvals() {
        let roles = derive_approval_roles(
            RiskLevel::Low,
            PolicyVerdict::Ignore,
            ChangeAction::AddRule,
            false,
            false,
        );
        assert!(roles.is_empty());
    }

    #[test]
    fn switch_target_adds_network_lead() {
        let roles = derive_approval_roles(
            RiskLevel::Medium,
            PolicyVerdict::Ignore,
            ChangeAction::ChangeVlan,
            true,
            false,
        );
        assert!(roles.contains(&NetworkLead));
        assert!(roles.contains(&Approver));
    }

    #[test]
    fn dedup_keeps_a_single_network_lead_when_already_the_base_role() {
        let roles = derive_approval_roles(
            RiskLevel::High,
            PolicyVerdict::Ignore,
            ChangeAction::ShutdownInterface,
            true,
            false,
        );
        assert_eq!(roles.iter().filter(|r| **r == NetworkLead).count(), 1);
    }
}
