// types.rs — closed enums shared across graph, store, policy, and workflow.
//
// Every enum here is a closed, serde-tagged sum type: unknown values are
// rejected at deserialization rather than tolerated as free-form strings,
// per the "duck-typed payloads -> tagged sum types" design note.

use serde::{Deserialize, Serialize};

use crate::error::CieError;

/// Deployment environment a node or change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Prod,
    Preprod,
    Dc1,
    Dc2,
}

/// Business criticality, ordered low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

/// The category of infrastructure a change request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Firewall,
    Switch,
    Vlan,
    Port,
    Rack,
    CloudSg,
}

/// The action a change performs, bit-exact per spec §6.
///
/// Not every action is valid for every `ChangeType` — `valid_for` encodes
/// the per-type allow-list the workflow controller checks on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    AddRule,
    RemoveRule,
    ModifyRule,
    DisableRule,
    ConfigChange,
    RebootDevice,
    FirmwareUpgrade,
    Decommission,
    DisablePort,
    EnablePort,
    ShutdownInterface,
    ChangeVlan,
    DeleteVlan,
    ModifyVlan,
    ModifySg,
    DeleteSg,
}

impl ChangeType {
    /// The actions allowed for this change type, per spec §6's enum table.
    pub fn allowed_actions(self) -> &'static [ChangeAction] {
        use ChangeAction::*;
        match self {
            ChangeType::Firewall => &[
                AddRule,
                RemoveRule,
                ModifyRule,
                DisableRule,
                ConfigChange,
                RebootDevice,
                FirmwareUpgrade,
                Decommission,
            ],
            ChangeType::Switch => &[
                DisablePort,
                EnablePort,
                ShutdownInterface,
                ChangeVlan,
                ConfigChange,
                RebootDevice,
                FirmwareUpgrade,
                Decommission,
            ],
            ChangeType::Vlan => &[ChangeVlan, DeleteVlan, ModifyVlan],
            ChangeType::Port => &[DisablePort, EnablePort, ShutdownInterface],
            ChangeType::Rack => &[Decommission, ConfigChange],
            ChangeType::CloudSg => &[ModifySg, DeleteSg],
        }
    }

    /// Validate that `action` is legal for this change type.
    pub fn validate_action(self, action: ChangeAction) -> Result<(), CieError> {
        if self.allowed_actions().contains(&action) {
            Ok(())
        } else {
            Err(CieError::Validation(format!(
                "action {action:?} is not valid for change type {self:?}"
            )))
        }
    }
}

/// The role required to decide a given approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRole {
    Admin,
    NetworkLead,
    SecurityLead,
    DcManager,
    Approver,
}

impl ApprovalRole {
    /// Total order used when a policy's `require_double_approval` verdict
    /// needs to identify "the highest-role approval already present"
    /// (spec §4.W "Approval derivation").
    fn rank(self) -> u8 {
        match self {
            ApprovalRole::Approver => 0,
            ApprovalRole::NetworkLead => 1,
            ApprovalRole::DcManager => 2,
            ApprovalRole::Admin => 3,
            ApprovalRole::SecurityLead => 4,
        }
    }

    /// Return the higher-ranked of two roles.
    pub fn highest(roles: &[ApprovalRole]) -> Option<ApprovalRole> {
        roles.iter().copied().max_by_key(|r| r.rank())
    }
}

/// The decision state of a single approval row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    /// Past `expires_at` with no decision; counts as Rejected for quorum
    /// purposes per spec §4.W "Expiration".
    Expired,
}

/// The lifecycle status of a change record (spec §4.W state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Draft,
    Pending,
    Analyzing,
    Approved,
    Executing,
    Completed,
    Rejected,
    RolledBack,
}

impl ChangeStatus {
    /// Whether a change in this status must carry a non-null risk score
    /// and impact snapshot (spec §3.2 invariant "non-null whenever status
    /// >= Analyzing").
    pub fn requires_analysis(self) -> bool {
        !matches!(self, ChangeStatus::Draft | ChangeStatus::Pending)
    }

    /// Whether the record is immutable except for audit linkage (spec §3.2
    /// "once Completed or RolledBack, the record is immutable").
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeStatus::Completed | ChangeStatus::RolledBack)
    }

    /// Check whether transitioning from this status to `next` is legal,
    /// per the state machine diagram in spec §4.W.
    pub fn can_transition_to(self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Analyzing)
                | (Analyzing, Approved)
                | (Analyzing, Rejected)
                | (Approved, Executing)
                | (Executing, Completed)
                | (Executing, RolledBack)
        )
    }
}

/// The qualitative risk bucket derived from the 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a clipped 0-100 score onto its risk level, per spec §4.K's
    /// banding table.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=30 => RiskLevel::Low,
            31..=55 => RiskLevel::Medium,
            56..=75 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Base approval roles required before any policy/topology-driven
    /// additions, per spec §4.W "Approval derivation".
    pub fn base_approval_roles(self) -> Vec<ApprovalRole> {
        match self {
            RiskLevel::Low => vec![],
            RiskLevel::Medium => vec![ApprovalRole::Approver],
            RiskLevel::High => vec![ApprovalRole::NetworkLead],
            RiskLevel::Critical => vec![ApprovalRole::Admin, ApprovalRole::SecurityLead],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firewall_allows_add_rule_but_not_delete_vlan() {
        assert!(ChangeType::Firewall
            .validate_action(ChangeAction::AddRule)
            .is_ok());
        assert!(ChangeType::Firewall
            .validate_action(ChangeAction::DeleteVlan)
            .is_err());
    }

    #[test]
    fn vlan_change_type_rejects_port_actions() {
        assert!(ChangeType::Vlan
            .validate_action(ChangeAction::DisablePort)
            .is_err());
    }

    #[test]
    fn risk_level_banding_matches_spec_table() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(31), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(55), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(56), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(76), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn change_status_follows_the_spec_diagram() {
        assert!(ChangeStatus::Draft.can_transition_to(ChangeStatus::Pending));
        assert!(ChangeStatus::Pending.can_transition_to(ChangeStatus::Analyzing));
        assert!(ChangeStatus::Analyzing.can_transition_to(ChangeStatus::Approved));
        assert!(ChangeStatus::Analyzing.can_transition_to(ChangeStatus::Rejected));
        assert!(ChangeStatus::Approved.can_transition_to(ChangeStatus::Executing));
        assert!(ChangeStatus::Executing.can_transition_to(ChangeStatus::Completed));
        assert!(ChangeStatus::Executing.can_transition_to(ChangeStatus::RolledBack));
    }

    #[test]
    fn change_status_rejects_skipping_stages() {
        assert!(!ChangeStatus::Draft.can_transition_to(ChangeStatus::Analyzing));
        assert!(!ChangeStatus::Pending.can_transition_to(ChangeStatus::Approved));
        assert!(!ChangeStatus::Completed.can_transition_to(ChangeStatus::Executing));
    }

    #[test]
    fn approval_role_highest_picks_admin_over_approver() {
        let roles = [ApprovalRole::Approver, ApprovalRole::Admin, ApprovalRole::NetworkLead];
        assert_eq!(ApprovalRole::highest(&roles), Some(ApprovalRole::Admin));
    }

    #[test]
    fn critical_risk_level_requires_admin_and_security_lead() {
        let roles = RiskLevel::Critical.base_approval_roles();
        assert!(roles.contains(&ApprovalRole::Admin));
        assert!(roles.contains(&ApprovalRole::SecurityLead));
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ChangeType::CloudSg).unwrap(),
            "\"cloud_sg\""
        );
        assert_eq!(
            serde_json::to_string(&ApprovalRole::DcManager).unwrap(),
            "\"dc_manager\""
        );
    }
}
