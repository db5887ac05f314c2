// conflict.rs — pairwise policy conflict detection (spec §4.P, §8
// property 7: conflict detection is symmetric, conflicts(a, b) ==
// conflicts(b, a)).

use serde::{Deserialize, Serialize};

use cie_core::{ChangeType, Environment};

use crate::condition::{Policy, PolicyAction};

const ALL_ENVIRONMENTS: &[Environment] = &[
    Environment::Prod,
    Environment::Preprod,
    Environment::Dc1,
    Environment::Dc2,
];

const ALL_CHANGE_TYPES: &[ChangeType] = &[
    ChangeType::Firewall,
    ChangeType::Switch,
    ChangeType::Vlan,
    ChangeType::Port,
    ChangeType::Rack,
    ChangeType::CloudSg,
];

/// Two ways a pair of policies can disagree about the same change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// One policy would block a change the other would let pass with no
    /// approval at all.
    Overlap,
    /// One policy demands double approval where another is satisfied with
    /// a single approval, for the same scope.
    Precedence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConflict {
    pub policy_a: String,
    pub policy_b: String,
    pub conflict_type: ConflictType,
}

fn applicable_environments(condition_envs: &std::collections::HashSet<Environment>) -> Vec<Environment> {
    if condition_envs.is_empty() {
        ALL_ENVIRONMENTS.to_vec()
    } else {
        condition_envs.iter().copied().collect()
    }
}

fn applicable_change_types(condition_types: &std::collections::HashSet<ChangeType>) -> Vec<ChangeType> {
    if condition_types.is_empty() {
        ALL_CHANGE_TYPES.to_vec()
    } else {
        condition_types.iter().copied().collect()
    }
}

/// Whether `a` and `b`'s scopes share at least one (environment,
/// change_type) combination.
fn scope_overlaps(a: &Policy, b: &Policy) -> bool {
    let a_envs = applicable_environments(&a.condition.environments);
    let b_envs = applicable_environments(&b.condition.environments);
    let a_types = applicable_change_types(&a.condition.change_types);
    let b_types = applicable_change_types(&b.condition.change_types);

    a_envs.iter().any(|e| b_envs.contains(e)) && a_types.iter().any(|t| b_types.contains(t))
}

/// Classify the conflict between two policies, if any. Written so the
/// two directions of the check are identical in shape, which is what
/// makes `conflict_between(a, b) == conflict_between(b, a)` hold by
/// construction rather than by coincidence.
fn conflict_between(a: &Policy, b: &Policy) -> Option<ConflictType> {
    if !a.enabled || !b.enabled || !scope_overlaps(a, b) {
        return None;
    }

    let blocks = |p: &Policy| p.action == PolicyAction::Block;
    let auto_approves = |p: &Policy| p.action == PolicyAction::Warn;
    let requires_double = |p: &Policy| p.action == PolicyAction::RequireDoubleApproval;
    let single_approval_ok =
        |p: &Policy| p.action != PolicyAction::RequireDoubleApproval && p.action != PolicyAction::Block;

    if (blocks(a) && auto_approves(b)) || (blocks(b) && auto_approves(a)) {
        return Some(ConflictType::Overlap);
    }
    if (requires_double(a) && single_approval_ok(b)) || (requires_double(b) && single_approval_ok(a)) {
        return Some(ConflictType::Precedence);
    }
    None
}

/// All pairwise conflicts within a policy set.
pub fn conflicts(policies: &[Policy]) -> Vec<PolicyConflict> {
    let mut found = Vec::new();
    for i in 0..policies.len() {
        for j in (i + 1)..policies.len() {
            if let Some(conflict_type) = conflict_between(&policies[i], &policies[j]) {
                found.push(PolicyConflict {
                    policy_a: policies[i].id.clone(),
                    policy_b: policies[j].id.clone(),
                    conflict_type,
                });
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{PolicyCondition, PolicyRuleType};
    use chrono::Utc;

    fn policy(id: &str, action: PolicyAction, environments: &[Environment]) -> Policy {
        let mut condition = PolicyCondition::default();
        condition.environments = environments.iter().copied().collect();
        Policy::new(id, id, PolicyRuleType::AutoBlock, condition, action, Utc::now())
    }

    #[test]
    fn block_and_warn_over_same_scope_is_overlap() {
        let a = policy("a", PolicyAction::Block, &[Environment::Prod]);
        let b = policy("b", PolicyAction::Warn, &[Environment::Prod]);
        assert_eq!(conflict_between(&a, &b), Some(ConflictType::Overlap));
    }

    #[test]
    fn conflict_detection_is_symmetric() {
        let a = policy("a", PolicyAction::Block, &[Environment::Prod]);
        let b = policy("b", PolicyAction::Warn, &[Environment::Prod]);
        assert_eq!(conflict_between(&a, &b), conflict_between(&b, &a));

        let c = policy("c", PolicyAction::RequireDoubleApproval, &[Environment::Dc1]);
        let d = policy("d", PolicyAction::Warn, &[Environment::Dc1]);
        assert_eq!(conflict_between(&c, &d), conflict_between(&d, &c));

        let e = policy("e", PolicyAction::Block, &[Environment::Prod]);
        let f = policy("f", PolicyAction::Block, &[Environment::Dc2]);
        assert_eq!(conflict_between(&e, &f), conflict_between(&f, &e));
    }

    #[test]
    fn non_overlapping_scopes_never_conflict() {
        let a = policy("a", PolicyAction::Block, &[Environment::Prod]);
        let b = policy("b", PolicyAction::Warn, &[Environment::Dc1]);
        assert_eq!(conflict_between(&a, &b), None);
    }

    #[test]
    fn double_approval_vs_warn_over_same_scope_is_precedence() {
        let a = policy("a", PolicyAction::RequireDoubleApproval, &[Environment::Prod]);
        let b = policy("b", PolicyAction::Warn, &[Environment::Prod]);
        assert_eq!(conflict_between(&a, &b), Some(ConflictType::Precedence));
    }

    #[test]
    fn conflicts_over_a_policy_set_finds_every_pair() {
        let policies = vec![
            policy("a", PolicyAction::Block, &[Environment::Prod]),
            policy("b", PolicyAction::Warn, &[Environment::Prod]),
            policy("c", PolicyAction::Warn, &[Environment::Dc1]),
        ];
        let found = conflicts(&policies);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictType::Overlap);
    }
}
