// engine.rs — PolicyEngine::evaluate: runs every enabled policy against a
// change and reduces to the single most severe verdict.
//
// Grounded on `ta-policy/src/engine.rs`'s `evaluate`/`evaluate_with_trace`
// split: here, `evaluate` always returns the trace (`PolicyEvaluation`)
// since a blocked submission needs the triggering policy names to explain
// itself in the error, not just a bool.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{ChangeAction, ChangeType, CieError, Environment};

use crate::condition::{Policy, PolicyAction, PolicyCondition, PolicyRuleType, Weekday};

/// Severity order matches spec §4.P exactly: declaration order here is
/// ascending severity, so `Ord::max` over triggered verdicts picks the
/// most severe one without a separate rank table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyVerdict {
    Ignore,
    Warn,
    RequireDoubleApproval,
    Block,
}

fn verdict_from_action(action: PolicyAction) -> PolicyVerdict {
    match action {
        PolicyAction::Warn => PolicyVerdict::Warn,
        PolicyAction::Block => PolicyVerdict::Block,
        PolicyAction::RequireDoubleApproval => PolicyVerdict::RequireDoubleApproval,
    }
}

/// One policy that matched, with the reason it fired. Carried in the
/// `policy_evaluated` audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredPolicy {
    pub policy_id: String,
    pub policy_name: String,
    pub verdict: PolicyVerdict,
    pub reason: String,
}

/// The inputs a policy evaluation reads about the change under review.
#[derive(Debug, Clone)]
pub struct PolicyEvalInput {
    pub environment: Environment,
    pub change_type: ChangeType,
    pub action: ChangeAction,
    pub any_any_rule_involved: bool,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub verdict: PolicyVerdict,
    pub triggered: Vec<TriggeredPolicy>,
}

impl PolicyEvaluation {
    /// The names of every policy that contributed the winning verdict,
    /// for the `PolicyBlocked`/`PolicyRequiresDoubleApproval` error.
    pub fn names_at(&self, verdict: PolicyVerdict) -> Vec<String> {
        self.triggered
            .iter()
            .filter(|t| t.verdict == verdict)
            .map(|t| t.policy_name.clone())
            .collect()
    }

    /// Turn a `Block` verdict into the workflow-facing error, or `None`
    /// if the change is not blocked.
    pub fn blocking_error(&self) -> Option<CieError> {
        if self.verdict != PolicyVerdict::Block {
            return None;
        }
        let (policies, reasons) = self
            .triggered
            .iter()
            .filter(|t| t.verdict == PolicyVerdict::Block)
            .map(|t| (t.policy_name.clone(), t.reason.clone()))
            .unzip();
        Some(CieError::PolicyBlocked { policies, reasons })
    }
}

fn scope_matches(condition: &PolicyCondition, input: &PolicyEvalInput) -> bool {
    (condition.environments.is_empty() || condition.environments.contains(&input.environment))
        && (condition.change_types.is_empty()
            || condition.change_types.contains(&input.change_type))
}

fn hour_in_window(hour: u8, start: u8, end: u8) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

fn time_restriction_triggers(condition: &PolicyCondition, now: DateTime<Utc>) -> Option<String> {
    if let (Some(start), Some(end)) = (condition.blocked_hours_start, condition.blocked_hours_end)
    {
        let hour = now.hour() as u8;
        if hour_in_window(hour, start, end) {
            return Some(format!(
                "submitted at {hour:02}:00 UTC, inside the restricted {start:02}-{end:02} window"
            ));
        }
    }
    if !condition.blocked_days.is_empty() {
        let weekday = Weekday::from(now.weekday());
        if condition.blocked_days.contains(&weekday) {
            return Some(format!("submitted on a restricted day ({weekday:?})"));
        }
    }
    None
}

/// Evaluate one policy against `input`, returning its verdict and the
/// reason it fired, or `None` if it does not apply.
fn evaluate_one(policy: &Policy, input: &PolicyEvalInput) -> Option<(PolicyVerdict, String)> {
    if !policy.enabled || !scope_matches(&policy.condition, input) {
        return None;
    }

    // The three "immediate block" keys apply regardless of rule_type —
    // they are a blunt override shared across the condition schema.
    if policy.condition.block_environments.contains(&input.environment) {
        return Some((
            PolicyVerdict::Block,
            format!("{:?} is in this policy's blocked environment list", input.environment),
        ));
    }
    if policy.condition.block_change_types.contains(&input.change_type) {
        return Some((
            PolicyVerdict::Block,
            format!("{:?} is in this policy's blocked change type list", input.change_type),
        ));
    }
    if policy.condition.block_any_any_rules && input.any_any_rule_involved {
        return Some((
            PolicyVerdict::Block,
            "an ANY-ANY rule is involved and this policy blocks those".to_string(),
        ));
    }

    match policy.rule_type {
        PolicyRuleType::TimeRestriction => {
            time_restriction_triggers(&policy.condition, input.now)
                .map(|reason| (verdict_from_action(policy.action), reason))
        }
        PolicyRuleType::DoubleValidation => {
            if policy.condition.required_approvals.is_some() {
                Some((
                    PolicyVerdict::RequireDoubleApproval,
                    "policy requires double validation for changes in scope".to_string(),
                ))
            } else {
                None
            }
        }
        PolicyRuleType::AutoBlock => Some((
            verdict_from_action(policy.action),
            "change matches this policy's scope".to_string(),
        )),
    }
}

pub struct PolicyEngine;

impl PolicyEngine {
    /// Evaluate every enabled policy against `input` and reduce to the
    /// single most severe verdict (spec §4.P).
    pub fn evaluate(policies: &[Policy], input: &PolicyEvalInput) -> PolicyEvaluation {
        let mut verdict = PolicyVerdict::Ignore;
        let mut triggered = Vec::new();

        for policy in policies {
            if let Some((v, reason)) = evaluate_one(policy, input) {
                verdict = verdict.max(v);
                tracing::info!(policy = %policy.name, ?v, "policy triggered");
                triggered.push(TriggeredPolicy {
                    policy_id: policy.id.clone(),
                    policy_name: policy.name.clone(),
                    verdict: v,
                    reason,
                });
            }
        }

        PolicyEvaluation { verdict, triggered }
    }
}
