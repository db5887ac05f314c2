// condition.rs — the Policy record and its tagged condition schema (spec
// §3.4/§4.P). Every recognized key is a named field rather than a
// free-form map, so an unrecognized key fails at deserialization instead
// of silently doing nothing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{ChangeType, Environment};

/// Day of week, independent of `chrono::Weekday` so the wire format stays
/// ours to control. Maintenance/blocked-day windows are always evaluated
/// in UTC (see DESIGN.md's maintenance-window open question decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

/// What kind of rule a policy encodes. Drives which predicate
/// `PolicyEngine::evaluate` applies once scope and the immediate-block
/// keys have been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRuleType {
    TimeRestriction,
    DoubleValidation,
    AutoBlock,
}

/// The verdict a triggered policy asks for, before severity reduction
/// across the whole policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Warn,
    Block,
    RequireDoubleApproval,
}

/// Condition schema, spec §4.P. Empty/missing on any axis means "no
/// constraint on that axis" — `#[serde(default)]` on the whole struct
/// means a policy only needs to specify the keys it cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyCondition {
    pub environments: HashSet<Environment>,
    pub change_types: HashSet<ChangeType>,
    pub blocked_hours_start: Option<u8>,
    pub blocked_hours_end: Option<u8>,
    pub blocked_days: HashSet<Weekday>,
    pub required_approvals: Option<u32>,
    pub block_any_any_rules: bool,
    pub block_environments: HashSet<Environment>,
    pub block_change_types: HashSet<ChangeType>,
}

/// A stored policy record, spec §3.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub rule_type: PolicyRuleType,
    pub condition: PolicyCondition,
    pub action: PolicyAction,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: PolicyRuleType,
        condition: PolicyCondition,
        action: PolicyAction,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rule_type,
            condition,
            action,
            enabled: true,
            created_at: now,
            last_triggered_at: None,
        }
    }

    /// Record that this policy's condition matched a change, for audit
    /// and for `GET /policies` callers wanting "last triggered" visibility.
    pub fn mark_triggered(&mut self, now: DateTime<Utc>) {
        self.last_triggered_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_defaults_constrain_nothing() {
        let condition = PolicyCondition::default();
        assert!(condition.environments.is_empty());
        assert!(condition.change_types.is_empty());
        assert!(!condition.block_any_any_rules);
    }

    #[test]
    fn condition_round_trips_through_json() {
        let mut condition = PolicyCondition::default();
        condition.environments.insert(Environment::Prod);
        condition.blocked_hours_start = Some(9);
        condition.blocked_hours_end = Some(17);
        let json = serde_json::to_string(&condition).unwrap();
        let back: PolicyCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blocked_hours_start, Some(9));
        assert!(back.environments.contains(&Environment::Prod));
    }
}
