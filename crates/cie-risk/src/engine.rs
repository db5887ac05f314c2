// engine.rs — RiskEngine: additive factor scoring + clipping (spec §4.K).
//
// Grounded on `ta-policy/src/engine.rs`'s `evaluate`/`evaluate_with_trace`
// pair: `calculate` returns just the score, `calculate_with_breakdown`
// returns the score alongside the ordered list of factors that produced
// it, the same "decision plus trace" split. Determinism (spec §8
// property 4) falls out of the function being a pure read of its
// arguments — no internal clock, no hidden state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cie_core::{ChangeAction, Criticality, Environment, RiskConfig, RiskLevel};
use cie_graph::{GraphSnapshot, NodeKind};
use cie_impact::ImpactSnapshot;
use cie_store::ChangeRecord;

/// One factor the engine evaluated, applied or not, with the delta it
/// contributed. Carried in the `risk_calculated` audit entry's `details`
/// so a score can be explained after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: &'static str,
    pub delta: i32,
    pub applied: bool,
}

/// The full inputs a risk calculation reads — bundled so the audit trail
/// can capture exactly what was used to reproduce a score later (spec
/// §4.K "Determinism").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskInput {
    pub environment: Environment,
    pub action: ChangeAction,
    pub has_rollback_plan: bool,
    pub within_maintenance_window: bool,
    pub prior_incident_within_90d: bool,
    pub total_dependency_count: usize,
    pub core_device_touched: bool,
    pub any_any_rule_involved: bool,
    pub distinct_critical_apps: usize,
    pub all_critical_services_redundant: bool,
    pub only_low_criticality_targets: bool,
    pub clock: DateTime<Utc>,
}

/// The result of one risk calculation: the clipped score, its qualitative
/// level, and the ordered factor trace that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub clock: DateTime<Utc>,
}

pub struct RiskEngine<'a> {
    config: &'a RiskConfig,
}

impl<'a> RiskEngine<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    /// Build a `RiskInput` by reading the change record, its impact
    /// snapshot, and the topology graph it was analyzed against. Kept
    /// separate from `score` so the pure scoring function can be unit
    /// tested against literal inputs without constructing a graph.
    pub fn input_for(
        change: &ChangeRecord,
        impact: &ImpactSnapshot,
        graph: &GraphSnapshot,
        prior_incident_within_90d: bool,
        now: DateTime<Utc>,
    ) -> RiskInput {
        let data = graph.data();
        let known_targets: Vec<&cie_core::NodeId> = change
            .target_components
            .iter()
            .filter(|id| !impact.unknown_targets.contains(id))
            .collect();

        let core_device_touched = known_targets
            .iter()
            .filter_map(|id| data.node(id))
            .any(|n| n.is_core);

        let any_any_rule_involved = known_targets
            .iter()
            .filter_map(|id| data.node(id))
            .any(|n| n.kind.is_any_any_rule());

        let distinct_critical_apps = impact
            .affected_applications
            .iter()
            .chain(impact.affected_services.iter())
            .filter_map(|id| data.node(id))
            .filter(|n| n.criticality == Some(Criticality::Critical))
            .count();

        let only_low_criticality_targets = !known_targets.is_empty()
            && known_targets
                .iter()
                .filter_map(|id| data.node(id))
                .all(|n| n.criticality == Some(Criticality::Low));

        RiskInput {
            environment: change.environment,
            action: change.action,
            has_rollback_plan: !change.rollback_plan.trim().is_empty(),
            within_maintenance_window: change.is_within_maintenance_window(now),
            prior_incident_within_90d,
            total_dependency_count: impact.total_dependency_count,
            core_device_touched,
            any_any_rule_involved,
            distinct_critical_apps,
            all_critical_services_redundant: impact.all_critical_services_redundant(),
            only_low_criticality_targets,
            clock: now,
        }
    }

    /// Score `input`, clip to the configured range, and band into a
    /// `RiskLevel` (spec §4.K's additive table).
    pub fn calculate(&self, input: &RiskInput) -> RiskBreakdown {
        let mut factors = Vec::new();
        let mut total: i32 = 0;

        let mut apply = |name: &'static str, delta: i32, applied: bool| {
            if applied {
                total += delta;
            }
            factors.push(RiskFactor { name, delta, applied });
        };

        apply("prod_environment", 30, input.environment == Environment::Prod);
        apply("core_device_touched", 40, input.core_device_touched);
        apply(
            "more_than_10_dependencies",
            20,
            input.total_dependency_count > 10,
        );
        apply("no_rollback_plan", 25, !input.has_rollback_plan);
        apply(
            "outside_maintenance_window",
            30,
            !input.within_maintenance_window,
        );
        apply(
            "prior_incident_within_90d",
            15,
            input.prior_incident_within_90d,
        );

        // +20 per distinct critical app/service, capped at +40 (spec §4.K).
        let critical_app_delta = (input.distinct_critical_apps.min(2) as i32) * 20;
        apply(
            "affects_critical_application",
            critical_app_delta,
            input.distinct_critical_apps > 0,
        );

        apply("any_any_rule_involved", 25, input.any_any_rule_involved);

        apply(
            "redundancy_for_all_critical_services",
            -10,
            input.all_critical_services_redundant,
        );
        apply(
            "add_rule_low_criticality_only",
            -5,
            input.action == ChangeAction::AddRule && input.only_low_criticality_targets,
        );

        let clipped = total
            .clamp(self.config.clip_min as i32, self.config.clip_max as i32) as u8;
        let level = RiskLevel::from_score(clipped);

        tracing::info!(score = clipped, ?level, "risk calculated");

        RiskBreakdown {
            score: clipped,
            level,
            factors,
            clock: input.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_input() -> RiskInput {
        RiskInput {
            environment: Environment::Preprod,
            action: ChangeAction::ConfigChange,
            has_rollback_plan: true,
            within_maintenance_window: true,
            prior_incident_within_90d: false,
            total_dependency_count: 0,
            core_device_touched: false,
            any_any_rule_involved: false,
            distinct_critical_apps: 0,
            all_critical_services_redundant: false,
            only_low_criticality_targets: false,
            clock: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn scenario_a_decommission_primary_dc1_firewall_caps_at_100() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let input = RiskInput {
            environment: Environment::Prod,
            action: ChangeAction::Decommission,
            has_rollback_plan: false,
            within_maintenance_window: false,
            core_device_touched: true,
            distinct_critical_apps: 3,
            ..base_input()
        };
        let breakdown = engine.calculate(&input);
        assert_eq!(breakdown.score, 100);
        assert_eq!(breakdown.level, RiskLevel::Critical);
    }

    #[test]
    fn scenario_c_add_rule_low_criticality_scores_low() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let input = RiskInput {
            environment: Environment::Preprod,
            action: ChangeAction::AddRule,
            has_rollback_plan: true,
            within_maintenance_window: true,
            only_low_criticality_targets: true,
            ..base_input()
        };
        let breakdown = engine.calculate(&input);
        assert!(breakdown.score <= 30);
        assert_eq!(breakdown.level, RiskLevel::Low);
    }

    #[test]
    fn score_never_exceeds_configured_clip() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let input = RiskInput {
            environment: Environment::Prod,
            core_device_touched: true,
            total_dependency_count: 50,
            has_rollback_plan: false,
            within_maintenance_window: false,
            prior_incident_within_90d: true,
            distinct_critical_apps: 10,
            any_any_rule_involved: true,
            ..base_input()
        };
        let breakdown = engine.calculate(&input);
        assert!(breakdown.score <= 100);
    }

    #[test]
    fn score_never_goes_below_clip_min() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let input = RiskInput {
            action: ChangeAction::AddRule,
            only_low_criticality_targets: true,
            all_critical_services_redundant: true,
            ..base_input()
        };
        let breakdown = engine.calculate(&input);
        assert!(breakdown.score >= config.clip_min);
    }

    #[test]
    fn determinism_same_input_same_score() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let input = base_input();
        let first = engine.calculate(&input);
        let second = engine.calculate(&input);
        assert_eq!(first.score, second.score);
        assert_eq!(first.level, second.level);
    }

    #[test]
    fn critical_app_bonus_caps_at_two_apps() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let two_apps = RiskInput {
            distinct_critical_apps: 2,
            ..base_input()
        };
        let five_apps = RiskInput {
            distinct_critical_apps: 5,
            ..base_input()
        };
        assert_eq!(
            engine.calculate(&two_apps).score,
            engine.calculate(&five_apps).score
        );
    }

    #[test]
    fn redundancy_discount_lowers_score() {
        let config = RiskConfig::default();
        let engine = RiskEngine::new(&config);
        let without_discount = RiskInput {
            environment: Environment::Prod,
            ..base_input()
        };
        let with_discount = RiskInput {
            environment: Environment::Prod,
            all_critical_services_redundant: true,
            ..base_input()
        };
        assert!(engine.calculate(&with_discount).score < engine.calculate(&without_discount).score);
    }
}
