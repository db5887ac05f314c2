// controller.rs — WorkflowController: the submit/approve/execute/rollback
// orchestrator (spec §4.W).
//
// Grounded on `ta_goal::goal_run::GoalRun`'s "state enum owns the legality
// check, the orchestrator owns the pipeline" shape, generalized to a
// pipeline with four collaborators (impact, policy, risk, approvals)
// instead of one. Every persisted mutation goes through
// `ChangeStore::mutate`, so the read-modify-write for a single change is
// one critical section even when this controller's own logic spans
// several steps around it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;

use cie_audit::{AuditAction, AuditEntry, AuditJournal};
use cie_core::{
    ApprovalStatus, ChangeAction, ChangeId, ChangeStatus, ChangeType, CieError, EngineConfig,
    NodeId,
};
use cie_graph::{DeviceKind, GraphStore, NodeKind};
use cie_impact::ImpactAnalyzer;
use cie_policy::{Policy, PolicyEngine, PolicyEvalInput, PolicyVerdict};
use cie_risk::RiskEngine;
use cie_store::{ChangeRecord, ChangeStore};

use crate::approvals::derive_approval_roles;
use crate::cancellation::CancellationToken;

/// Orchestrates one change record's lifecycle against the graph, impact,
/// risk, and policy engines, plus the audit journal (spec §4.W).
///
/// Holds no per-change state beyond the in-flight cancellation registry:
/// everything else lives in `store`/`audit`/`graph`, so a `WorkflowController`
/// can be cheaply constructed per request the way the teacher's service
/// handlers construct short-lived collaborators around long-lived stores.
pub struct WorkflowController {
    graph: Arc<GraphStore>,
    store: Arc<ChangeStore>,
    audit: Arc<AuditJournal>,
    config: EngineConfig,
    in_flight: RwLock<HashMap<ChangeId, CancellationToken>>,
}

fn touches_switch_or_router(
    store: &cie_graph::GraphData,
    targets: &[NodeId],
) -> bool {
    targets.iter().filter_map(|id| store.node(id)).any(|n| {
        matches!(
            n.kind,
            NodeKind::Device {
                device_kind: DeviceKind::Switch | DeviceKind::Router,
                ..
            }
        )
    })
}

/// Whether a firewall rule is directly in play: either a target itself is
/// a pre-existing `Rule` node (remove/modify/disable of an existing rule),
/// or the impact traversal reached an ANY-ANY rule downstream. A plain
/// `add_rule` against a device target — the new rule has no node yet —
/// does not trigger this on its own (spec §8 scenario C).
fn touches_firewall_rule_or_any_any(
    data: &cie_graph::GraphData,
    targets: &[NodeId],
    impact: &cie_impact::ImpactSnapshot,
) -> bool {
    let target_is_rule = targets
        .iter()
        .filter_map(|id| data.node(id))
        .any(|n| matches!(n.kind, NodeKind::Rule { .. }));
    let any_any_reached = impact
        .directly_impacted
        .iter()
        .chain(impact.indirectly_impacted.iter())
        .filter_map(|id| data.node(id))
        .any(|n| n.kind.is_any_any_rule());
    target_is_rule || any_any_reached
}

impl WorkflowController {
    pub fn new(
        graph: Arc<GraphStore>,
        store: Arc<ChangeStore>,
        audit: Arc<AuditJournal>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            store,
            audit,
            config,
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new Draft change and append its `created` audit entry.
    /// `target_components` may be empty here — spec §3.2 only requires it
    /// non-empty once the change leaves Draft — to be filled in later via
    /// `edit_targets`.
    pub fn create_draft(
        &self,
        id: ChangeId,
        title: impl Into<String>,
        change_type: ChangeType,
        action: ChangeAction,
        environment: cie_core::Environment,
        target_components: Vec<NodeId>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ChangeRecord, CieError> {
        let created_by = created_by.into();
        let record = ChangeRecord::new(
            id.clone(),
            title,
            change_type,
            action,
            environment,
            target_components,
            created_by.clone(),
            now,
        )?;
        self.store.insert(record.clone())?;
        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Created)
                .with_change(id)
                .with_user(created_by),
        );
        Ok(record)
    }

    fn begin_analysis(&self, change_id: &ChangeId, token: CancellationToken) {
        self.in_flight
            .write()
            .expect("workflow in-flight registry lock poisoned")
            .insert(change_id.clone(), token);
    }

    fn end_analysis(&self, change_id: &ChangeId) {
        self.in_flight
            .write()
            .expect("workflow in-flight registry lock poisoned")
            .remove(change_id);
    }

    /// Cancel the in-flight analysis for `change_id`, if any. Returns
    /// whether one was actually in flight and got cancelled.
    fn cancel_in_flight(&self, change_id: &ChangeId) -> bool {
        let guard = self
            .in_flight
            .read()
            .expect("workflow in-flight registry lock poisoned");
        if let Some(token) = guard.get(change_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Record an author edit to a change's targets/action while it is
    /// still Draft or Pending (spec §4.W diagram note). Invalidates any
    /// cached analysis and cancels an in-flight `submit`/`re_analyze` for
    /// this change, recording `analysis_superseded` if one was cancelled.
    pub fn edit_targets(
        &self,
        change_id: &ChangeId,
        new_targets: Option<Vec<NodeId>>,
        new_action: Option<ChangeAction>,
        now: DateTime<Utc>,
    ) -> Result<ChangeRecord, CieError> {
        self.store.mutate(change_id, |record| {
            if !matches!(record.status, ChangeStatus::Draft | ChangeStatus::Pending) {
                return Err(CieError::Validation(format!(
                    "change {} cannot be edited in status {:?}",
                    record.id, record.status
                )));
            }
            if let Some(targets) = new_targets {
                // Empty targets are only legal while still Draft (spec
                // §3.2: non-empty is required "for any status > Draft");
                // a Pending record already carries that invariant and
                // an edit cannot clear it back out.
                if targets.is_empty() && record.status != ChangeStatus::Draft {
                    return Err(CieError::Validation(
                        "target_components must be non-empty once a change has left Draft"
                            .to_string(),
                    ));
                }
                record.target_components = targets;
            }
            if let Some(action) = new_action {
                record.change_type.validate_action(action)?;
                record.action = action;
            }
            record.invalidate_analysis(now);
            Ok(())
        })?;

        if self.cancel_in_flight(change_id) {
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::AnalysisSuperseded).with_change(change_id.clone()),
            );
            tracing::info!(%change_id, "in-flight analysis superseded by edit");
        }

        self.store.get(change_id)
    }

    /// Run impact → policy → risk → approval derivation against the
    /// current graph snapshot, without persisting anything. Shared by
    /// `submit` and `re_analyze`.
    fn run_analysis(
        &self,
        record: &ChangeRecord,
        policies: &[Policy],
        prior_incident_within_90d: bool,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, CieError> {
        let snapshot = self.graph.snapshot();
        let data = snapshot.data();

        let impact =
            ImpactAnalyzer::new(&self.config.impact).analyze(&snapshot, record.action, &record.target_components)?;

        let firewall_or_any_any =
            touches_firewall_rule_or_any_any(data, &record.target_components, &impact);
        let switch_or_router = touches_switch_or_router(data, &record.target_components);

        let policy_input = PolicyEvalInput {
            environment: record.environment,
            change_type: record.change_type,
            action: record.action,
            any_any_rule_involved: firewall_or_any_any,
            now,
        };
        let policy_eval = PolicyEngine::evaluate(policies, &policy_input);

        let risk_input =
            RiskEngine::input_for(record, &impact, &snapshot, prior_incident_within_90d, now);
        let risk = RiskEngine::new(&self.config.risk).calculate(&risk_input);

        let approval_roles = derive_approval_roles(
            risk.level,
            policy_eval.verdict,
            record.action,
            switch_or_router,
            firewall_or_any_any,
        );

        Ok(AnalysisOutcome {
            impact,
            risk,
            policy_eval,
            approval_roles,
        })
    }

    /// `submit` (spec §4.W invariants i-vii): requires the change be in
    /// Draft; runs the full analysis pipeline; persists the snapshot,
    /// risk score, and derived approvals; transitions Pending then
    /// Analyzing (or straight to Approved when no approvals are needed,
    /// e.g. a Low-risk change with no topology/policy escalation).
    pub fn submit(
        &self,
        change_id: &ChangeId,
        policies: &[Policy],
        prior_incident_within_90d: bool,
        now: DateTime<Utc>,
        cancellation: &CancellationToken,
    ) -> Result<ChangeRecord, CieError> {
        let record = self.store.get(change_id)?;
        if record.status != ChangeStatus::Draft {
            return Err(CieError::TransitionForbidden {
                change_id: change_id.clone(),
                from: record.status,
                to: ChangeStatus::Pending,
            });
        }
        if record.target_components.is_empty() {
            return Err(CieError::Validation(
                "target_components must be non-empty".to_string(),
            ));
        }

        self.begin_analysis(change_id, cancellation.clone());
        let outcome = self.run_analysis(&record, policies, prior_incident_within_90d, now);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.end_analysis(change_id);
                return Err(err);
            }
        };

        if cancellation.is_cancelled() {
            self.end_analysis(change_id);
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::AnalysisSuperseded).with_change(change_id.clone()),
            );
            return Err(CieError::Validation(format!(
                "analysis for change {change_id} was superseded by a concurrent edit"
            )));
        }

        if let Some(blocking) = outcome.policy_eval.blocking_error() {
            self.end_analysis(change_id);
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::PolicyTriggered)
                    .with_change(change_id.clone())
                    .with_details(json!({
                        "verdict": "block",
                        "policies": outcome.policy_eval.names_at(PolicyVerdict::Block),
                    })),
            );
            return Err(blocking);
        }

        let approval_roles = outcome.approval_roles.clone();
        let risk = outcome.risk.clone();
        let impact = outcome.impact.clone();

        self.store.mutate(change_id, |r| {
            r.record_impact(impact.clone(), now);
            r.record_risk(risk.score, risk.level, now);
            r.transition(ChangeStatus::Pending, now)?;
            r.transition(ChangeStatus::Analyzing, now)?;
            Ok(())
        })?;

        for role in &approval_roles {
            self.store
                .add_approval(change_id, *role, self.config.approvals.timeout_hours as i64, now)?;
        }

        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Analyzed)
                .with_change(change_id.clone())
                .with_details(json!({
                    "traversal_strategy": impact.traversal_strategy,
                    "directly_impacted": impact.directly_impacted,
                    "total_dependency_count": impact.total_dependency_count,
                })),
        );
        let _ = self.audit.append(
            AuditEntry::new(AuditAction::RiskCalculated)
                .with_change(change_id.clone())
                .with_details(json!({
                    "score": risk.score,
                    "level": risk.level,
                    "clock": risk.clock,
                    "factors": risk.factors,
                })),
        );
        if !outcome.policy_eval.triggered.is_empty() {
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::PolicyTriggered)
                    .with_change(change_id.clone())
                    .with_details(json!({ "verdict": outcome.policy_eval.verdict })),
            );
        }
        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Submitted)
                .with_change(change_id.clone())
                .with_details(json!({ "approval_roles": approval_roles })),
        );

        self.end_analysis(change_id);

        if approval_roles.is_empty() {
            self.store
                .mutate(change_id, |r| r.transition(ChangeStatus::Approved, now))?;
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::Approved)
                    .with_change(change_id.clone())
                    .with_details(json!({ "auto_approved": true })),
            );
        }

        self.store.get(change_id)
    }

    /// Explicitly invalidate and recompute a change's impact/risk while it
    /// is still under review (spec §4.I "Caching" (a)). Leaves already
    /// decided approvals alone; only regenerates derivation if none of
    /// the current approvals have been decided yet, to avoid orphaning an
    /// audited decision mid-review.
    pub fn re_analyze(
        &self,
        change_id: &ChangeId,
        policies: &[Policy],
        prior_incident_within_90d: bool,
        now: DateTime<Utc>,
        cancellation: &CancellationToken,
    ) -> Result<ChangeRecord, CieError> {
        let record = self.store.get(change_id)?;
        if record.status != ChangeStatus::Analyzing {
            return Err(CieError::Validation(format!(
                "change {} cannot be re-analyzed in status {:?}",
                record.id, record.status
            )));
        }

        self.store
            .mutate(change_id, |r| {
                r.invalidate_analysis(now);
                Ok(())
            })?;

        self.begin_analysis(change_id, cancellation.clone());
        let outcome = self.run_analysis(&record, policies, prior_incident_within_90d, now);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.end_analysis(change_id);
                return Err(err);
            }
        };

        if cancellation.is_cancelled() {
            self.end_analysis(change_id);
            let _ = self.audit.append(
                AuditEntry::new(AuditAction::AnalysisSuperseded).with_change(change_id.clone()),
            );
            return Err(CieError::Validation(format!(
                "re-analysis for change {change_id} was superseded by a concurrent edit"
            )));
        }

        let any_decided = record
            .approvals
            .iter()
            .any(|a| a.status != ApprovalStatus::Pending);

        let risk = outcome.risk.clone();
        let impact = outcome.impact.clone();
        self.store.mutate(change_id, |r| {
            r.record_impact(impact.clone(), now);
            r.record_risk(risk.score, risk.level, now);
            Ok(())
        })?;

        if !any_decided {
            self.store.mutate(change_id, |r| {
                r.approvals.clear();
                Ok(())
            })?;
            for role in &outcome.approval_roles {
                self.store.add_approval(
                    change_id,
                    *role,
                    self.config.approvals.timeout_hours as i64,
                    now,
                )?;
            }
        } else {
            tracing::warn!(%change_id, "re-analyze skipped approval regeneration: decisions already recorded");
        }

        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Analyzed)
                .with_change(change_id.clone())
                .with_details(json!({ "re_analyzed": true })),
        );
        let _ = self.audit.append(
            AuditEntry::new(AuditAction::RiskCalculated)
                .with_change(change_id.clone())
                .with_details(json!({ "score": risk.score, "level": risk.level })),
        );

        self.end_analysis(change_id);
        self.store.get(change_id)
    }

    /// Decide one approval row. Only the matching role may decide it;
    /// duplicate decisions on an already-resolved row are rejected by
    /// `ChangeStore::decide_approval` (spec §8 scenario E).
    pub fn decide_approval(
        &self,
        change_id: &ChangeId,
        approval_id: cie_core::ApprovalId,
        decider_role: cie_core::ApprovalRole,
        status: ApprovalStatus,
        decided_by: impl Into<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ChangeRecord, CieError> {
        if !matches!(status, ApprovalStatus::Approved | ApprovalStatus::Rejected) {
            return Err(CieError::Validation(
                "decide_approval only accepts Approved or Rejected".to_string(),
            ));
        }

        let record = self.store.get(change_id)?;
        let approval = record
            .approvals
            .iter()
            .find(|a| a.id == approval_id)
            .ok_or(CieError::NotFound {
                kind: "approval",
                id: approval_id.to_string(),
            })?;
        if approval.role_required != decider_role {
            return Err(CieError::Validation(format!(
                "approval {approval_id} requires role {:?}, not {:?}",
                approval.role_required, decider_role
            )));
        }

        let decided_by = decided_by.into();
        self.store
            .decide_approval(change_id, approval_id, status, decided_by.clone(), comment, now)?;

        let _ = self.audit.append(
            AuditEntry::new(if status == ApprovalStatus::Approved {
                AuditAction::Approved
            } else {
                AuditAction::Rejected
            })
            .with_change(change_id.clone())
            .with_user(decided_by)
            .with_details(json!({ "approval_id": approval_id.0 })),
        );

        self.store.mutate(change_id, |r| {
            if r.status != ChangeStatus::Analyzing {
                return Ok(());
            }
            let any_rejected = r
                .approvals
                .iter()
                .any(|a| matches!(a.status, ApprovalStatus::Rejected | ApprovalStatus::Expired));
            if any_rejected {
                return r.transition(ChangeStatus::Rejected, now);
            }
            let quorum_met = r.approvals.iter().all(|a| a.status == ApprovalStatus::Approved);
            if quorum_met {
                return r.transition(ChangeStatus::Approved, now);
            }
            Ok(())
        })?;

        self.store.get(change_id)
    }

    /// `execute` (spec §4.W): requires Approved; requires the maintenance
    /// window unless `admin_override` is set, which is itself audited.
    pub fn execute(
        &self,
        change_id: &ChangeId,
        now: DateTime<Utc>,
        admin_override: bool,
    ) -> Result<ChangeRecord, CieError> {
        let record = self.store.get(change_id)?;
        if record.status != ChangeStatus::Approved {
            return Err(CieError::TransitionForbidden {
                change_id: change_id.clone(),
                from: record.status,
                to: ChangeStatus::Executing,
            });
        }
        if !admin_override && !record.is_within_maintenance_window(now) {
            return Err(CieError::MaintenanceWindowViolation(change_id.clone()));
        }

        self.store
            .mutate(change_id, |r| r.transition(ChangeStatus::Executing, now))?;

        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Executed)
                .with_change(change_id.clone())
                .with_details(json!({ "admin_override": admin_override })),
        );
        self.store.get(change_id)
    }

    pub fn complete(&self, change_id: &ChangeId, now: DateTime<Utc>) -> Result<ChangeRecord, CieError> {
        let record = self.store.get(change_id)?;
        if record.status != ChangeStatus::Executing {
            return Err(CieError::TransitionForbidden {
                change_id: change_id.clone(),
                from: record.status,
                to: ChangeStatus::Completed,
            });
        }
        self.store
            .mutate(change_id, |r| r.transition(ChangeStatus::Completed, now))?;
        let _ = self
            .audit
            .append(AuditEntry::new(AuditAction::Completed).with_change(change_id.clone()));
        self.store.get(change_id)
    }

    pub fn rollback(&self, change_id: &ChangeId, now: DateTime<Utc>) -> Result<ChangeRecord, CieError> {
        let record = self.store.get(change_id)?;
        if record.status != ChangeStatus::Executing {
            return Err(CieError::TransitionForbidden {
                change_id: change_id.clone(),
                from: record.status,
                to: ChangeStatus::RolledBack,
            });
        }
        self.store
            .mutate(change_id, |r| r.transition(ChangeStatus::RolledBack, now))?;
        let _ = self
            .audit
            .append(AuditEntry::new(AuditAction::RolledBack).with_change(change_id.clone()));
        self.store.get(change_id)
    }

    pub fn reject(
        &self,
        change_id: &ChangeId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ChangeRecord, CieError> {
        let reason = reason.into();
        self.store.mutate(change_id, |r| {
            r.transition(ChangeStatus::Rejected, now)?;
            r.reject_reason = Some(reason.clone());
            Ok(())
        })?;
        let _ = self.audit.append(
            AuditEntry::new(AuditAction::Rejected)
                .with_change(change_id.clone())
                .with_details(json!({ "reason": reason })),
        );
        self.store.get(change_id)
    }
}

struct AnalysisOutcome {
    impact: cie_impact::ImpactSnapshot,
    risk: cie_risk::RiskBreakdown,
    policy_eval: cie_policy::PolicyEvaluation,
    approval_roles: Vec<cie_core::ApprovalRole>,
}
