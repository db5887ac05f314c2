// rollup.rs — MetricsEngine::rollup: the §4.M KPI aggregation over the
// change store and the audit journal.
//
// Grounded on `other_examples/.../unet__.../diff-analysis.rs`'s
// `DiffStatistics` shape (a flat struct of counts/percentages computed in
// one pass over a collection) and on `ta-goal`'s pattern of deriving
// rollups by scanning a store's `list()` rather than keeping a running
// counter — simplicity over incremental maintenance, since this is a
// periodic background job (spec §5 "Metrics / KPIs"), not a hot path.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cie_audit::{AuditAction, AuditEntry, AuditJournal};
use cie_core::{ChangeId, ChangeStatus, CieError};
use cie_graph::GraphSnapshot;
use cie_store::{ChangeRecord, ChangeStore};

/// One rollup of the KPIs named in spec §4.M, computed over every change
/// the store currently holds (optionally restricted to a trailing
/// window by `created_at`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsRollup {
    pub total_changes: usize,
    pub completed_changes: usize,
    pub auto_approved_pct: f64,
    pub avg_validation_minutes: f64,
    pub incidents_post_change_pct: f64,
    pub scoring_precision_pct: f64,
    pub core_changes_detected_pct: f64,
}

pub struct MetricsEngine;

impl MetricsEngine {
    /// Roll up KPIs over every change in `store`, reading the audit
    /// journal for submission/approval/incident timestamps and `graph`
    /// for `is_core` lookups on each change's targets.
    ///
    /// `window` restricts the input to changes `created_at >= now - window`
    /// when given; `None` rolls up the entire store, matching the teacher's
    /// "all time" default for unscoped dashboard queries.
    pub fn rollup(
        store: &ChangeStore,
        audit: &AuditJournal,
        graph: &GraphSnapshot,
        now: DateTime<Utc>,
        window: Option<Duration>,
    ) -> Result<MetricsRollup, CieError> {
        let entries = audit.read_all().map_err(|err| {
            CieError::Validation(format!("failed to read audit journal for rollup: {err}"))
        })?;
        let by_change = index_by_change(&entries);

        let records: Vec<ChangeRecord> = store
            .list()
            .into_iter()
            .filter(|r| match window {
                Some(w) => r.created_at >= now - w,
                None => true,
            })
            .collect();

        let total_changes = records.len();
        if total_changes == 0 {
            return Ok(MetricsRollup::default());
        }

        let completed: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| r.status == ChangeStatus::Completed)
            .collect();
        let completed_changes = completed.len();

        let auto_approved_pct = if completed_changes == 0 {
            0.0
        } else {
            let auto = completed
                .iter()
                .filter(|r| r.approvals.iter().all(|a| a.decided_by.is_none()))
                .count();
            auto as f64 / completed_changes as f64
        };

        let validation_minutes: Vec<f64> = completed
            .iter()
            .filter_map(|r| validation_minutes_for(r, &by_change))
            .collect();
        let avg_validation_minutes = if validation_minutes.is_empty() {
            0.0
        } else {
            validation_minutes.iter().sum::<f64>() / validation_minutes.len() as f64
        };

        let incidents_post_change_pct = if completed_changes == 0 {
            0.0
        } else {
            let with_incident = completed
                .iter()
                .filter(|r| has_incident_within_7_days(r, &by_change))
                .count();
            with_incident as f64 / completed_changes as f64
        };

        // spec §9 Open Questions: "scoring precision" has no defined
        // labeling source; treat as the complement of the incident rate
        // over the same Completed population unless a feedback label is
        // introduced (see DESIGN.md).
        let scoring_precision_pct = if completed_changes == 0 {
            0.0
        } else {
            1.0 - incidents_post_change_pct
        };

        let data = graph.data();
        let core_changes_detected_pct = if completed_changes == 0 {
            0.0
        } else {
            let touched_core = completed
                .iter()
                .filter(|r| {
                    r.target_components
                        .iter()
                        .filter_map(|id| data.node(id))
                        .any(|n| n.is_core)
                })
                .count();
            touched_core as f64 / completed_changes as f64
        };

        tracing::info!(
            total_changes,
            completed_changes,
            auto_approved_pct,
            avg_validation_minutes,
            incidents_post_change_pct,
            scoring_precision_pct,
            core_changes_detected_pct,
            "metrics rollup computed"
        );

        Ok(MetricsRollup {
            total_changes,
            completed_changes,
            auto_approved_pct,
            avg_validation_minutes,
            incidents_post_change_pct,
            scoring_precision_pct,
            core_changes_detected_pct,
        })
    }
}

fn index_by_change(entries: &[AuditEntry]) -> HashMap<ChangeId, Vec<&AuditEntry>> {
    let mut by_change: HashMap<ChangeId, Vec<&AuditEntry>> = HashMap::new();
    for entry in entries {
        if let Some(change_id) = &entry.change_id {
            by_change.entry(change_id.clone()).or_default().push(entry);
        }
    }
    by_change
}

/// `(first_approved_at - submitted_at)` in minutes, read off the audit
/// trail rather than the change record (neither `submitted_at` nor
/// "first approved" timestamp is a first-class field on `ChangeRecord` —
/// both are derivable from its own audit history, the source of truth
/// for "when did X happen" per spec §3.5). `None` if the change has no
/// `submitted` entry or never recorded an `approved` entry (e.g. it was
/// rejected, or auto-approved with no approval rows to decide).
fn validation_minutes_for(
    record: &ChangeRecord,
    by_change: &HashMap<ChangeId, Vec<&AuditEntry>>,
) -> Option<f64> {
    let entries = by_change.get(&record.id)?;
    let submitted_at = entries
        .iter()
        .find(|e| e.action == AuditAction::Submitted)
        .map(|e| e.timestamp)?;
    let first_approved_at = entries
        .iter()
        .filter(|e| e.action == AuditAction::Approved)
        .map(|e| e.timestamp)
        .min()?;
    let minutes = (first_approved_at - submitted_at).num_seconds() as f64 / 60.0;
    Some(minutes.max(0.0))
}

fn has_incident_within_7_days(
    record: &ChangeRecord,
    by_change: &HashMap<ChangeId, Vec<&AuditEntry>>,
) -> bool {
    let Some(entries) = by_change.get(&record.id) else {
        return false;
    };
    let Some(completed_at) = entries
        .iter()
        .find(|e| e.action == AuditAction::Completed)
        .map(|e| e.timestamp)
    else {
        return false;
    };
    entries.iter().any(|e| {
        e.action == AuditAction::IncidentReported
            && e.timestamp >= completed_at
            && e.timestamp <= completed_at + Duration::days(7)
    })
}
