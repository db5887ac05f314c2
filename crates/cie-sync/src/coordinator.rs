// coordinator.rs — SyncCoordinator: schedules connector syncs, applies
// their mutations to the graph store transactionally, and recovers on
// failure (spec §4.S, §5's "explicit task supervisor" design note).
//
// Concurrency primitives follow SPEC_FULL §5.1 literally: a
// `tokio::sync::Semaphore` sized `min(connector_count, 16)` bounds
// concurrent syncs; a per-connector `tokio::sync::Mutex<ConnectorRunState>`
// tracks in-flight runs so a second `sync_now` on a connector already
// running only sets a `coalesced` flag rather than launching a second
// run — the same "debounce by flag, not by queue" idiom
// `ta_goal::events::NotificationSink` fan-out uses for dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use cie_audit::{AuditAction, AuditEntry, AuditJournal};
use cie_core::{CieError, SyncConfig};
use cie_graph::GraphStore;

use crate::connector::{Connector, ConnectorError};

const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorHealthStatus {
    Healthy,
    Error,
}

/// Externally observable health of one connector, surfaced by
/// `SyncCoordinator::health`.
#[derive(Debug, Clone)]
pub struct ConnectorHealth {
    pub status: ConnectorHealthStatus,
    pub last_error: Option<String>,
}

impl Default for ConnectorHealth {
    fn default() -> Self {
        Self {
            status: ConnectorHealthStatus::Healthy,
            last_error: None,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectorRunState {
    in_flight: bool,
    coalesced: bool,
}

/// Schedules and serializes connector syncs against one `GraphStore`.
pub struct SyncCoordinator {
    graph: Arc<GraphStore>,
    audit: Arc<AuditJournal>,
    connectors: Vec<Arc<dyn Connector>>,
    config: SyncConfig,
    job_timeout: Duration,
    semaphore: Arc<Semaphore>,
    run_states: HashMap<String, Mutex<ConnectorRunState>>,
    health: Mutex<HashMap<String, ConnectorHealth>>,
}

impl SyncCoordinator {
    pub fn new(
        graph: Arc<GraphStore>,
        audit: Arc<AuditJournal>,
        connectors: Vec<Arc<dyn Connector>>,
        config: SyncConfig,
    ) -> Self {
        let width = connectors.len().clamp(1, 16);
        let run_states = connectors
            .iter()
            .map(|c| (c.connector_id().to_string(), Mutex::new(ConnectorRunState::default())))
            .collect();
        Self {
            graph,
            audit,
            connectors,
            config,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            semaphore: Arc::new(Semaphore::new(width)),
            run_states,
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Override the per-job timeout (defaults to 5 minutes, spec §5).
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn connector_ids(&self) -> Vec<String> {
        self.connectors.iter().map(|c| c.connector_id().to_string()).collect()
    }

    pub async fn health(&self, connector_id: &str) -> Option<ConnectorHealth> {
        self.health.lock().await.get(connector_id).cloned()
    }

    fn find(&self, connector_id: &str) -> Result<Arc<dyn Connector>, CieError> {
        self.connectors
            .iter()
            .find(|c| c.connector_id() == connector_id)
            .cloned()
            .ok_or_else(|| CieError::NotFound {
                kind: "connector",
                id: connector_id.to_string(),
            })
    }

    /// Trigger a sync for every configured connector, concurrently, each
    /// through its own coalescing/backoff path (spec §5 "Multiple
    /// connectors sync in parallel"). Each connector's run is spawned as
    /// its own task so a slow or timed-out connector never blocks the
    /// others; results are collected in `connector_ids()` order.
    pub async fn sync_all(self: &Arc<Self>) -> Vec<(String, Result<(), CieError>)> {
        let mut handles = Vec::new();
        for id in self.connector_ids() {
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let result = this.sync_now(&id).await;
                (id, result)
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.expect("sync task panicked"));
        }
        out
    }

    /// Trigger a sync for one connector. If a sync for this connector is
    /// already in flight, this call merges into it (spec §5 "Backpressure")
    /// and returns immediately once the in-flight run (plus its coalesced
    /// follow-up) completes.
    pub async fn sync_now(&self, connector_id: &str) -> Result<(), CieError> {
        let connector = self.find(connector_id)?;
        let run_state = self
            .run_states
            .get(connector_id)
            .ok_or_else(|| CieError::NotFound {
                kind: "connector",
                id: connector_id.to_string(),
            })?;

        {
            let mut guard = run_state.lock().await;
            if guard.in_flight {
                guard.coalesced = true;
                info!(connector_id, "sync already in flight, coalescing follow-up run");
                return Ok(());
            }
            guard.in_flight = true;
        }

        let mut result = Ok(());
        loop {
            result = self.run_with_retry(&connector).await;
            let mut guard = run_state.lock().await;
            if guard.coalesced {
                guard.coalesced = false;
                continue;
            }
            guard.in_flight = false;
            break;
        }
        result
    }

    async fn run_with_retry(&self, connector: &Arc<dyn Connector>) -> Result<(), CieError> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("sync coordinator semaphore should never be closed");

        let connector_id = connector.connector_id().to_string();
        let mut attempt = 0u32;
        let mut delay = Duration::from_secs(self.config.retry_base_seconds);

        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.job_timeout, connector.sync()).await;

            let sync_result = match outcome {
                Ok(inner) => inner,
                Err(_) => Err(ConnectorError::Transient(format!(
                    "sync job exceeded {}s timeout",
                    self.job_timeout.as_secs()
                ))),
            };

            match sync_result {
                Ok(mutations) => {
                    self.graph.apply(&mutations).map_err(CieError::from)?;
                    self.mark_healthy(&connector_id).await;
                    let _ = self.audit.append(
                        AuditEntry::new(AuditAction::SyncCompleted).with_details(json!({
                            "connector_id": connector_id,
                            "attempt": attempt,
                            "mutation_count": mutations.len(),
                        })),
                    );
                    info!(connector_id, attempt, mutations = mutations.len(), "sync completed");
                    return Ok(());
                }
                Err(ConnectorError::Permanent(cause)) => {
                    self.mark_error(&connector_id, &cause).await;
                    let _ = self.audit.append(
                        AuditEntry::new(AuditAction::SyncCompleted).with_details(json!({
                            "connector_id": connector_id,
                            "attempt": attempt,
                            "outcome": "permanent_failure",
                            "cause": cause,
                        })),
                    );
                    error!(connector_id, attempt, %cause, "sync failed permanently");
                    return Err(CieError::ConnectorSyncFailed { attempt, cause });
                }
                Err(ConnectorError::Transient(cause)) => {
                    let _ = self.audit.append(
                        AuditEntry::new(AuditAction::SyncCompleted).with_details(json!({
                            "connector_id": connector_id,
                            "attempt": attempt,
                            "outcome": "transient_failure",
                            "cause": cause,
                        })),
                    );
                    warn!(connector_id, attempt, %cause, "transient sync failure, retrying");
                    if attempt >= self.config.retry_max {
                        self.mark_error(&connector_id, &cause).await;
                        error!(connector_id, attempt, "sync retry budget exhausted");
                        return Err(CieError::ConnectorSyncFailed { attempt, cause });
                    }
                    tokio::time::sleep(delay).await;
                    let cap = Duration::from_secs(self.config.retry_cap_seconds);
                    delay = (delay * 2).min(cap);
                }
            }
        }
    }

    async fn mark_healthy(&self, connector_id: &str) {
        self.health.lock().await.insert(
            connector_id.to_string(),
            ConnectorHealth {
                status: ConnectorHealthStatus::Healthy,
                last_error: None,
            },
        );
    }

    async fn mark_error(&self, connector_id: &str, cause: &str) {
        self.health.lock().await.insert(
            connector_id.to_string(),
            ConnectorHealth {
                status: ConnectorHealthStatus::Error,
                last_error: Some(cause.to_string()),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    use async_trait::async_trait;
    use cie_core::NodeId;
    use cie_graph::{DeviceKind, GraphMutation, NodeKind};
    use cie_store::ChangeRecord;

    struct FlakyConnector {
        id: String,
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        fn connector_id(&self) -> &str {
            &self.id
        }

        async fn sync(&self) -> Result<Vec<GraphMutation>, ConnectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                return Err(ConnectorError::Transient(format!("attempt {call} failed")));
            }
            Ok(vec![GraphMutation::UpsertNode {
                id: NodeId::from("FW-1"),
                kind: NodeKind::Device {
                    device_kind: DeviceKind::Firewall,
                    vendor: "acme".into(),
                    model: "x".into(),
                },
                environment: None,
                criticality: None,
            }])
        }

        async fn validate_change(&self, _change: &ChangeRecord) -> Result<(), Vec<String>> {
            Ok(())
        }

        async fn simulate_change(
            &self,
            _change: &ChangeRecord,
        ) -> Result<crate::connector::SimulationReport, ConnectorError> {
            unimplemented!("not exercised by sync coordinator tests")
        }

        async fn apply_change(
            &self,
            _change: &ChangeRecord,
        ) -> Result<crate::connector::ExecutionReceipt, ConnectorError> {
            unimplemented!("not exercised by sync coordinator tests")
        }
    }

    fn fast_retry_config() -> SyncConfig {
        SyncConfig {
            retry_max: 8,
            retry_base_seconds: 0,
            retry_cap_seconds: 1,
        }
    }

    #[tokio::test]
    async fn scenario_f_recovers_after_three_transient_failures() {
        let dir = tempdir().unwrap();
        let graph = Arc::new(GraphStore::new(2));
        let audit = Arc::new(AuditJournal::open(dir.path().join("audit.jsonl")).unwrap());
        let connector = Arc::new(FlakyConnector {
            id: "conn-1".to_string(),
            fail_times: 3,
            calls: AtomicU32::new(0),
        });
        let coordinator = SyncCoordinator::new(
            graph.clone(),
            audit.clone(),
            vec![connector.clone()],
            fast_retry_config(),
        );

        coordinator.sync_now("conn-1").await.unwrap();

        assert_eq!(graph.snapshot().data().node_count(), 1);
        let health = coordinator.health("conn-1").await.unwrap();
        assert_eq!(health.status, ConnectorHealthStatus::Healthy);
        assert!(health.last_error.is_none());

        let entries = audit.read_all().unwrap();
        assert_eq!(entries.len(), 4);
        for entry in &entries[..3] {
            assert_eq!(
                entry.details["outcome"].as_str(),
                Some("transient_failure")
            );
        }
        assert!(entries[3].details.get("outcome").is_none());
    }

    #[tokio::test]
    async fn sync_with_no_mutations_is_a_no_op() {
        struct EmptyConnector;
        #[async_trait]
        impl Connector for EmptyConnector {
            fn connector_id(&self) -> &str {
                "empty"
            }
            async fn sync(&self) -> Result<Vec<GraphMutation>, ConnectorError> {
                Ok(vec![])
            }
            async fn validate_change(&self, _change: &ChangeRecord) -> Result<(), Vec<String>> {
                Ok(())
            }
            async fn simulate_change(
                &self,
                _change: &ChangeRecord,
            ) -> Result<crate::connector::SimulationReport, ConnectorError> {
                unimplemented!()
            }
            async fn apply_change(
                &self,
                _change: &ChangeRecord,
            ) -> Result<crate::connector::ExecutionReceipt, ConnectorError> {
                unimplemented!()
            }
        }

        let dir = tempdir().unwrap();
        let graph = Arc::new(GraphStore::new(2));
        let audit = Arc::new(AuditJournal::open(dir.path().join("audit.jsonl")).unwrap());
        let coordinator = SyncCoordinator::new(
            graph.clone(),
            audit,
            vec![Arc::new(EmptyConnector)],
            fast_retry_config(),
        );

        coordinator.sync_now("empty").await.unwrap();
        assert_eq!(graph.snapshot().data().node_count(), 0);
    }

    #[tokio::test]
    async fn exhausting_retry_budget_surfaces_connector_sync_failed() {
        struct AlwaysFails;
        #[async_trait]
        impl Connector for AlwaysFails {
            fn connector_id(&self) -> &str {
                "doomed"
            }
            async fn sync(&self) -> Result<Vec<GraphMutation>, ConnectorError> {
                Err(ConnectorError::Transient("device unreachable".to_string()))
            }
            async fn validate_change(&self, _change: &ChangeRecord) -> Result<(), Vec<String>> {
                Ok(())
            }
            async fn simulate_change(
                &self,
                _change: &ChangeRecord,
            ) -> Result<crate::connector::SimulationReport, ConnectorError> {
                unimplemented!()
            }
            async fn apply_change(
                &self,
                _change: &ChangeRecord,
            ) -> Result<crate::connector::ExecutionReceipt, ConnectorError> {
                unimplemented!()
            }
        }

        let dir = tempdir().unwrap();
        let graph = Arc::new(GraphStore::new(2));
        let audit = Arc::new(AuditJournal::open(dir.path().join("audit.jsonl")).unwrap());
        let mut config = fast_retry_config();
        config.retry_max = 2;
        let coordinator =
            SyncCoordinator::new(graph, audit, vec![Arc::new(AlwaysFails)], config);

        let err = coordinator.sync_now("doomed").await.unwrap_err();
        assert!(matches!(err, CieError::ConnectorSyncFailed { attempt: 2, .. }));
        let health = coordinator.health("doomed").await.unwrap();
        assert_eq!(health.status, ConnectorHealthStatus::Error);
    }
}
