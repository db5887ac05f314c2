// connector.rs — the Connector contract (spec §6), the one collaborator
// interface this core actually defines rather than merely describes.
//
// Grounded on the `async_trait`-annotated collaborator-interface shape the
// pack uses for trust-boundary adapters (e.g. `NamespaceAuthority` in
// `decision-gate-mcp/src/namespace_authority.rs`, stored behind
// `Arc<dyn Trait + Send + Sync>`): a connector is an external device
// adapter this core never implements, only calls through a narrow async
// trait object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cie_graph::GraphMutation;
use cie_store::ChangeRecord;

/// What a connector's `simulate_change` reports back, best-effort and
/// advisory — never a substitute for the risk/policy verdicts this core
/// computes itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub would_succeed: bool,
    pub warnings: Vec<String>,
    pub details: serde_json::Value,
}

/// What a connector's `apply_change` hands back once it has pushed the
/// change to the device. The engine records this but never blocks a
/// workflow transition on it succeeding — actually reconfiguring a
/// device is out of scope (spec §1 Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub connector_id: String,
    pub accepted: bool,
    pub reference: String,
}

/// Errors a connector can raise. `Transient` is retried by the
/// coordinator per its backoff budget (spec §4.S); `Permanent` is
/// surfaced immediately.
#[derive(Debug, Error, Clone)]
pub enum ConnectorError {
    #[error("transient connector failure: {0}")]
    Transient(String),
    #[error("permanent connector failure: {0}")]
    Permanent(String),
}

/// The four operations every connector exposes (spec §6). Implemented
/// outside this core for real devices; `MockConnector` (this crate's test
/// module) is the only implementation shipped here.
#[async_trait]
pub trait Connector: Send + Sync {
    fn connector_id(&self) -> &str;

    /// Produce the mutations needed to bring the graph store up to date
    /// with this connector's view of the world.
    async fn sync(&self) -> Result<Vec<GraphMutation>, ConnectorError>;

    /// Ask the device whether it would accept this change, without
    /// applying it. `Err` carries human-readable rejection reasons.
    async fn validate_change(&self, change: &ChangeRecord) -> Result<(), Vec<String>>;

    /// Dry-run the change against the device.
    async fn simulate_change(&self, change: &ChangeRecord)
        -> Result<SimulationReport, ConnectorError>;

    /// Push the change to the device. This core never calls this on the
    /// workflow's behalf — `execute` only records intent; an operator or
    /// an external automation invokes the connector directly.
    async fn apply_change(&self, change: &ChangeRecord) -> Result<ExecutionReceipt, ConnectorError>;
}
