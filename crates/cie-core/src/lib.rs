//! Shared identifiers, enums, configuration, and the workspace error type
//! for the Change Intelligence Engine.

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use config::{
    ApprovalsConfig, EngineConfig, ExecutionConfig, GraphConfig, ImpactConfig, RiskConfig,
    SyncConfig,
};
pub use error::CieError;
pub use ids::{ApprovalId, AuditId, ChangeId, IdSequence, NodeId};
pub use types::{
    ApprovalRole, ApprovalStatus, ChangeAction, ChangeStatus, ChangeType, Criticality,
    Environment, RiskLevel,
};
