//! Impact analyzer for the Change Intelligence Engine: given a change's
//! targets and action, walks the topology graph with a per-action
//! strategy and produces an `ImpactSnapshot` the risk engine and
//! policy engine both read (spec §4.I).

pub mod analyzer;
pub mod error;
pub mod snapshot;
pub mod strategy;

pub use analyzer::ImpactAnalyzer;
pub use error::{unknown_targets_to_cie_error, ImpactError};
pub use snapshot::{CriticalPath, ImpactSnapshot, TraversalStrategy};
pub use strategy::strategy_for;
