//! Connector contract and sync coordinator for the Change Intelligence
//! Engine (spec §6): the boundary between the topology graph this core
//! owns and the external device adapters it never implements itself.

pub mod connector;
pub mod coordinator;

pub use connector::{Connector, ConnectorError, ExecutionReceipt, SimulationReport};
pub use coordinator::{ConnectorHealth, ConnectorHealthStatus, SyncCoordinator};
