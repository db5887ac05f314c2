//! Risk scoring engine for the Change Intelligence Engine: combines a
//! change's impact snapshot, topology, and history into a 0-100 score and
//! qualitative level (spec §4.K).

pub mod engine;

pub use engine::{RiskBreakdown, RiskEngine, RiskFactor, RiskInput};
