//! Policy engine for the Change Intelligence Engine: tagged-condition
//! policies evaluated against a submitted change, reduced to a single
//! severity-ranked verdict, plus pairwise conflict detection across a
//! policy set (spec §3.4/§4.P).

pub mod condition;
pub mod conflict;
pub mod engine;

pub use condition::{Policy, PolicyAction, PolicyCondition, PolicyRuleType, Weekday};
pub use conflict::{conflicts, ConflictType, PolicyConflict};
pub use engine::{PolicyEngine, PolicyEvalInput, PolicyEvaluation, PolicyVerdict, TriggeredPolicy};
