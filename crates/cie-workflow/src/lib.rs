//! Workflow controller for the Change Intelligence Engine: the
//! submit/approve/execute/rollback state machine orchestrating the impact
//! analyzer, risk engine, and policy engine over one change record (spec
//! §4.W).

pub mod approvals;
pub mod cancellation;
pub mod controller;

pub use approvals::{derive_approval_roles, reap_all_expired_approvals, reap_expired_approvals_for};
pub use cancellation::CancellationToken;
pub use controller::WorkflowController;
