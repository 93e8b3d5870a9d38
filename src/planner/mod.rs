//! Planning and execution.

mod cancel;
mod executor;
mod guard;
mod plan;
mod rollback;

pub use cancel::CancelToken;
pub use executor::PlanExecutor;
pub use guard::{GuardDecision, IdempotenceGuard};
pub use plan::ProvisioningPlan;
pub use rollback::RollbackCoordinator;
