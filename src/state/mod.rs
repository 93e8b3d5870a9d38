//! Run-state persistence and locking.

mod lock;
mod run_state;
mod store;

pub use lock::{LOCK_EXPIRY_SECS, LOCK_REFRESH_SECS, LockInfo, generate_holder_id};
pub use run_state::{
    NodeRecord, NodeStatus, ProvisioningResult, ResourceReport, RollbackOutcome, RunOutcome,
    RunState, RunStatus, STATE_VERSION,
};
pub use store::RunStateStore;
