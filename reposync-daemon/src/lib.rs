//! Mirror daemon runtime: reconciliation scheduler + webhook server + socket server.

mod error;
pub mod intake;
pub mod paths;
pub mod protocol;
pub mod reconciler;
mod runtime;
pub mod scheduler;
mod shared_ledger;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use error::DaemonError;
pub use intake::{EventIntake, IntakeOutcome};
pub use protocol::{
    request_mirror, request_status, request_stop, request_sync, send_request, DaemonClient,
    DaemonRequest, DaemonResponse,
};
pub use reconciler::{Reconciler, RunSummary};
pub use runtime::{init_tracing, run, serve, start_blocking};
pub use scheduler::{Scheduler, SchedulerState};
pub use shared_ledger::SharedLedger;
