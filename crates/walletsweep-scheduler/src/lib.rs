//! walletsweep scheduler.
//!
//! Drives one extraction session for a `(wallet, chain_id, [from, to))` request: partitions the
//! range, launches one extract task per chunk on a cluster executor, waits for the batch to
//! settle, then launches and waits on the aggregate task.

pub mod cli;
pub mod config;
pub mod executor;
pub mod launcher;
pub mod monitor;
pub mod orchestrator;

pub use launcher::TaskLauncher;
pub use monitor::{MonitorOutcome, MonitorPolicy, MonitorReport, TaskMonitor};
pub use orchestrator::{Orchestrator, SessionReport, SessionRequest, SessionSettings};
