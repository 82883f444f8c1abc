/// Liveness monitoring
///
/// One long-lived scheduler task runs sweeps back to back. A sweep reads a
/// snapshot of every site, probes each one concurrently (up to a configured
/// ceiling) and records one ping per site before the next sweep may start.
pub mod dispatcher;
pub mod prober;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use dispatcher::Dispatcher;
pub use prober::HttpProber;
pub use scheduler::{Scheduler, SchedulerSettings};
pub use store::SiteSource;
pub use types::Cadence;
