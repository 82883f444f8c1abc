use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::Dispatcher;
use super::store::SiteSource;
use super::types::{Cadence, SweepSummary};

/// Timing of the sweep loop
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub cadence: Cadence,
}

/// Monitoring scheduler - runs one sweep over all sites per interval
pub struct Scheduler {
    source: Arc<dyn SiteSource>,
    dispatcher: Dispatcher,
    settings: SchedulerSettings,
    report_tx: Option<mpsc::Sender<SweepSummary>>,
}

impl Scheduler {
    pub fn new(source: Arc<dyn SiteSource>, dispatcher: Dispatcher, settings: SchedulerSettings) -> Self {
        Self { source, dispatcher, settings, report_tx: None }
    }

    /// Publish a summary of every finished sweep on `report_tx`
    pub fn with_reports(mut self, report_tx: mpsc::Sender<SweepSummary>) -> Self {
        self.report_tx = Some(report_tx);
        self
    }

    /// Take a fresh snapshot of the sites and probe all of them once.
    ///
    /// Fails only when the snapshot cannot be read.
    pub async fn sweep_once(&self, abort: &CancellationToken) -> Result<SweepSummary> {
        let started_at = Instant::now();

        let sites = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                let mut summary = SweepSummary::empty(started_at);
                summary.finished_at = Instant::now();
                return Ok(summary);
            }
            sites = self.source.list_all_sites() => sites?,
        };

        info!("Starting sweep of {} sites", sites.len());

        let mut summary = self.dispatcher.sweep(sites, abort).await;
        summary.started_at = started_at;

        info!(
            "Finished sweep in {:?}: {} up, {} down, {} recorded, {} write failures, {} abandoned",
            summary.duration(),
            summary.up,
            summary.down,
            summary.recorded,
            summary.write_failures,
            summary.abandoned
        );

        Ok(summary)
    }

    /// Sweep repeatedly until `stop` is cancelled.
    ///
    /// Sweeps never overlap. `stop` is only checked between sweeps; `abort`
    /// is handed to the sweep in flight.
    pub async fn run(&self, stop: CancellationToken, abort: CancellationToken) {
        info!(
            "Scheduler started: every {:?} ({})",
            self.settings.interval, self.settings.cadence
        );

        while !stop.is_cancelled() {
            let started_at = Instant::now();

            match self.sweep_once(&abort).await {
                Ok(summary) => self.report(summary),
                Err(e) => error!("Could not list sites, skipping this sweep: {:#}", e),
            }

            let next = match self.settings.cadence {
                Cadence::FixedDelay => Instant::now() + self.settings.interval,
                Cadence::FixedRate => started_at + self.settings.interval,
            };

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep_until(next) => {}
            }
        }

        info!("Scheduler stopped");
    }

    fn report(&self, summary: SweepSummary) {
        if let Some(report_tx) = &self.report_tx {
            if let Err(e) = report_tx.try_send(summary) {
                debug!("Dropping sweep report: {}", e);
            }
        }
    }

    /// Run the scheduler on its own task
    pub fn spawn(self) -> SchedulerHandle {
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();

        let task = tokio::spawn({
            let stop = stop.clone();
            let abort = abort.clone();
            async move { self.run(stop, abort).await }
        });

        SchedulerHandle { stop, abort, task }
    }
}

/// Owner side of a spawned [`Scheduler`]
pub struct SchedulerHandle {
    stop: CancellationToken,
    abort: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling and wait for the scheduler to exit.
    ///
    /// A sweep in flight gets `grace` to finish; after that its remaining
    /// probes are dropped.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), JoinError> {
        self.stop.cancel();

        match timeout(grace, &mut self.task).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Sweep still running after {:?}, abandoning in-flight probes", grace);
                self.abort.cancel();
                self.task.await
            }
        }
    }
}
