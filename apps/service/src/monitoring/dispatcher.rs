use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::prober::Prober;
use super::store::PingRecorder;
use super::types::{Outcome, SweepSummary};
use crate::database::models::Site;

/// What happened to one site during a sweep
enum SiteResult {
    Recorded(Outcome),
    WriteFailed(Outcome),
    Abandoned,
}

/// Fans a sweep out to one probe per site and waits for all of them
pub struct Dispatcher {
    prober: Arc<dyn Prober>,
    recorder: Arc<dyn PingRecorder>,
    limiter: Arc<Semaphore>,
}

impl Dispatcher {
    /// `max_concurrency` caps simultaneous probes; zero is treated as one
    pub fn new(
        prober: Arc<dyn Prober>,
        recorder: Arc<dyn PingRecorder>,
        max_concurrency: usize,
    ) -> Self {
        Self { prober, recorder, limiter: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }

    /// Probe every site in `sites` exactly once and record each outcome.
    ///
    /// Returns only after every launched probe has finished. Cancelling
    /// `abort` stops launching new probes and drops the ones in flight;
    /// those sites are counted as abandoned and get no ping.
    pub async fn sweep(&self, sites: Vec<Site>, abort: &CancellationToken) -> SweepSummary {
        let mut summary = SweepSummary::empty(Instant::now());
        summary.sites = sites.len();

        let mut handles = Vec::with_capacity(sites.len());

        for site in sites {
            let permit = tokio::select! {
                biased;
                _ = abort.cancelled() => {
                    summary.abandoned += 1;
                    continue;
                }
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        summary.abandoned += 1;
                        continue;
                    }
                },
            };

            let prober = self.prober.clone();
            let recorder = self.recorder.clone();
            let abort = abort.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                probe_site(site, prober.as_ref(), recorder.as_ref(), &abort).await
            }));
        }

        for result in join_all(handles).await {
            match result {
                Ok(SiteResult::Recorded(outcome)) => {
                    summary.recorded += 1;
                    tally(&mut summary, outcome);
                }
                Ok(SiteResult::WriteFailed(outcome)) => {
                    summary.write_failures += 1;
                    tally(&mut summary, outcome);
                }
                Ok(SiteResult::Abandoned) => summary.abandoned += 1,
                Err(e) => {
                    error!("Probe task failed: {}", e);
                    summary.abandoned += 1;
                }
            }
        }

        summary.finished_at = Instant::now();
        summary
    }
}

fn tally(summary: &mut SweepSummary, outcome: Outcome) {
    if outcome.is_up() {
        summary.up += 1;
    } else {
        summary.down += 1;
    }
}

async fn probe_site(
    site: Site,
    prober: &dyn Prober,
    recorder: &dyn PingRecorder,
    abort: &CancellationToken,
) -> SiteResult {
    let probe = tokio::select! {
        biased;
        _ = abort.cancelled() => {
            debug!("Probe of site {} abandoned", site.id);
            return SiteResult::Abandoned;
        }
        probe = prober.probe(&site.url) => probe,
    };

    debug!("Site {} ({}) is {} after {:?}", site.id, site.label(), probe.outcome, probe.latency);

    match recorder.record_ping(site.id, &probe).await {
        Ok(_) => SiteResult::Recorded(probe.outcome),
        Err(e) => {
            warn!("Failed to record ping for site {}: {:#}", site.id, e);
            SiteResult::WriteFailed(probe.outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::testing::{FakeProber, MemoryRecorder, site, sites};
    use crate::monitoring::types::FailureKind;
    use std::time::Duration;

    fn dispatcher(
        prober: Arc<FakeProber>,
        recorder: Arc<MemoryRecorder>,
        max_concurrency: usize,
    ) -> Dispatcher {
        Dispatcher::new(prober, recorder, max_concurrency)
    }

    #[tokio::test]
    async fn test_empty_sweep_returns_immediately() {
        let prober = Arc::new(FakeProber::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober.clone(), recorder.clone(), 4);

        let summary = tokio::time::timeout(
            Duration::from_millis(100),
            dispatcher.sweep(Vec::new(), &CancellationToken::new()),
        )
        .await
        .expect("empty sweep blocked");

        assert_eq!(summary.sites, 0);
        assert_eq!(summary.recorded, 0);
        assert_eq!(prober.calls(), 0);
        assert!(recorder.pings().is_empty());
    }

    #[tokio::test]
    async fn test_every_site_recorded_exactly_once() {
        let prober = Arc::new(FakeProber::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober.clone(), recorder.clone(), 8);

        let summary = dispatcher.sweep(sites(25), &CancellationToken::new()).await;

        assert_eq!(summary.sites, 25);
        assert_eq!(summary.recorded, 25);
        assert_eq!(summary.up, 25);
        assert_eq!(prober.calls(), 25);
        assert_eq!(recorder.site_ids(), (1..=25).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let prober = Arc::new(FakeProber::new().with_default_delay(Duration::from_millis(20)));
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober.clone(), recorder.clone(), 3);

        let summary = dispatcher.sweep(sites(12), &CancellationToken::new()).await;

        assert_eq!(summary.recorded, 12);
        assert!(prober.max_in_flight() <= 3, "saw {} probes at once", prober.max_in_flight());
        assert!(prober.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated() {
        let prober = Arc::new(FakeProber::new());
        let recorder = Arc::new(MemoryRecorder::new().failing_for(2));
        let dispatcher = dispatcher(prober, recorder.clone(), 4);

        let summary = dispatcher.sweep(sites(4), &CancellationToken::new()).await;

        assert_eq!(summary.recorded, 3);
        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.up, 4);
        assert_eq!(recorder.site_ids(), vec![1, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_site_does_not_delay_others() {
        let fast = Duration::from_millis(200);
        let slow = Duration::from_millis(300);
        let down = Outcome::Down { failure: FailureKind::Timeout };

        let prober = Arc::new(
            FakeProber::new()
                .answer("https://a.example", fast, Outcome::Up { status_code: 200 })
                .answer("https://b.example", slow, down)
                .answer("https://c.example", fast, Outcome::Up { status_code: 503 }),
        );
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober, recorder.clone(), 8);

        let snapshot = vec![
            site(1, "https://a.example"),
            site(2, "https://b.example"),
            site(3, "https://c.example"),
        ];
        let summary = dispatcher.sweep(snapshot, &CancellationToken::new()).await;

        assert_eq!((summary.up, summary.down, summary.recorded), (2, 1, 3));

        // Bounded by the slowest probe, not the sum of all three
        assert!(summary.duration() >= slow);
        assert!(summary.duration() < fast * 2 + slow, "sweep took {:?}", summary.duration());

        let b = recorder.recorded_at(2).unwrap();
        assert!(recorder.recorded_at(1).unwrap() < b);
        assert!(recorder.recorded_at(3).unwrap() < b);
    }

    #[tokio::test]
    async fn test_abort_releases_hung_probes() {
        let prober = Arc::new(FakeProber::new().hang("https://hung.example"));
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober, recorder.clone(), 4);

        let abort = CancellationToken::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let snapshot = vec![site(1, "https://ok.example"), site(2, "https://hung.example")];
        let summary = tokio::time::timeout(Duration::from_secs(2), dispatcher.sweep(snapshot, &abort))
            .await
            .expect("abort did not release the sweep");

        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(recorder.site_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_aborted_before_start_launches_nothing() {
        let prober = Arc::new(FakeProber::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let dispatcher = dispatcher(prober.clone(), recorder.clone(), 4);

        let abort = CancellationToken::new();
        abort.cancel();

        let summary = dispatcher.sweep(sites(5), &abort).await;

        assert_eq!(summary.abandoned, 5);
        assert_eq!(prober.calls(), 0);
        assert!(recorder.pings().is_empty());
    }
}
