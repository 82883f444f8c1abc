//! In-memory collaborators for exercising the dispatcher and scheduler
//! without sockets or a database.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::Instant;

use super::prober::Prober;
use super::store::{PingRecorder, SiteSource};
use super::types::{Outcome, Probe};
use crate::database::models::Site;

pub fn site(id: i64, url: &str) -> Site {
    Site {
        id,
        user_id: 1,
        name: None,
        url: url.to_string(),
        created_at: UNIX_EPOCH,
        updated_at: None,
    }
}

pub fn sites(count: i64) -> Vec<Site> {
    (1..=count).map(|id| site(id, &format!("https://site{id}.example"))).collect()
}

#[derive(Clone, Copy)]
enum Behaviour {
    Answer { delay: Duration, outcome: Outcome },
    Hang,
}

/// Prober with scripted per-URL behaviour; unknown URLs answer 200 at once
#[derive(Default)]
pub struct FakeProber {
    behaviours: HashMap<String, Behaviour>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn answer(mut self, url: &str, delay: Duration, outcome: Outcome) -> Self {
        self.behaviours.insert(url.to_string(), Behaviour::Answer { delay, outcome });
        self
    }

    pub fn hang(mut self, url: &str) -> Self {
        self.behaviours.insert(url.to_string(), Behaviour::Hang);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, url: &str) -> Probe {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behaviour = self.behaviours.get(url).copied().unwrap_or(Behaviour::Answer {
            delay: self.default_delay,
            outcome: Outcome::Up { status_code: 200 },
        });

        match behaviour {
            Behaviour::Answer { delay, outcome } => {
                tokio::time::sleep(delay).await;
                Probe { outcome, latency: delay }
            }
            Behaviour::Hang => std::future::pending::<Probe>().await,
        }
    }
}

/// Records pings in memory, failing on request for chosen sites
#[derive(Default)]
pub struct MemoryRecorder {
    pings: Mutex<Vec<(i64, Probe, Instant)>>,
    failing_sites: HashSet<i64>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, site_id: i64) -> Self {
        self.failing_sites.insert(site_id);
        self
    }

    pub fn pings(&self) -> Vec<(i64, Probe, Instant)> {
        self.pings.lock().unwrap().clone()
    }

    pub fn site_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.pings().iter().map(|(id, _, _)| *id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn recorded_at(&self, site_id: i64) -> Option<Instant> {
        self.pings().iter().find(|(id, _, _)| *id == site_id).map(|(_, _, at)| *at)
    }
}

#[async_trait]
impl PingRecorder for MemoryRecorder {
    async fn record_ping(&self, site_id: i64, probe: &Probe) -> Result<i64> {
        if self.failing_sites.contains(&site_id) {
            return Err(anyhow!("disk full"));
        }

        let mut pings = self.pings.lock().unwrap();
        pings.push((site_id, *probe, Instant::now()));
        Ok(pings.len() as i64)
    }
}

/// Site source that replays scripted snapshots, then repeats the last one
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Site>, String>>>,
    last: Mutex<Vec<Site>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn always(sites: Vec<Site>) -> Self {
        Self::scripted(vec![Ok(sites)])
    }

    pub fn scripted(script: Vec<Result<Vec<Site>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteSource for ScriptedSource {
    async fn list_all_sites(&self) -> Result<Vec<Site>> {
        self.calls.lock().unwrap().push(Instant::now());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(sites)) => {
                *self.last.lock().unwrap() = sites.clone();
                Ok(sites)
            }
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}
