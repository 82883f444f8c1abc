use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

use super::types::{FailureKind, Probe};
use super::validation::validate_site_url;

/// Performs one liveness check against a URL
///
/// Implementations never fail: every transport problem is folded into a
/// down [`Probe`].
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> Probe;
}

/// HEAD-request prober
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client, timeout })
    }
}

fn classify(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_connect() {
        FailureKind::Connect
    } else if error.is_builder() {
        FailureKind::InvalidUrl
    } else {
        FailureKind::Request
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> Probe {
        let start = Instant::now();

        let target = match validate_site_url(url) {
            Ok(target) => target,
            Err(e) => {
                debug!("Skipping request to {}: {}", url, e);
                return Probe::down(FailureKind::InvalidUrl, start.elapsed());
            }
        };

        debug!("HEAD {}", target);

        // The client timeout covers the request; the outer one also bounds
        // DNS resolution and anything else reqwest does before it.
        match timeout(self.timeout, self.client.head(target).send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                debug!("{} responded {}", url, status);
                Probe::up(status.as_u16(), start.elapsed())
            }
            Ok(Err(e)) => {
                let failure = classify(&e);
                debug!("{} unreachable ({}): {}", url, failure, e);
                Probe::down(failure, start.elapsed())
            }
            Err(_) => {
                debug!("{} timed out after {:?}", url, self.timeout);
                Probe::down(FailureKind::Timeout, start.elapsed())
            }
        }
    }
}
