use anyhow::Result;
use async_trait::async_trait;

use super::types::Probe;
use crate::database::models::Site;

/// Supplies the sites to probe at the start of each sweep
#[async_trait]
pub trait SiteSource: Send + Sync {
    /// Every registered site, regardless of owner
    async fn list_all_sites(&self) -> Result<Vec<Site>>;
}

/// Persists probe outcomes
///
/// Called from many probe tasks at once; implementations must not lose
/// writes under concurrent use.
#[async_trait]
pub trait PingRecorder: Send + Sync {
    /// Append one ping for `site_id` and return its id
    async fn record_ping(&self, site_id: i64, probe: &Probe) -> Result<i64>;
}
