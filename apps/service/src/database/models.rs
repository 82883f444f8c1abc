use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::monitoring::types::FailureKind;

/// A monitored URL, as registered through the web front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
    pub url: String,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

impl Site {
    /// Name to show in logs and listings, falling back to the URL
    pub fn label(&self) -> &str {
        self.name.as_deref().filter(|name| !name.is_empty()).unwrap_or(&self.url)
    }
}

/// One persisted probe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub id: i64,
    pub site_id: i64,
    pub up: bool,
    /// Response status when up, the down sentinel otherwise
    pub status_code: u16,
    pub failure: Option<FailureKind>,
    pub latency_ms: Option<u64>,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

/// Convert SystemTime to Unix timestamp
pub fn timestamp_to_i64(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Convert Unix timestamp to SystemTime
pub fn i64_to_timestamp(timestamp: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64)
}
