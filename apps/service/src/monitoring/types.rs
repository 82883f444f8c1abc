use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Status code persisted for every down ping
pub const DOWN_SENTINEL: u16 = 500;

/// Why a probe produced no HTTP response
///
/// Only kept for diagnostics; every kind maps to the same down outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No response within the probe timeout
    Timeout,
    /// DNS, TCP or TLS setup failed
    Connect,
    /// The connection was made but no valid response came back
    Request,
    /// The URL could not be probed at all
    InvalidUrl,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Request => "request",
            FailureKind::InvalidUrl => "invalid_url",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(FailureKind::Timeout),
            "connect" => Ok(FailureKind::Connect),
            "request" => Ok(FailureKind::Request),
            "invalid_url" => Ok(FailureKind::InvalidUrl),
            other => Err(format!("unknown failure kind: {other}")),
        }
    }
}

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Some HTTP response arrived, whatever its status
    Up { status_code: u16 },
    Down { failure: FailureKind },
}

impl Outcome {
    pub fn is_up(&self) -> bool {
        matches!(self, Outcome::Up { .. })
    }

    /// Status code as persisted: the response code, or [`DOWN_SENTINEL`]
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Up { status_code } => *status_code,
            Outcome::Down { .. } => DOWN_SENTINEL,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Outcome::Up { .. } => None,
            Outcome::Down { failure } => Some(*failure),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Up { status_code } => write!(f, "up ({status_code})"),
            Outcome::Down { failure } => write!(f, "down ({failure})"),
        }
    }
}

/// Outcome of a probe together with how long it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub outcome: Outcome,
    pub latency: Duration,
}

impl Probe {
    pub fn up(status_code: u16, latency: Duration) -> Self {
        Self { outcome: Outcome::Up { status_code }, latency }
    }

    pub fn down(failure: FailureKind, latency: Duration) -> Self {
        Self { outcome: Outcome::Down { failure }, latency }
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// When the next sweep is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    /// Sleep the full interval after each sweep finishes
    #[default]
    FixedDelay,
    /// Start sweeps one interval apart, measured from sweep start
    FixedRate,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::FixedDelay => write!(f, "fixed-delay"),
            Cadence::FixedRate => write!(f, "fixed-rate"),
        }
    }
}

/// Tally of one completed sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Sites in the snapshot
    pub sites: usize,
    pub up: usize,
    pub down: usize,
    /// Pings successfully written
    pub recorded: usize,
    pub write_failures: usize,
    /// Sites left without a result: aborted before or during their probe,
    /// or their task failed
    pub abandoned: usize,
}

impl SweepSummary {
    pub fn empty(started_at: Instant) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            sites: 0,
            up: 0,
            down: 0,
            recorded: 0,
            write_failures: 0,
            abandoned: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_outcomes_share_sentinel() {
        for failure in [
            FailureKind::Timeout,
            FailureKind::Connect,
            FailureKind::Request,
            FailureKind::InvalidUrl,
        ] {
            let outcome = Outcome::Down { failure };
            assert!(!outcome.is_up());
            assert_eq!(outcome.status_code(), DOWN_SENTINEL);
            assert_eq!(outcome.failure(), Some(failure));
            assert_eq!(failure.as_str().parse::<FailureKind>(), Ok(failure));
        }
    }

    #[test]
    fn test_any_status_is_up() {
        for code in [101, 200, 301, 404, 500, 503] {
            let outcome = Outcome::Up { status_code: code };
            assert!(outcome.is_up());
            assert_eq!(outcome.status_code(), code);
            assert_eq!(outcome.failure(), None);
        }
    }

    #[test]
    fn test_cadence_names() {
        assert_eq!(Cadence::default(), Cadence::FixedDelay);
        assert_eq!(Cadence::FixedRate.to_string(), "fixed-rate");
    }
}
