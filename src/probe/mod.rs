pub mod icmp;

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a reachability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Success,
    Failure,
    Timeout,
}

impl std::fmt::Display for PingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PingStatus::Success => write!(f, "success"),
            PingStatus::Failure => write!(f, "failure"),
            PingStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// What a single probe run observed
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: PingStatus,
    pub rtt_ms: Option<f64>,
    pub details: String,
}

impl ProbeOutcome {
    pub fn success(ip: IpAddr, rtt_ms: f64) -> Self {
        Self {
            status: PingStatus::Success,
            rtt_ms: Some(rtt_ms),
            details: format!("Reply from {} in {:.2} ms", ip, rtt_ms),
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: PingStatus::Timeout,
            rtt_ms: None,
            details: "No response".to_string(),
        }
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Self {
            status: PingStatus::Failure,
            rtt_ms: None,
            details: details.into(),
        }
    }
}

/// A reachability check against one address.
///
/// Probing is blocking and must return within `timeout()`; errors are
/// reported as a `Failure` outcome, never raised.
pub trait Prober: Send + Sync {
    fn probe(&self, ip: IpAddr) -> ProbeOutcome;

    fn timeout(&self) -> Duration;
}

/// Response body of `GET /ping/{name}`
#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub name: String,
    pub status: PingStatus,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl PingResult {
    pub fn new(name: String, outcome: ProbeOutcome) -> Self {
        Self {
            name,
            status: outcome.status,
            details: outcome.details,
            timestamp: Utc::now(),
        }
    }
}
