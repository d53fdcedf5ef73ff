//! Two-stage health probe: TCP connect, then `GET /health`.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::debug;

use super::candidates::Endpoint;
use super::http_client;
use crate::error::MurmurResult;

/// Default timeout for each probe stage
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Status value a live server reports on `/health`
pub const RUNNING: &str = "running";

/// Where a probe gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStage {
    /// Nothing accepted a TCP connection
    Transport,
    /// Something is listening but it is not a live server
    Liveness,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Liveness => f.write_str("liveness"),
        }
    }
}

/// Result of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Server is up and reports itself running
    Reachable {
        /// Time for both stages
        latency: Duration,
    },
    /// Probe failed at `stage`
    Unreachable {
        /// Stage that failed
        stage: ProbeStage,
        /// Human-readable reason
        detail: String,
    },
}

impl ProbeOutcome {
    /// Whether the endpoint passed both stages
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

/// An endpoint together with its probe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Probed endpoint
    pub endpoint: Endpoint,
    /// What the probe found
    pub outcome: ProbeOutcome,
}

impl Candidate {
    /// Failure record for an unreachable candidate
    pub fn failure(&self) -> Option<CandidateFailure> {
        match &self.outcome {
            ProbeOutcome::Reachable { .. } => None,
            ProbeOutcome::Unreachable { stage, detail } => Some(CandidateFailure::new(
                self.endpoint.host.clone(),
                *stage,
                detail.clone(),
            )),
        }
    }
}

/// Why one candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Candidate host
    pub address: String,
    /// Stage that failed
    pub stage: ProbeStage,
    /// Reason reported by the probe
    pub detail: String,
}

impl CandidateFailure {
    /// Create a failure record
    pub fn new<A: Into<String>, D: Into<String>>(address: A, stage: ProbeStage, detail: D) -> Self {
        Self {
            address: address.into(),
            stage,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.address, self.stage, self.detail)
    }
}

#[derive(Deserialize)]
struct HealthBody {
    status: Option<String>,
}

/// Checks whether a live server answers on an endpoint
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HealthProbe {
    /// Probe with `timeout` applied to each stage
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> MurmurResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            timeout,
        })
    }

    /// Timeout applied to each stage
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `endpoint`. The liveness stage runs only after a TCP connect
    /// succeeds.
    pub async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        let started = Instant::now();

        if let Err(detail) = self.connect(endpoint).await {
            debug!("{} failed transport probe: {}", endpoint, detail);
            return ProbeOutcome::Unreachable {
                stage: ProbeStage::Transport,
                detail,
            };
        }

        match self.check_health(endpoint).await {
            Ok(()) => {
                let latency = started.elapsed();
                debug!("{} is live ({} ms)", endpoint, latency.as_millis());
                ProbeOutcome::Reachable { latency }
            }
            Err(detail) => {
                debug!("{} failed liveness probe: {}", endpoint, detail);
                ProbeOutcome::Unreachable {
                    stage: ProbeStage::Liveness,
                    detail,
                }
            }
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<(), String> {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("connect timed out after {} ms", self.timeout.as_millis())),
        }
    }

    async fn check_health(&self, endpoint: &Endpoint) -> Result<(), String> {
        let response = self
            .client
            .get(endpoint.url("/health"))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("health check returned HTTP {}", status.as_u16()));
        }

        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| format!("health body is not JSON: {e}"))?;
        match body.status.as_deref() {
            Some(RUNNING) => Ok(()),
            Some(other) => Err(format!("server status is '{other}'")),
            None => Err("health body has no status".to_string()),
        }
    }
}
