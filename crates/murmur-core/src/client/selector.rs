//! Endpoint selection: probe candidates in order, take the first live one.

use async_trait::async_trait;
use tracing::{info, warn};

use super::candidates::{CandidateGenerator, Endpoint};
use super::probe::{Candidate, HealthProbe};
use crate::error::{MurmurError, MurmurResult};

/// Something that can pick a server endpoint
#[async_trait]
pub trait EndpointSelector: Send + Sync {
    /// Pick an endpoint that is live right now
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::NoEndpointReachable`] when nothing answers.
    async fn select(&self) -> MurmurResult<Endpoint>;
}

/// Probes generated candidates on one port. Keeps no state between calls.
#[derive(Debug, Clone)]
pub struct ConnectionSelector {
    port: u16,
    probe: HealthProbe,
    generator: CandidateGenerator,
}

impl ConnectionSelector {
    /// Create a selector
    pub fn new(port: u16, probe: HealthProbe, generator: CandidateGenerator) -> Self {
        Self {
            port,
            probe,
            generator,
        }
    }

    /// Port probed on every candidate host
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Probe every candidate without stopping at the first live one
    pub async fn survey(&self) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for host in self.generator.candidates().await {
            let endpoint = Endpoint::new(host, self.port);
            let outcome = self.probe.probe(&endpoint).await;
            candidates.push(Candidate { endpoint, outcome });
        }
        candidates
    }
}

#[async_trait]
impl EndpointSelector for ConnectionSelector {
    async fn select(&self) -> MurmurResult<Endpoint> {
        let mut failures = Vec::new();

        for host in self.generator.candidates().await {
            let endpoint = Endpoint::new(host, self.port);
            let candidate = Candidate {
                outcome: self.probe.probe(&endpoint).await,
                endpoint,
            };
            match candidate.failure() {
                None => {
                    info!("Connected to TTS server at {}", candidate.endpoint);
                    return Ok(candidate.endpoint);
                }
                Some(failure) => failures.push(failure),
            }
        }

        warn!("No TTS server reachable on port {}", self.port);
        Err(MurmurError::no_endpoint(self.port, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::candidates::HostResolver;
    use crate::client::probe::ProbeStage;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoHostname;

    #[async_trait]
    impl HostResolver for NoHostname {
        fn hostname(&self) -> Option<String> {
            None
        }

        async fn resolve(&self, _host: &str) -> Vec<IpAddr> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_nothing_listening_reports_every_candidate() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let selector = ConnectionSelector::new(
            port,
            HealthProbe::new(Duration::from_millis(200)).unwrap(),
            CandidateGenerator::new(Arc::new(NoHostname)),
        );

        match selector.select().await.unwrap_err() {
            MurmurError::NoEndpointReachable {
                port: reported,
                failures,
            } => {
                assert_eq!(reported, port);
                let hosts: Vec<&str> = failures.iter().map(|f| f.address.as_str()).collect();
                assert_eq!(
                    hosts,
                    vec!["localhost", "127.0.0.1", "0.0.0.0", "::1", "172.17.0.1"]
                );
                assert!(failures.iter().all(|f| f.stage == ProbeStage::Transport));
            }
            other => panic!("expected NoEndpointReachable, got {other:?}"),
        }
    }
}
