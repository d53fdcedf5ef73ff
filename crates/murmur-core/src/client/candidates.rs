//! Candidate server addresses, in the order a client should try them.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MurmurError, MurmurResult};

/// Default gateway of the Docker bridge network
pub const DOCKER_BRIDGE_ADDR: &str = "172.17.0.1";

const LOOPBACK_CANDIDATES: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// A host and port a server may be listening on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP literal, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an `http://host:port` URL. A missing port defaults to 80.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::Configuration`] for anything that is not an
    /// http URL with a host.
    pub fn parse(url: &str) -> MurmurResult<Self> {
        let parsed = reqwest::Url::parse(url.trim())
            .map_err(|e| MurmurError::configuration(format!("Invalid server URL '{url}': {e}")))?;
        if parsed.scheme() != "http" {
            return Err(MurmurError::configuration(format!(
                "Server URL '{url}' must use http"
            )));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| MurmurError::configuration(format!("Server URL '{url}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = parsed.port_or_known_default().unwrap_or(80);
        Ok(Self { host, port })
    }

    /// `http://host:port`, with IPv6 literals bracketed
    pub fn base_url(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Absolute URL for `path` on this endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Host name lookup and resolution, swappable in tests
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// This machine's host name
    fn hostname(&self) -> Option<String>;

    /// Addresses `host` resolves to; empty when resolution fails
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// Resolver backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    fn hostname(&self) -> Option<String> {
        hostname::get().ok()?.into_string().ok()
    }

    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        match tokio::net::lookup_host((host, 0)).await {
            Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
            Err(e) => {
                debug!("Could not resolve {}: {}", host, e);
                Vec::new()
            }
        }
    }
}

/// Produces the ordered, duplicate-free list of hosts to probe
#[derive(Clone)]
pub struct CandidateGenerator {
    resolver: Arc<dyn HostResolver>,
}

impl CandidateGenerator {
    /// Generator over a custom resolver
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Generator over [`SystemResolver`]
    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver))
    }

    /// Candidate hosts: loopback forms first, then this machine's own
    /// addresses, then the container bridge gateway.
    ///
    /// Lookup failures only shorten the list. Own addresses are whatever
    /// the host name resolves to; interfaces are not enumerated, so a VPN
    /// tunnel address missing from name resolution is not a candidate.
    pub async fn candidates(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        for host in LOOPBACK_CANDIDATES {
            push_unique(&mut hosts, host.to_string());
        }

        if let Some(hostname) = self.resolver.hostname() {
            let external: Vec<IpAddr> = self
                .resolver
                .resolve(&hostname)
                .await
                .into_iter()
                .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
                .collect();
            let primary = external
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| external.first())
                .copied();

            match primary {
                Some(primary) => {
                    push_unique(&mut hosts, primary.to_string());
                    push_unique(&mut hosts, hostname);
                    for ip in external {
                        push_unique(&mut hosts, ip.to_string());
                    }
                }
                None => debug!("Host name {} has no external address", hostname),
            }
        }

        push_unique(&mut hosts, DOCKER_BRIDGE_ADDR.to_string());
        debug!("Candidate hosts: {:?}", hosts);
        hosts
    }
}

impl fmt::Debug for CandidateGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateGenerator").finish_non_exhaustive()
    }
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self::system()
    }
}

fn push_unique(hosts: &mut Vec<String>, host: String) {
    if !hosts.contains(&host) {
        hosts.push(host);
    }
}
