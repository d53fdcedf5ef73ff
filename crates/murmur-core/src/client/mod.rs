//! Client side: find a live server across network setups (VPN tunnels,
//! containers, loopback variants) and send requests that survive restarts.

pub mod candidates;
pub mod probe;
pub mod resilient;
pub mod selector;
/// Single-slot gating for triggered work
pub mod trigger;

use std::time::Duration;

pub use candidates::{CandidateGenerator, Endpoint, HostResolver, SystemResolver};
pub use probe::{Candidate, CandidateFailure, HealthProbe, ProbeOutcome, ProbeStage};
pub use resilient::{ResilientClient, RetryPolicy};
pub use selector::{ConnectionSelector, EndpointSelector};
pub use trigger::TriggerSlot;

use crate::error::{MurmurError, MurmurResult};

// VPN clients often install a system proxy that cannot reach local
// addresses, so every client request goes direct.
pub(crate) fn http_client(timeout: Duration) -> MurmurResult<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .user_agent(format!("murmur/{}", crate::VERSION))
        .build()
        .map_err(|e| MurmurError::transport(format!("Failed to initialize HTTP client: {e}")))
}
