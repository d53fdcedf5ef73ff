//! Request client that reconnects and retries.
//!
//! Each attempt moves through `Connecting -> Requesting` and, on a
//! retriable failure, `Retrying -> Connecting` again until the attempt
//! budget is spent. A failed endpoint selection uses up an attempt like a
//! failed request does. Retries reconnect first, then pause, then request.
//! Blank text and HTTP 400 responses are returned at once.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::candidates::{CandidateGenerator, Endpoint};
use super::http_client;
use super::probe::HealthProbe;
use super::selector::{ConnectionSelector, EndpointSelector};
use crate::config::ClientConfig;
use crate::dispatcher::SynthesisRequest;
use crate::error::{MurmurError, MurmurResult};
use crate::model::ModelInventory;

/// Attempt budget and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Pause between reconnecting and the retried request
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum State {
    Connecting,
    Requesting(Endpoint),
    Retrying(MurmurError),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for a synthesis server whose address may change between calls
#[derive(Debug)]
pub struct ResilientClient<S = ConnectionSelector> {
    selector: S,
    http: reqwest::Client,
    policy: RetryPolicy,
    pinned: Option<Endpoint>,
    last_good: Mutex<Option<Endpoint>>,
}

impl ResilientClient<ConnectionSelector> {
    /// Build a client from configuration, using system host discovery
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid pinned URL or if an HTTP client
    /// cannot be built.
    pub fn from_config(config: &ClientConfig) -> MurmurResult<Self> {
        let selector = ConnectionSelector::new(
            config.port,
            HealthProbe::new(config.probe_timeout())?,
            CandidateGenerator::system(),
        );
        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            pause: config.retry_pause(),
        };
        let client = Self::new(selector, policy, config.request_timeout())?;
        match &config.server_url {
            Some(url) => Ok(client.with_pinned_endpoint(Endpoint::parse(url)?)),
            None => Ok(client),
        }
    }
}

impl<S: EndpointSelector> ResilientClient<S> {
    /// Create a client over `selector`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(selector: S, policy: RetryPolicy, request_timeout: Duration) -> MurmurResult<Self> {
        Ok(Self {
            selector,
            http: http_client(request_timeout)?,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            pinned: None,
            last_good: Mutex::new(None),
        })
    }

    /// Use `endpoint` for the first attempt of every call; retries select again
    #[must_use]
    pub fn with_pinned_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.pinned = Some(endpoint);
        self
    }

    /// Endpoint of the most recent successful call
    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.last_good.lock().clone()
    }

    /// Retry policy in effect
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send a synthesis request and return the WAV bytes
    ///
    /// # Errors
    ///
    /// - [`MurmurError::BadRequest`] for blank text, or if the server
    ///   rejected the request
    /// - [`MurmurError::AttemptsExhausted`] carrying the last failure once
    ///   every attempt failed
    pub async fn send(&self, request: &SynthesisRequest) -> MurmurResult<Vec<u8>> {
        if request.text.trim().is_empty() {
            return Err(MurmurError::bad_request("Text cannot be empty"));
        }
        self.execute("synthesis", |endpoint| self.post_tts(endpoint, request))
            .await
    }

    /// Fetch the server's model inventory
    ///
    /// # Errors
    ///
    /// Same as [`ResilientClient::send`].
    pub async fn list_models(&self) -> MurmurResult<ModelInventory> {
        self.execute("inventory", |endpoint| self.get_models(endpoint))
            .await
    }

    async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> MurmurResult<T>
    where
        F: Fn(Endpoint) -> Fut,
        Fut: Future<Output = MurmurResult<T>>,
    {
        let mut preferred = self.pinned.clone().or_else(|| self.last_endpoint());
        let mut attempt = 0;
        let mut state = State::Connecting;

        loop {
            state = match state {
                State::Connecting => {
                    attempt += 1;
                    let selected = match preferred.take() {
                        Some(endpoint) => Ok(endpoint),
                        None => self.selector.select().await,
                    };
                    match selected {
                        Ok(endpoint) => {
                            if attempt > 1 {
                                tokio::time::sleep(self.policy.pause).await;
                            }
                            State::Requesting(endpoint)
                        }
                        Err(e) => State::Retrying(e),
                    }
                }
                State::Requesting(endpoint) => {
                    debug!("{} attempt {} against {}", operation, attempt, endpoint);
                    match call(endpoint.clone()).await {
                        Ok(value) => {
                            *self.last_good.lock() = Some(endpoint);
                            return Ok(value);
                        }
                        Err(e) if !e.is_retriable() => return Err(e),
                        Err(e) => State::Retrying(e),
                    }
                }
                State::Retrying(error) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        operation, attempt, self.policy.max_attempts, error
                    );
                    if attempt >= self.policy.max_attempts {
                        return Err(MurmurError::attempts_exhausted(attempt, error));
                    }
                    *self.last_good.lock() = None;
                    info!("Reconnecting to TTS server");
                    State::Connecting
                }
            };
        }
    }

    async fn post_tts(&self, endpoint: Endpoint, request: &SynthesisRequest) -> MurmurResult<Vec<u8>> {
        let response = self
            .http
            .post(endpoint.url("/tts"))
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_models(&self, endpoint: Endpoint) -> MurmurResult<ModelInventory> {
        let response = self.http.get(endpoint.url("/models")).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> MurmurResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error)
        .unwrap_or(body);

    if status == reqwest::StatusCode::BAD_REQUEST {
        Err(MurmurError::bad_request(message))
    } else {
        Err(MurmurError::application(status.as_u16(), message))
    }
}
