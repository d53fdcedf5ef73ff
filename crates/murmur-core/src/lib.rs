//! # Murmur Core
//!
//! Local text-to-speech serving that keeps working across VPN tunnels,
//! containers and server restarts.
//!
//! ## Features
//!
//! - Lazily loaded synthesis engines, one load per model at a time
//! - Model and language picked from the text when the caller does not say
//! - Voice-cloning reference recording provisioned on first use
//! - Client-side server discovery over loopback, host and bridge addresses
//! - Requests that reconnect and retry when the server goes away
//!
//! ## Example
//!
//! ```rust,no_run
//! use murmur_core::{ClientConfig, ResilientClient, SynthesisRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ResilientClient::from_config(&ClientConfig::default())?;
//!     let wav = client.send(&SynthesisRequest::new("Hello, world!")).await?;
//!     std::fs::write("hello.wav", wav)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod language;
pub mod model;
pub mod server;

// Re-export main types for convenience
pub use client::{
    CandidateGenerator, ConnectionSelector, Endpoint, EndpointSelector, HealthProbe,
    ResilientClient, RetryPolicy, TriggerSlot,
};
pub use config::{ClientConfig, ServerConfig};
pub use dispatcher::{SynthesisDispatcher, SynthesisRequest};
pub use engine::{CommandBackend, EngineBackend, EngineCapabilities, SynthesisEngine, SynthesisOptions};
pub use error::{MurmurError, MurmurResult};
pub use model::{ModelCache, ModelInventory, ModelKey, ReferenceAudio, ReferenceAudioConfig};
pub use server::{AppState, Server};

/// Version information for the murmur-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Port the server listens on and the client probes by default
pub const DEFAULT_PORT: u16 = 8090;
