//! Server and client configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables. Command-line flags are applied on top by the
//! binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::CommandEngineConfig;
use crate::error::{MurmurError, MurmurResult};
use crate::model::{ModelKey, ReferenceAudioConfig};
use crate::DEFAULT_PORT;

/// Port variable read by both server and client
pub const PORT_ENV: &str = "MURMUR_PORT";
/// Fallback port variable, for hosts that inject `PORT`
pub const PORT_ENV_FALLBACK: &str = "PORT";
/// Set to `1`, `true` or `yes` to start the server without preloading
pub const SKIP_PRELOAD_ENV: &str = "SKIP_PRELOAD";
/// Pins the client to a single server URL
pub const SERVER_URL_ENV: &str = "MURMUR_SERVER_URL";

/// Synthesis server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Start serving without loading `preload_models`
    pub skip_preload: bool,
    /// Models loaded in the background at startup
    pub preload_models: Vec<ModelKey>,
    /// External engine program and model catalog
    pub engine: CommandEngineConfig,
    /// Reference recording for voice cloning
    pub reference_audio: ReferenceAudioConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            skip_preload: false,
            preload_models: vec![ModelKey::default_engine(), ModelKey::multilingual()],
            engine: CommandEngineConfig::default(),
            reference_audio: ReferenceAudioConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path` (when given) and apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::Configuration`] if the file cannot be read or
    /// parsed, or an environment variable holds an invalid value.
    pub fn load(path: Option<&Path>) -> MurmurResult<Self> {
        let mut config: Self = read_toml(path)?;
        if let Some(port) = port_from_env()? {
            config.port = port;
        }
        if let Some(value) = env_var(SKIP_PRELOAD_ENV) {
            config.skip_preload = parse_flag(&value);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::Configuration`] describing the first bad value.
    pub fn validate(&self) -> MurmurResult<()> {
        if self.host.trim().is_empty() {
            return Err(MurmurError::configuration("host cannot be empty"));
        }
        if self.engine.program.as_os_str().is_empty() {
            return Err(MurmurError::configuration("engine.program cannot be empty"));
        }
        Ok(())
    }

    /// `host:port` string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server port probed on every candidate host
    pub port: u16,
    /// Skip discovery and always use this URL
    pub server_url: Option<String>,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub retry_pause_ms: u64,
    /// Per-candidate probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Timeout for one synthesis request in seconds
    pub request_timeout_secs: u64,
    /// Model sent with every request; inferred by the server when unset
    pub model: Option<ModelKey>,
    /// Language sent with every request; inferred by the server when unset
    pub language: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            server_url: None,
            max_attempts: 3,
            retry_pause_ms: 1000,
            probe_timeout_ms: 2000,
            request_timeout_secs: 60,
            model: None,
            language: None,
        }
    }
}

impl ClientConfig {
    /// Load from `path` (when given) and apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::Configuration`] if the file cannot be read or
    /// parsed, or a value is out of range.
    pub fn load(path: Option<&Path>) -> MurmurResult<Self> {
        let mut config: Self = read_toml(path)?;
        if let Some(port) = port_from_env()? {
            config.port = port;
        }
        if let Some(url) = env_var(SERVER_URL_ENV) {
            config.server_url = Some(url);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::Configuration`] describing the first bad value.
    pub fn validate(&self) -> MurmurResult<()> {
        if self.port == 0 {
            return Err(MurmurError::configuration("port must be non-zero"));
        }
        if self.max_attempts == 0 {
            return Err(MurmurError::configuration("max_attempts must be at least 1"));
        }
        if self.probe_timeout_ms == 0 {
            return Err(MurmurError::configuration("probe_timeout_ms must be non-zero"));
        }
        if self.request_timeout_secs == 0 {
            return Err(MurmurError::configuration("request_timeout_secs must be non-zero"));
        }
        Ok(())
    }

    /// Pause between attempts
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    /// Per-candidate probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Timeout for one synthesis request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn read_toml<T>(path: Option<&Path>) -> MurmurResult<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(path) = path else {
        return Ok(T::default());
    };
    debug!("Reading configuration from {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|e| {
        MurmurError::configuration(format!("Cannot read {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&text)?)
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn port_from_env() -> MurmurResult<Option<u16>> {
    let Some((name, value)) = [PORT_ENV, PORT_ENV_FALLBACK]
        .into_iter()
        .find_map(|name| env_var(name).map(|value| (name, value)))
    else {
        return Ok(None);
    };
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(Some(port)),
        _ => Err(MurmurError::configuration(format!(
            "{name} must be a port number, got '{value}'"
        ))),
    }
}

/// `1`, `true` and `yes` (any case) are on; everything else is off
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
