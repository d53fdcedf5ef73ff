// Model keys and the entries the cache hands out

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineCapabilities, SynthesisEngine, SynthesisOptions};

/// Identifier of a synthesis engine configuration (engine family plus
/// language/voice variant). Compared by exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKey(String);

impl ModelKey {
    /// Default single-language English engine
    pub const DEFAULT: &'static str = "tts_models/en/ljspeech/tacotron2-DDC";
    /// Multilingual, voice-cloning-capable engine
    pub const MULTILINGUAL: &'static str = "tts_models/multilingual/multi-dataset/xtts_v2";

    /// Wrap an identifier
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    /// The default single-language key
    #[must_use]
    pub fn default_engine() -> Self {
        Self::new(Self::DEFAULT)
    }

    /// The multilingual key
    #[must_use]
    pub fn multilingual() -> Self {
        Self::new(Self::MULTILINGUAL)
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ModelKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A loaded synthesis engine plus what it declared about itself at load time.
///
/// The engine sits behind its own lock: engines are not assumed to be
/// reentrant, so calls into one entry never interleave.
pub struct ModelEntry {
    key: ModelKey,
    capabilities: EngineCapabilities,
    engine: Mutex<Box<dyn SynthesisEngine>>,
    load_time: Duration,
}

impl ModelEntry {
    /// Wrap a freshly loaded engine, reading its capabilities once
    pub fn new(key: ModelKey, engine: Box<dyn SynthesisEngine>, load_time: Duration) -> Self {
        let capabilities = engine.capabilities();
        Self {
            key,
            capabilities,
            engine: Mutex::new(engine),
            load_time,
        }
    }

    /// Key this entry was loaded for
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Capabilities reported by the engine at load time
    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    /// Wall-clock time the load took
    pub fn load_time(&self) -> Duration {
        self.load_time
    }

    /// Run one synthesis call while holding the entry's lock.
    ///
    /// Blocking; call from a blocking thread.
    pub fn synthesize(&self, text: &str, options: &SynthesisOptions) -> anyhow::Result<Vec<u8>> {
        let mut engine = self.engine.lock();
        engine.synthesize(text, options)
    }
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry")
            .field("key", &self.key)
            .field("capabilities", &self.capabilities)
            .field("load_time", &self.load_time)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a cached entry
pub type SharedEntry = Arc<ModelEntry>;

/// What a server currently has in memory. Body of `GET /models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInventory {
    /// Keys of loaded engines, sorted
    pub loaded_models: Vec<ModelKey>,
    /// Path of the provisioned reference recording, if any
    pub reference_audio: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_key_exact_match() {
        assert_eq!(ModelKey::from("a/b"), ModelKey::new("a/b".to_string()));
        assert_ne!(ModelKey::from("a/b"), ModelKey::from("a/B"));
        assert_ne!(ModelKey::from("a/b"), ModelKey::from("a/b "));
    }

    #[test]
    fn test_well_known_keys() {
        assert_eq!(ModelKey::default_engine().as_str(), ModelKey::DEFAULT);
        assert_eq!(ModelKey::multilingual().to_string(), ModelKey::MULTILINGUAL);
    }

    #[test]
    fn test_model_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&ModelKey::from("tts_models/x")).unwrap();
        assert_eq!(json, "\"tts_models/x\"");
    }
}
