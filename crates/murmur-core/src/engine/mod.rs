//! Boundary to the speech-synthesis engines.
//!
//! The core never looks inside an engine. It loads one per [`ModelKey`]
//! through an [`EngineBackend`], reads its [`EngineCapabilities`] once, and
//! afterwards only calls [`SynthesisEngine::synthesize`] with the parameters
//! those capabilities declare. Any loader quirks (checkpoint formats,
//! deserialization shims) belong inside a backend implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{ModelKey, ReferenceAudio};

/// Adapter that drives an external synthesis command line
pub mod command;

pub use command::{CatalogEntry, CommandBackend, CommandEngineConfig};

/// What a loaded engine supports. Reported once at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCapabilities {
    /// Engine accepts a speaker selection
    pub multi_speaker: bool,
    /// Named speakers, in the engine's own order
    pub speakers: Vec<String>,
    /// Engine accepts a language code
    pub multi_lingual: bool,
    /// Supported language codes
    pub languages: Vec<String>,
    /// Engine can condition its voice on a reference recording
    pub voice_cloning: bool,
}

impl EngineCapabilities {
    /// Capabilities of a plain single-speaker, single-language engine
    #[must_use]
    pub fn single() -> Self {
        Self::default()
    }

    /// First declared speaker of a multi-speaker engine, if any
    #[must_use]
    pub fn first_speaker(&self) -> Option<&str> {
        if self.multi_speaker {
            self.speakers.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// Optional parameters for one synthesis call.
///
/// Only fields backed by a capability flag are ever set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOptions {
    /// Speaker name (multi-speaker engines)
    pub speaker: Option<String>,
    /// Language code (multilingual engines)
    pub language: Option<String>,
    /// Voice-cloning reference (voice-cloning engines)
    pub reference_audio: Option<Arc<ReferenceAudio>>,
}

/// A loaded synthesis engine.
///
/// Not required to be reentrant; the model cache serializes calls per entry.
#[cfg_attr(test, mockall::automock)]
pub trait SynthesisEngine: Send {
    /// Capabilities of this engine instance
    fn capabilities(&self) -> EngineCapabilities;

    /// Synthesize `text` and return an encoded audio file (WAV)
    fn synthesize(&mut self, text: &str, options: &SynthesisOptions) -> anyhow::Result<Vec<u8>>;
}

/// Loads engines by model key. Loads are slow and blocking.
pub trait EngineBackend: Send + Sync {
    /// Load the engine for `key`
    fn load(&self, key: &ModelKey) -> anyhow::Result<Box<dyn SynthesisEngine>>;
}
