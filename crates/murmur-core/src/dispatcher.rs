//! Server-side request handling: validate, pick a model and language,
//! fetch the engine from the cache, synthesize.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::SynthesisOptions;
use crate::error::{MurmurError, MurmurResult};
use crate::language;
use crate::model::{ModelCache, ModelEntry, ModelKey};

/// One synthesis request. Also the JSON body of `POST /tts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Model to use; inferred from the text when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<ModelKey>,
    /// Language code; inferred for multilingual engines when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SynthesisRequest {
    /// Request with text only
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Pin the model
    #[must_use]
    pub fn with_model<K: Into<ModelKey>>(mut self, model: K) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Pin the language
    #[must_use]
    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    fn model(&self) -> ModelKey {
        self.model_name
            .as_ref()
            .filter(|key| !key.as_str().trim().is_empty())
            .cloned()
            .unwrap_or_else(|| language::infer_model(&self.text))
    }

    fn requested_language(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
    }
}

/// Turns requests into audio using engines from a [`ModelCache`]
#[derive(Debug, Clone)]
pub struct SynthesisDispatcher {
    cache: ModelCache,
}

impl SynthesisDispatcher {
    /// Create a dispatcher over `cache`
    #[must_use]
    pub fn new(cache: ModelCache) -> Self {
        Self { cache }
    }

    /// The cache this dispatcher loads engines from
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Synthesize one request and return the encoded audio
    ///
    /// # Errors
    ///
    /// - [`MurmurError::BadRequest`] for blank text
    /// - [`MurmurError::ModelUnavailable`] if the engine cannot be loaded
    /// - [`MurmurError::SynthesisFailed`] if the engine fails; the cached
    ///   entry stays usable
    pub async fn synthesize(&self, request: &SynthesisRequest) -> MurmurResult<Vec<u8>> {
        if request.text.trim().is_empty() {
            return Err(MurmurError::bad_request("Text cannot be empty"));
        }

        let key = request.model();
        let entry = self.cache.get_or_load(&key).await?;
        let options = self.options_for(&entry, request).await;

        info!(
            model = %key,
            language = options.language.as_deref().unwrap_or("-"),
            speaker = options.speaker.as_deref().unwrap_or("-"),
            reference = options.reference_audio.is_some(),
            "Synthesizing {} characters",
            request.text.chars().count()
        );

        let started = Instant::now();
        let text = request.text.clone();
        let audio = tokio::task::spawn_blocking(move || entry.synthesize(&text, &options))
            .await
            .map_err(|e| MurmurError::synthesis(format!("Synthesis task failed: {e}")))?
            .map_err(|e| MurmurError::synthesis(format!("{e:#}")))?;

        info!(
            "Synthesis finished in {:.2}s ({} bytes)",
            started.elapsed().as_secs_f32(),
            audio.len()
        );
        Ok(audio)
    }

    /// Build the options an entry may receive; nothing the engine did not
    /// declare support for is ever set.
    async fn options_for(&self, entry: &ModelEntry, request: &SynthesisRequest) -> SynthesisOptions {
        let caps = entry.capabilities();
        let mut options = SynthesisOptions::default();

        if caps.multi_lingual {
            let language = request
                .requested_language()
                .map_or_else(|| language::infer_language(&request.text).to_string(), str::to_string);
            options.language = Some(language);
        } else if let Some(requested) = request.requested_language() {
            debug!(model = %entry.key(), "Ignoring language {} for single-language engine", requested);
        }

        // First listed speaker; the list carries no preference order of its own.
        if let Some(speaker) = caps.first_speaker() {
            options.speaker = Some(speaker.to_string());
        } else if caps.voice_cloning {
            options.reference_audio = self.cache.ensure_reference_audio().await;
            if options.reference_audio.is_none() {
                debug!(model = %entry.key(), "Synthesizing without reference audio");
            }
        }

        options
    }
}
