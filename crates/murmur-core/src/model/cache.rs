// ModelCache: lazily loaded synthesis engines keyed by model identifier.
// One load per key at a time; every waiter for that key gets the same outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

use super::reference::{self, ReferenceAudio, ReferenceAudioConfig};
use super::types::{ModelEntry, ModelInventory, ModelKey, SharedEntry};
use crate::engine::{EngineBackend, SynthesisOptions};
use crate::error::{MurmurError, MurmurResult};

type LoadOutcome = MurmurResult<SharedEntry>;
type LoadSlot = watch::Receiver<Option<LoadOutcome>>;

/// Thread-safe cache of loaded engines.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ModelCache {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn EngineBackend>,
    entries: RwLock<HashMap<ModelKey, SharedEntry>>,
    // Lock order: in_flight before entries.
    in_flight: Mutex<HashMap<ModelKey, LoadSlot>>,
    reference_config: ReferenceAudioConfig,
    reference: OnceCell<Arc<ReferenceAudio>>,
}

impl ModelCache {
    /// Create an empty cache over `backend`
    pub fn new(backend: Arc<dyn EngineBackend>, reference_config: ReferenceAudioConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                reference_config,
                reference: OnceCell::new(),
            }),
        }
    }

    /// Get a cached entry without loading
    pub fn get(&self, key: &ModelKey) -> Option<SharedEntry> {
        self.shared.entries.read().get(key).cloned()
    }

    /// Return the entry for `key`, loading it first if needed.
    ///
    /// Concurrent callers for the same uncached key wait on a single load
    /// and all observe its outcome. Loading one key never blocks lookups
    /// of another.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::ModelUnavailable`] if the load fails. Failures
    /// are not cached; the next call starts a new load.
    pub async fn get_or_load(&self, key: &ModelKey) -> MurmurResult<SharedEntry> {
        if let Some(entry) = self.get(key) {
            return Ok(entry);
        }

        let mut slot = {
            let mut in_flight = self.shared.in_flight.lock();
            // The load may have been published between the fast path and here.
            if let Some(entry) = self.get(key) {
                return Ok(entry);
            }
            match in_flight.get(key) {
                Some(slot) => {
                    debug!(model = %key, "Waiting for in-flight load");
                    slot.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());
                    Shared::spawn_load(Arc::clone(&self.shared), key.clone(), tx);
                    rx
                }
            }
        };

        let outcome = match slot.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(MurmurError::model_unavailable(
                key.as_str(),
                "load task ended without a result",
            ))
        })
    }

    /// Load each key in order, logging failures instead of returning them
    pub async fn preload(&self, keys: &[ModelKey]) {
        info!("Preloading {} TTS model(s)", keys.len());
        for key in keys {
            if let Err(e) = self.get_or_load(key).await {
                error!("Failed to preload model {}: {}", key, e);
            }
        }
        info!("Model preload finished");
    }

    /// Keys of every cached entry, sorted
    pub fn loaded_models(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self.shared.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Loaded models and reference recording, for reporting
    pub fn inventory(&self) -> ModelInventory {
        ModelInventory {
            loaded_models: self.loaded_models(),
            reference_audio: self.reference_audio().map(|audio| audio.path().to_path_buf()),
        }
    }

    /// Reference audio, if it has been provisioned already
    pub fn reference_audio(&self) -> Option<Arc<ReferenceAudio>> {
        self.shared.reference.get().cloned()
    }

    /// Provision the shared reference recording on first use.
    ///
    /// Returns `None` when no source produced a usable recording; the next
    /// call tries again. Callers proceed without voice cloning in that case.
    pub async fn ensure_reference_audio(&self) -> Option<Arc<ReferenceAudio>> {
        match self
            .shared
            .reference
            .get_or_try_init(|| self.provision_reference())
            .await
        {
            Ok(audio) => Some(Arc::clone(audio)),
            Err(e) => {
                warn!("Reference audio unavailable: {}", e);
                None
            }
        }
    }

    async fn provision_reference(&self) -> MurmurResult<Arc<ReferenceAudio>> {
        let config = &self.shared.reference_config;

        if config.path.exists() {
            match ReferenceAudio::open(&config.path) {
                Ok(audio) => {
                    info!("Using existing reference audio: {:?}", audio.path());
                    return Ok(Arc::new(audio));
                }
                Err(e) => warn!("Existing reference audio is unusable: {}", e),
            }
        }

        if let Some(url) = &config.download_url {
            let timeout = Duration::from_secs(config.download_timeout_secs);
            match reference::download(url, &config.path, timeout).await {
                Ok(audio) => {
                    info!("Downloaded reference audio to {:?}", audio.path());
                    return Ok(Arc::new(audio));
                }
                Err(e) => warn!("Failed to download reference audio: {}", e),
            }
        }

        if let Some(model) = &config.fallback_model {
            info!("Synthesizing reference audio with {}", model);
            let entry = self.get_or_load(model).await?;
            let text = config.fallback_text.clone();
            let path = config.path.clone();
            let audio = tokio::task::spawn_blocking(move || {
                let bytes = entry
                    .synthesize(&text, &SynthesisOptions::default())
                    .map_err(|e| MurmurError::synthesis(format!("{e:#}")))?;
                ReferenceAudio::store(&path, &bytes)
            })
            .await
            .map_err(|e| MurmurError::synthesis(format!("Reference synthesis task failed: {e}")))??;
            info!("Created reference audio at {:?}", audio.path());
            return Ok(Arc::new(audio));
        }

        Err(MurmurError::file(format!(
            "No reference audio at {} and no source configured to create one",
            config.path.display()
        )))
    }
}

impl Shared {
    fn spawn_load(shared: Arc<Self>, key: ModelKey, tx: watch::Sender<Option<LoadOutcome>>) {
        tokio::spawn(async move {
            let outcome = shared.load(&key).await;
            shared.publish(&key, &outcome);
            // Waiters may all have gone away; the entry is cached regardless.
            let _ = tx.send(Some(outcome));
        });
    }

    async fn load(&self, key: &ModelKey) -> LoadOutcome {
        info!("Loading TTS model: {}", key);
        let backend = Arc::clone(&self.backend);
        let load_key = key.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            backend
                .load(&load_key)
                .map(|engine| ModelEntry::new(load_key, engine, started.elapsed()))
        })
        .await;

        match result {
            Ok(Ok(entry)) => {
                info!(
                    "Model {} loaded in {:.2}s",
                    key,
                    entry.load_time().as_secs_f32()
                );
                Ok(Arc::new(entry))
            }
            Ok(Err(e)) => {
                error!("Failed to load model {}: {:#}", key, e);
                Err(MurmurError::model_unavailable(key.as_str(), format!("{e:#}")))
            }
            Err(e) => {
                error!("Load task for model {} failed: {}", key, e);
                Err(MurmurError::model_unavailable(
                    key.as_str(),
                    format!("load task failed: {e}"),
                ))
            }
        }
    }

    fn publish(&self, key: &ModelKey, outcome: &LoadOutcome) {
        let mut in_flight = self.in_flight.lock();
        if let Ok(entry) = outcome {
            self.entries.write().insert(key.clone(), Arc::clone(entry));
        }
        in_flight.remove(key);
    }
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("loaded_models", &self.loaded_models())
            .field("reference_audio", &self.reference_audio())
            .finish_non_exhaustive()
    }
}
