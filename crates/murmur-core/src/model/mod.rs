//! Model management for the synthesis server.
//! Engines are loaded lazily, once per key, and cached for the process lifetime.

/// Lazily loaded engine cache
pub mod cache;
/// Reference recording for voice-cloning engines
pub mod reference;
/// Model keys and cache entries
pub mod types;

pub use cache::ModelCache;
pub use reference::{ReferenceAudio, ReferenceAudioConfig};
pub use types::{ModelEntry, ModelInventory, ModelKey, SharedEntry};
