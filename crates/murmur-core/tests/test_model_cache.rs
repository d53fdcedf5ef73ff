//! Model cache: single-flight loading and reference provisioning

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{write_wav, FakeBackend};
use murmur_core::{ModelCache, ModelKey, MurmurError, ReferenceAudioConfig};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_over(backend: &Arc<FakeBackend>, reference: ReferenceAudioConfig) -> ModelCache {
    ModelCache::new(Arc::clone(backend) as _, reference)
}

fn no_reference() -> ReferenceAudioConfig {
    ReferenceAudioConfig::local_only("/nonexistent/murmur/reference.wav")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_load() {
    let backend = Arc::new(
        FakeBackend::new().with_delay(ModelKey::MULTILINGUAL, Duration::from_millis(300)),
    );
    let cache = cache_over(&backend, no_reference());
    let key = ModelKey::multilingual();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get_or_load(&key).await })
        })
        .collect();

    let mut entries = Vec::new();
    for task in tasks {
        entries.push(task.await.unwrap().unwrap());
    }

    assert_eq!(backend.loads(ModelKey::MULTILINGUAL), 1);
    assert!(entries.iter().all(|entry| Arc::ptr_eq(entry, &entries[0])));
    assert_eq!(cache.loaded_models(), vec![key]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failure_is_shared_and_not_cached() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_delay(ModelKey::DEFAULT, Duration::from_millis(200))
            .with_failure(ModelKey::DEFAULT),
    );
    let cache = cache_over(&backend, no_reference());
    let key = ModelKey::default_engine();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.get_or_load(&key).await })
        })
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        errors.push(task.await.unwrap().unwrap_err());
    }

    assert_eq!(backend.loads(ModelKey::DEFAULT), 1);
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert!(matches!(errors[0], MurmurError::ModelUnavailable { .. }));
    assert!(errors[0].to_string().contains("weights"));
    assert!(cache.get(&key).is_none());

    // The failure was not cached: a later call loads again.
    backend.heal(ModelKey::DEFAULT);
    cache.get_or_load(&key).await.unwrap();
    assert_eq!(backend.loads(ModelKey::DEFAULT), 2);
    assert!(cache.get(&key).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_load_does_not_block_other_keys() {
    let backend = Arc::new(
        FakeBackend::new().with_delay(ModelKey::MULTILINGUAL, Duration::from_millis(1500)),
    );
    let cache = cache_over(&backend, no_reference());

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_or_load(&ModelKey::multilingual()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    cache.get_or_load(&ModelKey::default_engine()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(cache.get(&ModelKey::multilingual()).is_none());

    slow.await.unwrap().unwrap();
    assert_eq!(
        cache.loaded_models(),
        vec![ModelKey::default_engine(), ModelKey::multilingual()]
    );
}

#[tokio::test]
async fn test_dropped_caller_does_not_abort_load() {
    let backend = Arc::new(
        FakeBackend::new().with_delay(ModelKey::DEFAULT, Duration::from_millis(200)),
    );
    let cache = cache_over(&backend, no_reference());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        cache.get_or_load(&ModelKey::default_engine()),
    )
    .await;
    assert!(abandoned.is_err());

    // A later caller joins or reuses the same load.
    cache.get_or_load(&ModelKey::default_engine()).await.unwrap();
    assert_eq!(backend.loads(ModelKey::DEFAULT), 1);
}

#[tokio::test]
async fn test_reference_uses_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reference.wav");
    write_wav(&path);

    let backend = Arc::new(FakeBackend::new());
    let cache = cache_over(&backend, ReferenceAudioConfig::local_only(&path));

    let first = cache.ensure_reference_audio().await.unwrap();
    let second = cache.ensure_reference_audio().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.path(), path.as_path());
    assert_eq!(first.sample_rate(), 22_050);
    assert_eq!(cache.inventory().reference_audio, Some(path));
}

#[tokio::test]
async fn test_missing_reference_is_retried_later() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reference.wav");

    let backend = Arc::new(FakeBackend::new());
    let cache = cache_over(&backend, ReferenceAudioConfig::local_only(&path));

    assert!(cache.ensure_reference_audio().await.is_none());
    write_wav(&path);
    assert!(cache.ensure_reference_audio().await.is_some());
}

#[tokio::test]
async fn test_reference_downloaded_when_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ljspeech_1.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(common::wav_bytes(4_410)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = ReferenceAudioConfig {
        download_url: Some(format!("{}/ljspeech_1.wav", server.uri())),
        fallback_model: None,
        ..ReferenceAudioConfig::local_only(dir.path().join("cache").join("reference.wav"))
    };
    let backend = Arc::new(FakeBackend::new());
    let cache = cache_over(&backend, config);

    let audio = cache.ensure_reference_audio().await.unwrap();
    assert!(audio.path().exists());
    assert_eq!(audio.duration(), Duration::from_millis(200));
    assert_eq!(backend.loads(ModelKey::DEFAULT), 0);
}

#[tokio::test]
async fn test_reference_synthesized_when_download_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>moved</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reference.wav");
    let config = ReferenceAudioConfig {
        download_url: Some(format!("{}/ljspeech_1.wav", server.uri())),
        fallback_model: Some(ModelKey::default_engine()),
        ..ReferenceAudioConfig::local_only(&path)
    };
    let backend = Arc::new(FakeBackend::new());
    let cache = cache_over(&backend, config);

    let audio = cache.ensure_reference_audio().await.unwrap();
    assert_eq!(audio.path(), path.as_path());
    assert!(path.exists());

    // The fallback model was loaded through the cache and stays there.
    assert_eq!(cache.loaded_models(), vec![ModelKey::default_engine()]);
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].text, murmur_core::model::reference::DEFAULT_REFERENCE_TEXT);
}
