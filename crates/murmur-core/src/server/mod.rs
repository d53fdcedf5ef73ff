//! HTTP front end of the synthesis server.
//!
//! Routes:
//! - `GET /health`: liveness, `{"status":"running"}`
//! - `POST /tts`: `{text, model_name?, language?}` to `audio/wav`
//! - `GET /models`: loaded models and reference recording

/// Request handlers and error responses
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};

use crate::config::ServerConfig;
use crate::dispatcher::SynthesisDispatcher;
use crate::engine::EngineBackend;
use crate::error::{MurmurError, MurmurResult};
use crate::model::{ModelCache, ModelKey};

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request dispatcher; owns a handle to the model cache
    pub dispatcher: SynthesisDispatcher,
}

impl AppState {
    /// State over an existing cache
    pub fn new(cache: ModelCache) -> Self {
        Self {
            dispatcher: SynthesisDispatcher::new(cache),
        }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/health", get(routes::health))
        .route("/tts", post(routes::synthesize))
        .route("/models", get(routes::models))
        .layer(trace_layer)
        .with_state(state)
}

/// A bound, not yet running server
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: AppState,
    preload: Vec<ModelKey>,
}

impl Server {
    /// Bind the configured address and set up an empty model cache
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(config: &ServerConfig, backend: Arc<dyn EngineBackend>) -> MurmurResult<Self> {
        let cache = ModelCache::new(backend, config.reference_audio.clone());
        let address = config.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            MurmurError::configuration(format!("Cannot listen on {address}: {e}"))
        })?;

        let preload = if config.skip_preload {
            info!("Skipping model preload");
            Vec::new()
        } else {
            config.preload_models.clone()
        };

        Ok(Self {
            listener,
            state: AppState::new(cache),
            preload,
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> MurmurResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state, for inspection
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` completes. Preloading runs in the background
    /// so `/health` answers while models load.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop fails.
    pub async fn run<F>(self, shutdown: F) -> MurmurResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.preload.is_empty() {
            let cache = self.state.dispatcher.cache().clone();
            let keys = self.preload;
            tokio::spawn(async move { cache.preload(&keys).await });
        }

        info!("TTS server listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("TTS server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
