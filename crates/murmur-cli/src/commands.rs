use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use murmur_core::client::{CandidateGenerator, ConnectionSelector, HealthProbe, ProbeOutcome};
use murmur_core::server::shutdown_signal;
use murmur_core::{
    ClientConfig, CommandBackend, ResilientClient, Server, ServerConfig, SynthesisRequest,
    TriggerSlot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!("Starting Murmur TTS server");
    info!("Synthesis program: {}", config.engine.program.display());
    info!("Reference audio: {}", config.reference_audio.path.display());

    let backend = Arc::new(CommandBackend::new(config.engine.clone()));
    let server = Server::bind(&config, backend).await?;
    server.run(shutdown_signal()).await?;
    Ok(())
}

fn request_for(config: &ClientConfig, text: &str) -> SynthesisRequest {
    SynthesisRequest {
        text: text.to_string(),
        model_name: config.model.clone(),
        language: config.language.clone(),
    }
}

async fn speak_to(client: &ResilientClient, request: &SynthesisRequest, output: &Path) -> anyhow::Result<()> {
    let audio = client.send(request).await?;
    tokio::fs::write(output, &audio)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Saved {} bytes to {}", audio.len(), output.display());
    Ok(())
}

pub async fn speak(config: &ClientConfig, text: &str, output: &Path) -> anyhow::Result<()> {
    let client = ResilientClient::from_config(config)?;
    speak_to(&client, &request_for(config, text), output).await
}

pub async fn listen(config: ClientConfig, output: PathBuf) -> anyhow::Result<()> {
    let client = Arc::new(ResilientClient::from_config(&config)?);
    let config = Arc::new(config);
    let output = Arc::new(output);
    let slot = TriggerSlot::new();
    let mut last = None;

    info!("Reading lines from stdin; each line is spoken");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim().to_string();
        if text.is_empty() {
            continue;
        }

        let client = Arc::clone(&client);
        let config = Arc::clone(&config);
        let output = Arc::clone(&output);
        let job = async move {
            if let Err(e) = speak_to(&client, &request_for(&config, &text), &output).await {
                warn!("Failed to speak line: {:#}", e);
            }
        };
        match slot.try_spawn(job) {
            Some(handle) => last = Some(handle),
            None => warn!("Still speaking the previous line; ignoring this one"),
        }
    }

    if let Some(handle) = last {
        handle.await?;
    }
    Ok(())
}

pub async fn diagnose(config: &ClientConfig) -> anyhow::Result<()> {
    if let Some(url) = &config.server_url {
        println!("Pinned server URL: {url} (tried first; retries discover)");
    }

    let selector = ConnectionSelector::new(
        config.port,
        HealthProbe::new(config.probe_timeout())?,
        CandidateGenerator::system(),
    );
    println!(
        "Probing port {} ({} ms timeout per stage)",
        config.port, config.probe_timeout_ms
    );

    let candidates = selector.survey().await;
    for candidate in &candidates {
        match &candidate.outcome {
            ProbeOutcome::Reachable { latency } => {
                println!("  ok    {:<40} {} ms", candidate.endpoint.base_url(), latency.as_millis());
            }
            ProbeOutcome::Unreachable { stage, detail } => {
                println!("  fail  {:<40} {stage}: {detail}", candidate.endpoint.base_url());
            }
        }
    }

    match candidates.iter().find(|c| c.outcome.is_reachable()) {
        Some(first) => println!("Clients will connect to {}", first.endpoint),
        None => println!("No candidate answered; is the server running on port {}?", config.port),
    }
    Ok(())
}

pub async fn models(config: &ClientConfig) -> anyhow::Result<()> {
    let client = ResilientClient::from_config(config)?;
    let inventory = client.list_models().await?;

    if inventory.loaded_models.is_empty() {
        println!("No models loaded");
    } else {
        println!("Loaded models:");
        for model in &inventory.loaded_models {
            println!("  {model}");
        }
    }
    match &inventory.reference_audio {
        Some(path) => println!("Reference audio: {}", path.display()),
        None => println!("Reference audio: not provisioned"),
    }
    Ok(())
}
