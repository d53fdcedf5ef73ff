//! murmur - local text-to-speech server and VPN-tolerant client

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use murmur_core::{ClientConfig, ModelKey, ServerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "murmur",
    about = "Local text-to-speech server and client",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the synthesis server
    Serve(ServeArgs),
    /// Synthesize one text and save it as a WAV file
    Speak(SpeakArgs),
    /// Synthesize each line read from stdin; lines arriving mid-request are dropped
    Listen(ListenArgs),
    /// Probe every candidate address and report what answers
    Diagnose(ClientArgs),
    /// Show the models a server has loaded
    Models(ClientArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Start without preloading models
    #[arg(long)]
    skip_preload: bool,

    /// Synthesis program to run
    #[arg(long)]
    program: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server port to probe
    #[arg(short, long)]
    port: Option<u16>,

    /// Use this server URL instead of discovering one
    #[arg(short, long)]
    server: Option<String>,

    /// Per-candidate probe timeout in milliseconds
    #[arg(long)]
    probe_timeout_ms: Option<u64>,
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// Model to use (inferred by the server when omitted)
    #[arg(short, long)]
    model: Option<String>,

    /// Language code (inferred for multilingual models when omitted)
    #[arg(short, long)]
    language: Option<String>,

    /// Where to write the audio
    #[arg(short, long, default_value = "tts_output.wav")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct SpeakArgs {
    /// Text to speak
    text: String,

    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Debug, Args)]
struct ListenArgs {
    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    client: ClientArgs,
}

impl ServeArgs {
    fn resolve(&self) -> anyhow::Result<ServerConfig> {
        self.apply(ServerConfig::load(self.config.as_deref())?)
    }

    fn apply(&self, mut config: ServerConfig) -> anyhow::Result<ServerConfig> {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.skip_preload {
            config.skip_preload = true;
        }
        if let Some(program) = &self.program {
            config.engine.program.clone_from(program);
        }
        config.validate()?;
        Ok(config)
    }
}

impl ClientArgs {
    fn resolve(&self, request: Option<&RequestArgs>) -> anyhow::Result<ClientConfig> {
        self.apply(ClientConfig::load(self.config.as_deref())?, request)
    }

    /// Layer flags over `config`; `resolve` adds file and environment loading
    fn apply(
        &self,
        mut config: ClientConfig,
        request: Option<&RequestArgs>,
    ) -> anyhow::Result<ClientConfig> {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(server) = &self.server {
            config.server_url = Some(server.clone());
        }
        if let Some(timeout) = self.probe_timeout_ms {
            config.probe_timeout_ms = timeout;
        }
        if let Some(request) = request {
            if let Some(model) = &request.model {
                config.model = Some(ModelKey::new(model.as_str()));
            }
            if let Some(language) = &request.language {
                config.language = Some(language.clone());
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=info,murmur_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Serve(args) => commands::serve(args.resolve()?).await,
        Command::Speak(args) => {
            let config = args.client.resolve(Some(&args.request))?;
            commands::speak(&config, &args.text, &args.request.output).await
        }
        Command::Listen(args) => {
            let config = args.client.resolve(Some(&args.request))?;
            commands::listen(config, args.request.output).await
        }
        Command::Diagnose(args) => commands::diagnose(&args.resolve(None)?).await,
        Command::Models(args) => commands::models(&args.resolve(None)?).await,
    }
}
