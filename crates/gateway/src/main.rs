use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use tg_domain::config::{Config, ConfigSeverity};
use tg_gateway::api;
use tg_gateway::state::AppState;
use tg_store::{FileStore, MemoryKv};

#[derive(Parser)]
#[command(name = "tutorgate", about = "AI tutoring session gateway")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "TG_CONFIG", default_value = "tutorgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the gateway server (the default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("tutorgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tg_gateway=debug")),
        )
        .json()
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    } else {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        Ok(Config::default())
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("TutorGate starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Persistence backends ─────────────────────────────────────────
    let store = Arc::new(
        FileStore::new(&config.storage.state_path).context("initializing file store")?,
    );
    let kv = Arc::new(MemoryKv::new());

    // ── Application state ────────────────────────────────────────────
    let state = AppState::build(config.clone(), store, kv).context("wiring app state")?;

    // ── Background tasks ─────────────────────────────────────────────
    state.docs.spawn_gc(config.whiteboard.gc_interval_secs);
    tracing::info!(
        interval_secs = config.whiteboard.gc_interval_secs,
        "ephemeral GC running"
    );

    // ── CORS for the front-end ───────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(
            config
                .server
                .cors_origin
                .parse::<HeaderValue>()
                .context("parsing cors_origin")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any);

    let app = api::router(state).layer(cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "TutorGate listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
