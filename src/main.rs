//! Declarative query gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, limits, timeout, trace)
//!                         │
//!                         ▼
//!                     routing::matcher (mount prefix → JSON document)
//!                         │
//!                         ▼
//!                     orchestrator ──▶ api::cache (compile once per document)
//!                         │                 │
//!                         │                 ▼
//!                         │            routing::trie (METHOD/path → endpoint)
//!                         ▼
//!                     api::context (conf/path/request/query → bind values)
//!                         │
//!                         ▼
//!                     backend (sqlite | htpasswd): prepare → bind → execute → close
//!                         │
//!     Client Response     ▼
//!     ◀────────────── JSON rows or {"error", "message"}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use query_gateway::backend::BackendRegistry;
use query_gateway::config::{self, ConfigError, GatewaySettings, MountConfig};
use query_gateway::http::HttpServer;
use query_gateway::lifecycle::{signals, startup, Shutdown};
use query_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "query-gateway", version, about = "Serve REST endpoints declared in JSON documents")]
struct Args {
    /// Server settings (TOML). Defaults are used when the file does not exist.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Serve a single API document at `/`, replacing the configured mounts.
    #[arg(short, long)]
    api: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn load_settings(args: &Args) -> Result<GatewaySettings, ConfigError> {
    let mut settings = if args.config.exists() {
        config::load_config(&args.config)?
    } else {
        GatewaySettings::default()
    };

    if let Some(api) = &args.api {
        settings.mounts = vec![MountConfig {
            prefix: "/".to_string(),
            config: api.to_string_lossy().into_owned(),
        }];
    }
    if let Some(bind) = &args.bind {
        settings.listener.bind_address = bind.clone();
    }

    config::validate_config(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    logging::init_logging(&settings.observability)?;
    tracing::info!("query-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        settings = ?args.config,
        bind_address = %settings.listener.bind_address,
        mounts = settings.mounts.len(),
        request_timeout_secs = settings.timeouts.request_secs,
        "Configuration loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(BackendRegistry::with_defaults());
    tracing::debug!(registry = ?registry, "Backends registered");

    let server = HttpServer::new(&settings, registry);
    let compiled = startup::preload(server.mounts(), server.orchestrator())?;
    tracing::info!(documents = compiled, "Configurations compiled");

    let listener = TcpListener::bind(&settings.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
