//! License Gate
//!
//! TLS-terminating reverse proxy in front of a licensing API.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────────┐
//!                   │                       LICENSE GATE                        │
//!                   │                                                           │
//!   Client Request  │  ┌─────────┐    ┌──────────────┐    ┌───────────────┐    │
//!   ────────────────┼─▶│   TLS   │───▶│  admission   │───▶│    gateway    │────┼──▶ Licensing
//!                   │  │listener │    │ rate limit,  │    │ inject x-api- │    │     Backend
//!                   │  └─────────┘    │ method, path,│    │ key, relay    │    │
//!                   │                 │ credential   │    └───────┬───────┘    │
//!                   │                 └──────────────┘            │            │
//!                   │                                             ▼            │
//!   Client Response │                                     ┌───────────────┐    │
//!   ◀───────────────┼─────────────────────────────────────│ sign response │◀───┼───
//!                   │                                     │  (Ed25519)    │    │
//!                   │                                     └───────────────┘    │
//!                   └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

use license_gate::config::load_config;
use license_gate::http::HttpServer;
use license_gate::lifecycle::{self, Shutdown, StartupError};
use license_gate::net::tls::load_tls_config;
use license_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "license-gate")]
#[command(about = "Signing reverse proxy for license API calls", long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(short, long, env = "LICENSE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level; overrides the configuration file.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(cli.log_level.as_deref().unwrap_or("info"));
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init_logging(&level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        started_at = unix_now(),
        "license-gate starting"
    );

    let code = match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "license-gate failed");
            ExitCode::FAILURE
        }
    };

    tracing::info!(stopped_at = unix_now(), "license-gate stopped");
    code
}

async fn run(config: license_gate::GateConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        data_dir = %config.data_dir.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let prepared = lifecycle::prepare(config).await?;
    let tls = load_tls_config(&prepared.tls.cert_path, &prepared.tls.key_path)
        .await
        .map_err(StartupError::Certificate)?;

    let server = HttpServer::new(prepared.config, prepared.signer)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on_signal();

    server
        .run_tls(tls, server_shutdown)
        .await
        .map_err(StartupError::Bind)
}
