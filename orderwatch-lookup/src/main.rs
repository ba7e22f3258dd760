//! orderwatch-lookup - bulk order status lookup service
//!
//! Runs either as an HTTP service (`serve`, the default) or as a one-shot
//! command-line lookup (`lookup`) that prints the merged result as JSON.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orderwatch_common::config::{
    default_config_path, load_toml_config, read_toml_config, write_toml_config,
    CompiledDefaults, TomlConfig,
};
use orderwatch_common::events::EventBus;
use orderwatch_lookup::config::{CliOverrides, ServiceConfig};
use orderwatch_lookup::db::open_result_cache;
use orderwatch_lookup::models::LookupSession;
use orderwatch_lookup::services::{
    export_columns, normalize, summarize, write_csv, ExportFormat, LookupService, MonitoringClient,
};
use orderwatch_lookup::AppState;
use serde_json::json;
use tokio::signal;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Event bus capacity; slow SSE clients beyond this lag and skip events
const EVENT_BUS_CAPACITY: usize = 1000;

/// Command-line arguments for orderwatch-lookup
#[derive(Parser, Debug)]
#[command(name = "orderwatch-lookup")]
#[command(about = "Bulk order status lookup against the monitoring service")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data folder holding the result cache database
    #[arg(long, global = true)]
    data_folder: Option<PathBuf>,

    /// Base URL of the monitoring service
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Bearer token for the monitoring service
    #[arg(long, global = true)]
    api_token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Look up identifiers once and print the result as JSON
    Lookup {
        /// File with identifiers (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Ignore cached results
        #[arg(long)]
        force_refresh: bool,

        /// Print the records as CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.config.as_deref());

    info!(
        "orderwatch-lookup {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml = load_toml_config(args.config.as_deref());
    let mut overrides = CliOverrides {
        data_folder: args.data_folder.clone(),
        remote_url: args.remote_url.clone(),
        api_token: args.api_token.clone(),
        port: None,
    };

    match args.command {
        None => run_server(overrides, &toml).await,
        Some(Command::Serve { port }) => {
            overrides.port = port;
            run_server(overrides, &toml).await
        }
        Some(Command::Lookup {
            file,
            force_refresh,
            csv,
        }) => run_lookup(overrides, &toml, file.as_deref(), force_refresh, csv).await,
        Some(Command::InitConfig { force }) => init_config(args.config, force),
    }
}

/// Log to stderr; RUST_LOG wins over the configured level
fn init_tracing(config_path: Option<&Path>) {
    // Quiet read: the subscriber is not up yet, load_toml_config reports problems later
    let level = config_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .and_then(|path| read_toml_config(&path).ok())
        .map(|config| config.logging.level)
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "orderwatch_lookup={level},orderwatch_common={level},tower_http=info"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the lookup service from resolved configuration
async fn build_service(config: &ServiceConfig) -> Result<Arc<LookupService>> {
    info!("Data folder: {}", config.data_folder.display());
    info!("Monitoring service: {}", config.remote_base_url);

    let cache = open_result_cache(config.database_path.as_deref(), config.cache_ttl()).await;

    let purged = cache.purge_expired().await;
    if purged > 0 {
        info!(purged, "Removed expired cache entries");
    }

    let client = Arc::new(
        MonitoringClient::new(
            config.remote_base_url.clone(),
            config.api_token.clone(),
            config.request_timeout,
        )
        .context("Failed to build monitoring service client")?,
    );

    Ok(Arc::new(LookupService::new(
        client.clone(),
        client,
        cache,
        &config.lookup,
        Arc::new(config.status_groups.clone()),
        EventBus::new(EVENT_BUS_CAPACITY),
    )))
}

async fn run_server(overrides: CliOverrides, toml: &TomlConfig) -> Result<()> {
    let config = ServiceConfig::resolve(&overrides, toml);
    let service = build_service(&config).await?;

    let app = orderwatch_lookup::build_router(AppState::new(service));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn run_lookup(
    overrides: CliOverrides,
    toml: &TomlConfig,
    file: Option<&Path>,
    force_refresh: bool,
    csv: bool,
) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read identifiers from stdin")?;
            buffer
        }
    };

    let identifiers = normalize(&input);
    if identifiers.is_empty() {
        anyhow::bail!("No identifiers found in input");
    }

    let config = ServiceConfig::resolve(&overrides, toml);
    let service = build_service(&config).await?;

    let session = Arc::new(RwLock::new(LookupSession::new(
        identifiers.fingerprint().to_string(),
        identifiers.len(),
    )));

    let stop = CancellationToken::new();
    let interrupt = stop.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight batches");
            interrupt.cancel();
        }
    });

    let result = service
        .execute(&session, &identifiers, stop, force_refresh)
        .await;

    if csv {
        let columns = export_columns(result.records(), None);
        let bytes = write_csv(result.records(), &columns, ExportFormat::Csv)
            .context("Failed to write CSV")?;
        std::io::stdout()
            .write_all(&bytes)
            .context("Failed to write to stdout")?;
        if !result.missing().is_empty() {
            warn!(missing = result.missing().len(), "Some identifiers were not found");
        }
        return Ok(());
    }

    let snapshot = session.read().await.clone();
    let output = json!({
        "session": snapshot,
        "summary": summarize(&result, service.status_groups()),
        "records": result.records(),
        "missing": result.missing(),
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize result")?
    );
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let target = path
        .or_else(default_config_path)
        .context("Could not determine config directory; pass --config")?;

    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }

    write_toml_config(&TomlConfig::default(), &target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!("Wrote {}", target.display());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
