//! CLI entry point for the route tracker.
//!
//! `serve` runs the HTTP server; `snapshot` prints the currently active buses
//! once and exits.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use route_tracker::config::{ReloadPolicy, ServerSettings, Settings, TrackerConfig};
use route_tracker::fetch::BasicClient;
use route_tracker::reference::{ReferenceStore, ReferenceTables};
use route_tracker::server::{AppState, ReferenceSource, app, track_buses};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "route_tracker")]
#[command(about = "Live positions of the active buses on one route", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve /api/buses and the map page
    Serve {
        #[command(flatten)]
        server: ServerSettings,
    },
    /// Print the active buses as JSON and exit
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/route_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("route_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let config = cli.settings.tracker_config()?;
    let client = BasicClient::new(cli.settings.feed_timeout()).context("building HTTP client")?;

    match cli.command {
        Commands::Serve { server } => serve(config, client, server).await?,
        Commands::Snapshot => {
            let references = startup_references(&config).await?;
            let buses = track_buses(&client, &config, &references).await?;
            info!(active = buses.len(), "Snapshot complete");
            println!("{}", serde_json::to_string_pretty(&buses)?);
        }
    }

    Ok(())
}

/// Loads the reference tables up front unless they are read per request.
async fn startup_references(config: &TrackerConfig) -> Result<ReferenceSource> {
    if config.reload == ReloadPolicy::PerRequest {
        return Ok(ReferenceSource::PerRequest);
    }

    let tables =
        ReferenceTables::load_async(config.references.clone(), config.route.route_id.clone())
            .await
            .context("loading reference tables")?;
    Ok(ReferenceSource::Cached(ReferenceStore::new(tables)))
}

#[tracing::instrument(skip_all, fields(bind = %server.bind, route_id = %config.route.route_id))]
async fn serve(config: TrackerConfig, client: BasicClient, server: ServerSettings) -> Result<()> {
    let references = startup_references(&config).await?;

    if let (ReferenceSource::Cached(store), ReloadPolicy::Every(every)) =
        (&references, config.reload)
    {
        info!(every_secs = every.as_secs(), "Reference reload enabled");
        store.spawn_reloader(
            config.references.clone(),
            config.route.route_id.clone(),
            every,
        );
    }

    if !server.index_file.exists() {
        warn!(index = %server.index_file.display(), "Landing page not found, / will 404");
    }

    let state = Arc::new(AppState {
        client,
        config,
        references,
    });
    let router = app(state, &server.index_file, &server.static_dir);

    let listener = tokio::net::TcpListener::bind(server.bind)
        .await
        .with_context(|| format!("binding {}", server.bind))?;

    info!("Server is running on http://{}", server.bind);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
