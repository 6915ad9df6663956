//! Shelfmark backend server.
//!
//! Wires configuration, database, the job subsystem and the HTTP surface
//! together, then runs the worker loop alongside the server until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use shelfmark_db::{AttachmentStore, EntryStore};
use shelfmark_job_queue::{BroadcastEventSink, JobRegistry, JobStore, JobWorker};
use shelfmark_jobs::enrich::page::HttpPageSummaryFetcher;
use shelfmark_jobs::enrich::platform::{
    ImdbJsonLdFetcher, PlatformMetadataFetcher, YouTubeOembedFetcher,
};
use shelfmark_jobs::llm::GeminiClient;
use shelfmark_jobs::thumbs::preview::HttpPreviewImageFetcher;
use shelfmark_jobs::thumbs::screenshot::CdpScreenshotter;
use shelfmark_jobs::{EnrichEntryHandler, RegenerateThumbnailHandler};
use shelfmark_server::state::AppState;
use shelfmark_storage::FileStorage;

mod cli;
mod tracing_setup;

use cli::CliArgs;
use tracing_setup::install_tracing_from_config;

/// Capacity of the job change feed; slow subscribers lose old events.
const JOB_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    if args.help_requested {
        CliArgs::print_help();
        return Ok(());
    }

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .or_else(|| std::env::var("SHELFMARK_CONFIG_PATH").ok());
    let config = match config_path.as_deref() {
        Some(p) => shelfmark_config::load_config(Some(p))?,
        None => shelfmark_config::load_config::<&std::path::Path>(None)?,
    };
    shelfmark_config::validate_config(&config)?;

    install_tracing_from_config(&config.logging);
    tracing::info!(config_path = ?config_path, "configuration loaded");

    // Database
    let mut db_cfg = shelfmark_db::DbConnectionConfig::for_file_path(&config.database.path);
    db_cfg.max_connections = config.database.max_connections;
    db_cfg.connect_timeout_secs = config.database.connect_timeout_secs;
    let db_pool = shelfmark_db::create_pool(&db_cfg).await?;
    shelfmark_db::apply_schema(&db_pool).await?;
    tracing::info!(db_url = %db_cfg.url, "database ready");

    // Shared collaborators
    let http = shelfmark_jobs::fetch::default_http_client();
    let entries = EntryStore::new(db_pool.clone());
    let attachments = AttachmentStore::new(db_pool.clone());
    let storage = FileStorage::new(&config.storage.data_dir);

    let job_events = BroadcastEventSink::new(JOB_EVENT_CAPACITY);
    let job_store = JobStore::new(db_pool.clone(), Arc::new(job_events.clone()));

    // Job handlers
    let generator = Arc::new(GeminiClient::new(
        http.clone(),
        config.llm.model.clone(),
        config.llm.api_key.clone(),
    ));
    let page_fetcher = Arc::new(HttpPageSummaryFetcher::new(http.clone()));
    let platform_fetchers: Vec<Arc<dyn PlatformMetadataFetcher>> = vec![
        Arc::new(YouTubeOembedFetcher::new(http.clone())),
        Arc::new(ImdbJsonLdFetcher::new(http.clone())),
    ];
    let preview = Arc::new(HttpPreviewImageFetcher::new(http.clone()));
    let screenshotter = Arc::new(CdpScreenshotter::new(
        config.thumbnails.browser_binary.clone(),
        http.clone(),
        Duration::from_millis(config.thumbnails.navigation_timeout_ms),
        Duration::from_millis(config.thumbnails.settle_delay_ms),
    ));

    let mut registry = JobRegistry::new();
    registry.register(EnrichEntryHandler::new(
        entries.clone(),
        attachments,
        storage.clone(),
        page_fetcher,
        platform_fetchers,
        generator,
    ));
    registry.register(RegenerateThumbnailHandler::new(
        entries,
        storage,
        preview,
        screenshotter,
    ));
    let registry = Arc::new(registry);

    // Worker loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = JobWorker::new(
        job_store.clone(),
        registry,
        config.jobs.max_attempts,
        Duration::from_millis(config.jobs.poll_delay_ms),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // HTTP surface
    let state = Arc::new(AppState::new(db_pool, job_store, job_events));
    let app = shelfmark_server::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
