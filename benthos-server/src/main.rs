use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use benthos_config::Settings;
use benthos_core::{
    Catalog, Crawler, DataModel, FileCache, KeyStore, LabelStudioClient, LabelStudioSync,
    Metrics, Orchestrator, SummaryWorker, worker,
};
use benthos_server::{AppState, create_app};
use chrono::Utc;
use clap::Parser;
use prometheus::Registry;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments for the Benthos server.
#[derive(Parser, Debug)]
#[command(name = "benthos-server")]
#[command(about = "Coordination service for the dive-image processing pipeline")]
struct Args {
    /// Directory holding settings.toml (and optionally .secrets.toml)
    #[arg(long, env = "BENTHOS_CONFIG", default_value = ".")]
    config: PathBuf,

    /// Server port (overrides config)
    #[arg(short, long, env = "BENTHOS_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "benthos_server=debug,benthos_core=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A bad configuration is fatal before the listener binds.
    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    settings.validate().context("configuration validation failed")?;
    settings.ensure_directories()?;
    let mounts = settings.load_data_paths()?;
    info!("configuration loaded, {} data roots", mounts.len());

    let registry = Registry::new();
    let metrics = Arc::new(Metrics::new(&registry));

    let catalog = Catalog::connect(&settings.postgres.connection_url()?)
        .await
        .context("database connection failed")?;
    catalog.initialize_schema().await?;
    info!("catalog initialized");

    let key_store = Arc::new(
        KeyStore::open(&settings.web_api.key_store)
            .await
            .context("key store open failed")?,
    );

    let cache = FileCache::open(&settings.cache.path, settings.cache.max_storage_bytes())
        .await
        .context("file cache open failed")?;
    cache.attach_metrics(Arc::clone(&metrics));

    let data_model = Arc::new(DataModel::new(
        catalog.clone(),
        cache,
        mounts.clone(),
        &settings.data_model,
    ));

    let orchestrator = Arc::new(Orchestrator::new(catalog.clone(), Arc::clone(&metrics)));

    let (shutdown_tx, shutdown_rx) = worker::shutdown_channel();

    let crawler = Crawler::new(
        catalog.clone(),
        mounts,
        settings.exiftool.path.clone(),
        settings.logs.clone(),
        settings.scraper.interval,
        Arc::clone(&metrics),
    );
    let discovery_trigger = crawler.trigger();
    crawler.spawn(shutdown_rx.clone());

    let label_sync = LabelStudioSync::new(
        catalog.clone(),
        LabelStudioClient::new(
            &settings.label_studio.host,
            &settings.label_studio.api_key,
        ),
        settings.web_api.root_url.clone(),
        settings.label_studio.laser_projects,
        settings.label_studio.headtail_projects,
        settings.logs.bad_task_links(),
        settings.label_studio.interval,
        Arc::clone(&metrics),
    );
    let label_sync_trigger = label_sync.trigger();
    label_sync.spawn(shutdown_rx.clone());

    orchestrator.spawn_reaper(settings.orchestrator.reaper_interval, shutdown_rx.clone());

    SummaryWorker::new(catalog.clone(), settings.summary.interval, Arc::clone(&metrics))
        .spawn(shutdown_rx);

    let state = AppState {
        catalog,
        key_store,
        orchestrator,
        data_model,
        metrics,
        discovery_trigger,
        label_sync_trigger,
        start_time: Utc::now(),
    };
    let app = create_app(state);

    let host: IpAddr = settings
        .web_api
        .host
        .parse()
        .with_context(|| format!("invalid web_api.host {}", settings.web_api.host))?;
    let port = args.port.unwrap_or(settings.web_api.port);
    let addr = SocketAddr::new(host, port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Benthos orchestrator listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("failed to install the shutdown signal handler");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
