use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blagues_core::{EventHub, SubmissionFlow};
use blagues_server::config::Config;
use blagues_server::dataset_file::JsonFileDataset;
use blagues_server::repository::SqliteRepository;
use blagues_server::transport::HttpPresenter;
use blagues_server::{get_bot_version, router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = get_bot_version(), "Starting joke submission bot");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.state_dir.join("blagues-state.db");
    info!("Using state database: {}", db_path.display());
    let repo = Arc::new(
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?,
    );

    info!("Using dataset: {}", config.dataset_path.display());
    let dataset = Arc::new(
        JsonFileDataset::open(&config.dataset_path)
            .await
            .context("Failed to load the joke dataset")?,
    );

    let presenter = Arc::new(
        HttpPresenter::new(&config.transport_url, config.transport_token.clone())
            .context("Failed to build the transport client")?,
    );

    let flow = SubmissionFlow::new(
        repo.clone(),
        dataset.clone(),
        presenter,
        EventHub::default(),
        config.engine.clone(),
    );

    let port = config.port;
    let app_state = Arc::new(AppState {
        config,
        flow,
        repo,
        dataset,
    });

    let app = router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Server listening on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
