//! trailhead daemon -- receives GitHub webhooks and runs the quest
//! progression engine over the tracked repository.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use th_core::config::TrailheadConfig;
use th_core::progress_store::ProgressStore;
use th_core::quest_config::QuestConfig;
use th_engine::{ProgressionEngine, ResponseTemplates};
use th_grader::Grader;
use th_signals::github::GitHubClient;
use tracing::info;

mod commenter;
mod server;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_logging("th-daemon", "info");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRAILHEAD_CONFIG").ok())
        .unwrap_or_else(|| "trailhead.toml".to_string());
    let config = TrailheadConfig::load_from(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    info!(repo = %config.repo.slug, bind = %config.server.bind, "trailhead starting");

    let quests = Arc::new(
        QuestConfig::load_from(&config.quests.definition)
            .with_context(|| format!("failed to load {}", config.quests.definition.display()))?,
    );
    let templates = Arc::new(
        ResponseTemplates::load_from(&config.quests.responses)
            .with_context(|| format!("failed to load {}", config.quests.responses.display()))?,
    );
    let store = Arc::new(
        ProgressStore::open(&config.store.path)
            .await
            .with_context(|| format!("failed to open {}", config.store.path.display()))?,
    );

    let github = Arc::new(
        GitHubClient::from_env(config.repo_owner(), config.repo_name())
            .context("failed to build GitHub client")?,
    );
    let grader = Arc::new(Grader::new(
        &config.grading.root,
        &config.grading.interpreter,
        Duration::from_secs(config.grading.timeout_secs),
    ));

    let engine = Arc::new(ProgressionEngine::new(
        quests,
        store,
        github.clone(),
        github.clone(),
        grader,
        templates,
        config.repo.slug.clone(),
    ));

    let state = Arc::new(server::AppState {
        engine,
        admin_gate: github,
        commenter: Arc::new(commenter::LogCommenter),
        tracked_slug: config.repo.slug.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "webhook server listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("trailhead stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("ctrl-c received, shutting down");
}
