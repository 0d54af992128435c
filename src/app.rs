use std::sync::Arc;

use anyhow::Context as _;
use tokio::signal;

use crate::{
    api,
    config::Config,
    engine::LocalEngine,
    history::HistoryStore,
    registry::SessionRegistry,
    single_instance::SingleInstanceLock,
};

pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        log = %config.general.log_level,
        data_dir = %config.general.data_dir,
        "starting app"
    );

    tokio::fs::create_dir_all(&config.general.data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", config.general.data_dir))?;
    let lock = SingleInstanceLock::acquire(config.lock_path())?;
    tracing::debug!(path = %lock.path().display(), "acquired single-instance lock");

    let content_dir = config.content_dir();
    tokio::fs::create_dir_all(&content_dir)
        .await
        .with_context(|| format!("failed to create content dir {}", content_dir.display()))?;
    tracing::info!(content_dir = %content_dir.display(), "local content engine ready");

    let history = Arc::new(
        HistoryStore::load(config.history_path(), config.history.max_entries).await,
    );
    let engine = Arc::new(LocalEngine::new(content_dir));
    let registry = SessionRegistry::new(engine, history);

    let listener = api::bind(&config).await?;
    tracing::info!("press Ctrl+C to stop");

    tokio::select! {
        res = api::serve(listener, &config, registry.clone()) => {
            res.context("api server stopped")?;
        }
        _ = signal::ctrl_c() => {
            tracing::warn!("received Ctrl+C");
        }
    }

    tracing::info!(
        active_sessions = registry.active_count(),
        "shutting down gracefully"
    );
    drop(lock);
    Ok(())
}
