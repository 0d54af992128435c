use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use tokio::net::TcpListener;

use crate::{config::Config, history::HistoryStore, registry::SessionRegistry};

mod cors;
pub(crate) mod error;
mod handlers;
mod router;


#[derive(Clone)]
pub struct ApiState {
    pub(crate) registry: SessionRegistry,
    pub(crate) history: Arc<HistoryStore>,
    /// Prefix for `vlcUrl`, without a trailing slash.
    pub(crate) public_base_url: Arc<str>,
    pub(crate) max_json_body_bytes: usize,
    pub(crate) default_page_size: usize,
}

impl ApiState {
    pub fn new(cfg: &Config, registry: SessionRegistry) -> Self {
        Self {
            history: registry.history().clone(),
            registry,
            public_base_url: Arc::from(cfg.api.public_base_url()),
            max_json_body_bytes: cfg.api.max_json_body_bytes,
            default_page_size: cfg.history.default_page_size.max(1),
        }
    }
}

pub fn build_app(cfg: &Config, registry: SessionRegistry) -> Router<()> {
    let state = ApiState::new(cfg, registry);
    let cors = cors::CorsPolicy::new(&cfg.api.cors_allowed_origins, &state.public_base_url);
    router::build_app(state, cors)
}

pub async fn bind(cfg: &Config) -> anyhow::Result<TcpListener> {
    let bind_ip: std::net::IpAddr = cfg
        .api
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid api.host '{}': {e}", cfg.api.host))?;
    let addr = SocketAddr::new(bind_ip, cfg.api.port);
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind api listener on {addr}"))
}

/// Serves until the listener fails or the task is dropped.
pub async fn serve(
    listener: TcpListener,
    cfg: &Config,
    registry: SessionRegistry,
) -> anyhow::Result<()> {
    let app = build_app(cfg, registry);
    let addr = listener.local_addr()?;
    tracing::info!(
        addr = %addr,
        public_base_url = %cfg.api.public_base_url(),
        "api server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
