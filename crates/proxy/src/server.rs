//! Router assembly and the listening loop.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use common::config::ProxyConfig;
use common::Error;
use entur_client::EnturClient;
use met_client::MetClient;
use tracing::{info, warn};

use crate::response::method_not_allowed;
use crate::{entur, met};

/// Upstream clients and identity shared by all requests.
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub met: MetClient,
    pub entur: EnturClient,
    /// Configured `ET-Client-Name`; `None` defers to the caller or placeholder.
    pub entur_client_name: Option<String>,
}

impl ProxyState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, Error> {
        if config.met_user_agent.trim().is_empty() {
            warn!("MET_USER_AGENT not set; MET may throttle or reject the placeholder identity");
        }
        if config.entur_client_name().is_none() {
            warn!("ENTUR_CLIENT not set; Entur requests fall back to caller or placeholder name");
        }

        Ok(Self {
            met: MetClient::new(&config.met_base_url, config.met_user_agent_or_placeholder())?,
            entur: EnturClient::new(&config.entur_base_url)?,
            entur_client_name: config.entur_client_name().map(str::to_owned),
        })
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(
            "/api/met",
            get(met::handle)
                .options(met::handle_preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/entur",
            get(entur::handle_get)
                .post(entur::handle_post)
                .options(entur::handle_preflight)
                .fallback(method_not_allowed),
        )
        .with_state(Arc::new(state))
}

/// Bind `config.bind_addr` and serve until the listener fails.
pub async fn serve(config: &ProxyConfig) -> Result<(), Error> {
    let state = ProxyState::from_config(config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Proxy listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
