//! Application state

use gateway_auth::TokenService;
use gateway_proxy::UpstreamRouter;
use std::sync::Arc;

/// Prometheus handle rendering the `/metrics` endpoint
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub upstreams: Arc<UpstreamRouter>,
}

impl AppState {
    pub fn new(tokens: Arc<TokenService>, upstreams: Arc<UpstreamRouter>) -> Self {
        Self { tokens, upstreams }
    }
}
