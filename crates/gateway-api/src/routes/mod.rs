//! API routes

pub mod auth;
mod health;
pub mod metrics;
pub mod proxy;

use axum::Router;
use gateway_auth::{FilterChain, filter_chain_middleware, normalize_path_middleware};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
///
/// The filter chain wraps every route, the upstream fallback included, so
/// the route policy decides access for all paths. Paths are canonicalized
/// before the chain runs, so the policy and the forwarder see the same path.
pub fn create_router(
    state: AppState,
    chain: FilterChain,
    metrics_handle: Option<Arc<MetricsHandle>>,
) -> Router {
    let mut router = Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .fallback(proxy::forward)
        .with_state(state);

    // Add metrics endpoint if handle is provided
    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            chain,
            filter_chain_middleware,
        ))
        .layer(axum::middleware::from_fn(normalize_path_middleware))
}
