//! Gateway REST API
//!
//! This crate provides the Axum router of the gateway: health and
//! metrics endpoints, token refresh, and the fallback that forwards
//! authorized requests to upstream services. Authentication runs in the
//! filter chain layered over the whole router.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
