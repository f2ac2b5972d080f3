//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_auth::AuthError;
use gateway_proxy::ProxyError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            // Auth failures already carry their own status and body
            ApiError::Auth(e) => return e.into_response(),
            ApiError::Proxy(ProxyError::NoUpstream(path)) => {
                warn!("No upstream for {}", path);
                (StatusCode::NOT_FOUND, "Not found")
            }
            ApiError::Proxy(ProxyError::UnsafePath(path)) => {
                warn!("Refused to forward {}", path);
                (StatusCode::BAD_REQUEST, "Bad request")
            }
            ApiError::Proxy(e) if e.is_timeout() => {
                warn!("Upstream timed out: {}", e);
                (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout")
            }
            ApiError::Proxy(e) => {
                error!("Upstream request failed: {}", e);
                (StatusCode::BAD_GATEWAY, "Bad gateway")
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}
