//! Token refresh endpoint

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::get,
};
use gateway_auth::{AuthError, TokenPairResponse, extract_bearer_token};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Default refresh path
pub const REFRESH_PATH: &str = "/api/refreshToken";

/// GET|POST /api/refreshToken
///
/// Exchanges a bearer refresh token for a new access token. The refresh
/// token itself is returned unchanged.
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<TokenPairResponse, ApiError> {
    let refresh_token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or(AuthError::MissingToken)?;

    let identity = state.tokens.verify_refresh(refresh_token).map_err(|e| {
        warn!("Refresh rejected: {}", e);
        metrics::counter!("gateway_token_refreshes_total", "outcome" => "rejected").increment(1);
        e
    })?;

    let access_token = state.tokens.issue_access(&identity)?;
    metrics::counter!("gateway_token_refreshes_total", "outcome" => "success").increment(1);
    debug!("Refreshed access token for {}", identity.email);

    Ok(TokenPairResponse {
        access_token,
        refresh_token: refresh_token.to_string(),
    })
}

/// Create token routes
pub fn routes() -> Router<AppState> {
    Router::new().route(REFRESH_PATH, get(refresh).post(refresh))
}
