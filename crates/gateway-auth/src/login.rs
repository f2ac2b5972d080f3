//! Login stage
//!
//! Consumes `POST <login path>` requests, exchanging credentials for an
//! access/refresh token pair. Every other request passes through.

use async_trait::async_trait;
use axum::{
    Json,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::authenticator::CredentialAuthenticator;
use crate::chain::{RequestStage, StageOutcome};
use crate::error::AuthError;
use crate::identity::Identity;
use crate::jwt::TokenService;

/// Default login path
pub const DEFAULT_LOGIN_PATH: &str = "/api/login";

/// Maximum accepted login body size
const MAX_LOGIN_BODY_BYTES: usize = 64 * 1024;

/// Response header carrying the access token
pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("access_token");
/// Response header carrying the refresh token
pub const REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("refresh_token");

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token pair returned on login and refresh
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPairResponse {
    /// Issue a fresh pair for an identity
    pub fn issue(tokens: &TokenService, identity: &Identity) -> Result<Self, AuthError> {
        Ok(Self {
            access_token: tokens.issue_access(identity)?,
            refresh_token: tokens.issue_refresh(identity)?,
        })
    }
}

impl IntoResponse for TokenPairResponse {
    fn into_response(self) -> Response {
        let access = HeaderValue::from_str(&self.access_token).ok();
        let refresh = HeaderValue::from_str(&self.refresh_token).ok();

        let mut response = (StatusCode::OK, Json(self)).into_response();
        let headers = response.headers_mut();
        if let Some(value) = access {
            headers.insert(ACCESS_TOKEN_HEADER, value);
        }
        if let Some(value) = refresh {
            headers.insert(REFRESH_TOKEN_HEADER, value);
        }
        response
    }
}

/// Stage handling credential login
pub struct LoginStage {
    path: String,
    authenticator: Arc<dyn CredentialAuthenticator>,
    tokens: Arc<TokenService>,
}

impl LoginStage {
    pub fn new(authenticator: Arc<dyn CredentialAuthenticator>, tokens: Arc<TokenService>) -> Self {
        Self {
            path: DEFAULT_LOGIN_PATH.to_string(),
            authenticator,
            tokens,
        }
    }

    /// Override the login path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn handles(&self, request: &Request) -> bool {
        request.method() == Method::POST && request.uri().path() == self.path
    }

    async fn login(&self, request: Request) -> Result<TokenPairResponse, AuthError> {
        let credentials = parse_credentials(request).await?;

        let identity = self
            .authenticator
            .authenticate(&credentials.username, &credentials.password)
            .await?;

        let pair = TokenPairResponse::issue(&self.tokens, &identity)?;

        info!("User {} logged in successfully", identity.email);
        Ok(pair)
    }
}

/// Read credentials from a JSON or form-encoded body
async fn parse_credentials(request: Request) -> Result<LoginRequest, AuthError> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let body = axum::body::to_bytes(request.into_body(), MAX_LOGIN_BODY_BYTES)
        .await
        .map_err(|e| {
            warn!("Failed to read login body: {}", e);
            AuthError::InvalidCredentials
        })?;

    let parsed = if is_form {
        serde_urlencoded::from_bytes::<LoginRequest>(&body).map_err(|e| e.to_string())
    } else {
        serde_json::from_slice::<LoginRequest>(&body).map_err(|e| e.to_string())
    };

    parsed.map_err(|e| {
        warn!("Malformed login body: {}", e);
        AuthError::InvalidCredentials
    })
}

#[async_trait]
impl RequestStage for LoginStage {
    fn name(&self) -> &'static str {
        "login"
    }

    async fn process(&self, request: Request) -> StageOutcome {
        if !self.handles(&request) {
            return StageOutcome::Continue(request);
        }

        let response = match self.login(request).await {
            Ok(pair) => {
                metrics::counter!("gateway_logins_total", "outcome" => "success").increment(1);
                pair.into_response()
            }
            Err(e) if e.is_internal() => {
                warn!("Login failed: {}", e);
                metrics::counter!("gateway_logins_total", "outcome" => "error").increment(1);
                e.into_response()
            }
            Err(e) => {
                warn!("Login rejected: {}", e);
                metrics::counter!("gateway_logins_total", "outcome" => "rejected").increment(1);
                AuthError::InvalidCredentials.into_response()
            }
        };

        StageOutcome::Respond(response)
    }
}
