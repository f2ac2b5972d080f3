//! Authorization stage
//!
//! Looks up the route policy for each request, verifies the bearer
//! access token for protected routes and binds the resulting
//! [`Principal`] into the request extensions.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderMap, Method, header::AUTHORIZATION},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::debug;

use crate::chain::{RequestStage, StageOutcome};
use crate::error::AuthError;
use crate::identity::{Identity, Principal};
use crate::jwt::TokenService;
use crate::path::normalize_path;
use crate::policy::{Requirement, RoutePolicy};

/// Extract bearer token from an authorization header value
///
/// The scheme is matched case-insensitively; an empty token counts as
/// no token.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Stage enforcing the route policy
pub struct AuthorizationStage {
    policy: Arc<RoutePolicy>,
    tokens: Arc<TokenService>,
}

impl AuthorizationStage {
    pub fn new(policy: Arc<RoutePolicy>, tokens: Arc<TokenService>) -> Self {
        Self { policy, tokens }
    }

    /// Decide a request
    ///
    /// Returns `Ok(None)` for public routes and the verified identity for
    /// protected ones. Only canonical paths are decided; see
    /// [`normalize_path`].
    pub fn authorize(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Option<Identity>, AuthError> {
        if normalize_path(path)? != path {
            debug!("Refusing to authorize non-canonical path {}", path);
            return Err(AuthError::InvalidPath);
        }

        let required_role = match self.policy.lookup(method, path) {
            Requirement::Public => return Ok(None),
            Requirement::Role(role) => role,
        };

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or(AuthError::MissingToken)?;

        let identity = self.tokens.verify_access(token)?;

        if identity.primary_role() != Some(required_role.as_str()) {
            debug!(
                "User {} lacks role {} for {} {}",
                identity.email, required_role, method, path
            );
            return Err(AuthError::InsufficientRole);
        }

        debug!(
            "Authorized user: {} ({}) for {} {}",
            identity.email, required_role, method, path
        );
        Ok(Some(identity))
    }
}

#[async_trait]
impl RequestStage for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn process(&self, mut request: Request) -> StageOutcome {
        let decision = self.authorize(request.method(), request.uri().path(), request.headers());

        match decision {
            Ok(Some(identity)) => {
                request.extensions_mut().insert(Principal(identity));
                StageOutcome::Continue(request)
            }
            Ok(None) => StageOutcome::Continue(request),
            Err(e) => {
                metrics::counter!("gateway_auth_rejections_total", "reason" => e.reason())
                    .increment(1);
                StageOutcome::Respond(e.into_response())
            }
        }
    }
}
