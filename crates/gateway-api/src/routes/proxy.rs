//! Upstream forwarding
//!
//! Requests that match no gateway route are forwarded to the upstream
//! owning the longest matching path prefix. The verified principal, if
//! any, travels in `x-auth-*` headers; client credentials never do.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use gateway_auth::{Identity, Principal};
use gateway_proxy::{
    ProxyError, UpstreamBody, sanitize_request_headers, sanitize_response_headers,
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub const AUTH_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-auth-email");
pub const AUTH_ID_HEADER: HeaderName = HeaderName::from_static("x-auth-id");
pub const AUTH_ROLE_HEADER: HeaderName = HeaderName::from_static("x-auth-role");

/// Attach the principal headers for an identity
fn insert_principal(headers: &mut HeaderMap, identity: &Identity) {
    if let Ok(value) = HeaderValue::from_str(&identity.email) {
        headers.insert(AUTH_EMAIL_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&identity.id.to_string()) {
        headers.insert(AUTH_ID_HEADER, value);
    }
    if let Some(value) = identity
        .primary_role()
        .and_then(|role| HeaderValue::from_str(role).ok())
    {
        headers.insert(AUTH_ROLE_HEADER, value);
    }
}

/// Stream the client body upstream; known-empty bodies stay empty
fn upstream_body(body: Body) -> UpstreamBody {
    if body.size_hint().exact() == Some(0) {
        UpstreamBody::from(Vec::new())
    } else {
        UpstreamBody::wrap_stream(body.into_data_stream())
    }
}

/// Fallback handler forwarding to the configured upstreams
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    let upstream = state
        .upstreams
        .find(&path)
        .ok_or_else(|| ProxyError::NoUpstream(path.clone()))?;

    let (parts, body) = request.into_parts();

    let mut headers = sanitize_request_headers(&parts.headers);
    if let Some(Principal(identity)) = parts.extensions.get::<Principal>() {
        insert_principal(&mut headers, identity);
    }

    debug!("Routing {} {} to upstream {}", parts.method, path, upstream.name());

    let upstream_response = upstream
        .forward(
            parts.method,
            &path,
            parts.uri.query(),
            headers,
            upstream_body(body),
        )
        .await?;

    let status = upstream_response.status();
    let headers = sanitize_response_headers(upstream_response.headers());

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
