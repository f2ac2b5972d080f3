//! Request path canonicalization
//!
//! The route policy and the upstream forwarder must see the same path.
//! Every request path is rewritten to one canonical spelling before any
//! stage runs:
//! - segments are percent-decoded, then re-encoded with a fixed set
//! - empty segments are dropped, a trailing slash is kept
//! - `.` and `..` segments, encoded slashes, backslashes and NUL are
//!   rejected with 400

use axum::{
    extract::Request,
    http::{Uri, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tracing::{debug, warn};

use crate::error::AuthError;

/// Bytes escaped when re-encoding a decoded segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Canonical form of a request path
pub fn normalize_path(path: &str) -> Result<String, AuthError> {
    let mut canonical = String::with_capacity(path.len());

    for raw in path.split('/').filter(|s| !s.is_empty()) {
        let segment = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| AuthError::InvalidPath)?;

        if segment == "." || segment == ".." || segment.contains(['/', '\\', '\0']) {
            return Err(AuthError::InvalidPath);
        }

        canonical.push('/');
        canonical.extend(utf8_percent_encode(&segment, SEGMENT));
    }

    if canonical.is_empty() || path.ends_with('/') {
        canonical.push('/');
    }
    Ok(canonical)
}

fn rewrite_uri(uri: &Uri, path: &str) -> Result<Uri, AuthError> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query =
        Some(PathAndQuery::try_from(path_and_query).map_err(|_| AuthError::InvalidPath)?);
    Uri::from_parts(parts).map_err(|_| AuthError::InvalidPath)
}

/// Axum middleware rewriting the request URI to its canonical path
pub async fn normalize_path_middleware(mut request: Request, next: Next) -> Response {
    let original = request.uri().path();

    let rewritten = normalize_path(original).and_then(|canonical| {
        if canonical == original {
            Ok(None)
        } else {
            rewrite_uri(request.uri(), &canonical).map(Some)
        }
    });

    match rewritten {
        Ok(Some(uri)) => {
            debug!("Canonicalized {} to {}", request.uri().path(), uri.path());
            *request.uri_mut() = uri;
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Rejected request path {}", request.uri().path());
            metrics::counter!("gateway_auth_rejections_total", "reason" => e.reason())
                .increment(1);
            return e.into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_canonical_paths_unchanged() {
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/api/core/students/1").unwrap(), "/api/core/students/1");
        assert_eq!(normalize_path("/api/login/").unwrap(), "/api/login/");
    }

    #[test]
    fn test_empty_segments_collapsed() {
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("//api///core/").unwrap(), "/api/core/");
    }

    #[test]
    fn test_percent_escapes_decoded() {
        assert_eq!(normalize_path("/api/core/%61dmins/1").unwrap(), "/api/core/admins/1");
        assert_eq!(normalize_path("/files/a%20b").unwrap(), "/files/a%20b");
        assert_eq!(normalize_path("/files/a b").unwrap(), "/files/a%20b");
        assert_eq!(normalize_path("/files/100%25").unwrap(), "/files/100%25");
    }

    #[test]
    fn test_dot_segments_rejected() {
        for path in [
            "/api/core/tansiq/../admins/1",
            "/api/./core",
            "/api/core/tansiq/%2e%2e/admins",
            "/api/core/tansiq/.%2E/admins",
            "/..",
        ] {
            assert!(
                matches!(normalize_path(path), Err(AuthError::InvalidPath)),
                "{path}"
            );
        }
        assert_eq!(normalize_path("/a/.../b").unwrap(), "/a/.../b");
    }

    #[test]
    fn test_smuggled_separators_rejected() {
        for path in ["/api/core%2fadmins", "/api/core%5C..%5Cadmins", "/a%00b", "/a/%ff"] {
            assert!(
                matches!(normalize_path(path), Err(AuthError::InvalidPath)),
                "{path}"
            );
        }
    }

    async fn seen_uri(request: Request) -> String {
        request.uri().to_string()
    }

    fn app() -> Router {
        Router::new()
            .fallback(seen_uri)
            .layer(axum::middleware::from_fn(normalize_path_middleware))
    }

    #[tokio::test]
    async fn test_middleware_rewrites_uri_keeping_query() {
        let request = axum::http::Request::builder()
            .uri("/api//core/%61dmins?page=2")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"/api/core/admins?page=2");
    }

    #[tokio::test]
    async fn test_middleware_rejects_dot_segments() {
        let request = axum::http::Request::builder()
            .uri("/api/core/tansiq/../admins/1")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
