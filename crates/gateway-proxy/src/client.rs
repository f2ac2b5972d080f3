//! Upstream client

use http::{HeaderMap, HeaderName, Method, header};
use reqwest::{Body, Client, Response};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;

/// Prefix of the headers the gateway uses to pass the principal upstream
pub const PRINCIPAL_HEADER_PREFIX: &str = "x-auth-";

/// Hop-by-hop headers, never forwarded in either direction
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Client credentials the upstream must not see
const SENSITIVE: [HeaderName; 4] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::HOST,
    header::CONTENT_LENGTH,
];

/// Upstream client configuration
#[derive(Clone, Debug)]
pub struct UpstreamClientConfig {
    /// Name used in logs
    pub name: String,
    /// Path prefix routed to this upstream, e.g. `/api/core`
    pub prefix: String,
    /// Base URL of the upstream service
    pub url: String,
    /// Remove `prefix` from the path before forwarding
    pub strip_prefix: bool,
    /// Request timeout
    pub timeout: Duration,
}

/// Client for one upstream service
pub struct UpstreamClient {
    config: UpstreamClientConfig,
    base: Url,
    client: Client,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(config: UpstreamClientConfig) -> Result<Self, ProxyError> {
        let base = Url::parse(&config.url)
            .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", config.url, e)))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                config.url
            )));
        }
        if !config.prefix.starts_with('/') {
            return Err(ProxyError::InvalidUrl(format!(
                "prefix '{}' must start with '/'",
                config.prefix
            )));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        info!(
            "Created upstream client {} for {} -> {}",
            config.name, config.prefix, config.url
        );

        Ok(Self {
            config,
            base,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Whether a request path belongs to this upstream
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.config.prefix.trim_end_matches('/');
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Build the upstream URL for a request path and query
    ///
    /// Fails if the URL parser would change the path, e.g. by resolving
    /// dot segments.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, ProxyError> {
        let path = if self.config.strip_prefix {
            let prefix = self.config.prefix.trim_end_matches('/');
            path.strip_prefix(prefix).unwrap_or(path)
        } else {
            path
        };

        let mut url = self.base.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        if url.path() != joined {
            return Err(ProxyError::UnsafePath(joined));
        }
        url.set_query(query);
        Ok(url)
    }

    /// Forward a request upstream
    ///
    /// `headers` should already be sanitized and carry the principal headers.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response, ProxyError> {
        let url = self.target_url(path, query)?;
        debug!("Forwarding {} {} to {}", method, path, url);

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        debug!("Upstream {} answered {}", self.config.name, response.status());
        Ok(response)
    }
}

/// Upstreams ordered by prefix length, longest first
pub struct UpstreamRouter {
    upstreams: Vec<UpstreamClient>,
}

impl UpstreamRouter {
    pub fn new(mut upstreams: Vec<UpstreamClient>) -> Self {
        upstreams.sort_by_key(|u| std::cmp::Reverse(u.prefix().trim_end_matches('/').len()));
        Self { upstreams }
    }

    /// Find the upstream with the longest matching prefix
    pub fn find(&self, path: &str) -> Option<&UpstreamClient> {
        self.upstreams.iter().find(|u| u.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }
}

/// Copy client headers that are safe to forward
///
/// Drops hop-by-hop headers, client credentials and any header in the
/// principal namespace, which only the gateway may set.
pub fn sanitize_request_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(name) && !SENSITIVE.contains(name))
        .filter(|(name, _)| !name.as_str().starts_with(PRINCIPAL_HEADER_PREFIX))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Copy upstream response headers that are safe to return
pub fn sanitize_response_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(name) && *name != header::CONTENT_LENGTH)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
