//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("No upstream configured for {0}")]
    NoUpstream(String),

    #[error("Path would be rewritten upstream: {0}")]
    UnsafePath(String),
}

impl ProxyError {
    /// Whether the upstream did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProxyError::Http(e) if e.is_timeout())
    }
}
