//! Gateway Upstream Proxy
//!
//! This crate provides the client that forwards authorized requests to
//! the upstream services behind the gateway.

pub mod client;
pub mod error;

pub use client::{UpstreamClient, UpstreamClientConfig, UpstreamRouter, sanitize_request_headers, sanitize_response_headers};
pub use error::ProxyError;

/// Re-export of the request body type taken by [`UpstreamClient::forward`]
pub use reqwest::Body as UpstreamBody;
