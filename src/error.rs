//! Unexpected failures during request processing.
//!
//! Anything surfacing as a `ProxyError` is logged and answered with a
//! uniform 500 and an empty JSON body.

use std::time::Duration;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("failed to build request: {0}")]
    Http(#[from] axum::http::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid upstream uri: {0}")]
    Uri(#[from] axum::http::uri::InvalidUri),
}
