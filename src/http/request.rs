//! Per-request state shared with hooks.
//!
//! # Responsibilities
//! - Capture method, URI, headers and the buffered body
//! - Hold the resolved route and the optional parsed JSON body
//! - Carry the store handle and hook-private extensions
//! - Accumulate the response that will be written to the client
//!
//! # Design Decisions
//! - Owned by the engine for the whole lifecycle, lent mutably to hooks
//! - Malformed JSON is never fatal; the raw bytes stay authoritative

use axum::body::Bytes;
use axum::http::{header, request::Parts, Extensions, HeaderMap, Method, Uri};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::http::response::PendingResponse;
use crate::routing::RouteTarget;
use crate::store::DocumentStore;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An inbound request as seen by the lifecycle engine and its hooks.
pub struct ProxyRequest {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub json: Option<Value>,
    pub route: RouteTarget,
    pub peer: SocketAddr,
    pub store: Arc<dyn DocumentStore>,
    /// Typed state hooks attach for later stages.
    pub extensions: Extensions,
    pub response: PendingResponse,
}

impl ProxyRequest {
    pub fn new(
        parts: Parts,
        body: Bytes,
        peer: SocketAddr,
        store: Arc<dyn DocumentStore>,
        default_db: &str,
    ) -> Self {
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let route = RouteTarget::resolve(parts.uri.path(), default_db);

        Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            json: None,
            route,
            peer,
            store,
            extensions: Extensions::new(),
            response: PendingResponse::default(),
        }
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query string parameter, decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// True when the declared content type is `application/json`.
    pub fn is_json(&self) -> bool {
        self.header_str(header::CONTENT_TYPE)
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    }

    /// Parse the body as JSON when declared so; failures are logged and ignored.
    pub fn parse_json_body(&mut self) {
        if !self.is_json() {
            return;
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(value) => self.json = Some(value),
            Err(e) => tracing::debug!(error = %e, "Malformed JSON in request"),
        }
    }

    /// Body to forward: the (possibly rewritten) JSON if parsed, else the raw bytes.
    pub fn outgoing_body(&self) -> Result<Bytes, serde_json::Error> {
        match &self.json {
            Some(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            None => Ok(self.body.clone()),
        }
    }
}

impl std::fmt::Debug for ProxyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRequest")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("route", &self.route)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
