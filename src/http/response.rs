//! Response accumulation and serialization.
//!
//! # Responsibilities
//! - Hold the status, headers and body destined for the client
//! - Merge the backend response without clobbering hook-set headers
//! - Re-encode rewritten JSON and recompute `Content-Length`
//!
//! # Design Decisions
//! - Hop-by-hop and length headers from the backend are never copied
//! - Serialization always produces a body matching its `Content-Length`
//! - Signal and error bodies are JSON and labelled as such

use axum::body::{Body, Bytes};
use axum::http::{header, response::Parts, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use serde_json::Value;

use crate::error::ProxyError;
use crate::signal::{reason_phrase, ControlSignal, EMPTY_JSON};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// True for headers that describe a single connection and must not be forwarded.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// The response being built for the client.
#[derive(Debug, Clone, Default)]
pub struct PendingResponse {
    pub status: StatusCode,
    /// Reason phrase override for HTTP/1.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    /// Raw body as received or as set by a signal.
    pub body: Bytes,
    /// Parsed body; takes precedence over `body` when serializing.
    pub json: Option<Value>,
    /// Header names copied from the backend response.
    upstream_headers: Vec<HeaderName>,
}

impl PendingResponse {
    /// Replace the response with the contents of a control signal.
    pub fn apply_signal(&mut self, signal: &ControlSignal) {
        self.status = signal.status();
        self.reason = Some(signal.message().to_string());
        self.body = signal.body().clone();
        self.json = None;
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
    }

    /// Replace the response with the uniform 500, dropping backend headers.
    pub fn server_error(&mut self) {
        for name in self.upstream_headers.drain(..) {
            self.headers.remove(&name);
        }
        self.apply_signal(&ControlSignal::new(StatusCode::INTERNAL_SERVER_ERROR));
    }

    /// Take over the status, headers and body received from the backend.
    pub fn absorb_upstream(&mut self, parts: Parts, body: Bytes) {
        self.status = parts.status;
        for name in parts.headers.keys() {
            if is_hop_by_hop(name)
                || *name == header::CONTENT_LENGTH
                || self.headers.contains_key(name)
            {
                continue;
            }
            for value in parts.headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
            self.upstream_headers.push(name.clone());
        }
        self.body = body;
        self.json = None;
    }

    /// Parse the raw body as JSON; failures leave `json` empty.
    pub fn parse_json(&mut self) {
        if self.body.is_empty() {
            return;
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(value) => self.json = Some(value),
            Err(e) => tracing::debug!(error = %e, "Unable to parse response body"),
        }
    }

    /// Bytes that go on the wire.
    pub fn wire_body(&self) -> Result<Bytes, serde_json::Error> {
        match &self.json {
            Some(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            None => Ok(self.body.clone()),
        }
    }

    /// Build the HTTP response with a recomputed `Content-Length`.
    pub fn to_http(&self) -> Result<Response<Body>, ProxyError> {
        let body = self.wire_body()?;
        let length = body.len();

        let mut response = Response::builder().status(self.status).body(Body::from(body))?;
        *response.headers_mut() = self.headers.clone();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));

        if let Some(reason) = &self.reason {
            if reason != reason_phrase(self.status) {
                match hyper::ext::ReasonPhrase::try_from(reason.as_bytes()) {
                    Ok(phrase) => {
                        response.extensions_mut().insert(phrase);
                    }
                    Err(_) => tracing::debug!(reason = %reason, "Invalid reason phrase dropped"),
                }
            }
        }

        Ok(response)
    }
}

/// Infallible 500 used when serialization itself fails.
pub fn fallback_error() -> Response<Body> {
    let mut response = Response::new(Body::from(Bytes::from_static(EMPTY_JSON)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(EMPTY_JSON.len()));
    response
}
