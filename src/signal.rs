//! Control signals for early request termination.
//!
//! # Responsibilities
//! - Carry the final status, reason phrase and body of a short-circuited request
//! - Provide the `Flow` value hooks return to continue or abort a stage
//!
//! # Design Decisions
//! - A signal is a value, not an error: it always ends in a clean response
//! - Unexpected failures use `ProxyError` instead and map to 500
//! - Default message comes from the canonical reason phrase table

use axum::body::Bytes;
use axum::http::StatusCode;

/// Body used whenever a signal does not carry its own.
pub const EMPTY_JSON: &[u8] = b"{}";

/// Structured early exit carrying the final HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSignal {
    status: StatusCode,
    message: String,
    body: Bytes,
}

impl ControlSignal {
    /// Create a signal with the default reason phrase and an empty JSON body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: reason_phrase(status).to_string(),
            body: Bytes::from_static(EMPTY_JSON),
        }
    }

    /// Override the reason phrase.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Override the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Reason phrase for a status code, `"Unknown"` for unregistered codes.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

/// Outcome of a hook or of a whole stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing.
    Continue,
    /// Skip everything up to and including backend forwarding.
    Abort(ControlSignal),
}

impl Flow {
    pub fn is_abort(&self) -> bool {
        matches!(self, Flow::Abort(_))
    }
}

impl From<ControlSignal> for Flow {
    fn from(signal: ControlSignal) -> Self {
        Flow::Abort(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_status_table() {
        let signal = ControlSignal::forbidden();
        assert_eq!(signal.status(), StatusCode::FORBIDDEN);
        assert_eq!(signal.message(), "Forbidden");
        assert_eq!(signal.body().as_ref(), b"{}");
    }

    #[test]
    fn unknown_status_has_fallback_message() {
        let status = StatusCode::from_u16(599).unwrap();
        assert_eq!(ControlSignal::new(status).message(), "Unknown");
    }

    #[test]
    fn overrides_apply() {
        let signal = ControlSignal::forbidden()
            .with_message("Invalid Request")
            .with_body(r#"{"reason":"no"}"#);
        assert_eq!(signal.message(), "Invalid Request");
        assert_eq!(signal.body().as_ref(), br#"{"reason":"no"}"#);
    }

    #[test]
    fn signal_converts_to_abort() {
        let flow: Flow = ControlSignal::ok().into();
        assert!(flow.is_abort());
        assert!(!Flow::Continue.is_abort());
    }
}
