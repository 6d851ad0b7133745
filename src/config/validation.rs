//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check handler names against the known modules
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;
use crate::modules::MODULE_NAMES;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("default_db must not be empty")]
    EmptyDefaultDb,

    #[error("at least one endpoint is required")]
    NoEndpoints,

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("unknown handler module '{0}'")]
    UnknownHandler(String),

    #[error("handler module '{0}' listed twice")]
    DuplicateHandler(String),

    #[error("invalid backend url '{0}'")]
    BackendUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.default_db.trim().is_empty() {
        errors.push(ValidationError::EmptyDefaultDb);
    }

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    for endpoint in &config.endpoints {
        if endpoint.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BindAddress(endpoint.bind_address.clone()));
        }
    }

    let mut seen = HashSet::new();
    for name in &config.handlers {
        if !MODULE_NAMES.contains(&name.as_str()) {
            errors.push(ValidationError::UnknownHandler(name.clone()));
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateHandler(name.clone()));
        }
    }

    match url::Url::parse(&config.backend.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::BackendUrl(config.backend.url.clone())),
    }

    if config.backend.timeout_secs == 0 {
        errors.push(ValidationError::Zero("backend.timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::Zero("limits.max_body_size"));
    }
    if config.limits.max_response_size == 0 {
        errors.push(ValidationError::Zero("limits.max_response_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
