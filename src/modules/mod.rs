//! Handler modules.
//!
//! # Data Flow
//! ```text
//! config.handlers = ["cors", "sessions", "admin"]
//!     → build_registry (name → module factory, in order)
//!     → HookRegistry (immutable, shared by every request)
//! ```
//!
//! # Design Decisions
//! - Modules are plain registration tables; nothing is discovered by name at runtime
//! - An unknown handler name is a startup error
//! - The admin set is built once and shared by `Arc`

pub mod admin;
pub mod cors;
pub mod sessions;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{ConfigError, GatewayConfig};
use crate::hooks::{HandlerModule, HookRegistry};
use crate::lifecycle::Shutdown;

/// Every handler name `build_registry` accepts.
pub const MODULE_NAMES: &[&str] = &[cors::NAME, sessions::NAME, admin::NAME];

/// Emails allowed to use the admin endpoint.
#[derive(Debug, Clone, Default)]
pub struct AdminSet {
    emails: HashSet<String>,
}

impl AdminSet {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: emails.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(email)
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

/// Instantiate the configured handler modules in precedence order.
pub fn build_registry(config: &GatewayConfig, shutdown: &Shutdown) -> Result<HookRegistry, ConfigError> {
    let admins = Arc::new(AdminSet::new(config.admins.iter().cloned()));

    let modules = config
        .handlers
        .iter()
        .map(|name| build_module(name, &admins, shutdown))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(admins = admins.len(), modules = modules.len(), "Hook registry built");
    Ok(HookRegistry::new(modules))
}

fn build_module(
    name: &str,
    admins: &Arc<AdminSet>,
    shutdown: &Shutdown,
) -> Result<HandlerModule, ConfigError> {
    match name {
        cors::NAME => Ok(cors::module()),
        sessions::NAME => Ok(sessions::module(admins.clone())),
        admin::NAME => Ok(admin::module(admins.clone(), shutdown.clone())),
        other => Err(ConfigError::UnknownModule(other.to_string())),
    }
}
