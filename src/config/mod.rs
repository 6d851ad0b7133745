//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to the server and handler modules
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the process never reloads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_overrides, load_config, load_default, ConfigError};
pub use schema::{BackendConfig, EndpointConfig, GatewayConfig, TlsConfig};
