//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! [[endpoints]] with tls = { cert_path, key_path }
//!     → tls.rs (load PEM files into a rustls config)
//!     → axum-server TLS acceptor
//!     → same router as the plain HTTP endpoints
//! ```

pub mod tls;
