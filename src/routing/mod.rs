//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request URI
//!     → route.rs (strip query, split path, classify shape)
//!     → RouteTarget { database, document_type, document_id }
//!     → storage_path() used by the engine to reach the backend
//! ```
//!
//! # Design Decisions
//! - A flat `/type/id` or `/type:id` scheme only; no routing tables
//! - Resolved once per request; hooks may backfill the id
//! - Unresolvable paths fail closed (404, no backend I/O)

pub mod route;

pub use route::RouteTarget;
