//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, lifecycle engine)
//!     → request.rs (buffered request, route, hook extensions)
//!     → [hooks: url → pre → pending]
//!     → backend document store
//!     → response.rs (merge backend response, hooks rewrite, serialize)
//!     → [hooks: finish → final]
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ProxyRequest, X_REQUEST_ID};
pub use response::PendingResponse;
pub use server::HttpServer;
