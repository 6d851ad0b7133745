//! Hook dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Engine reaches a stage (url, pre, pending, finish, final)
//!     → HookPoint::candidates(stage, doc_type, method)
//!         1. (stage)
//!         2. (doc_type, stage)          only when a type resolved
//!         3. (doc_type, method, stage)  only when a type resolved
//!     → for each candidate, every module registering it, in module order
//!     → first Flow::Abort or error ends the sequence
//! ```
//!
//! # Design Decisions
//! - Modules register hooks explicitly at startup; no name synthesis at runtime
//! - Module order is fixed when the registry is built and defines precedence
//! - Hooks are futures: a hook waiting on the store never blocks other requests

pub mod point;
pub mod registry;

pub use point::{HookPoint, Stage};
pub use registry::{HandlerModule, HookFuture, HookRegistry, HookResult};
