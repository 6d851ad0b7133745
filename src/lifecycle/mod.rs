//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Store → Handler modules → Listeners
//!
//! Shutdown (shutdown.rs):
//!     Trigger (signal or admin opcode) → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - A single coordinator is shared by every trigger and every listener

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
