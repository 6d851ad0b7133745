//! slipcover: a hookable HTTP gateway in front of CouchDB.

pub mod config;
pub mod error;
pub mod hooks;
pub mod http;
pub mod lifecycle;
pub mod modules;
pub mod net;
pub mod observability;
pub mod routing;
pub mod signal;
pub mod store;

pub use config::GatewayConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use signal::{ControlSignal, Flow};
