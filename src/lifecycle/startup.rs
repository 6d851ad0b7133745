//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize the backend store and handler modules from configuration
//! - Bind every configured endpoint (plain or TLS)
//! - Serve until shutdown, then drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Handler modules are built before the first listener binds
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::tls::load_tls_config;
use crate::store::{couch::backend_client, CouchStore};

/// Run the gateway until shutdown is requested.
pub async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();
    let client = backend_client();
    let store = Arc::new(CouchStore::new(&config.backend, client.clone()));
    let endpoints = config.endpoints.clone();

    let server = HttpServer::new(config, store, client, shutdown.clone())?;
    tracing::info!(handlers = ?server.module_names(), "Handler modules loaded");

    tokio::spawn(signals::watch_signals(shutdown.clone()));

    let mut listeners = JoinSet::new();
    for endpoint in endpoints {
        let addr: SocketAddr = endpoint.bind_address.parse()?;
        match endpoint.tls {
            Some(tls) => {
                let tls_config =
                    load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                tracing::info!(address = %addr, protocol = "https", "Listening");
                listeners.spawn(server.clone().serve_tls(addr, tls_config));
            }
            None => {
                let listener = TcpListener::bind(addr).await?;
                tracing::info!(address = %listener.local_addr()?, protocol = "http", "Listening");
                listeners.spawn(server.clone().serve(listener));
            }
        }
    }

    while let Some(result) = listeners.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Listener failed");
                shutdown.trigger();
            }
            Err(e) => {
                tracing::error!(error = %e, "Listener task panicked");
                shutdown.trigger();
            }
        }
    }

    Ok(())
}
