//! HTTP server setup and the request lifecycle engine.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Drive every request through the hook stages
//! - Forward routed requests to the backend document store
//! - Record per-request metrics
//!
//! # Lifecycle
//! ```text
//! RECEIVED → url → BODY_PARSED → pre → { pending → RESPONSE_RECEIVED | 404 }
//!          → finish → SERIALIZED → final → CLOSED
//! ```
//!
//! # Design Decisions
//! - A control signal skips to `finish`; an error skips to serialization as a 500
//! - The client `authorization` header never reaches the backend
//! - `final` is informational: its signals and errors are logged only

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, Response, Uri},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::{ConfigError, GatewayConfig};
use crate::error::ProxyError;
use crate::hooks::{HookRegistry, HookResult, Stage};
use crate::http::request::{ProxyRequest, X_REQUEST_ID};
use crate::http::response::{fallback_error, is_hop_by_hop, PendingResponse};
use crate::lifecycle::Shutdown;
use crate::modules;
use crate::observability::metrics;
use crate::signal::{ControlSignal, Flow};
use crate::store::{couch::basic_authorization, DocumentStore};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HookRegistry>,
    pub store: Arc<dyn DocumentStore>,
    pub client: Client<HttpConnector, Body>,
    pub config: Arc<GatewayConfig>,
    backend_base: String,
    backend_auth: Option<HeaderValue>,
    backend_timeout: Duration,
}

/// HTTP front end of the gateway. Cheap to clone, one clone per listener.
#[derive(Clone)]
pub struct HttpServer {
    router: Router,
    registry: Arc<HookRegistry>,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a server with the handler modules named in the configuration.
    ///
    /// `client` carries forwarded requests; pass the store's client to share
    /// one connection pool with it.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn DocumentStore>,
        client: Client<HttpConnector, Body>,
        shutdown: Shutdown,
    ) -> Result<Self, ConfigError> {
        let registry = modules::build_registry(&config, &shutdown)?;
        Ok(Self::with_registry(config, store, client, registry, shutdown))
    }

    /// Create a server around an already built hook registry.
    pub fn with_registry(
        config: GatewayConfig,
        store: Arc<dyn DocumentStore>,
        client: Client<HttpConnector, Body>,
        registry: HookRegistry,
        shutdown: Shutdown,
    ) -> Self {
        let registry = Arc::new(registry);

        let state = AppState {
            registry: registry.clone(),
            store,
            client,
            backend_base: config.backend.url.trim_end_matches('/').to_string(),
            backend_auth: basic_authorization(&config.backend),
            backend_timeout: Duration::from_secs(config.backend.timeout_secs),
            config: Arc::new(config),
        };

        let router = Self::build_router(&state.config, state.clone());
        Self {
            router,
            registry,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.registry.module_names()
    }

    /// Serve plain HTTP on `listener` until shutdown is triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until shutdown is triggered.
    pub async fn serve_tls(self, addr: SocketAddr, tls: RustlsConfig) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let watcher = handle.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            watcher.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!(address = %addr, "HTTPS server stopped");
        Ok(())
    }
}

/// Catch-all handler: one lifecycle run per request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
    );

    async move {
        let response = run_lifecycle(&state, request, peer).await;
        let status = response.status().as_u16();
        metrics::record_request(method.as_str(), status, start);
        tracing::info!(
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request complete"
        );
        response
    }
    .instrument(span)
    .await
}

async fn run_lifecycle(state: &AppState, request: Request<Body>, peer: SocketAddr) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let limit = state.config.limits.max_body_size;

    if declared_length(&parts.headers).is_some_and(|len| len > limit) {
        tracing::debug!(limit, "Declared body exceeds limit");
        return too_large();
    }
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit, "Failed to buffer request body");
            return too_large();
        }
    };

    let mut req = ProxyRequest::new(
        parts,
        bytes,
        peer,
        state.store.clone(),
        &state.config.default_db,
    );
    tracing::debug!(route = %req.route, "Route resolved");

    let completed = match process(state, &mut req).await {
        Ok(Flow::Continue) => true,
        Ok(Flow::Abort(signal)) => {
            req.response.apply_signal(&signal);
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Request processing failed");
            req.response.server_error();
            false
        }
    };

    if completed {
        req.response.parse_json();
        match fire(state, Stage::Finish, &mut req).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Abort(signal)) => req.response.apply_signal(&signal),
            Err(e) => {
                tracing::error!(error = %e, "Finish hook failed");
                req.response.server_error();
            }
        }
    }

    let response = req.response.to_http().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response");
        fallback_error()
    });

    match fire(state, Stage::Final, &mut req).await {
        Ok(Flow::Continue) => {}
        Ok(Flow::Abort(signal)) => {
            tracing::debug!(status = %signal.status(), "Signal in final stage ignored")
        }
        Err(e) => tracing::warn!(error = %e, "Final hook failed"),
    }

    response
}

/// Stages up to and including the backend exchange.
async fn process(state: &AppState, req: &mut ProxyRequest) -> HookResult {
    if let abort @ Flow::Abort(_) = fire(state, Stage::Url, req).await? {
        return Ok(abort);
    }

    req.parse_json_body();

    if let abort @ Flow::Abort(_) = fire(state, Stage::Pre, req).await? {
        return Ok(abort);
    }

    let Some(path) = req.route.storage_path() else {
        tracing::debug!(route = %req.route, "No storage path, answering 404");
        return Ok(Flow::Abort(ControlSignal::not_found()));
    };

    let upstream = upstream_request(state, req, &path)?;
    tracing::debug!(uri = %upstream.uri(), "Forwarding to backend");
    let in_flight = state.client.request(upstream);

    if let abort @ Flow::Abort(_) = fire(state, Stage::Pending, req).await? {
        return Ok(abort);
    }

    let response = match tokio::time::timeout(state.backend_timeout, in_flight).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            metrics::record_upstream_error();
            return Err(e.into());
        }
        Err(_) => {
            metrics::record_upstream_error();
            return Err(ProxyError::UpstreamTimeout(state.backend_timeout));
        }
    };

    let (parts, body) = response.into_parts();
    let limit = state.config.limits.max_response_size;
    let bytes = axum::body::to_bytes(Body::new(body), limit).await?;
    tracing::debug!(status = %parts.status, bytes = bytes.len(), "Backend responded");
    req.response.absorb_upstream(parts, bytes);

    Ok(Flow::Continue)
}

/// Fire a stage and count any signal it produced.
async fn fire(state: &AppState, stage: Stage, req: &mut ProxyRequest) -> HookResult {
    let flow = state.registry.fire(stage, req).await?;
    if let Flow::Abort(signal) = &flow {
        metrics::record_signal(stage.as_str(), signal.status().as_u16());
    }
    Ok(flow)
}

/// Build the backend request for `path`, carrying the (possibly rewritten) body.
fn upstream_request(
    state: &AppState,
    req: &ProxyRequest,
    path: &str,
) -> Result<Request<Body>, ProxyError> {
    let body = req.outgoing_body()?;

    let mut target = format!("{}{}", state.backend_base, path);
    if let Some(query) = req.uri.query() {
        target.push('?');
        target.push_str(query);
    }
    let uri: Uri = target.parse()?;

    let mut builder = Request::builder().method(req.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &req.headers {
            if is_hop_by_hop(name)
                || *name == header::HOST
                || *name == header::CONTENT_LENGTH
                || *name == header::AUTHORIZATION
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        if let Some(auth) = &state.backend_auth {
            headers.insert(header::AUTHORIZATION, auth.clone());
        }
    }

    Ok(builder.body(Body::from(body))?)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn too_large() -> Response<Body> {
    let signal = ControlSignal::payload_too_large();
    metrics::record_signal("receive", signal.status().as_u16());

    let mut response = PendingResponse::default();
    response.apply_signal(&signal);
    response.to_http().unwrap_or_else(|_| fallback_error())
}
