//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use slipcover::config::{BackendConfig, GatewayConfig};
use slipcover::store::{couch::backend_client, CouchStore, MemoryStore, StoreError};
use slipcover::{HttpServer, Shutdown};

pub const DB: &str = "slipcover";
pub const ADMIN_EMAIL: &str = "ops@example.com";

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Bytes,
}

/// In-process stand-in for CouchDB, backed by a `MemoryStore`.
#[derive(Clone)]
pub struct MockCouch {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockCouch {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests that touched `/{db}/{key}`.
    pub fn requests_for(&self, key: &str) -> Vec<Recorded> {
        let path = format!("/{DB}/{key}");
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn seed(&self, doc: Value) {
        self.store
            .put(DB, doc.as_object().cloned().unwrap())
            .unwrap();
    }

    pub fn doc(&self, key: &str) -> Option<Map<String, Value>> {
        self.store.fetch(DB, key)
    }
}

/// Start a mock CouchDB on an ephemeral port.
pub async fn start_mock_couch() -> MockCouch {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mock = MockCouch {
        addr: listener.local_addr().unwrap(),
        store: MemoryStore::new(),
        requests: Arc::default(),
    };

    let app = Router::new()
        .route("/{db}/{key}", any(couch_document))
        .fallback(couch_unknown)
        .with_state(mock.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    mock
}

async fn couch_document(
    State(mock): State<MockCouch>,
    Path((db, key)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&mock, &method, &uri, &headers, &body);

    match method {
        Method::GET => match mock.store.fetch(&db, &key) {
            Some(doc) => Json(Value::Object(doc)).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "not_found", "reason": "missing"})),
            )
                .into_response(),
        },
        Method::PUT => {
            let mut fields: Map<String, Value> = match serde_json::from_slice(&body) {
                Ok(fields) => fields,
                Err(_) => {
                    return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad_request"})))
                        .into_response()
                }
            };
            fields.insert("_id".to_string(), Value::String(key.clone()));
            match mock.store.put(&db, fields) {
                Ok(doc) => (
                    StatusCode::CREATED,
                    Json(json!({"ok": true, "id": key, "rev": doc.rev()})),
                )
                    .into_response(),
                Err(StoreError::Conflict(_)) => {
                    (StatusCode::CONFLICT, Json(json!({"error": "conflict"}))).into_response()
                }
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal", "reason": e.to_string()})),
                )
                    .into_response(),
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn couch_unknown(
    State(mock): State<MockCouch>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&mock, &method, &uri, &headers, &body);
    (StatusCode::BAD_REQUEST, Json(json!({"error": "illegal_path"}))).into_response()
}

fn record(mock: &MockCouch, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
    mock.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });
}

/// Start a raw TCP backend that answers every connection with `response`
/// after `delay`. Returns its address.
pub async fn start_raw_backend(response: String, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config_for(backend: SocketAddr) -> GatewayConfig {
    GatewayConfig {
        admins: vec![ADMIN_EMAIL.to_string()],
        backend: BackendConfig {
            url: format!("http://{backend}"),
            timeout_secs: 2,
            ..BackendConfig::default()
        },
        ..GatewayConfig::default()
    }
}

/// A running gateway.
pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the gateway on an ephemeral port, with hooks using a CouchDB store
/// pointed at the configured backend.
pub async fn start_gateway(config: GatewayConfig) -> Gateway {
    let shutdown = Shutdown::new();
    let client = backend_client();
    let store = Arc::new(CouchStore::new(&config.backend, client.clone()));
    let server = HttpServer::new(config, store, client, shutdown.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));

    Gateway { addr, shutdown }
}

/// Send a raw HTTP/1.1 request and return the status line.
pub async fn raw_status_line(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Seed a confirmed session `session:{key}`.
pub fn seed_confirmed_session(mock: &MockCouch, key: &str, email: &str) {
    mock.seed(json!({
        "_id": format!("session:{key}"),
        "email": email,
        "created": "2024-01-01T00:00:00Z",
        "secret": format!("secret-{key}"),
        "confirm_id": format!("c-{key}"),
        "confirmed": "2024-01-01T00:05:00Z",
        "confirmed_by_ip": "127.0.0.1",
    }));
}

pub fn token(key: &str) -> String {
    format!("Token session:{key}")
}
