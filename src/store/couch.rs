//! CouchDB store client.
//!
//! # Responsibilities
//! - Fetch and write documents over the CouchDB HTTP API
//! - Track `_rev` so saves update in place
//! - Authenticate with HTTP Basic credentials when configured

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use base64::Engine as _;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::BackendConfig;
use crate::store::{Document, DocumentStore, StoreError};

/// Characters left unescaped in database names and document keys.
const KEY_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b':');

/// Build the `Authorization` value for the backend, if credentials are configured.
pub fn basic_authorization(config: &BackendConfig) -> Option<HeaderValue> {
    let username = config.username.as_deref()?;
    let password = config.password.as_deref().unwrap_or_default();
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    HeaderValue::from_str(&format!("Basic {token}")).ok()
}

/// Document store backed by a CouchDB server.
#[derive(Clone)]
pub struct CouchStore {
    client: Client<HttpConnector, Body>,
    base_url: String,
    authorization: Option<HeaderValue>,
    timeout: Duration,
}

/// Pooled HTTP client for the backend, shared by the store and the proxy engine.
pub fn backend_client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

impl CouchStore {
    /// Store issuing its requests through `client`'s connection pool.
    pub fn new(config: &BackendConfig, client: Client<HttpConnector, Body>) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            authorization: basic_authorization(config),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn document_url(&self, database: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            utf8_percent_encode(database, KEY_SAFE),
            utf8_percent_encode(key, KEY_SAFE)
        )
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), StoreError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .header(header::ACCEPT, "application/json");
        if let Some(auth) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, auth.clone());
        }

        let request = match body {
            Some(bytes) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))?,
            None => builder.body(Body::empty())?,
        };

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX).await?;
        Ok((status, bytes))
    }

    async fn put(&self, database: &str, mut fields: Map<String, Value>) -> Result<Document, StoreError> {
        let id = fields
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(StoreError::MissingId)?;

        let payload = serde_json::to_vec(&fields)?;
        let (status, bytes) = self
            .send(Method::PUT, self.document_url(database, &id), Some(payload))
            .await?;

        match status {
            StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::OK => {
                let reply: Map<String, Value> = serde_json::from_slice(&bytes)?;
                if let Some(rev) = reply.get("rev").cloned() {
                    fields.insert("_rev".to_string(), rev);
                }
                tracing::debug!(database, id = %id, "Document written");
                Ok(Document::from_fields(database, fields))
            }
            StatusCode::CONFLICT => Err(StoreError::Conflict(id)),
            other => Err(unexpected(other, &bytes)),
        }
    }
}

fn unexpected(status: StatusCode, body: &[u8]) -> StoreError {
    StoreError::Status {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn get(&self, database: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let (status, bytes) = self
            .send(Method::GET, self.document_url(database, key), None)
            .await?;

        match status {
            StatusCode::OK => {
                let fields: Map<String, Value> = serde_json::from_slice(&bytes)?;
                Ok(Some(Document::from_fields(database, fields)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(unexpected(other, &bytes)),
        }
    }

    async fn create(&self, database: &str, mut fields: Map<String, Value>) -> Result<Document, StoreError> {
        fields.remove("_rev");
        self.put(database, fields).await
    }

    async fn save(&self, doc: Document) -> Result<Document, StoreError> {
        let database = doc.database().to_string();
        self.put(&database, doc.into_fields()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(username: Option<&str>, password: Option<&str>) -> BackendConfig {
        BackendConfig {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn basic_authorization_encodes_credentials() {
        let value = basic_authorization(&backend(Some("admin"), Some("secret"))).unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic YWRtaW46c2VjcmV0");
        assert!(basic_authorization(&backend(None, Some("secret"))).is_none());
    }

    #[test]
    fn document_urls_escape_keys() {
        let mut config = backend(None, None);
        config.url = "http://127.0.0.1:5984/".to_string();
        let store = CouchStore::new(&config, backend_client());
        assert_eq!(
            store.document_url("slipcover", "session:a b/c"),
            "http://127.0.0.1:5984/slipcover/session:a%20b%2Fc"
        );
    }
}
