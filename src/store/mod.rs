//! Backend document store.
//!
//! # Data Flow
//! ```text
//! hook (session lookup, confirmation write)
//!     → DocumentStore (async, non-blocking)
//!         → couch.rs  (CouchDB over HTTP)
//!         → memory.rs (in-process, tests and failure injection)
//! ```
//!
//! # Design Decisions
//! - Hooks only reach the backend through this trait, never the proxy transport
//! - Every call is async so a lookup never stalls other connections
//! - Documents are loose JSON objects keyed `"{type}:{id}"`

pub mod couch;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

pub use couch::CouchStore;
pub use memory::MemoryStore;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("failed to read response: {0}")]
    Body(#[from] axum::Error),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("document update conflict: {0}")]
    Conflict(String),

    #[error("document has no _id")]
    MissingId,

    #[error("injected failure writing {0}")]
    Injected(String),
}

/// A JSON document living in a backend database.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    database: String,
    fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document with the given `_id`.
    pub fn new(database: impl Into<String>, id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("_id".to_string(), Value::String(id.into()));
        Self {
            database: database.into(),
            fields,
        }
    }

    pub fn from_fields(database: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            database: database.into(),
            fields,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("_id")
    }

    pub fn rev(&self) -> Option<&str> {
        self.get_str("_rev")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Async access to the backend document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` when it does not exist.
    async fn get(&self, database: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Create a new document. `fields` must carry an `_id`.
    async fn create(&self, database: &str, fields: Map<String, Value>) -> Result<Document, StoreError>;

    /// Write back a previously fetched document, returning it with its new revision.
    async fn save(&self, doc: Document) -> Result<Document, StoreError>;
}

/// Parse a CouchDB revision number (`"3-abc"` → 3).
pub(crate) fn revision_number(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_accessors() {
        let mut doc = Document::new("slipcover", "session:abc");
        doc.set("email", "a@x.com");
        assert_eq!(doc.database(), "slipcover");
        assert_eq!(doc.id(), Some("session:abc"));
        assert_eq!(doc.get_str("email"), Some("a@x.com"));
        assert!(!doc.contains("confirmed"));
        assert_eq!(doc.rev(), None);
    }

    #[test]
    fn revision_numbers() {
        assert_eq!(revision_number("3-deadbeef"), 3);
        assert_eq!(revision_number("garbage"), 0);
    }
}
