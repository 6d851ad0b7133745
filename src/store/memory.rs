//! In-memory document store.
//!
//! Mirrors the CouchDB revision rules closely enough for the gateway:
//! updates must carry the current `_rev`, creates must not collide.
//! Writes to keys with an injected failure prefix fail with
//! `StoreError::Injected`.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::store::{revision_number, Document, DocumentStore, StoreError};

/// A thread-safe in-memory store keyed by `(database, _id)`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<DashMap<(String, String), Map<String, Value>>>,
    failing_prefixes: Arc<DashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to a key starting with `prefix` fail.
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        self.failing_prefixes.insert(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.failing_prefixes.clear();
    }

    /// Raw read, without database-level bookkeeping.
    pub fn fetch(&self, database: &str, key: &str) -> Option<Map<String, Value>> {
        self.docs
            .get(&(database.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Insert or update a document with CouchDB revision semantics.
    pub fn put(&self, database: &str, mut fields: Map<String, Value>) -> Result<Document, StoreError> {
        let id = fields
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(StoreError::MissingId)?;

        if self.failing_prefixes.iter().any(|p| id.starts_with(p.as_str())) {
            return Err(StoreError::Injected(id));
        }

        let incoming_rev = fields.get("_rev").and_then(Value::as_str).map(str::to_string);
        let key = (database.to_string(), id.clone());

        let next = match self.docs.get(&key) {
            Some(existing) => {
                let current = existing.get("_rev").and_then(Value::as_str).unwrap_or_default();
                if incoming_rev.as_deref() != Some(current) {
                    return Err(StoreError::Conflict(id));
                }
                revision_number(current) + 1
            }
            None => {
                if incoming_rev.is_some() {
                    return Err(StoreError::Conflict(id));
                }
                1
            }
        };

        let rev = format!("{}-{}", next, uuid::Uuid::new_v4().simple());
        fields.insert("_rev".to_string(), Value::String(rev));
        self.docs.insert(key, fields.clone());

        Ok(Document::from_fields(database, fields))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// All keys in a database that start with `prefix`.
    pub fn keys_with_prefix(&self, database: &str, prefix: &str) -> Vec<String> {
        self.docs
            .iter()
            .filter(|entry| entry.key().0 == database && entry.key().1.starts_with(prefix))
            .map(|entry| entry.key().1.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, database: &str, key: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .fetch(database, key)
            .map(|fields| Document::from_fields(database, fields)))
    }

    async fn create(&self, database: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        self.put(database, fields)
    }

    async fn save(&self, doc: Document) -> Result<Document, StoreError> {
        let database = doc.database().to_string();
        self.put(&database, doc.into_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_then_update_bumps_revision() {
        let store = MemoryStore::new();
        let doc = store
            .create("db", fields(json!({"_id": "session:1", "email": "a@x.com"})))
            .await
            .unwrap();
        assert!(doc.rev().unwrap().starts_with("1-"));

        let mut doc = store.get("db", "session:1").await.unwrap().unwrap();
        doc.set("confirmed", "now");
        let saved = store.save(doc).await.unwrap();
        assert!(saved.rev().unwrap().starts_with("2-"));
        assert_eq!(store.fetch("db", "session:1").unwrap()["confirmed"], "now");
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let store = MemoryStore::new();
        store.put("db", fields(json!({"_id": "a"}))).unwrap();
        let stale = store.get("db", "a").await.unwrap().unwrap();
        store.save(stale.clone()).await.unwrap();

        let err = store.save(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == "a"));
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MemoryStore::new();
        store.put("db", fields(json!({"_id": "a"}))).unwrap();
        let err = store.create("db", fields(json!({"_id": "a"}))).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn missing_id_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(store.put("db", Map::new()), Err(StoreError::MissingId)));
    }

    #[test]
    fn injected_failures_match_prefix() {
        let store = MemoryStore::new();
        store.fail_writes_with_prefix("confirm:");
        assert!(matches!(
            store.put("db", fields(json!({"_id": "confirm:1"}))),
            Err(StoreError::Injected(_))
        ));
        assert!(store.put("db", fields(json!({"_id": "session:1"}))).is_ok());

        store.clear_failures();
        assert!(store.put("db", fields(json!({"_id": "confirm:1"}))).is_ok());
        assert_eq!(store.keys_with_prefix("db", "confirm:"), vec!["confirm:1".to_string()]);
    }
}
