//! Storage collaborator seam.
//!
//! The real store is a warehouse owned by the host pipeline; this crate only
//! needs the known-identifier query and a place to hand successful payloads.
//! `MemoryStore` backs tests and small ad-hoc runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::reconcile::RecordId;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Identifiers already fully processed. Queried once per run, never
    /// mutated by the fetch loop.
    async fn known_ids(&self) -> anyhow::Result<HashSet<RecordId>>;

    async fn persist(&self, id: &RecordId, payload: &Value) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordId, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known(ids: impl IntoIterator<Item = RecordId>) -> Self {
        let records = ids.into_iter().map(|id| (id, Value::Null)).collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn get(&self, id: &RecordId) -> Option<Value> {
        self.records.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn known_ids(&self) -> anyhow::Result<HashSet<RecordId>> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }

    async fn persist(&self, id: &RecordId, payload: &Value) -> anyhow::Result<()> {
        self.records
            .lock()
            .await
            .insert(id.clone(), payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_then_query_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        let id = RecordId::from("T1");
        let payload = serde_json::json!({"title": "Snow removal"});
        store.persist(&id, &payload).await.unwrap();

        assert_eq!(store.get(&id).await, Some(payload));
        assert!(store.known_ids().await.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn with_known_seeds_the_identifier_set() {
        let store = MemoryStore::with_known(vec![RecordId::from("A"), RecordId::from("B")]);
        let known = store.known_ids().await.unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(store.len().await, 2);
    }
}
