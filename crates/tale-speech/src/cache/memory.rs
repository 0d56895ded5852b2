use super::{KeyValueStore, StoredEntry};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Entries {
    values: HashMap<String, StoredEntry>,
    order: Vec<String>,
}

/// In-process store that keeps insertion order for eviction
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses new keys once it holds `max_entries`
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_entries: Some(max_entries),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        Ok(self.entries.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if !entries.values.contains_key(key) {
            if let Some(max) = self.max_entries
                && entries.values.len() >= max
            {
                return Err(StoreError::Capacity);
            }
            entries.order.push(key.to_string());
        }
        entries.values.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if entries.values.remove(key).is_some() {
            entries.order.retain(|k| k != key);
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .order
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_keys_keeps_insertion_order() {
        let store = MemoryStore::new();
        for key in ["p_b", "p_a", "other", "p_c"] {
            store.set(key, StoredEntry::new(vec![])).await.unwrap();
        }
        assert_eq!(
            store.list_keys("p_").await.unwrap(),
            vec!["p_b".to_string(), "p_a".to_string(), "p_c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_overwrite_does_not_need_capacity() {
        let store = MemoryStore::with_max_entries(1);
        store.set("k", StoredEntry::new(vec![1])).await.unwrap();
        store.set("k", StoredEntry::new(vec![2])).await.unwrap();
        assert!(matches!(
            store.set("other", StoredEntry::new(vec![3])).await,
            Err(StoreError::Capacity)
        ));
        assert_eq!(store.get("k").await.unwrap().unwrap().payload, vec![2]);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("missing").await.is_ok());
        assert!(store.is_empty().await);
    }
}
