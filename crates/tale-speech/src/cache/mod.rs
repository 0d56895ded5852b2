//! Audio cache
//!
//! Synthesized audio is cached under a key derived from the full text and the
//! resolved options. Entries expire after the retention window and are deleted
//! lazily on lookup. When a write fails for lack of room, the oldest entries are
//! evicted in a batch and the write is retried once. Storage failures are logged
//! and never surfaced to callers.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{StoreError, StoreResult};
use crate::types::{SynthesisRequest, SynthesizedAudio};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Default retention window for cached audio
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
/// Default number of entries evicted when a write runs out of room
pub const DEFAULT_EVICTION_BATCH: usize = 10;

/// A cached payload with its creation time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>, retention: TimeDelta) -> bool {
        now - self.created_at > retention
    }
}

mod payload_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Persistent key-value storage consumed by the cache
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>>;

    /// Store an entry. Fails with `StoreError::Capacity` when the store is full.
    async fn set(&self, key: &str, entry: StoredEntry) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Keys starting with `prefix`, in stable insertion order
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Cache of synthesized audio on top of a `KeyValueStore`
#[derive(Clone)]
pub struct AudioCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    retention: TimeDelta,
    eviction_batch: usize,
}

impl AudioCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            retention: TimeDelta::days(DEFAULT_RETENTION_DAYS),
            eviction_batch: DEFAULT_EVICTION_BATCH,
        }
    }

    pub fn with_retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_eviction_batch(mut self, batch: usize) -> Self {
        self.eviction_batch = batch.max(1);
        self
    }

    /// Derive the cache key for a request.
    ///
    /// The digest covers the full text plus every option that changes the audio,
    /// so two texts sharing a prefix never collide.
    pub fn key_for(&self, request: &SynthesisRequest) -> String {
        let mut s = String::with_capacity(request.text.len() + 64);
        s.push_str(&request.voice.voice_id);
        s.push('|');
        s.push_str(&request.voice.language_tag);
        s.push('|');
        s.push_str(request.voice.gender.as_str());
        s.push('|');
        s.push_str(&format!("{:.2}", request.speaking_rate));
        s.push('|');
        s.push_str(request.audio_encoding.as_str());
        s.push('|');
        s.push_str(&request.text);

        let digest = Sha256::digest(s.as_bytes());
        format!("{}{}", self.namespace, hex::encode(digest))
    }

    /// Look up a non-expired entry. Expired entries are deleted.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                log::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        if entry.is_expired(Utc::now(), self.retention) {
            log::debug!("Cache entry {} expired, removing", key);
            if let Err(e) = self.store.delete(key).await {
                log::warn!("Failed to delete expired cache entry {}: {}", key, e);
            }
            return None;
        }

        log::debug!("Cache hit for {}", key);
        Some(entry.payload)
    }

    /// Store synthesized audio. Returns whether the entry was written.
    pub async fn put(&self, key: &str, audio: &SynthesizedAudio) -> bool {
        let entry = StoredEntry::new(audio.payload.clone());
        match self.store.set(key, entry.clone()).await {
            Ok(()) => true,
            Err(StoreError::Capacity) => {
                log::warn!(
                    "Cache full, evicting {} oldest entries before retrying",
                    self.eviction_batch
                );
                self.evict_oldest(self.eviction_batch).await;
                match self.store.set(key, entry).await {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("Cache write for {} failed after eviction: {}", key, e);
                        false
                    }
                }
            }
            Err(e) => {
                log::warn!("Cache write for {} failed: {}", key, e);
                false
            }
        }
    }

    /// Remove up to `batch` entries in the store's enumeration order
    pub async fn evict_oldest(&self, batch: usize) -> usize {
        let keys = match self.store.list_keys(&self.namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("Failed to enumerate cache keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.into_iter().take(batch) {
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to evict cache entry {}: {}", key, e),
            }
        }
        log::debug!("Evicted {} cache entries", removed);
        removed
    }

    /// Remove every entry under the namespace
    pub async fn clear_all(&self) -> usize {
        let keys = match self.store.list_keys(&self.namespace).await {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("Failed to enumerate cache keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to delete cache entry {}: {}", key, e),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioEncoding, Gender, VoiceProfile};

    fn request(text: &str, rate: f32) -> SynthesisRequest {
        SynthesisRequest::new(
            text,
            VoiceProfile::new("da-DK", "da-DK-Wavenet-A", Gender::Female),
            rate,
            AudioEncoding::Mp3,
        )
    }

    fn cache_with(store: Arc<MemoryStore>) -> AudioCache {
        AudioCache::new(store, "tts_cache_")
    }

    #[test]
    fn test_key_is_deterministic_and_namespaced() {
        let cache = cache_with(Arc::new(MemoryStore::new()));
        let a = cache.key_for(&request("Hej med dig", 0.9));
        let b = cache.key_for(&request("Hej med dig", 0.9));
        assert_eq!(a, b);
        assert!(a.starts_with("tts_cache_"));
        assert_eq!(a.len(), "tts_cache_".len() + 64);
    }

    #[test]
    fn test_key_depends_on_full_text_and_options() {
        let cache = cache_with(Arc::new(MemoryStore::new()));
        let prefix = "a".repeat(200);
        let a = cache.key_for(&request(&format!("{prefix} slut"), 0.9));
        let b = cache.key_for(&request(&format!("{prefix} start"), 0.9));
        assert_ne!(a, b);

        let slow = cache.key_for(&request("Hej", 0.8));
        let normal = cache.key_for(&request("Hej", 0.9));
        assert_ne!(slow, normal);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache_with(Arc::new(MemoryStore::new()));
        let key = cache.key_for(&request("Hej", 0.9));
        let audio = SynthesizedAudio::new(vec![1, 2, 3], AudioEncoding::Mp3);

        assert!(cache.get(&key).await.is_none());
        assert!(cache.put(&key, &audio).await);
        assert_eq!(cache.get(&key).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_on_lookup() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let stale = StoredEntry::new(vec![9]).with_created_at(Utc::now() - TimeDelta::days(8));
        store.set("tts_cache_old", stale).await.unwrap();

        assert!(cache.get("tts_cache_old").await.is_none());
        assert!(store.get("tts_cache_old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_inside_retention_is_served() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        let recent = StoredEntry::new(vec![7]).with_created_at(Utc::now() - TimeDelta::days(6));
        store.set("tts_cache_recent", recent).await.unwrap();

        assert_eq!(cache.get("tts_cache_recent").await, Some(vec![7]));
    }

    #[tokio::test]
    async fn test_put_evicts_oldest_when_full() {
        let store = Arc::new(MemoryStore::with_max_entries(3));
        let cache = cache_with(store.clone()).with_eviction_batch(2);
        let audio = SynthesizedAudio::new(vec![0], AudioEncoding::Mp3);

        for key in ["tts_cache_a", "tts_cache_b", "tts_cache_c"] {
            assert!(cache.put(key, &audio).await);
        }
        assert!(cache.put("tts_cache_d", &audio).await);

        let keys = store.list_keys("tts_cache_").await.unwrap();
        assert_eq!(keys, vec!["tts_cache_c".to_string(), "tts_cache_d".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_all_only_touches_namespace() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store.clone());
        store.set("tts_cache_a", StoredEntry::new(vec![1])).await.unwrap();
        store.set("tts_cache_b", StoredEntry::new(vec![2])).await.unwrap();
        store.set("session_id", StoredEntry::new(vec![3])).await.unwrap();

        assert_eq!(cache.clear_all().await, 2);
        assert!(store.get("session_id").await.unwrap().is_some());
        assert!(store.list_keys("tts_cache_").await.unwrap().is_empty());
    }

    #[test]
    fn test_stored_entry_serializes_payload_as_base64() {
        let entry = StoredEntry::new(vec![0, 255, 16]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["payload"], "AP8Q");
        let back: StoredEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
