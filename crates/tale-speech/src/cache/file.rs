use super::{KeyValueStore, StoredEntry};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

const EXTENSION: &str = "tts";

/// First line of every cache file
#[derive(Serialize, Deserialize)]
struct FileHeader {
    key: String,
    created_at: DateTime<Utc>,
}

/// Directory-backed store with one file per key.
///
/// Each file holds a one-line JSON header followed by the raw audio payload,
/// so enumeration reads headers only. File names are the hex-encoded key, so
/// any key is safe on disk. Keys are enumerated oldest entry first.
pub struct FileStore {
    dir: PathBuf,
    max_entries: Option<usize>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_entries: None,
        })
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hex::encode(key.as_bytes()), EXTENSION))
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn read_entry(path: &Path) -> StoreResult<Option<StoredEntry>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let split = bytes.iter().position(|b| *b == b'\n').unwrap_or(bytes.len());
        let header: FileHeader = serde_json::from_slice(&bytes[..split])?;
        let payload = bytes.get(split + 1..).unwrap_or_default().to_vec();
        Ok(Some(StoredEntry::new(payload).with_created_at(header.created_at)))
    }

    async fn read_header(path: &Path) -> StoreResult<Option<FileHeader>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line).await?;
        Ok(Some(serde_json::from_str(line.trim_end())?))
    }

    async fn count_entries(&self) -> StoreResult<usize> {
        let mut count = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if Self::key_from_path(&entry.path()).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn map_write_error(err: std::io::Error) -> StoreError {
    if err.kind() == ErrorKind::StorageFull {
        StoreError::Capacity
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        Self::read_entry(&self.path_for(key)).await
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> StoreResult<()> {
        let path = self.path_for(key);
        if let Some(max) = self.max_entries
            && !tokio::fs::try_exists(&path).await?
            && self.count_entries().await? >= max
        {
            return Err(StoreError::Capacity);
        }

        let header = FileHeader {
            key: key.to_string(),
            created_at: entry.created_at,
        };
        let mut bytes = serde_json::to_vec(&header)?;
        bytes.push(b'\n');
        bytes.extend_from_slice(&entry.payload);

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(map_write_error)?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut found = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let path = dir_entry.path();
            let Some(key) = Self::key_from_path(&path) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match Self::read_header(&path).await {
                Ok(Some(header)) => found.push((header.created_at, key)),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Skipping unreadable cache file {}: {}", path.display(), e);
                }
            }
        }
        found.sort();
        Ok(found.into_iter().map(|(_, key)| key).collect())
    }
}
