// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local history of past analyses
//!
//! The history lives in a single string-keyed slot of a [`KeyValueStore`] as a
//! JSON array, newest first. Every append reads the whole list, prepends the
//! new record and writes the list back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::acquisition::ImageUri;
use crate::error::StorageError;

/// One completed analysis. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    image: String,
    result: String,
    timestamp: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Create a record stamped with the current time
    pub fn new(image: &ImageUri, result: impl Into<String>) -> Self {
        Self::with_timestamp(image, result, Utc::now())
    }

    pub fn with_timestamp(image: &ImageUri, result: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            image: image.as_str().to_string(),
            result: result.into(),
            timestamp,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// String-keyed persistent slots
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a slot, `None` if it was never written
    async fn get_item(&self, key: &str) -> std::io::Result<Option<String>>;

    /// Replace the whole content of a slot
    async fn set_item(&self, key: &str, value: &str) -> std::io::Result<()>;
}

/// One JSON file per key inside a directory
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get_item(&self, key: &str) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.slot_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write beside the slot and swap it in
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, self.slot_path(key)).await
    }
}

/// In-process slots, lost when dropped
#[derive(Default)]
pub struct MemoryKvStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, key: &str) -> std::io::Result<Option<String>> {
        Ok(self.slots.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.slots.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Newest-first list of analyses kept in one store slot
pub struct HistoryStore<S> {
    store: S,
    key: String,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Prepend a record and rewrite the stored list
    pub async fn append(&self, record: AnalysisRecord) -> Result<(), StorageError> {
        // Appends from this process never interleave their read and write
        let _guard = self.write_lock.lock().await;

        let mut records = self
            .read_all()
            .await
            .map_err(|e| StorageError::Append(Box::new(e)))?;
        records.insert(0, record);

        let json = serde_json::to_string(&records).map_err(StorageError::Encode)?;
        self.store
            .set_item(&self.key, &json)
            .await
            .map_err(StorageError::Write)?;

        debug!("History now holds {} entries", records.len());
        Ok(())
    }

    /// Read all history entries, newest first
    pub async fn read_all(&self) -> Result<Vec<AnalysisRecord>, StorageError> {
        let data = self
            .store
            .get_item(&self.key)
            .await
            .map_err(StorageError::Read)?;

        match data {
            Some(data) if !data.trim().is_empty() => {
                serde_json::from_str(&data).map_err(StorageError::Corrupted)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Get the most recent N entries
    pub async fn get_recent(&self, count: usize) -> Result<Vec<AnalysisRecord>, StorageError> {
        let mut records = self.read_all().await?;
        records.truncate(count);
        Ok(records)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
