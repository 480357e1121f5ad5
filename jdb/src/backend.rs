//! Storage backends
//!
//! A backend loads and saves whole collections. The JSON file backend is the
//! durable one; the memory backend keeps everything in a map and is handy in
//! tests and for throwaway databases.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::record::{Document, json_type};
use crate::validation::validate_collection_name;

/// File extension for collection files
pub const COLLECTION_EXTENSION: &str = "json";

const LOCK_EXTENSION: &str = "lock";

/// Exclusive hold on a collection for one read-modify-write cycle
///
/// Released on drop.
#[derive(Debug, Default)]
pub struct CollectionLock {
    file: Option<File>,
}

impl CollectionLock {
    pub fn none() -> Self {
        Self { file: None }
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = FileExt::unlock(&file)
        {
            debug!(error = %e, "CollectionLock::drop: unlock failed, released on close");
        }
    }
}

/// Whole-collection storage
#[async_trait]
pub trait Backend: Send + Sync {
    /// Load every document; a collection that was never written is empty
    async fn load(&self, collection: &str) -> DbResult<Vec<Document>>;

    /// Replace the collection's contents
    async fn save(&self, collection: &str, docs: &[Document]) -> DbResult<()>;

    /// Remove the collection entirely, returning whether it existed
    async fn remove(&self, collection: &str) -> DbResult<bool>;

    /// Names of all persisted collections, sorted
    async fn list(&self) -> DbResult<Vec<String>>;

    /// Take an exclusive lock on the collection, if the backend supports one
    async fn lock(&self, _collection: &str) -> DbResult<CollectionLock> {
        Ok(CollectionLock::none())
    }
}

/// One pretty-printed JSON array file per collection
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    base_dir: PathBuf,
    file_lock: bool,
}

impl JsonFileBackend {
    pub fn new(base_dir: impl Into<PathBuf>, file_lock: bool) -> Self {
        let base_dir = base_dir.into();
        debug!(base_dir = %base_dir.display(), file_lock, "JsonFileBackend::new: called");
        Self { base_dir, file_lock }
    }

    /// Path of the file backing `collection`
    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{collection}.{COLLECTION_EXTENSION}"))
    }

    fn temp_path_for(&self, collection: &str) -> PathBuf {
        self.base_dir
            .join(format!(".{collection}.{COLLECTION_EXTENSION}.{}.tmp", std::process::id()))
    }

    fn lock_path_for(&self, collection: &str) -> PathBuf {
        self.base_dir
            .join(format!("{collection}.{COLLECTION_EXTENSION}.{LOCK_EXTENSION}"))
    }

    async fn ensure_dir(&self) -> DbResult<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| DbError::io(&self.base_dir, e))
    }
}

/// Parse a collection file: a JSON array of objects
pub(crate) fn parse_collection(path: &Path, content: &str) -> DbResult<Vec<Document>> {
    let corrupt = |reason: String| DbError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(corrupt(format!("expected an array, found {}", json_type(&value))));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(doc) => Ok(doc),
            other => Err(corrupt(format!("element {index} is {}, not an object", json_type(&other)))),
        })
        .collect()
}

#[async_trait]
impl Backend for JsonFileBackend {
    async fn load(&self, collection: &str) -> DbResult<Vec<Document>> {
        let path = self.path_for(collection);
        debug!(path = %path.display(), "JsonFileBackend::load: called");

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%collection, "JsonFileBackend::load: no file yet, empty collection");
                return Ok(Vec::new());
            }
            Err(e) => return Err(DbError::io(path, e)),
        };

        parse_collection(&path, &content)
    }

    async fn save(&self, collection: &str, docs: &[Document]) -> DbResult<()> {
        let path = self.path_for(collection);
        debug!(path = %path.display(), count = docs.len(), "JsonFileBackend::save: called");
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(docs)?;

        // Write aside and rename so readers never see a half-written file
        let temp = self.temp_path_for(collection);
        fs::write(&temp, content).await.map_err(|e| DbError::io(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                warn!(error = %cleanup, temp = %temp.display(), "JsonFileBackend::save: failed to remove temp file");
            }
            return Err(DbError::io(path, e));
        }
        Ok(())
    }

    async fn remove(&self, collection: &str) -> DbResult<bool> {
        let path = self.path_for(collection);
        debug!(path = %path.display(), "JsonFileBackend::remove: called");
        let existed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(DbError::io(path, e)),
        };

        // The caller may still hold the lock; unlinking leaves its handle valid
        let lock_path = self.lock_path_for(collection);
        match fs::remove_file(&lock_path).await {
            Ok(()) => debug!(path = %lock_path.display(), "JsonFileBackend::remove: lock file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %lock_path.display(), "JsonFileBackend::remove: failed to remove lock file"),
        }
        Ok(existed)
    }

    async fn list(&self) -> DbResult<Vec<String>> {
        debug!(base_dir = %self.base_dir.display(), "JsonFileBackend::list: called");
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::io(&self.base_dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| DbError::io(&self.base_dir, e))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == COLLECTION_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && validate_collection_name(stem).is_ok()
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn lock(&self, collection: &str) -> DbResult<CollectionLock> {
        if !self.file_lock {
            return Ok(CollectionLock::none());
        }
        self.ensure_dir().await?;

        let path = self.lock_path_for(collection);
        debug!(path = %path.display(), "JsonFileBackend::lock: acquiring");
        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| DbError::io(&path, std::io::Error::other(e)))?
        .map_err(|e| DbError::io(&path, e))?;

        Ok(CollectionLock { file: Some(file) })
    }
}

/// Collections held in memory only
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load(&self, collection: &str) -> DbResult<Vec<Document>> {
        debug!(%collection, "MemoryBackend::load: called");
        Ok(self.collections.lock().await.get(collection).cloned().unwrap_or_default())
    }

    async fn save(&self, collection: &str, docs: &[Document]) -> DbResult<()> {
        debug!(%collection, count = docs.len(), "MemoryBackend::save: called");
        self.collections
            .lock()
            .await
            .insert(collection.to_string(), docs.to_vec());
        Ok(())
    }

    async fn remove(&self, collection: &str) -> DbResult<bool> {
        debug!(%collection, "MemoryBackend::remove: called");
        Ok(self.collections.lock().await.remove(collection).is_some())
    }

    async fn list(&self) -> DbResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.lock().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
