//! Database handle
//!
//! Owns the storage backend and a registry of collection actors. The first
//! request for a collection name spawns its actor; later requests reuse it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::actor::collection_loop;
use crate::backend::{Backend, JsonFileBackend, MemoryBackend};
use crate::collection::Collection;
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::messages::{CollectionCommand, CollectionEvent};
use crate::record::Document;
use crate::validation::validate_collection_name;

const EVENT_CAPACITY: usize = 64;

/// Cloneable handle to a set of collections sharing one backend
///
/// Must be used from within a tokio runtime: collection actors are spawned
/// as tasks on first use.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    actors: Mutex<HashMap<String, mpsc::Sender<CollectionCommand>>>,
    channel_capacity: usize,
    events: broadcast::Sender<CollectionEvent>,
}

impl Database {
    /// Open a file-backed database as configured
    pub fn open(config: &Config) -> Self {
        debug!(base_dir = %config.base_dir.display(), "Database::open: called");
        let backend = JsonFileBackend::new(&config.base_dir, config.file_lock);
        Self::with_backend(Arc::new(backend), config.channel_capacity)
    }

    /// Open a file-backed database rooted at `base_dir` with default settings
    pub fn open_at(base_dir: impl Into<PathBuf>) -> Self {
        let config = Config {
            base_dir: base_dir.into(),
            ..Config::default()
        };
        Self::open(&config)
    }

    /// A database that never touches disk
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), crate::DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_backend(backend: Arc<dyn Backend>, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(channel_capacity, "Database opened");
        Self {
            inner: Arc::new(Inner {
                backend,
                actors: Mutex::new(HashMap::new()),
                channel_capacity: channel_capacity.max(1),
                events,
            }),
        }
    }

    /// Typed handle to the collection `name`
    pub fn collection<T>(&self, name: &str) -> DbResult<Collection<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        debug!(%name, "collection: called");
        let tx = self.sender(name)?;
        Ok(Collection::new(name.to_string(), tx))
    }

    /// Schemaless handle to the collection `name`
    pub fn documents(&self, name: &str) -> DbResult<Collection<Document>> {
        self.collection(name)
    }

    fn sender(&self, name: &str) -> DbResult<mpsc::Sender<CollectionCommand>> {
        validate_collection_name(name)?;

        let mut actors = self.inner.actors.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = actors.get(name)
            && !tx.is_closed()
        {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);
        tokio::spawn(collection_loop(
            name.to_string(),
            Arc::clone(&self.inner.backend),
            rx,
            self.inner.events.clone(),
        ));
        debug!(%name, "sender: spawned collection actor");
        actors.insert(name.to_string(), tx.clone());
        Ok(tx)
    }

    /// Names of all persisted collections
    pub async fn collections(&self) -> DbResult<Vec<String>> {
        debug!("collections: called");
        self.inner.backend.list().await
    }

    /// Remove a collection's storage entirely, returning whether it existed
    pub async fn drop_collection(&self, name: &str) -> DbResult<bool> {
        debug!(%name, "drop_collection: called");
        let tx = self.sender(name)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CollectionCommand::Drop { reply: reply_tx })
            .await
            .map_err(|_| DbError::ChannelError)?;
        reply_rx.await.map_err(|_| DbError::ChannelError)?
    }

    /// Subscribe to change events from every collection
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.inner.events.subscribe()
    }

    /// Stop every collection actor
    ///
    /// Commands already queued run first. Handles obtained earlier fail with
    /// [`DbError::ChannelError`] afterwards; new handles respawn actors.
    pub async fn shutdown(&self) {
        debug!("shutdown: called");
        let actors: Vec<(String, mpsc::Sender<CollectionCommand>)> = self
            .inner
            .actors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (name, tx) in actors {
            if tx.send(CollectionCommand::Shutdown).await.is_ok() {
                tx.closed().await;
            }
            debug!(%name, "shutdown: actor stopped");
        }
        info!("Database shut down");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actors = self
            .inner
            .actors
            .lock()
            .map(|actors| actors.len())
            .unwrap_or_default();
        f.debug_struct("Database").field("actors", &actors).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rejects_invalid_collection_names() {
        let db = Database::in_memory();
        let err = db.documents("../escape").unwrap_err();
        assert!(matches!(err, DbError::InvalidCollectionName(_)));
        assert!(db.drop_collection("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_handles_share_one_actor() {
        let db = Database::in_memory();
        let a = db.documents("users").unwrap();
        let b = db.documents("users").unwrap();
        assert!(a.tx_same_channel(&b));

        let other = db.documents("posts").unwrap();
        assert!(!a.tx_same_channel(&other));
    }

    #[tokio::test]
    async fn test_collections_and_drop() {
        let temp = tempdir().unwrap();
        let db = Database::open_at(temp.path());
        assert!(db.collections().await.unwrap().is_empty());

        db.documents("users").unwrap().add(json!({"name": "a"}).as_object().cloned().unwrap()).await.unwrap();
        db.documents("posts").unwrap().clear().await.unwrap();
        assert_eq!(db.collections().await.unwrap(), vec!["posts", "users"]);

        assert!(db.drop_collection("posts").await.unwrap());
        assert!(!temp.path().join("posts.json.lock").exists());
        assert!(!db.drop_collection("posts").await.unwrap());
        assert_eq!(db.collections().await.unwrap(), vec!["users"]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_existing_handles() {
        let db = Database::in_memory();
        let users = db.documents("users").unwrap();
        users.clear().await.unwrap();

        db.shutdown().await;
        assert!(matches!(users.count(Default::default()).await.unwrap_err(), DbError::ChannelError));

        // A fresh handle respawns the actor over the same backend
        let users = db.documents("users").unwrap();
        assert_eq!(users.count(Default::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let db = Database::in_memory();
        let mut events = db.subscribe();
        let users = db.documents("users").unwrap();

        let added = users.add(json!({"name": "a"}).as_object().cloned().unwrap()).await.unwrap();
        users.update_by_id(&added.id, &json!({"name": "b"})).await.unwrap();
        users.delete_by_id(&added.id).await.unwrap();
        users.clear().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            CollectionEvent::Inserted {
                collection: "users".to_string(),
                id: added.id.clone()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CollectionEvent::Updated {
                collection: "users".to_string(),
                ids: vec![added.id.clone()]
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CollectionEvent::Deleted {
                collection: "users".to_string(),
                count: 1
            }
        );
        let cleared = events.recv().await.unwrap();
        assert_eq!(cleared.collection(), "users");
    }
}
