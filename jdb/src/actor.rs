//! Collection actor
//!
//! One task per collection owns every read and write of that collection.
//! Commands run strictly in arrival order and each read-modify-write cycle
//! finishes before the next command starts, so writers in this process never
//! overwrite each other's changes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::DbResult;
use crate::id::unique_id;
use crate::messages::{CollectionCommand, CollectionEvent};
use crate::query::Matcher;
use crate::record::{
    CREATED_AT_FIELD, Document, ID_FIELD, UPDATED_AT_FIELD, format_timestamp, next_timestamp, now, strip_reserved,
};

/// Owns one collection and processes its commands until shutdown
pub(crate) async fn collection_loop(
    collection: String,
    backend: Arc<dyn Backend>,
    mut rx: mpsc::Receiver<CollectionCommand>,
    events: broadcast::Sender<CollectionEvent>,
) {
    debug!(%collection, "collection_loop: started");
    let actor = CollectionActor {
        collection,
        backend,
        events,
    };

    while let Some(cmd) = rx.recv().await {
        debug!(collection = %actor.collection, ?cmd, "collection_loop: command");
        match cmd {
            CollectionCommand::Find { matcher, limit, reply } => {
                let _ = reply.send(actor.find(&matcher, limit).await);
            }
            CollectionCommand::Count { matcher, reply } => {
                let result = actor.find(&matcher, None).await.map(|docs| docs.len());
                let _ = reply.send(result);
            }
            CollectionCommand::Insert { fields, reply } => {
                let _ = reply.send(actor.insert(fields).await);
            }
            CollectionCommand::Update { matcher, patch, reply } => {
                let _ = reply.send(actor.update(&matcher, patch).await);
            }
            CollectionCommand::Delete { matcher, reply } => {
                let _ = reply.send(actor.delete(&matcher).await);
            }
            CollectionCommand::Clear { reply } => {
                let _ = reply.send(actor.clear().await);
            }
            CollectionCommand::Drop { reply } => {
                let _ = reply.send(actor.drop_collection().await);
            }
            CollectionCommand::Shutdown => {
                debug!(collection = %actor.collection, "collection_loop: shutdown requested");
                break;
            }
        }
    }

    info!(collection = %actor.collection, "Collection actor stopped");
}

struct CollectionActor {
    collection: String,
    backend: Arc<dyn Backend>,
    events: broadcast::Sender<CollectionEvent>,
}

impl CollectionActor {
    fn notify(&self, event: CollectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn find(&self, matcher: &Matcher, limit: Option<usize>) -> DbResult<Vec<Document>> {
        let docs = self.backend.load(&self.collection).await?;
        select(docs, matcher, limit)
    }

    async fn insert(&self, mut fields: Document) -> DbResult<Document> {
        let ignored = strip_reserved(&mut fields);
        if !ignored.is_empty() {
            warn!(collection = %self.collection, ?ignored, "insert: ignoring reserved fields supplied by caller");
        }

        let _lock = self.backend.lock(&self.collection).await?;
        let mut docs = self.backend.load(&self.collection).await?;

        let id = unique_id(&docs);
        let at = Value::String(format_timestamp(&now()));
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        fields.insert(CREATED_AT_FIELD.to_string(), at.clone());
        fields.insert(UPDATED_AT_FIELD.to_string(), at);

        docs.push(fields.clone());
        self.backend.save(&self.collection, &docs).await?;

        debug!(collection = %self.collection, %id, total = docs.len(), "insert: record added");
        self.notify(CollectionEvent::Inserted {
            collection: self.collection.clone(),
            id,
        });
        Ok(fields)
    }

    async fn update(&self, matcher: &Matcher, mut patch: Document) -> DbResult<Vec<Document>> {
        let ignored = strip_reserved(&mut patch);
        if !ignored.is_empty() {
            warn!(collection = %self.collection, ?ignored, "update: ignoring reserved fields in patch");
        }

        let _lock = self.backend.lock(&self.collection).await?;
        let mut docs = self.backend.load(&self.collection).await?;

        let mut updated = Vec::new();
        for doc in docs.iter_mut() {
            if !matcher(&*doc)? {
                continue;
            }
            for (field, value) in &patch {
                doc.insert(field.clone(), value.clone());
            }
            let at = next_timestamp(doc.get(UPDATED_AT_FIELD));
            doc.insert(UPDATED_AT_FIELD.to_string(), Value::String(format_timestamp(&at)));
            updated.push(doc.clone());
        }

        if updated.is_empty() {
            debug!(collection = %self.collection, "update: no matching records");
            return Ok(updated);
        }

        self.backend.save(&self.collection, &docs).await?;

        let ids = updated
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string))
            .collect();
        debug!(collection = %self.collection, count = updated.len(), "update: records updated");
        self.notify(CollectionEvent::Updated {
            collection: self.collection.clone(),
            ids,
        });
        Ok(updated)
    }

    async fn delete(&self, matcher: &Matcher) -> DbResult<usize> {
        let _lock = self.backend.lock(&self.collection).await?;
        let docs = self.backend.load(&self.collection).await?;
        let total = docs.len();

        let mut kept = Vec::with_capacity(total);
        for doc in docs {
            if !matcher(&doc)? {
                kept.push(doc);
            }
        }

        let count = total - kept.len();
        if count == 0 {
            debug!(collection = %self.collection, "delete: no matching records");
            return Ok(0);
        }

        self.backend.save(&self.collection, &kept).await?;

        debug!(collection = %self.collection, count, remaining = kept.len(), "delete: records removed");
        self.notify(CollectionEvent::Deleted {
            collection: self.collection.clone(),
            count,
        });
        Ok(count)
    }

    async fn clear(&self) -> DbResult<()> {
        let _lock = self.backend.lock(&self.collection).await?;
        self.backend.save(&self.collection, &[]).await?;

        info!(collection = %self.collection, "Collection cleared");
        self.notify(CollectionEvent::Cleared {
            collection: self.collection.clone(),
        });
        Ok(())
    }

    async fn drop_collection(&self) -> DbResult<bool> {
        let _lock = self.backend.lock(&self.collection).await?;
        let existed = self.backend.remove(&self.collection).await?;

        if existed {
            info!(collection = %self.collection, "Collection dropped");
            self.notify(CollectionEvent::Dropped {
                collection: self.collection.clone(),
            });
        }
        Ok(existed)
    }
}

/// Matching documents in stored order, stopping after `limit`
fn select(docs: Vec<Document>, matcher: &Matcher, limit: Option<usize>) -> DbResult<Vec<Document>> {
    let mut selected = Vec::new();
    for doc in docs {
        if limit.is_some_and(|limit| selected.len() >= limit) {
            break;
        }
        if matcher(&doc)? {
            selected.push(doc);
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::query::Query;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn spawn_actor(backend: Arc<dyn Backend>) -> (mpsc::Sender<CollectionCommand>, broadcast::Receiver<CollectionEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let (events, events_rx) = broadcast::channel(16);
        tokio::spawn(collection_loop("things".to_string(), backend, rx, events));
        (tx, events_rx)
    }

    fn fields(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_select_respects_limit_and_order() {
        let docs: Vec<Document> = (0..5).map(|n| fields(json!({"n": n, "even": n % 2 == 0}))).collect();
        let matcher = Query::<Document>::eq("even", true).into_matcher();
        let all = select(docs.clone(), &matcher, None).unwrap();
        assert_eq!(all.iter().map(|d| d["n"].as_i64().unwrap()).collect::<Vec<_>>(), vec![0, 2, 4]);
        let first = select(docs, &matcher, Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0]["n"], json!(0));
    }

    #[tokio::test]
    async fn test_insert_assigns_reserved_fields() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let (tx, mut events) = spawn_actor(backend.clone());

        let (reply, rx) = oneshot::channel();
        tx.send(CollectionCommand::Insert {
            fields: fields(json!({"name": "a", "id": "caller-id"})),
            reply,
        })
        .await
        .unwrap();
        let doc = rx.await.unwrap().unwrap();

        assert_ne!(doc[ID_FIELD], json!("caller-id"));
        assert_eq!(doc[CREATED_AT_FIELD], doc[UPDATED_AT_FIELD]);
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "id", "createdAt", "updatedAt"]);
        assert_eq!(backend.load("things").await.unwrap(), vec![doc.clone()]);

        match events.try_recv().unwrap() {
            CollectionEvent::Inserted { collection, id } => {
                assert_eq!(collection, "things");
                assert_eq!(json!(id), doc[ID_FIELD]);
            }
            other => panic!("Expected Inserted event, got {:?}", other),
        }

        tx.send(CollectionCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_without_match_does_not_write() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let (tx, mut events) = spawn_actor(backend.clone());

        let (reply, rx) = oneshot::channel();
        tx.send(CollectionCommand::Update {
            matcher: Query::<Document>::id("missing").into_matcher(),
            patch: fields(json!({"name": "b"})),
            reply,
        })
        .await
        .unwrap();
        assert!(rx.await.unwrap().unwrap().is_empty());

        // Never written, so the memory backend still has no entry
        assert!(backend.list().await.unwrap().is_empty());
        assert!(events.try_recv().is_err());

        tx.send(CollectionCommand::Shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_after_shutdown() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let (tx, _events) = spawn_actor(backend);
        tx.send(CollectionCommand::Shutdown).await.unwrap();
        tx.closed().await;
        assert!(tx.is_closed());
    }
}
