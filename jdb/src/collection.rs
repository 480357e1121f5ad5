//! Typed collection handle
//!
//! A [`Collection`] sends commands to its collection's actor and decodes the
//! replies into [`Record`]s. Handles are cheap to clone; every handle for the
//! same name talks to the same actor.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::messages::{CollectionCommand, Reply};
use crate::query::Query;
use crate::record::{Document, Record, fields_to_document, json_type};

/// Handle to one named collection of `Record<T>`
pub struct Collection<T> {
    name: String,
    tx: mpsc::Sender<CollectionCommand>,
    _shape: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
            _shape: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).finish()
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub(crate) fn new(name: String, tx: mpsc::Sender<CollectionCommand>) -> Self {
        Self {
            name,
            tx,
            _shape: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn tx_same_channel(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Send a command and wait for the actor's reply
    async fn request<R>(&self, build: impl FnOnce(Reply<R>) -> CollectionCommand) -> DbResult<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| DbError::ChannelError)?;
        reply_rx.await.map_err(|_| DbError::ChannelError)?
    }

    fn decode(docs: Vec<Document>) -> DbResult<Vec<Record<T>>> {
        docs.into_iter().map(Record::from_document).collect()
    }

    /// Every record in stored order
    pub async fn all(&self) -> DbResult<Vec<Record<T>>> {
        debug!(collection = %self.name, "all: called");
        self.find(Query::All).await
    }

    /// Records matching `query`, in stored order
    pub async fn find(&self, query: Query<T>) -> DbResult<Vec<Record<T>>> {
        debug!(collection = %self.name, ?query, "find: called");
        let matcher = query.into_matcher();
        let docs = self
            .request(|reply| CollectionCommand::Find {
                matcher,
                limit: None,
                reply,
            })
            .await?;
        Self::decode(docs)
    }

    /// First record matching `query`
    pub async fn find_one(&self, query: Query<T>) -> DbResult<Option<Record<T>>> {
        debug!(collection = %self.name, ?query, "find_one: called");
        let matcher = query.into_matcher();
        let docs = self
            .request(|reply| CollectionCommand::Find {
                matcher,
                limit: Some(1),
                reply,
            })
            .await?;
        docs.into_iter().next().map(Record::from_document).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Record<T>>> {
        debug!(collection = %self.name, %id, "find_by_id: called");
        self.find_one(Query::id(id)).await
    }

    /// Store a new record, assigning its id and timestamps
    pub async fn add(&self, fields: T) -> DbResult<Record<T>> {
        debug!(collection = %self.name, "add: called");
        let fields = fields_to_document(&fields)?;
        let doc = self
            .request(|reply| CollectionCommand::Insert { fields, reply })
            .await?;
        Record::from_document(doc)
    }

    /// Merge `patch` into every record matching `query`
    ///
    /// The patch must serialize to a JSON object. Its keys overwrite the
    /// record's; reserved keys are ignored. Returns the updated records.
    pub async fn update<P: Serialize>(&self, query: Query<T>, patch: &P) -> DbResult<Vec<Record<T>>> {
        debug!(collection = %self.name, ?query, "update: called");
        let patch = match serde_json::to_value(patch)? {
            Value::Object(patch) => patch,
            other => {
                return Err(DbError::InvalidPatch(format!(
                    "expected an object, got {}",
                    json_type(&other)
                )));
            }
        };
        let matcher = query.into_matcher();
        let docs = self
            .request(|reply| CollectionCommand::Update { matcher, patch, reply })
            .await?;
        Self::decode(docs)
    }

    pub async fn update_by_id<P: Serialize>(&self, id: &str, patch: &P) -> DbResult<Option<Record<T>>> {
        debug!(collection = %self.name, %id, "update_by_id: called");
        let updated = self.update(Query::id(id), patch).await?;
        Ok(updated.into_iter().next())
    }

    /// Remove every record matching `query`, returning how many were removed
    pub async fn delete(&self, query: Query<T>) -> DbResult<usize> {
        debug!(collection = %self.name, ?query, "delete: called");
        let matcher = query.into_matcher();
        self.request(|reply| CollectionCommand::Delete { matcher, reply })
            .await
    }

    pub async fn delete_by_id(&self, id: &str) -> DbResult<bool> {
        debug!(collection = %self.name, %id, "delete_by_id: called");
        Ok(self.delete(Query::id(id)).await? > 0)
    }

    /// Number of records matching `query`
    pub async fn count(&self, query: Query<T>) -> DbResult<usize> {
        debug!(collection = %self.name, ?query, "count: called");
        let matcher = query.into_matcher();
        self.request(|reply| CollectionCommand::Count { matcher, reply })
            .await
    }

    /// Discard every record, leaving an empty collection
    pub async fn clear(&self) -> DbResult<()> {
        debug!(collection = %self.name, "clear: called");
        self.request(|reply| CollectionCommand::Clear { reply }).await
    }
}
