//! Collection actor messages
//!
//! Commands sent to a collection actor and the change events it broadcasts.

use tokio::sync::oneshot;

use crate::error::DbResult;
use crate::query::Matcher;
use crate::record::Document;

/// Reply channel for a command
pub(crate) type Reply<T> = oneshot::Sender<DbResult<T>>;

/// Commands processed by a collection actor, one at a time
pub(crate) enum CollectionCommand {
    Find {
        matcher: Matcher,
        limit: Option<usize>,
        reply: Reply<Vec<Document>>,
    },
    Count {
        matcher: Matcher,
        reply: Reply<usize>,
    },
    Insert {
        fields: Document,
        reply: Reply<Document>,
    },
    Update {
        matcher: Matcher,
        patch: Document,
        reply: Reply<Vec<Document>>,
    },
    Delete {
        matcher: Matcher,
        reply: Reply<usize>,
    },
    Clear {
        reply: Reply<()>,
    },
    Drop {
        reply: Reply<bool>,
    },
    Shutdown,
}

impl std::fmt::Debug for CollectionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Find { .. } => "Find",
            Self::Count { .. } => "Count",
            Self::Insert { .. } => "Insert",
            Self::Update { .. } => "Update",
            Self::Delete { .. } => "Delete",
            Self::Clear { .. } => "Clear",
            Self::Drop { .. } => "Drop",
            Self::Shutdown => "Shutdown",
        };
        write!(f, "{name}")
    }
}

/// Broadcast after a collection changes on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    /// A record was added
    Inserted { collection: String, id: String },
    /// Records were updated
    Updated { collection: String, ids: Vec<String> },
    /// Records were deleted
    Deleted { collection: String, count: usize },
    /// The collection was emptied
    Cleared { collection: String },
    /// The collection file was removed
    Dropped { collection: String },
}

impl CollectionEvent {
    pub fn collection(&self) -> &str {
        match self {
            Self::Inserted { collection, .. }
            | Self::Updated { collection, .. }
            | Self::Deleted { collection, .. }
            | Self::Cleared { collection }
            | Self::Dropped { collection } => collection,
        }
    }
}
