//! jsondb - embedded flat-file JSON document store
//!
//! Each named collection is one pretty-printed JSON array on disk. Callers
//! get find/add/update/delete/count over typed records, with ids and
//! timestamps managed by the store.
//!
//! # Architecture
//!
//! ```text
//! Database ──collection::<T>("users")──> Collection<T> ──mpsc──> actor ──> Backend
//!                                                                  │
//! database/db/                                                     │
//! ├── users.json            <──────────────────────────────────────┘
//! └── cv-download-tracking.json
//! ```
//!
//! One actor task per collection runs every command for that collection in
//! order, so concurrent writers in one process cannot lose each other's
//! updates. Every command re-reads the file; there is no cache.
//!
//! # Example
//!
//! ```ignore
//! use jsondb::{Database, Query};
//! use jsondb::models::{User, USERS_COLLECTION};
//!
//! let db = Database::open_at("database/db");
//! let users = db.collection::<User>(USERS_COLLECTION)?;
//! let ann = users.add(User::new("Ann", "ann@example.com")).await?;
//! let active = users.find(Query::eq("active", true)).await?;
//! users.update_by_id(&ann.id, &serde_json::json!({"age": 31})).await?;
//! ```

mod actor;
pub mod backend;
pub mod cli;
mod collection;
pub mod config;
mod database;
mod error;
pub mod id;
mod messages;
pub mod models;
mod query;
pub mod record;
mod validation;

pub use backend::{Backend, CollectionLock, JsonFileBackend, MemoryBackend};
pub use collection::Collection;
pub use config::Config;
pub use database::Database;
pub use error::{DbError, DbResult};
pub use messages::CollectionEvent;
pub use query::{Predicate, Query, matches_pattern, values_equal};
pub use record::{Document, Record};
pub use validation::{MAX_COLLECTION_NAME_LEN, validate_collection_name};

/// Default collection directory, relative to the working directory
pub const DEFAULT_BASE_DIR: &str = "database/db";

/// Default number of queued commands per collection actor
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
