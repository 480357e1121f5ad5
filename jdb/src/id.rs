//! Record identifier generation

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::record::{Document, ID_FIELD};

/// Generate a fresh record id (UUIDv7: time-ordered with a random tail)
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Generate an id not already used by any of `docs`
pub(crate) fn unique_id(docs: &[Document]) -> String {
    loop {
        let id = generate_id();
        if !docs.iter().any(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str())) {
            return id;
        }
        debug!(%id, "unique_id: collision, regenerating");
    }
}
