//! Collection name validation
//!
//! Collection names become file names, so they are restricted to a portable
//! character set with no path separators or traversal components.

use crate::error::{DbError, DbResult};

/// Longest accepted collection name in bytes
pub const MAX_COLLECTION_NAME_LEN: usize = 128;

/// Check that `name` is usable as a collection file stem
pub fn validate_collection_name(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidCollectionName(name.to_string()))
    }
}
