//! Query types and matching
//!
//! A [`Query`] is either "everything", an equality pattern over fields, or a
//! caller-supplied predicate over the typed record. Patterns are evaluated
//! directly against stored documents; predicates see the decoded record.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DbError, DbResult};
use crate::record::{Document, ID_FIELD, Record, json_type};

/// Type-erased matcher run by a collection actor against stored documents
pub(crate) type Matcher = Box<dyn Fn(&Document) -> DbResult<bool> + Send + Sync>;

/// Predicate over a typed record
pub type Predicate<T> = Arc<dyn Fn(&Record<T>) -> bool + Send + Sync>;

/// Selects records in a collection
pub enum Query<T> {
    /// Every record
    All,
    /// Every named field present with an equal value; other fields unconstrained
    Pattern(Document),
    /// Caller-supplied test over the typed record
    Predicate(Predicate<T>),
    /// Pattern checked against the stored document, then the predicate
    Filtered { pattern: Document, predicate: Predicate<T> },
}

impl<T> Query<T> {
    pub fn all() -> Self {
        Self::All
    }

    /// Match the record with this id
    pub fn id(id: impl Into<String>) -> Self {
        Self::eq(ID_FIELD, id.into())
    }

    /// Match records whose `field` equals `value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut pattern = Document::new();
        pattern.insert(field.into(), value.into());
        Self::Pattern(pattern)
    }

    pub fn pattern(pattern: Document) -> Self {
        Self::Pattern(pattern)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Record<T>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Add an equality constraint on `field`
    ///
    /// The constraint is checked against the stored document, so fields the
    /// record type does not declare can still be matched.
    pub fn and(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match self {
            Self::All => Self::eq(field, value),
            Self::Pattern(mut pattern) => {
                pattern.insert(field, value);
                Self::Pattern(pattern)
            }
            Self::Predicate(predicate) => {
                let mut pattern = Document::new();
                pattern.insert(field, value);
                Self::Filtered { pattern, predicate }
            }
            Self::Filtered { mut pattern, predicate } => {
                pattern.insert(field, value);
                Self::Filtered { pattern, predicate }
            }
        }
    }
}

impl<T: DeserializeOwned + 'static> Query<T> {
    pub(crate) fn into_matcher(self) -> Matcher {
        match self {
            Self::All => Box::new(|_| Ok(true)),
            Self::Pattern(pattern) => Box::new(move |doc| Ok(matches_pattern(&pattern, doc))),
            Self::Predicate(f) => Box::new(move |doc| {
                let record = Record::<T>::from_document(doc.clone())?;
                Ok(f(&record))
            }),
            Self::Filtered { pattern, predicate } => Box::new(move |doc| {
                if !matches_pattern(&pattern, doc) {
                    return Ok(false);
                }
                let record = Record::<T>::from_document(doc.clone())?;
                Ok(predicate(&record))
            }),
        }
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::All
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        match self {
            Self::All => Self::All,
            Self::Pattern(pattern) => Self::Pattern(pattern.clone()),
            Self::Predicate(f) => Self::Predicate(Arc::clone(f)),
            Self::Filtered { pattern, predicate } => Self::Filtered {
                pattern: pattern.clone(),
                predicate: Arc::clone(predicate),
            },
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
            Self::Filtered { pattern, .. } => f
                .debug_struct("Filtered")
                .field("pattern", pattern)
                .finish_non_exhaustive(),
        }
    }
}

impl<T> From<Document> for Query<T> {
    fn from(pattern: Document) -> Self {
        Self::Pattern(pattern)
    }
}

impl<T> TryFrom<Value> for Query<T> {
    type Error = DbError;

    /// `null` means every record, an object is a pattern
    fn try_from(value: Value) -> DbResult<Self> {
        match value {
            Value::Null => Ok(Self::All),
            Value::Object(pattern) => Ok(Self::Pattern(pattern)),
            other => Err(DbError::InvalidQuery(format!(
                "expected an object pattern, got {}",
                json_type(&other)
            ))),
        }
    }
}

/// True when every pattern field is present in `doc` with an equal value
pub fn matches_pattern(pattern: &Document, doc: &Document) -> bool {
    pattern
        .iter()
        .all(|(field, expected)| doc.get(field).is_some_and(|actual| values_equal(actual, expected)))
}

/// Same JSON type and value; numbers by numeric value, containers structurally
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Flag {
        active: bool,
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn stored(id: &str, active: bool) -> Document {
        doc(json!({
            "active": active,
            "id": id,
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z",
        }))
    }

    #[test]
    fn test_pattern_matches_present_equal_fields() {
        let record = doc(json!({"id": "1", "active": true}));
        assert!(matches_pattern(&doc(json!({"active": true})), &record));
        assert!(!matches_pattern(&doc(json!({"active": false})), &record));
        assert!(!matches_pattern(&doc(json!({"active": true, "extra": "x"})), &record));
        assert!(matches_pattern(&Document::new(), &record));
    }

    #[test]
    fn test_missing_field_does_not_match_null() {
        let record = doc(json!({"id": "1"}));
        assert!(!matches_pattern(&doc(json!({"country": null})), &record));
        let record = doc(json!({"id": "1", "country": null}));
        assert!(matches_pattern(&doc(json!({"country": null})), &record));
    }

    #[test]
    fn test_values_equal_is_type_strict() {
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(!values_equal(&json!(true), &json!(1)));
        assert!(!values_equal(&json!(null), &json!(false)));
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(-3), &json!(-3)));
        assert!(!values_equal(&json!(u64::MAX), &json!(-1)));
    }

    #[test]
    fn test_values_equal_containers() {
        assert!(values_equal(&json!([1, "a"]), &json!([1.0, "a"])));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(values_equal(&json!({"a": 1, "b": [true]}), &json!({"b": [true], "a": 1})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_query_builders() {
        let q: Query<Flag> = Query::id("abc");
        match q {
            Query::Pattern(p) => assert_eq!(p, doc(json!({"id": "abc"}))),
            other => panic!("Expected pattern, got {:?}", other),
        }

        let q: Query<Flag> = Query::all().and("active", true).and("name", "x");
        match q {
            Query::Pattern(p) => assert_eq!(p, doc(json!({"active": true, "name": "x"}))),
            other => panic!("Expected pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_query_try_from_value() {
        assert!(matches!(Query::<Flag>::try_from(json!(null)).unwrap(), Query::All));
        assert!(matches!(Query::<Flag>::try_from(json!({"a": 1})).unwrap(), Query::Pattern(_)));
        let err = Query::<Flag>::try_from(json!([1])).unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery(_)));
    }

    #[test]
    fn test_predicate_matcher_decodes_record() {
        let matcher = Query::<Flag>::predicate(|r| r.data.active).into_matcher();
        assert!(matcher(&stored("1", true)).unwrap());
        assert!(!matcher(&stored("2", false)).unwrap());
    }

    #[test]
    fn test_predicate_matcher_errors_on_undecodable_document() {
        let matcher = Query::<Flag>::predicate(|_| true).into_matcher();
        let err = matcher(&doc(json!({"id": "1", "active": "yes"}))).unwrap_err();
        assert!(matches!(err, DbError::Serialization(_)));
    }

    #[test]
    fn test_predicate_and_field() {
        let matcher = Query::<Flag>::predicate(|r| r.data.active).and("id", "1").into_matcher();
        assert!(matcher(&stored("1", true)).unwrap());
        assert!(!matcher(&stored("2", true)).unwrap());
        assert!(!matcher(&stored("1", false)).unwrap());
    }

    #[test]
    fn test_predicate_and_matches_undeclared_stored_field() {
        let mut admin = stored("1", true);
        admin.insert("role".to_string(), json!("admin"));

        let matcher = Query::<Flag>::predicate(|_| true).and("role", "admin").into_matcher();
        assert!(matcher(&admin).unwrap());
        assert!(!matcher(&stored("2", true)).unwrap());
    }

    #[test]
    fn test_predicate_and_propagates_decode_errors() {
        let matcher = Query::<Flag>::predicate(|_| true).and("id", "1").into_matcher();
        let err = matcher(&doc(json!({"id": "1", "active": "yes"}))).unwrap_err();
        assert!(matches!(err, DbError::Serialization(_)));

        // Rejected by the pattern before decoding
        assert!(!matcher(&doc(json!({"id": "2", "active": "yes"}))).unwrap());
    }

    proptest! {
        #[test]
        fn prop_document_matches_any_subset_of_itself(
            fields in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8),
            keep in prop::collection::vec(any::<bool>(), 8),
        ) {
            let record: Document = fields.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let pattern: Document = record
                .iter()
                .zip(keep.iter())
                .filter(|(_, keep)| **keep)
                .map(|((k, v), _)| (k.clone(), v.clone()))
                .collect();
            prop_assert!(matches_pattern(&pattern, &record));
        }

        #[test]
        fn prop_changed_value_never_matches(key in "[a-z]{1,6}", a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let record: Document = [(key.clone(), json!(a))].into_iter().collect();
            let pattern: Document = [(key, json!(b))].into_iter().collect();
            prop_assert!(!matches_pattern(&pattern, &record));
        }
    }
}
