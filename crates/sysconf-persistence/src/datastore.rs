//! ---
//! scs_section: "03-persistence-logging"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Persistence abstractions and storage bindings."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use serde_json::{Map, Value};

use crate::Result;

/// A single row: a flat JSON object. The `id` key is owned by the store.
pub type Record = Map<String, Value>;

/// Column holding the row identifier. It is never prefixed.
pub const ID_FIELD: &str = "id";

/// Row predicate used by [`Datastore::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the given value.
    Eq(String, Value),
}

impl Filter {
    /// Convenience constructor for an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// Whether the record satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq(field, expected) => record.get(field) == Some(expected),
        }
    }
}

/// Options applied when writing rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Column prefix prepended to every key except `id` (e.g. `stg_`).
    pub prefix: Option<String>,
}

impl WriteOptions {
    /// Options writing columns with the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Apply the configured prefix to all non-id keys of a record.
    pub fn apply(&self, record: Record) -> Record {
        let Some(prefix) = self.prefix.as_deref() else {
            return record;
        };
        record
            .into_iter()
            .map(|(key, value)| {
                if key == ID_FIELD || key.starts_with(prefix) {
                    (key, value)
                } else {
                    (format!("{prefix}{key}"), value)
                }
            })
            .collect()
    }
}

/// Strip a column prefix from every key that carries it.
pub fn strip_prefix(record: Record, prefix: &str) -> Record {
    record
        .into_iter()
        .map(|(key, value)| match key.strip_prefix(prefix) {
            Some(stripped) => (stripped.to_owned(), value),
            None => (key, value),
        })
        .collect()
}

/// Table-oriented record store.
///
/// Implementations must be safe to share between threads; no transaction or
/// compare-and-swap primitive is offered, so concurrent writers race and the
/// last write wins.
pub trait Datastore: Send + Sync {
    /// Fetch a row by id.
    fn get(&self, table: &str, id: u64) -> Result<Record>;
    /// Return every row matching all filters, ordered by id. Unknown tables are empty.
    fn query(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>>;
    /// Insert a new row and return the assigned id.
    fn insert(&self, table: &str, record: Record, options: &WriteOptions) -> Result<u64>;
    /// Overwrite the columns present in `record` on an existing row and return the stored row.
    fn update(&self, table: &str, id: u64, record: Record, options: &WriteOptions)
        -> Result<Record>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn prefix_skips_id_and_already_prefixed_keys() {
        let options = WriteOptions::with_prefix("stg_");
        let prefixed = options.apply(record(json!({"id": 1, "timezone": "UTC", "stg_kbdmap": "us"})));
        assert_eq!(
            Value::Object(prefixed),
            json!({"id": 1, "stg_timezone": "UTC", "stg_kbdmap": "us"})
        );
    }

    #[test]
    fn strip_prefix_restores_plain_keys() {
        let stripped = strip_prefix(record(json!({"id": 1, "stg_timezone": "UTC"})), "stg_");
        assert_eq!(Value::Object(stripped), json!({"id": 1, "timezone": "UTC"}));
    }

    #[test]
    fn eq_filter_compares_json_values() {
        let row = record(json!({"id": 7, "cert_name": "gui"}));
        assert!(Filter::eq("id", 7).matches(&row));
        assert!(!Filter::eq("id", 8).matches(&row));
        assert!(!Filter::eq("missing", 7).matches(&row));
    }
}
