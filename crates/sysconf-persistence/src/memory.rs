//! ---
//! scs_section: "03-persistence-logging"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Persistence abstractions and storage bindings."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::datastore::{Datastore, Filter, Record, WriteOptions, ID_FIELD};
use crate::{PersistenceError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, Record>,
}

/// Plain table collection shared by the in-memory and file-backed stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    tables: BTreeMap<String, Table>,
}

impl Tables {
    /// Fetch a row by id.
    pub fn get(&self, table: &str, id: u64) -> Result<Record> {
        self.tables
            .get(table)
            .and_then(|t| t.rows.get(&id))
            .cloned()
            .ok_or_else(|| PersistenceError::RecordNotFound {
                table: table.to_owned(),
                id,
            })
    }

    /// Rows matching every filter, ordered by id.
    pub fn query(&self, table: &str, filters: &[Filter]) -> Vec<Record> {
        let Some(t) = self.tables.get(table) else {
            return Vec::new();
        };
        t.rows
            .values()
            .filter(|row| filters.iter().all(|filter| filter.matches(row)))
            .cloned()
            .collect()
    }

    /// Insert a row, assigning the next id for the table.
    pub fn insert(&mut self, table: &str, record: Record, options: &WriteOptions) -> u64 {
        let t = self.tables.entry(table.to_owned()).or_default();
        t.next_id += 1;
        let id = t.next_id;
        let mut row = options.apply(record);
        row.insert(ID_FIELD.to_owned(), Value::from(id));
        t.rows.insert(id, row);
        debug!(table, id, "record inserted");
        id
    }

    /// Merge the given columns into an existing row.
    pub fn update(
        &mut self,
        table: &str,
        id: u64,
        record: Record,
        options: &WriteOptions,
    ) -> Result<Record> {
        let row = self
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| PersistenceError::RecordNotFound {
                table: table.to_owned(),
                id,
            })?;
        for (key, value) in options.apply(record) {
            if key != ID_FIELD {
                row.insert(key, value);
            }
        }
        debug!(table, id, "record updated");
        Ok(row.clone())
    }
}

/// Volatile datastore used for tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    tables: RwLock<Tables>,
}

impl MemoryDatastore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, table: &str, id: u64) -> Result<Record> {
        self.tables.read().get(table, id)
    }

    fn query(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        Ok(self.tables.read().query(table, filters))
    }

    fn insert(&self, table: &str, record: Record, options: &WriteOptions) -> Result<u64> {
        Ok(self.tables.write().insert(table, record, options))
    }

    fn update(
        &self,
        table: &str,
        id: u64,
        record: Record,
        options: &WriteOptions,
    ) -> Result<Record> {
        self.tables.write().update(table, id, record, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_assigns_sequential_ids_per_table() {
        let store = MemoryDatastore::new();
        let options = WriteOptions::default();
        assert_eq!(store.insert("a", record(json!({"x": 1})), &options).unwrap(), 1);
        assert_eq!(store.insert("a", record(json!({"x": 2})), &options).unwrap(), 2);
        assert_eq!(store.insert("b", record(json!({"x": 3})), &options).unwrap(), 1);
        assert_eq!(store.get("a", 2).unwrap()["x"], json!(2));
    }

    #[test]
    fn update_merges_columns_and_keeps_id() {
        let store = MemoryDatastore::new();
        let options = WriteOptions::with_prefix("stg_");
        let id = store
            .insert("system.settings", record(json!({"guiport": 80, "language": "en"})), &options)
            .unwrap();
        let stored = store
            .update(
                "system.settings",
                id,
                record(json!({"id": 99, "guiport": 8080})),
                &options,
            )
            .unwrap();
        assert_eq!(stored["id"], json!(id));
        assert_eq!(stored["stg_guiport"], json!(8080));
        assert_eq!(stored["stg_language"], json!("en"));
    }

    #[test]
    fn update_missing_row_fails() {
        let store = MemoryDatastore::new();
        let err = store
            .update("system.settings", 1, Record::new(), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, PersistenceError::RecordNotFound { id: 1, .. }));
    }

    #[test]
    fn query_filters_rows_and_tolerates_unknown_tables() {
        let store = MemoryDatastore::new();
        let options = WriteOptions::default();
        store.insert("system.certificate", record(json!({"cert_name": "a"})), &options).unwrap();
        store.insert("system.certificate", record(json!({"cert_name": "b"})), &options).unwrap();

        let hits = store
            .query("system.certificate", &[Filter::eq("id", 2)])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["cert_name"], json!("b"));
        assert!(store.query("nope", &[]).unwrap().is_empty());
    }
}
