//! ---
//! scs_section: "03-persistence-logging"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Persistence abstractions and storage bindings."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::datastore::{Datastore, Filter, Record, WriteOptions};
use crate::memory::Tables;
use crate::{PersistenceError, Result};

/// Current store envelope version.
pub const STORE_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreEnvelope {
    version: u16,
    written_at: DateTime<Utc>,
    hash: String,
    tables: Tables,
}

/// Datastore persisted as a single JSON document.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename. The document carries a SHA-256 hash of its tables so that a
/// hand-edited or truncated file is refused on open.
#[derive(Debug)]
pub struct JsonFileDatastore {
    path: PathBuf,
    tables: RwLock<Tables>,
}

impl JsonFileDatastore {
    /// Open the store at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let tables = load_tables(&path)?;
            info!(path = %path.display(), "datastore loaded");
            tables
        } else {
            info!(path = %path.display(), "datastore file missing; starting empty");
            Tables::default()
        };
        Ok(Self {
            path,
            tables: RwLock::new(tables),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.write();
        let mut next = tables.clone();
        let out = op(&mut next)?;
        save_tables(&next, &self.path)?;
        *tables = next;
        Ok(out)
    }
}

impl Datastore for JsonFileDatastore {
    fn get(&self, table: &str, id: u64) -> Result<Record> {
        self.tables.read().get(table, id)
    }

    fn query(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        Ok(self.tables.read().query(table, filters))
    }

    fn insert(&self, table: &str, record: Record, options: &WriteOptions) -> Result<u64> {
        self.mutate(|tables| Ok(tables.insert(table, record, options)))
    }

    fn update(
        &self,
        table: &str,
        id: u64,
        record: Record,
        options: &WriteOptions,
    ) -> Result<Record> {
        self.mutate(|tables| tables.update(table, id, record, options))
    }
}

fn save_tables(tables: &Tables, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let envelope = StoreEnvelope {
        version: STORE_VERSION,
        written_at: Utc::now(),
        hash: compute_hash(tables)?,
        tables: tables.clone(),
    };

    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, &envelope)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "datastore persisted");
    Ok(())
}

fn load_tables(path: &Path) -> Result<Tables> {
    let bytes = fs::read(path)?;
    let envelope: StoreEnvelope = serde_json::from_slice(&bytes)?;
    if envelope.version != STORE_VERSION {
        return Err(PersistenceError::UnsupportedVersion(envelope.version));
    }
    let expected = compute_hash(&envelope.tables)?;
    if envelope.hash != expected {
        return Err(PersistenceError::HashMismatch);
    }
    Ok(envelope.tables)
}

/// Verify the integrity of a store file without opening it.
pub fn verify_store(path: &Path) -> bool {
    load_tables(path).is_ok()
}

fn compute_hash(tables: &Tables) -> Result<String> {
    let serialized = serde_json::to_vec(tables)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileDatastore::open(&path).unwrap();
        let id = store
            .insert(
                "system.settings",
                record(json!({"timezone": "UTC"})),
                &WriteOptions::with_prefix("stg_"),
            )
            .unwrap();
        drop(store);

        assert!(verify_store(&path));
        let reopened = JsonFileDatastore::open(&path).unwrap();
        let row = reopened.get("system.settings", id).unwrap();
        assert_eq!(row["stg_timezone"], json!("UTC"));
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileDatastore::open(&path).unwrap();
        assert!(store
            .update("system.settings", 4, Record::new(), &WriteOptions::default())
            .is_err());
        assert!(!path.exists());
    }

    #[test]
    fn open_rejects_tampered_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileDatastore::open(&path).unwrap();
        store
            .insert("system.certificate", record(json!({"cert_name": "gui"})), &WriteOptions::default())
            .unwrap();
        drop(store);

        let mut envelope: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        envelope["tables"]["tables"]["system.certificate"]["rows"]["1"]["cert_name"] =
            json!("evil");
        fs::write(&path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        assert!(!verify_store(&path));
        assert!(matches!(
            JsonFileDatastore::open(&path),
            Err(PersistenceError::HashMismatch)
        ));
    }
}
