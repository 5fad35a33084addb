//! ---
//! scs_section: "03-persistence-logging"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Persistence abstractions and storage bindings."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::sync::Arc;

use serde_json::json;
use sysconf_persistence::{
    Datastore, Filter, JsonFileDatastore, MemoryDatastore, Record, WriteOptions,
};
use tempfile::tempdir;

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn exercise(store: Arc<dyn Datastore>) {
    let prefix = WriteOptions::with_prefix("stg_");
    let id = store
        .insert(
            "system.settings",
            record(json!({"guiport": 80, "timezone": "UTC"})),
            &prefix,
        )
        .unwrap();

    store
        .update(
            "system.settings",
            id,
            record(json!({"guiport": 8080})),
            &prefix,
        )
        .unwrap();

    let row = store.get("system.settings", id).unwrap();
    assert_eq!(row["stg_guiport"], json!(8080));
    assert_eq!(row["stg_timezone"], json!("UTC"));

    let all = store.query("system.settings", &[]).unwrap();
    assert_eq!(all.len(), 1);
    assert!(store
        .query("system.settings", &[Filter::eq("id", id + 1)])
        .unwrap()
        .is_empty());
}

#[test]
fn memory_store_round_trips_prefixed_rows() {
    exercise(Arc::new(MemoryDatastore::new()));
}

#[test]
fn json_store_round_trips_prefixed_rows() {
    let dir = tempdir().unwrap();
    let store = JsonFileDatastore::open(dir.path().join("store.json")).unwrap();
    exercise(Arc::new(store));
}

#[test]
fn concurrent_updates_last_writer_wins() {
    let store = Arc::new(MemoryDatastore::new());
    let id = store
        .insert("system.settings", record(json!({"guiport": 80})), &WriteOptions::default())
        .unwrap();

    std::thread::scope(|scope| {
        for port in [81u16, 82, 83, 84] {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                store
                    .update(
                        "system.settings",
                        id,
                        record(json!({"guiport": port})),
                        &WriteOptions::default(),
                    )
                    .unwrap();
            });
        }
    });

    let port = store.get("system.settings", id).unwrap()["guiport"]
        .as_u64()
        .unwrap();
    assert!((81..=84).contains(&port));
}
