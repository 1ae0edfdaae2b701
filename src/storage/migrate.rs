use super::{
    data_key, save_json, KvStore, ID_COUNTER_KEY, LAST_ACTIVE_KEY, LEGACY_DATA_KEY, META_KEY,
    MIGRATED_V3_KEY, MIGRATED_V4_KEY,
};
use crate::config::DEFAULT_MAP_NAME;
use crate::error::WorkspaceResult;
use crate::models::{MapDocument, MapMeta};
use crate::util::now_timestamp;
use serde_json::Value;
use tracing::{info, warn};

const APPLIED: &str = "1";

/// A one-time layout upgrade, applied once and remembered through `flag`.
pub(crate) struct Migration {
    pub version: u32,
    pub flag: &'static str,
    pub apply: fn(&mut dyn KvStore) -> WorkspaceResult<()>,
}

/// Ordered by version; new steps go at the end.
pub(crate) static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 3,
        flag: MIGRATED_V3_KEY,
        apply: import_legacy_document,
    },
    Migration {
        version: 4,
        flag: MIGRATED_V4_KEY,
        apply: backfill_hierarchy,
    },
];

/// Apply every migration whose flag is not set yet. Returns the versions applied.
pub(crate) fn run(store: &mut dyn KvStore) -> WorkspaceResult<Vec<u32>> {
    let mut applied = vec![];
    for m in MIGRATIONS {
        if store.get_item(m.flag).as_deref() == Some(APPLIED) {
            continue;
        }
        (m.apply)(store)?;
        store.set_item(m.flag, APPLIED)?;
        info!(version = m.version, "applied storage migration");
        applied.push(m.version);
    }
    Ok(applied)
}

/// v3: the single-document layout (`mindmap-data`) becomes map 1.
fn import_legacy_document(store: &mut dyn KvStore) -> WorkspaceResult<()> {
    if store.get_item(META_KEY).is_some() {
        return Ok(());
    }
    let Some(json) = store.get_item(LEGACY_DATA_KEY) else {
        return Ok(());
    };
    let doc: MapDocument = match serde_json::from_str(&json) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "legacy document is unreadable; leaving it in place");
            return Ok(());
        }
    };

    let mut meta = MapMeta::new(1, DEFAULT_MAP_NAME, None, 0.0);
    meta.updated_at = now_timestamp();

    save_json(store, &data_key(1), &doc)?;
    save_json(store, META_KEY, &vec![meta])?;
    store.set_item(ID_COUNTER_KEY, "1")?;
    store.set_item(LAST_ACTIVE_KEY, "1")?;
    store.remove_item(LEGACY_DATA_KEY);
    Ok(())
}

/// v4: every registry entry gets `parentId` (null) and a numeric `order`.
fn backfill_hierarchy(store: &mut dyn KvStore) -> WorkspaceResult<()> {
    let Some(json) = store.get_item(META_KEY) else {
        return Ok(());
    };
    let entries: Vec<Value> = match serde_json::from_str(&json) {
        Ok(v) => v,
        Err(e) => {
            // The controller's corrupt-state recovery rewrites the registry.
            warn!(error = %e, "registry is unreadable; skipping hierarchy backfill");
            return Ok(());
        }
    };
    let (entries, changed) = backfill_entries(entries);
    if changed {
        save_json(store, META_KEY, &entries)?;
    }
    Ok(())
}

pub(crate) fn backfill_entries(mut entries: Vec<Value>) -> (Vec<Value>, bool) {
    let mut changed = false;
    for (i, entry) in entries.iter_mut().enumerate() {
        let Some(obj) = entry.as_object_mut() else {
            continue;
        };
        if !obj.contains_key("parentId") {
            obj.insert("parentId".to_string(), Value::Null);
            changed = true;
        }
        if !obj.get("order").is_some_and(Value::is_number) {
            obj.insert("order".to_string(), Value::from(i as u64));
            changed = true;
        }
    }
    (entries, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_backfill_entries_only_fills_missing_fields() {
        let entries = vec![
            json!({"id": 1, "name": "a"}),
            json!({"id": 2, "name": "b", "parentId": 1, "order": 5}),
            json!({"id": 3, "name": "c", "order": "x"}),
        ];
        let (out, changed) = backfill_entries(entries);
        assert!(changed);
        assert_eq!(out[0]["parentId"], Value::Null);
        assert_eq!(out[0]["order"], 0);
        assert_eq!(out[1]["parentId"], 1);
        assert_eq!(out[1]["order"], 5);
        assert_eq!(out[2]["order"], 2);

        let (_, again) = backfill_entries(out);
        assert!(!again);
    }

    #[test]
    fn test_run_sets_flags_and_is_idempotent() {
        let mut store = MemoryStore::default();
        store
            .set_item(META_KEY, r#"[{"id":1,"name":"old"}]"#)
            .expect("set");

        let applied = run(&mut store).expect("migrate");
        assert_eq!(applied, [3, 4]);
        assert_eq!(store.get_item(MIGRATED_V4_KEY).as_deref(), Some("1"));
        let meta: Vec<Value> =
            serde_json::from_str(&store.get_item(META_KEY).expect("meta")).expect("json");
        assert!(meta[0]["parentId"].is_null());
        assert_eq!(meta[0]["order"], 0);

        // Entries written after the flag is set are not touched again.
        store
            .set_item(META_KEY, r#"[{"id":1,"name":"later"}]"#)
            .expect("set");
        assert!(run(&mut store).expect("migrate").is_empty());
        assert_eq!(
            store.get_item(META_KEY).as_deref(),
            Some(r#"[{"id":1,"name":"later"}]"#)
        );
    }

    #[test]
    fn test_legacy_document_is_imported_as_first_map() {
        let mut store = MemoryStore::default();
        store
            .set_item(
                LEGACY_DATA_KEY,
                r#"{"root":{"id":"root","text":"old","children":[]}}"#,
            )
            .expect("set");

        run(&mut store).expect("migrate");
        assert!(store.get_item(LEGACY_DATA_KEY).is_none());
        assert_eq!(store.get_item(ID_COUNTER_KEY).as_deref(), Some("1"));
        let doc: MapDocument =
            serde_json::from_str(&store.get_item(&data_key(1)).expect("data")).expect("json");
        assert_eq!(doc.root.text, "old");
        let meta: Vec<MapMeta> =
            serde_json::from_str(&store.get_item(META_KEY).expect("meta")).expect("json");
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].parent_id, None);
    }

    #[test]
    fn test_corrupt_registry_is_left_alone() {
        let mut store = MemoryStore::default();
        store.set_item(META_KEY, "{oops").expect("set");
        run(&mut store).expect("migrate");
        assert_eq!(store.get_item(META_KEY).as_deref(), Some("{oops"));
    }
}
