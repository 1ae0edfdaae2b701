mod gateway;
mod local;
mod memory;
pub(crate) mod migrate;

use crate::error::{WorkspaceError, WorkspaceResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use gateway::Gateway;
pub use local::LocalStore;
pub use memory::MemoryStore;

pub(crate) const META_KEY: &str = "mindmap-meta";
pub(crate) const ID_COUNTER_KEY: &str = "mindmap-id-counter";
pub(crate) const LAST_ACTIVE_KEY: &str = "mindmap-last-active-id";
pub(crate) const SORT_MODE_KEY: &str = "mindmap-sort-mode";
pub(crate) const COLLAPSE_STATE_KEY: &str = "mindmap-collapse-state";
pub(crate) const COPY_FORMAT_KEY: &str = "mindmap-copy-format";
pub(crate) const COPY_BORDER_KEY: &str = "mindmap-copy-border";
pub(crate) const SIDEBAR_WIDTH_KEY: &str = "mindmap_left_sidebar_width";

// One-time layout migrations.
pub(crate) const LEGACY_DATA_KEY: &str = "mindmap-data";
pub(crate) const MIGRATED_V3_KEY: &str = "mindmap-migrated-v3";
pub(crate) const MIGRATED_V4_KEY: &str = "mindmap-migrated-v4";

pub(crate) fn data_key(map_id: u32) -> String {
    format!("mindmap-data-{map_id}")
}

/// Synchronous string key/value store (`localStorage` in the browser).
pub trait KvStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> WorkspaceResult<()>;
    fn remove_item(&mut self, key: &str);
}

/// Missing key -> `Ok(None)`; present but unparseable -> `CorruptState`.
pub(crate) fn load_json<T: for<'de> Deserialize<'de>>(
    store: &dyn KvStore,
    key: &str,
) -> WorkspaceResult<Option<T>> {
    let Some(json) = store.get_item(key) else {
        return Ok(None);
    };
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| WorkspaceError::CorruptState {
            key: key.to_string(),
            source,
        })
}

/// Like [`load_json`], but a corrupt value is logged and treated as absent.
pub(crate) fn load_json_lenient<T: for<'de> Deserialize<'de>>(
    store: &dyn KvStore,
    key: &str,
) -> Option<T> {
    match load_json(store, key) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable stored value");
            None
        }
    }
}

pub(crate) fn save_json<T: Serialize>(
    store: &mut dyn KvStore,
    key: &str,
    value: &T,
) -> WorkspaceResult<()> {
    let json = serde_json::to_string(value).map_err(|e| WorkspaceError::Storage {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.set_item(key, &json)
}

pub(crate) fn load_parsed<T: std::str::FromStr>(store: &dyn KvStore, key: &str) -> Option<T> {
    store.get_item(key).and_then(|v| v.trim().parse().ok())
}
