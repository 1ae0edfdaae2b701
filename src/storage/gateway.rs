use super::{
    data_key, load_json, load_json_lenient, load_parsed, migrate, save_json, KvStore,
    COLLAPSE_STATE_KEY, COPY_BORDER_KEY, COPY_FORMAT_KEY, ID_COUNTER_KEY, LAST_ACTIVE_KEY,
    META_KEY, SIDEBAR_WIDTH_KEY, SORT_MODE_KEY,
};
use crate::error::WorkspaceResult;
use crate::models::{CollapseState, CopyBorder, CopyFormat, MapDocument, MapMeta, SortMode};
use crate::registry::MapRegistry;
use serde_json::Value;
use tracing::{debug, warn};

/// Typed access to the persisted workspace layout.
pub struct Gateway<S: KvStore> {
    store: S,
}

impl<S: KvStore> Gateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn migrate(&mut self) -> WorkspaceResult<Vec<u32>> {
        migrate::run(&mut self.store)
    }

    /// `Ok(None)` when nothing has been saved yet, `CorruptState` when the
    /// stored value is not a JSON array.
    ///
    /// Entries are salvaged one at a time: wrong-typed fields are repaired,
    /// entries without a usable id (or repeating an earlier id) are dropped.
    pub fn load_registry(&self) -> WorkspaceResult<Option<MapRegistry>> {
        let Some(entries) = load_json::<Vec<Value>>(&self.store, META_KEY)? else {
            return Ok(None);
        };
        let mut maps: Vec<MapMeta> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match MapMeta::from_stored(i, entry) {
                Some(meta) if maps.iter().all(|m| m.id != meta.id) => maps.push(meta),
                Some(meta) => warn!(id = meta.id, "dropping registry entry with repeated id"),
                None => warn!(index = i, "dropping registry entry without a usable id"),
            }
        }
        let counter = load_parsed::<u32>(&self.store, ID_COUNTER_KEY).unwrap_or(0);
        Ok(Some(MapRegistry::new(maps, counter)))
    }

    pub fn save_registry(&mut self, registry: &MapRegistry) -> WorkspaceResult<()> {
        save_json(&mut self.store, META_KEY, &registry.maps())?;
        self.store
            .set_item(ID_COUNTER_KEY, &registry.counter().to_string())?;
        debug!(maps = registry.len(), counter = registry.counter(), "saved registry");
        Ok(())
    }

    pub fn load_document(&self, map_id: u32) -> WorkspaceResult<Option<MapDocument>> {
        load_json(&self.store, &data_key(map_id))
    }

    pub fn save_document(&mut self, map_id: u32, doc: &MapDocument) -> WorkspaceResult<()> {
        save_json(&mut self.store, &data_key(map_id), doc)
    }

    pub fn remove_document(&mut self, map_id: u32) {
        self.store.remove_item(&data_key(map_id));
    }

    pub fn last_active_id(&self) -> Option<u32> {
        load_parsed(&self.store, LAST_ACTIVE_KEY)
    }

    pub fn set_last_active_id(&mut self, map_id: u32) -> WorkspaceResult<()> {
        self.store.set_item(LAST_ACTIVE_KEY, &map_id.to_string())
    }

    pub fn sort_mode(&self) -> SortMode {
        load_parsed(&self.store, SORT_MODE_KEY).unwrap_or_default()
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) -> WorkspaceResult<()> {
        self.store.set_item(SORT_MODE_KEY, mode.as_ref())
    }

    pub fn collapse_state(&self) -> CollapseState {
        load_json_lenient(&self.store, COLLAPSE_STATE_KEY).unwrap_or_default()
    }

    pub fn save_collapse_state(&mut self, state: &CollapseState) -> WorkspaceResult<()> {
        save_json(&mut self.store, COLLAPSE_STATE_KEY, state)
    }

    pub fn copy_format(&self) -> CopyFormat {
        load_parsed(&self.store, COPY_FORMAT_KEY).unwrap_or_default()
    }

    pub fn set_copy_format(&mut self, format: CopyFormat) -> WorkspaceResult<()> {
        self.store.set_item(COPY_FORMAT_KEY, format.as_ref())
    }

    pub fn copy_border(&self) -> CopyBorder {
        load_parsed(&self.store, COPY_BORDER_KEY).unwrap_or_default()
    }

    pub fn set_copy_border(&mut self, border: CopyBorder) -> WorkspaceResult<()> {
        self.store.set_item(COPY_BORDER_KEY, border.as_ref())
    }

    pub fn sidebar_width(&self) -> Option<u32> {
        load_parsed::<f64>(&self.store, SIDEBAR_WIDTH_KEY)
            .filter(|w| w.is_finite() && *w > 0.0)
            .map(|w| w.round() as u32)
    }

    pub fn set_sidebar_width(&mut self, width: u32) -> WorkspaceResult<()> {
        self.store.set_item(SIDEBAR_WIDTH_KEY, &width.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_registry_roundtrip_with_counter() {
        let mut gw = Gateway::new(MemoryStore::default());
        assert!(gw.load_registry().expect("load").is_none());

        let mut reg = MapRegistry::new(vec![], 0);
        reg.create("A", None).expect("create");
        reg.create("B", None).expect("create");
        gw.save_registry(&reg).expect("save");

        assert_eq!(gw.store().get_item(ID_COUNTER_KEY).as_deref(), Some("2"));
        let loaded = gw.load_registry().expect("load").expect("present");
        assert_eq!(loaded, reg);
    }

    #[test]
    fn test_corrupt_registry_is_reported() {
        let mut gw = Gateway::new(MemoryStore::default());
        gw.store_mut().set_item(META_KEY, "not json").expect("set");
        let err = gw.load_registry().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptState);
    }

    #[test]
    fn test_wrong_typed_entries_are_salvaged() {
        let mut gw = Gateway::new(MemoryStore::default());
        gw.store_mut()
            .set_item(
                META_KEY,
                r#"[{"id":1,"name":"A","order":0},{"id":2,"name":"B","order":null},
                    {"id":"3","name":"C","order":2},{"name":"no id"},{"id":1,"name":"again"}]"#,
            )
            .expect("set");

        let reg = gw.load_registry().expect("array parses").expect("present");
        let ids: Vec<u32> = reg.maps().iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(reg.get(2).map(|m| m.order), Some(1.0));
        assert_eq!(reg.get(1).map(|m| m.name.as_str()), Some("A"));
        assert_eq!(reg.counter(), 3);
    }

    #[test]
    fn test_non_array_registry_is_corrupt() {
        let mut gw = Gateway::new(MemoryStore::default());
        gw.store_mut().set_item(META_KEY, r#"{"id":1}"#).expect("set");
        let err = gw.load_registry().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptState);
    }

    #[test]
    fn test_settings_defaults_and_persistence() {
        let mut gw = Gateway::new(MemoryStore::default());
        assert_eq!(gw.sort_mode(), SortMode::None);
        assert_eq!(gw.copy_format(), CopyFormat::Simple);
        assert_eq!(gw.copy_border(), CopyBorder::Border);
        assert_eq!(gw.sidebar_width(), None);

        gw.set_sort_mode(SortMode::Alpha).expect("set");
        gw.set_copy_format(CopyFormat::Family).expect("set");
        gw.set_copy_border(CopyBorder::None).expect("set");
        gw.set_sidebar_width(300).expect("set");

        assert_eq!(gw.store().get_item(SORT_MODE_KEY).as_deref(), Some("alpha"));
        assert_eq!(gw.sort_mode(), SortMode::Alpha);
        assert_eq!(gw.copy_format(), CopyFormat::Family);
        assert_eq!(gw.copy_border(), CopyBorder::None);
        assert_eq!(gw.sidebar_width(), Some(300));
    }

    #[test]
    fn test_collapse_state_uses_string_keys() {
        let mut gw = Gateway::new(MemoryStore::default());
        let mut state = CollapseState::new();
        state.insert(3, true);
        gw.save_collapse_state(&state).expect("save");
        assert_eq!(
            gw.store().get_item(COLLAPSE_STATE_KEY).as_deref(),
            Some(r#"{"3":true}"#)
        );
        assert_eq!(gw.collapse_state(), state);
    }

    #[test]
    fn test_unknown_setting_values_fall_back() {
        let mut gw = Gateway::new(MemoryStore::default());
        gw.store_mut().set_item(SORT_MODE_KEY, "shuffled").expect("set");
        gw.store_mut().set_item(COLLAPSE_STATE_KEY, "[").expect("set");
        assert_eq!(gw.sort_mode(), SortMode::None);
        assert!(gw.collapse_state().is_empty());
    }
}
