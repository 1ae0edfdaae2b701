mod address;

use crate::config::WorkspaceConfig;
use crate::editor::{action_for_key, KeyAction, MindTree};
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::models::{
    CollapseState, CopyBorder, CopyFormat, Direction, MapDocument, MapMeta, SortMode, ROOT_ID,
};
use crate::preview::{render, Rendered};
use crate::registry::{MapRegistry, SidebarItem};
use crate::storage::{Gateway, KvStore};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use address::{id_param, with_id_param, AddressBar, MemoryAddressBar};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    pub sort_mode: SortMode,
    pub copy_format: CopyFormat,
    pub copy_border: CopyBorder,
    pub sidebar_width: u32,
}

/// Everything the UI needs to redraw both sidebars.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceView {
    pub current_map_id: u32,
    pub maps: Vec<SidebarItem>,
    pub preview: Rendered,
    pub selection: Vec<String>,
    pub settings: ViewSettings,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", content = "nodeId", rename_all = "camelCase")]
pub enum KeyOutcome {
    /// Not a tree key, or the keyboard belongs to an open input.
    Ignored,
    Selected(String),
    Editing(String),
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct NodeEdit {
    node_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct MapRename {
    map_id: u32,
    original: String,
}

/// Owns the active map and every piece of process-wide UI state; the single
/// entry point for the UI layer.
pub struct Workspace<S: KvStore, A: AddressBar> {
    gateway: Gateway<S>,
    address: A,
    config: WorkspaceConfig,
    /// Last registry read from the store.
    registry: MapRegistry,
    active_id: u32,
    tree: MindTree,
    settings: ViewSettings,
    collapse: CollapseState,
    editing: Option<NodeEdit>,
    renaming: Option<MapRename>,
}

impl<S: KvStore, A: AddressBar> Workspace<S, A> {
    /// Load (or seed) the workspace and resolve the initial map:
    /// URL `id` parameter, then the last active map, then the first listed map.
    pub fn open(store: S, address: A, config: WorkspaceConfig) -> WorkspaceResult<Self> {
        let mut gateway = Gateway::new(store);
        if let Err(e) = gateway.migrate() {
            warn!(error = %e, "storage migration failed; continuing with current layout");
        }

        let registry = match gateway.load_registry() {
            Ok(Some(reg)) if !reg.is_empty() => reg,
            Ok(_) => {
                info!("no maps stored; seeding a fresh workspace");
                seed_registry(&mut gateway, &config)?
            }
            Err(e) => {
                warn!(error = %e, "map registry is corrupt; starting a fresh workspace");
                seed_registry(&mut gateway, &config)?
            }
        };

        let settings = ViewSettings {
            sort_mode: gateway.sort_mode(),
            copy_format: gateway.copy_format(),
            copy_border: gateway.copy_border(),
            sidebar_width: config.clamp_sidebar_width(
                gateway.sidebar_width().unwrap_or(config.sidebar_width),
            ),
        };
        let collapse = gateway.collapse_state();

        let exists = |id: &u32| registry.get(*id).is_some();
        let active_id = id_param(&address.search())
            .filter(exists)
            .or_else(|| gateway.last_active_id().filter(exists))
            .or_else(|| registry.first_listed(settings.sort_mode))
            .ok_or_else(|| WorkspaceError::invalid("workspace has no maps"))?;

        let tree = load_tree(&mut gateway, &config, active_id)?;
        let mut ws = Self {
            gateway,
            address,
            config,
            registry,
            active_id,
            tree,
            settings,
            collapse,
            editing: None,
            renaming: None,
        };
        ws.publish_active()?;
        // Persist the width so a fresh workspace records its default.
        ws.gateway.set_sidebar_width(ws.settings.sidebar_width)?;
        info!(map = active_id, "workspace opened");
        Ok(ws)
    }

    // ---- queries -------------------------------------------------------

    pub fn current_map_id(&self) -> u32 {
        self.active_id
    }

    pub fn current_meta(&self) -> Option<&MapMeta> {
        self.registry.get(self.active_id)
    }

    pub fn registry(&self) -> &MapRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &MindTree {
        &self.tree
    }

    /// Edits the tree without the immediate save, leaving it for the next switch.
    #[cfg(test)]
    pub(crate) fn tree_mut(&mut self) -> &mut MindTree {
        &mut self.tree
    }

    pub fn mind_map_data(&self) -> MapDocument {
        self.tree.to_document()
    }

    pub fn preview(&self) -> Rendered {
        render(&self.tree, self.settings.copy_format, self.settings.copy_border)
    }

    /// Clipboard text; identical to the preview text.
    pub fn copy_text(&self) -> String {
        self.preview().text
    }

    pub fn selected_node_ids(&self) -> Vec<String> {
        self.tree.selection().to_vec()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.settings.sort_mode
    }

    pub fn settings(&self) -> ViewSettings {
        self.settings
    }

    pub fn collapse_state(&self) -> &CollapseState {
        &self.collapse
    }

    pub fn map_list(&self) -> Vec<SidebarItem> {
        self.registry
            .sidebar_items(self.settings.sort_mode, &self.collapse, self.active_id)
    }

    pub fn top_level_items(&self) -> Vec<SidebarItem> {
        self.map_list().into_iter().filter(|i| !i.is_child).collect()
    }

    pub fn child_items(&self) -> Vec<SidebarItem> {
        self.map_list().into_iter().filter(|i| i.is_child).collect()
    }

    pub fn view(&self) -> WorkspaceView {
        WorkspaceView {
            current_map_id: self.active_id,
            maps: self.map_list(),
            preview: self.preview(),
            selection: self.selected_node_ids(),
            settings: self.settings,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn is_renaming(&self) -> bool {
        self.renaming.is_some()
    }

    pub fn gateway(&self) -> &Gateway<S> {
        &self.gateway
    }

    pub fn address(&self) -> &A {
        &self.address
    }

    /// Re-read registry and settings from the store (another tab, or the
    /// page itself, may have written them) and return a fresh view.
    pub fn refresh(&mut self) -> WorkspaceResult<WorkspaceView> {
        self.registry = self.read_registry();
        self.settings.sort_mode = self.gateway.sort_mode();
        self.settings.copy_format = self.gateway.copy_format();
        self.settings.copy_border = self.gateway.copy_border();
        self.collapse = self.gateway.collapse_state();

        if self.registry.get(self.active_id).is_none() {
            let next = self.first_listed()?;
            warn!(gone = self.active_id, next, "active map disappeared; switching");
            self.activate(next)?;
        }
        Ok(self.view())
    }

    // ---- map lifecycle -------------------------------------------------

    /// Make `map_id` the active map, saving the outgoing one first.
    pub fn switch_to(&mut self, map_id: u32) -> WorkspaceResult<()> {
        let reg = self.read_registry();
        if reg.get(map_id).is_none() {
            return Err(WorkspaceError::MapNotFound(map_id));
        }
        self.editing = None;
        self.autosave(reg)?;
        if map_id == self.active_id {
            return Ok(());
        }
        debug!(from = self.active_id, to = map_id, "switching map");
        self.activate(map_id)
    }

    /// New top-level map (or a child of `parent_id`), which becomes active.
    pub fn create_new(&mut self, parent_id: Option<u32>) -> WorkspaceResult<u32> {
        let mut reg = self.read_registry();
        let name = match parent_id {
            Some(_) => self.config.child_map_name.clone(),
            None => self.config.new_map_name.clone(),
        };
        let meta = reg.create(&name, parent_id)?;
        self.write_registry(reg)?;
        self.gateway
            .save_document(meta.id, &MapDocument::seeded(&self.config.root_text))?;
        info!(map = meta.id, parent = ?parent_id, "created map");
        self.switch_to(meta.id)?;
        Ok(meta.id)
    }

    /// Child maps hang only under top-level maps.
    pub fn add_child_map(&mut self, parent_id: u32) -> WorkspaceResult<u32> {
        let reg = self.read_registry();
        let parent = reg
            .get(parent_id)
            .ok_or(WorkspaceError::MapNotFound(parent_id))?;
        if parent.is_child() {
            return Err(WorkspaceError::invalid(format!(
                "map {parent_id} is a child map and cannot hold child maps"
            )));
        }
        if self.collapse.remove(&parent_id).is_some() {
            self.gateway.save_collapse_state(&self.collapse)?;
        }
        self.create_new(Some(parent_id))
    }

    /// Copy a map (content included) next to the original. The active map does not change.
    pub fn duplicate(&mut self, map_id: u32) -> WorkspaceResult<u32> {
        let doc = if map_id == self.active_id {
            self.save_tree_if_dirty()?;
            self.tree.to_document()
        } else {
            match self.gateway.load_document(map_id) {
                Ok(Some(doc)) => doc,
                Ok(None) => MapDocument::seeded(&self.config.root_text),
                Err(e) => {
                    warn!(error = %e, map = map_id, "duplicating unreadable content as empty map");
                    MapDocument::seeded(&self.config.root_text)
                }
            }
        };

        let mut reg = self.read_registry();
        let meta = reg.duplicate(map_id, &self.config.copy_suffix)?;
        // Round-trip through the arena so the copy is normalized like any loaded map.
        let doc = MindTree::from_document(&doc).to_document();
        self.gateway.save_document(meta.id, &doc)?;
        self.write_registry(reg)?;
        info!(source = map_id, map = meta.id, "duplicated map");
        Ok(meta.id)
    }

    pub fn rename_map(&mut self, map_id: u32, name: &str) -> WorkspaceResult<()> {
        let mut reg = self.read_registry();
        if reg.rename(map_id, name)? {
            self.write_registry(reg)?;
            debug!(map = map_id, "renamed map");
        }
        Ok(())
    }

    /// Start an inline rename; returns the current name for the input.
    pub fn begin_rename(&mut self, map_id: u32) -> WorkspaceResult<String> {
        let original = self
            .registry
            .get(map_id)
            .ok_or(WorkspaceError::MapNotFound(map_id))?
            .name
            .clone();
        self.renaming = Some(MapRename {
            map_id,
            original: original.clone(),
        });
        Ok(original)
    }

    /// Finish the inline rename. An empty name keeps the previous one.
    pub fn commit_rename(&mut self, name: &str) -> WorkspaceResult<()> {
        let session = self
            .renaming
            .take()
            .ok_or_else(|| WorkspaceError::invalid("no rename in progress"))?;
        self.rename_map(session.map_id, name)
    }

    /// Abandon the inline rename without writing anything. Returns the name
    /// the map keeps.
    pub fn cancel_rename(&mut self) -> Option<String> {
        self.renaming.take().map(|s| s.original)
    }

    /// Delete a map; its child maps move up a level. Deleting the active map
    /// switches to the first remaining one.
    pub fn delete_map(&mut self, map_id: u32) -> WorkspaceResult<()> {
        let mut reg = self.read_registry();
        reg.delete(map_id)?;
        self.write_registry(reg)?;
        self.gateway.remove_document(map_id);
        if self.collapse.remove(&map_id).is_some() {
            self.gateway.save_collapse_state(&self.collapse)?;
        }
        if self.renaming.as_ref().is_some_and(|r| r.map_id == map_id) {
            self.renaming = None;
        }
        info!(map = map_id, "deleted map");

        if map_id == self.active_id {
            self.editing = None;
            let next = self.first_listed()?;
            self.activate(next)?;
        }
        Ok(())
    }

    pub fn reparent_map(&mut self, map_id: u32, parent_id: Option<u32>) -> WorkspaceResult<()> {
        let mut reg = self.read_registry();
        reg.reparent(map_id, parent_id)?;
        self.write_registry(reg)
    }

    pub fn reorder_map(&mut self, map_id: u32, index: usize) -> WorkspaceResult<()> {
        let mut reg = self.read_registry();
        reg.reorder(map_id, index)?;
        self.write_registry(reg)
    }

    // ---- settings ------------------------------------------------------

    pub fn set_sort_mode(&mut self, mode: SortMode) -> WorkspaceResult<()> {
        self.gateway.set_sort_mode(mode)?;
        self.settings.sort_mode = mode;
        Ok(())
    }

    pub fn toggle_sort(&mut self) -> WorkspaceResult<SortMode> {
        let next = self.settings.sort_mode.toggled();
        self.set_sort_mode(next)?;
        Ok(next)
    }

    /// Flip a map's collapse flag; returns whether it is now collapsed.
    pub fn toggle_collapse(&mut self, map_id: u32) -> WorkspaceResult<bool> {
        if self.registry.get(map_id).is_none() {
            return Err(WorkspaceError::MapNotFound(map_id));
        }
        let collapsed = !self.collapse.get(&map_id).copied().unwrap_or(false);
        self.collapse.insert(map_id, collapsed);
        self.gateway.save_collapse_state(&self.collapse)?;
        Ok(collapsed)
    }

    pub fn set_copy_format(&mut self, format: CopyFormat) -> WorkspaceResult<()> {
        self.gateway.set_copy_format(format)?;
        self.settings.copy_format = format;
        Ok(())
    }

    pub fn set_copy_border(&mut self, border: CopyBorder) -> WorkspaceResult<()> {
        self.gateway.set_copy_border(border)?;
        self.settings.copy_border = border;
        Ok(())
    }

    /// Returns the width actually stored after clamping.
    pub fn set_sidebar_width(&mut self, width: u32) -> WorkspaceResult<u32> {
        let width = self.config.clamp_sidebar_width(width);
        self.gateway.set_sidebar_width(width)?;
        self.settings.sidebar_width = width;
        Ok(width)
    }

    // ---- tree edits on the active map ----------------------------------

    pub fn add_child(&mut self, parent_id: &str, text: &str) -> WorkspaceResult<String> {
        let id = self.tree.add_child(parent_id, text)?;
        self.tree.select(&id)?;
        self.persist_tree()?;
        Ok(id)
    }

    pub fn add_sibling(&mut self, node_id: &str, text: &str) -> WorkspaceResult<String> {
        let id = self.tree.add_sibling(node_id, text)?;
        self.tree.select(&id)?;
        self.persist_tree()?;
        Ok(id)
    }

    pub fn rename_node(&mut self, node_id: &str, text: &str) -> WorkspaceResult<()> {
        self.tree.rename(node_id, text)?;
        self.save_tree_if_dirty()
    }

    pub fn delete_node(&mut self, node_id: &str) -> WorkspaceResult<()> {
        self.tree.delete(node_id)?;
        if self.editing.as_ref().is_some_and(|e| !self.tree.contains(&e.node_id)) {
            self.editing = None;
        }
        self.persist_tree()
    }

    /// Replace the active map's content with a document edited outside the
    /// controller (the page's live data object). Saved right away; returns
    /// whether anything changed.
    pub fn load_content(&mut self, doc: &MapDocument) -> WorkspaceResult<bool> {
        if self.tree.to_document() == *doc {
            return Ok(false);
        }
        let focused = self.tree.focused().to_string();
        self.tree = MindTree::from_document(doc);
        if self.tree.contains(&focused) {
            self.tree.select(&focused)?;
        }
        if self.editing.as_ref().is_some_and(|e| !self.tree.contains(&e.node_id)) {
            self.editing = None;
        }
        debug!(map = self.active_id, "content replaced from outside");
        self.persist_tree()?;
        Ok(true)
    }

    /// Throw away the active map's content, leaving a lone root node.
    pub fn reset_map(&mut self) -> WorkspaceResult<()> {
        self.editing = None;
        self.tree = MindTree::new(&self.config.root_text);
        info!(map = self.active_id, "reset map content");
        self.persist_tree()
    }

    pub fn select_node(&mut self, node_id: &str) -> WorkspaceResult<()> {
        self.tree.select(node_id)
    }

    /// Move the selection from the focused node.
    pub fn navigate(&mut self, direction: Direction) -> WorkspaceResult<String> {
        let from = self.tree.focused().to_string();
        self.tree.navigate(&from, direction)
    }

    pub fn begin_edit(&mut self, node_id: &str) -> WorkspaceResult<String> {
        let text = self
            .tree
            .text(node_id)
            .ok_or_else(|| WorkspaceError::NodeNotFound(node_id.to_string()))?
            .to_string();
        self.tree.select(node_id)?;
        self.editing = Some(NodeEdit {
            node_id: node_id.to_string(),
        });
        Ok(text)
    }

    pub fn commit_edit(&mut self, text: &str) -> WorkspaceResult<()> {
        let Some(edit) = self.editing.take() else {
            return Err(WorkspaceError::invalid("no node is being edited"));
        };
        self.rename_node(&edit.node_id, text)
    }

    /// Close the node editor keeping the node's current text.
    pub fn cancel_edit(&mut self) -> bool {
        self.editing.take().is_some()
    }

    /// Dispatch a `KeyboardEvent.key` to the active tree.
    ///
    /// While a node edit or a map rename is open the key belongs to that
    /// input, so nothing happens here (Backspace must not delete nodes).
    pub fn handle_key(&mut self, key: &str) -> WorkspaceResult<KeyOutcome> {
        if self.editing.is_some() || self.renaming.is_some() {
            return Ok(KeyOutcome::Ignored);
        }
        let Some(action) = action_for_key(key) else {
            return Ok(KeyOutcome::Ignored);
        };
        let focused = self.tree.focused().to_string();

        let outcome = match action {
            KeyAction::Navigate(direction) => KeyOutcome::Selected(self.navigate(direction)?),
            KeyAction::AddChild => {
                let id = self.add_child(&focused, "")?;
                self.begin_edit(&id)?;
                KeyOutcome::Editing(id)
            }
            KeyAction::AddSibling => {
                let id = self.add_sibling(&focused, "")?;
                self.begin_edit(&id)?;
                KeyOutcome::Editing(id)
            }
            KeyAction::BeginEdit => {
                self.begin_edit(&focused)?;
                KeyOutcome::Editing(focused)
            }
            KeyAction::Delete if focused == ROOT_ID => KeyOutcome::Ignored,
            KeyAction::Delete => {
                self.delete_node(&focused)?;
                KeyOutcome::Deleted
            }
            KeyAction::Cancel => KeyOutcome::Ignored,
        };
        Ok(outcome)
    }

    // ---- internals -----------------------------------------------------

    /// Current registry from the store; falls back to the last good copy if
    /// the stored one is gone or unreadable.
    fn read_registry(&self) -> MapRegistry {
        match self.gateway.load_registry() {
            Ok(Some(reg)) if !reg.is_empty() => reg,
            Ok(_) => {
                warn!("stored registry is empty; using in-memory copy");
                self.registry.clone()
            }
            Err(e) => {
                warn!(error = %e, "stored registry unreadable; using in-memory copy");
                self.registry.clone()
            }
        }
    }

    fn write_registry(&mut self, reg: MapRegistry) -> WorkspaceResult<()> {
        self.gateway.save_registry(&reg)?;
        self.registry = reg;
        Ok(())
    }

    fn first_listed(&self) -> WorkspaceResult<u32> {
        self.registry
            .first_listed(self.settings.sort_mode)
            .ok_or_else(|| WorkspaceError::invalid("workspace has no maps"))
    }

    /// Save outgoing content (when changed) and bump the outgoing map's `updatedAt`.
    fn autosave(&mut self, mut reg: MapRegistry) -> WorkspaceResult<()> {
        if reg.get(self.active_id).is_none() {
            warn!(map = self.active_id, "active map was deleted elsewhere; not saving it");
            self.registry = reg;
            return Ok(());
        }
        if self.tree.is_dirty() {
            self.gateway
                .save_document(self.active_id, &self.tree.to_document())?;
            self.tree.mark_clean();
        }
        if reg.touch(self.active_id).is_ok() {
            self.write_registry(reg)?;
        } else {
            self.registry = reg;
        }
        Ok(())
    }

    fn save_tree_if_dirty(&mut self) -> WorkspaceResult<()> {
        if self.tree.is_dirty() {
            self.persist_tree()?;
        }
        Ok(())
    }

    fn persist_tree(&mut self) -> WorkspaceResult<()> {
        self.gateway
            .save_document(self.active_id, &self.tree.to_document())?;
        self.tree.mark_clean();
        let mut reg = self.read_registry();
        if reg.touch(self.active_id).is_ok() {
            self.write_registry(reg)?;
        }
        Ok(())
    }

    fn activate(&mut self, map_id: u32) -> WorkspaceResult<()> {
        self.tree = load_tree(&mut self.gateway, &self.config, map_id)?;
        self.active_id = map_id;
        self.publish_active()
    }

    /// Record the active map as last-active and in the URL.
    fn publish_active(&mut self) -> WorkspaceResult<()> {
        self.gateway.set_last_active_id(self.active_id)?;
        let search = with_id_param(&self.address.search(), self.active_id);
        self.address.replace_search(&search);
        Ok(())
    }
}

fn seed_registry<S: KvStore>(
    gateway: &mut Gateway<S>,
    config: &WorkspaceConfig,
) -> WorkspaceResult<MapRegistry> {
    let mut reg = MapRegistry::new(vec![], 0);
    let meta = reg.create(&config.default_map_name, None)?;
    gateway.save_document(meta.id, &MapDocument::seeded(&config.root_text))?;
    gateway.save_registry(&reg)?;
    Ok(reg)
}

/// Stored tree for `map_id`, or a fresh single-root tree (saved right away)
/// when none exists or it cannot be read.
fn load_tree<S: KvStore>(
    gateway: &mut Gateway<S>,
    config: &WorkspaceConfig,
    map_id: u32,
) -> WorkspaceResult<MindTree> {
    match gateway.load_document(map_id) {
        Ok(Some(doc)) => return Ok(MindTree::from_document(&doc)),
        Ok(None) => debug!(map = map_id, "no stored content; seeding root"),
        Err(e) => warn!(error = %e, map = map_id, "stored content unreadable; seeding root"),
    }
    let tree = MindTree::new(&config.root_text);
    gateway.save_document(map_id, &tree.to_document())?;
    Ok(tree)
}
