//! Browser binding: one workspace per page, reachable from `window` through
//! the exported functions below.

use crate::config::WorkspaceConfig;
use crate::error::WorkspaceResult;
use crate::models::{CopyBorder, CopyFormat, MapDocument, SortMode};
use crate::state::{AddressBar, Workspace};
use crate::storage::LocalStore;
use serde::Serialize;
use std::cell::RefCell;
use std::io;
use tracing::{warn, Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

/// `location.search` + `history.replaceState`.
pub struct BrowserAddressBar;

impl AddressBar for BrowserAddressBar {
    fn search(&self) -> String {
        web_sys::window()
            .and_then(|w| w.location().search().ok())
            .unwrap_or_default()
    }

    fn replace_search(&mut self, search: &str) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let location = window.location();
        let path = location.pathname().unwrap_or_default();
        let hash = location.hash().unwrap_or_default();
        let url = format!("{path}{search}{hash}");
        if let Ok(history) = window.history() {
            if let Err(e) = history.replace_state_with_url(&JsValue::NULL, "", Some(&url)) {
                warn!(error = ?e, "history.replaceState failed");
            }
        }
    }
}

type BrowserWorkspace = Workspace<LocalStore, BrowserAddressBar>;

thread_local! {
    static WORKSPACE: RefCell<Option<BrowserWorkspace>> = const { RefCell::new(None) };
    /// Object handed out by `getMindMapData`, with the map it belongs to. The
    /// page may mutate it in place; those edits are read back before the
    /// next call into the workspace.
    static LIVE_DATA: RefCell<Option<(u32, JsValue)>> = const { RefCell::new(None) };
}

/// Open the workspace against `localStorage` and publish the API on
/// `window`. Safe to call again; the existing instance is replaced.
pub fn boot() {
    let Some(store) = LocalStore::open() else {
        warn!("localStorage is unavailable; mind map workspace not started");
        return;
    };
    match Workspace::open(store, BrowserAddressBar, WorkspaceConfig::from_window()) {
        Ok(ws) => {
            LIVE_DATA.with(|live| *live.borrow_mut() = None);
            WORKSPACE.with(|cell| *cell.borrow_mut() = Some(ws));
            install_window_api();
        }
        Err(e) => warn!(error = %e, kind = ?e.kind(), "failed to open workspace"),
    }
}

/// Run `f` on the live workspace. Errors are logged and become `None`.
fn with_workspace<R>(
    op: &'static str,
    f: impl FnOnce(&mut BrowserWorkspace) -> WorkspaceResult<R>,
) -> Option<R> {
    WORKSPACE.with(|cell| {
        let mut slot = cell.borrow_mut();
        let Some(ws) = slot.as_mut() else {
            warn!(op, "workspace is not open");
            return None;
        };
        let handed_out = sync_live_data(ws);
        let result = f(ws);
        if let Some((map_id, doc)) = handed_out {
            if ws.current_map_id() != map_id || ws.mind_map_data() != doc {
                LIVE_DATA.with(|live| *live.borrow_mut() = None);
            }
        }
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(op, error = %e, kind = ?e.kind(), "workspace operation failed");
                None
            }
        }
    })
}

/// Fold page-side edits of the handed-out data object into the workspace.
/// Returns the map and content the object now mirrors, if it is still current.
fn sync_live_data(ws: &mut BrowserWorkspace) -> Option<(u32, MapDocument)> {
    let (map_id, value) = LIVE_DATA.with(|live| live.borrow().clone())?;
    if map_id != ws.current_map_id() {
        LIVE_DATA.with(|live| *live.borrow_mut() = None);
        return None;
    }
    let json = js_sys::JSON::stringify(&value).ok().map(String::from)?;
    match serde_json::from_str::<MapDocument>(&json) {
        Ok(doc) => {
            if let Err(e) = ws.load_content(&doc) {
                warn!(error = %e, "failed to apply page edits to the map");
            }
        }
        Err(e) => warn!(error = %e, "page-side map data is malformed; ignoring it"),
    }
    Some((map_id, ws.mind_map_data()))
}

fn read<R>(op: &'static str, f: impl FnOnce(&BrowserWorkspace) -> R) -> Option<R> {
    with_workspace(op, |ws| Ok(f(ws)))
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
        .unwrap_or(JsValue::UNDEFINED)
}

// ---- queries ----

#[wasm_bindgen(js_name = getCurrentMapId)]
pub fn get_current_map_id() -> Option<u32> {
    read("getCurrentMapId", |ws| ws.current_map_id())
}

/// The live data object of the active map; repeated calls return the same
/// object until the content changes through the workspace.
#[wasm_bindgen(js_name = getMindMapData)]
pub fn get_mind_map_data() -> JsValue {
    read("getMindMapData", |ws| {
        let map_id = ws.current_map_id();
        LIVE_DATA.with(|live| {
            let mut live = live.borrow_mut();
            if let Some((cached, value)) = live.as_ref() {
                if *cached == map_id {
                    return value.clone();
                }
            }
            let value = to_js(&ws.mind_map_data());
            *live = Some((map_id, value.clone()));
            value
        })
    })
    .unwrap_or(JsValue::UNDEFINED)
}

#[wasm_bindgen(js_name = getCurrentCopyText)]
pub fn get_current_copy_text() -> Option<String> {
    read("getCurrentCopyText", |ws| ws.copy_text())
}

#[wasm_bindgen(js_name = getSelectedNodeIds)]
pub fn get_selected_node_ids() -> js_sys::Array {
    let ids = read("getSelectedNodeIds", |ws| ws.selected_node_ids()).unwrap_or_default();
    ids.iter().map(|id| JsValue::from_str(id)).collect()
}

#[wasm_bindgen(js_name = getSortMode)]
pub fn get_sort_mode() -> Option<String> {
    read("getSortMode", |ws| ws.sort_mode().to_string())
}

/// Re-read shared state and return the full view for redrawing.
#[wasm_bindgen(js_name = renderMapList)]
pub fn render_map_list() -> JsValue {
    with_workspace("renderMapList", |ws| ws.refresh())
        .map(|view| to_js(&view))
        .unwrap_or(JsValue::UNDEFINED)
}

#[wasm_bindgen(js_name = getMapList)]
pub fn get_map_list() -> JsValue {
    read("getMapList", |ws| to_js(&ws.map_list())).unwrap_or(JsValue::UNDEFINED)
}

#[wasm_bindgen(js_name = getPreviewLines)]
pub fn get_preview_lines() -> JsValue {
    read("getPreviewLines", |ws| to_js(&ws.preview().lines)).unwrap_or(JsValue::UNDEFINED)
}

#[wasm_bindgen(js_name = getSettings)]
pub fn get_settings() -> JsValue {
    read("getSettings", |ws| to_js(&ws.settings())).unwrap_or(JsValue::UNDEFINED)
}

// ---- map commands ----

#[wasm_bindgen(js_name = createNewMap)]
pub fn create_new_map() -> Option<u32> {
    with_workspace("createNewMap", |ws| ws.create_new(None))
}

#[wasm_bindgen(js_name = addChildMap)]
pub fn add_child_map(parent_id: u32) -> Option<u32> {
    with_workspace("addChildMap", |ws| ws.add_child_map(parent_id))
}

#[wasm_bindgen(js_name = switchMap)]
pub fn switch_map(map_id: u32) -> bool {
    with_workspace("switchMap", |ws| ws.switch_to(map_id)).is_some()
}

#[wasm_bindgen(js_name = duplicateMap)]
pub fn duplicate_map(map_id: u32) -> Option<u32> {
    with_workspace("duplicateMap", |ws| ws.duplicate(map_id))
}

#[wasm_bindgen(js_name = renameMap)]
pub fn rename_map(map_id: u32, name: &str) -> bool {
    with_workspace("renameMap", |ws| ws.rename_map(map_id, name)).is_some()
}

#[wasm_bindgen(js_name = deleteMap)]
pub fn delete_map(map_id: u32) -> bool {
    with_workspace("deleteMap", |ws| ws.delete_map(map_id)).is_some()
}

#[wasm_bindgen(js_name = moveMap)]
pub fn move_map(map_id: u32, parent_id: Option<u32>) -> bool {
    with_workspace("moveMap", |ws| ws.reparent_map(map_id, parent_id)).is_some()
}

#[wasm_bindgen(js_name = reorderMap)]
pub fn reorder_map(map_id: u32, index: usize) -> bool {
    with_workspace("reorderMap", |ws| ws.reorder_map(map_id, index)).is_some()
}

#[wasm_bindgen(js_name = beginRename)]
pub fn begin_rename(map_id: u32) -> Option<String> {
    with_workspace("beginRename", |ws| ws.begin_rename(map_id))
}

#[wasm_bindgen(js_name = commitRename)]
pub fn commit_rename(name: &str) -> bool {
    with_workspace("commitRename", |ws| ws.commit_rename(name)).is_some()
}

#[wasm_bindgen(js_name = cancelRename)]
pub fn cancel_rename() -> Option<String> {
    with_workspace("cancelRename", |ws| Ok(ws.cancel_rename())).flatten()
}

// ---- settings ----

#[wasm_bindgen(js_name = setSortMode)]
pub fn set_sort_mode(mode: &str) -> bool {
    let Ok(mode) = mode.parse::<SortMode>() else {
        warn!(mode, "unknown sort mode");
        return false;
    };
    with_workspace("setSortMode", |ws| ws.set_sort_mode(mode)).is_some()
}

#[wasm_bindgen(js_name = toggleSort)]
pub fn toggle_sort() -> Option<String> {
    with_workspace("toggleSort", |ws| ws.toggle_sort()).map(|m| m.to_string())
}

#[wasm_bindgen(js_name = toggleCollapse)]
pub fn toggle_collapse(map_id: u32) -> Option<bool> {
    with_workspace("toggleCollapse", |ws| ws.toggle_collapse(map_id))
}

#[wasm_bindgen(js_name = setCopyFormat)]
pub fn set_copy_format(format: &str) -> bool {
    let Ok(format) = format.parse::<CopyFormat>() else {
        warn!(format, "unknown copy format");
        return false;
    };
    with_workspace("setCopyFormat", |ws| ws.set_copy_format(format)).is_some()
}

#[wasm_bindgen(js_name = setCopyBorder)]
pub fn set_copy_border(border: &str) -> bool {
    let Ok(border) = border.parse::<CopyBorder>() else {
        warn!(border, "unknown copy border");
        return false;
    };
    with_workspace("setCopyBorder", |ws| ws.set_copy_border(border)).is_some()
}

#[wasm_bindgen(js_name = setSidebarWidth)]
pub fn set_sidebar_width(width: u32) -> Option<u32> {
    with_workspace("setSidebarWidth", |ws| ws.set_sidebar_width(width))
}

// ---- tree commands ----

#[wasm_bindgen(js_name = resetMap)]
pub fn reset_map() -> bool {
    with_workspace("resetMap", |ws| ws.reset_map()).is_some()
}

#[wasm_bindgen(js_name = selectNode)]
pub fn select_node(node_id: &str) -> bool {
    with_workspace("selectNode", |ws| ws.select_node(node_id)).is_some()
}

#[wasm_bindgen(js_name = addChildNode)]
pub fn add_child_node(parent_id: &str, text: &str) -> Option<String> {
    with_workspace("addChildNode", |ws| ws.add_child(parent_id, text))
}

#[wasm_bindgen(js_name = addSiblingNode)]
pub fn add_sibling_node(node_id: &str, text: &str) -> Option<String> {
    with_workspace("addSiblingNode", |ws| ws.add_sibling(node_id, text))
}

#[wasm_bindgen(js_name = renameNode)]
pub fn rename_node(node_id: &str, text: &str) -> bool {
    with_workspace("renameNode", |ws| ws.rename_node(node_id, text)).is_some()
}

#[wasm_bindgen(js_name = deleteNode)]
pub fn delete_node(node_id: &str) -> bool {
    with_workspace("deleteNode", |ws| ws.delete_node(node_id)).is_some()
}

/// `{ kind, nodeId? }` describing what the key did.
#[wasm_bindgen(js_name = handleKey)]
pub fn handle_key(key: &str) -> JsValue {
    with_workspace("handleKey", |ws| ws.handle_key(key))
        .map(|outcome| to_js(&outcome))
        .unwrap_or(JsValue::UNDEFINED)
}

#[wasm_bindgen(js_name = beginEdit)]
pub fn begin_edit(node_id: &str) -> Option<String> {
    with_workspace("beginEdit", |ws| ws.begin_edit(node_id))
}

#[wasm_bindgen(js_name = commitEdit)]
pub fn commit_edit(text: &str) -> bool {
    with_workspace("commitEdit", |ws| ws.commit_edit(text)).is_some()
}

#[wasm_bindgen(js_name = cancelEdit)]
pub fn cancel_edit() -> bool {
    with_workspace("cancelEdit", |ws| Ok(ws.cancel_edit())).unwrap_or(false)
}

// ---- window ----

type WindowFn = fn(&JsValue, &JsValue) -> JsValue;

/// Everything above, callable as `window.<name>(...)` from page scripts.
static WINDOW_API: &[(&str, WindowFn)] = &[
    ("getCurrentMapId", |_, _| opt(get_current_map_id())),
    ("getMindMapData", |_, _| get_mind_map_data()),
    ("getCurrentCopyText", |_, _| opt(get_current_copy_text())),
    ("getSelectedNodeIds", |_, _| get_selected_node_ids().into()),
    ("getSortMode", |_, _| opt(get_sort_mode())),
    ("renderMapList", |_, _| render_map_list()),
    ("getMapList", |_, _| get_map_list()),
    ("getPreviewLines", |_, _| get_preview_lines()),
    ("getSettings", |_, _| get_settings()),
    ("createNewMap", |_, _| opt(create_new_map())),
    ("addChildMap", |id, _| opt(id_arg(id).and_then(add_child_map))),
    ("switchMap", |id, _| id_arg(id).is_some_and(switch_map).into()),
    ("duplicateMap", |id, _| opt(id_arg(id).and_then(duplicate_map))),
    ("renameMap", |id, name| {
        id_arg(id)
            .is_some_and(|id| rename_map(id, &text_arg(name)))
            .into()
    }),
    ("deleteMap", |id, _| id_arg(id).is_some_and(delete_map).into()),
    ("moveMap", |id, parent| {
        id_arg(id)
            .is_some_and(|id| move_map(id, id_arg(parent)))
            .into()
    }),
    ("reorderMap", |id, index| match (id_arg(id), num_arg(index)) {
        (Some(id), Some(index)) => reorder_map(id, index as usize).into(),
        _ => false.into(),
    }),
    ("beginRename", |id, _| opt(id_arg(id).and_then(begin_rename))),
    ("commitRename", |name, _| commit_rename(&text_arg(name)).into()),
    ("cancelRename", |_, _| opt(cancel_rename())),
    ("setSortMode", |mode, _| set_sort_mode(&text_arg(mode)).into()),
    ("toggleSort", |_, _| opt(toggle_sort())),
    ("toggleCollapse", |id, _| opt(id_arg(id).and_then(toggle_collapse))),
    ("setCopyFormat", |format, _| set_copy_format(&text_arg(format)).into()),
    ("setCopyBorder", |border, _| set_copy_border(&text_arg(border)).into()),
    ("setSidebarWidth", |w, _| opt(num_arg(w).and_then(set_sidebar_width))),
    ("resetMap", |_, _| reset_map().into()),
    ("selectNode", |id, _| select_node(&text_arg(id)).into()),
    ("addChildNode", |parent, text| {
        opt(add_child_node(&text_arg(parent), &text_arg(text)))
    }),
    ("addSiblingNode", |node, text| {
        opt(add_sibling_node(&text_arg(node), &text_arg(text)))
    }),
    ("renameNode", |node, text| {
        rename_node(&text_arg(node), &text_arg(text)).into()
    }),
    ("deleteNode", |node, _| delete_node(&text_arg(node)).into()),
    ("handleKey", |key, _| handle_key(&text_arg(key))),
    ("beginEdit", |node, _| opt(begin_edit(&text_arg(node)))),
    ("commitEdit", |text, _| commit_edit(&text_arg(text)).into()),
    ("cancelEdit", |_, _| cancel_edit().into()),
];

fn install_window_api() {
    let Some(window) = web_sys::window() else {
        return;
    };
    for (name, f) in WINDOW_API {
        let f = *f;
        let handler: Box<dyn Fn(JsValue, JsValue) -> JsValue> =
            Box::new(move |a: JsValue, b: JsValue| f(&a, &b));
        let closure = Closure::wrap(handler);
        if let Err(e) = js_sys::Reflect::set(&window, &JsValue::from_str(name), closure.as_ref()) {
            warn!(name, error = ?e, "could not publish function on window");
        }
        // Lives as long as the page.
        closure.forget();
    }
}

fn opt<T: Into<JsValue>>(value: Option<T>) -> JsValue {
    value.map_or(JsValue::UNDEFINED, Into::into)
}

/// Map ids arrive as numbers, or as strings when read from `data-*` attributes.
fn id_arg(v: &JsValue) -> Option<u32> {
    match v.as_f64() {
        Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => Some(n as u32),
        Some(_) => None,
        None => v.as_string().and_then(|s| s.trim().parse().ok()),
    }
}

fn num_arg(v: &JsValue) -> Option<u32> {
    v.as_f64()
        .or_else(|| v.as_string().and_then(|s| s.trim().parse().ok()))
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round().min(u32::MAX as f64) as u32)
}

fn text_arg(v: &JsValue) -> String {
    v.as_string().unwrap_or_default()
}

// ---- logging ----

/// Formats tracing events into `console.log` / `console.warn`.
pub struct ConsoleMakeWriter;

pub struct ConsoleWriter {
    buf: Vec<u8>,
    warn: bool,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buf);
        let line = JsValue::from_str(line.trim_end());
        if self.warn {
            web_sys::console::warn_1(&line);
        } else {
            web_sys::console::log_1(&line);
        }
    }
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            buf: vec![],
            warn: false,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            buf: vec![],
            // WARN and ERROR
            warn: *meta.level() <= Level::WARN,
        }
    }
}

pub fn init_logging() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .without_time()
        .with_writer(ConsoleMakeWriter)
        .finish();
    // A second call (e.g. hot reload) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
