pub mod app;
pub mod config;
pub mod editor;
pub mod error;
pub mod models;
pub mod preview;
pub mod registry;
pub mod state;
pub mod storage;
mod util;

pub use config::WorkspaceConfig;
pub use editor::MindTree;
pub use error::{ErrorKind, WorkspaceError, WorkspaceResult};
pub use models::{CopyBorder, CopyFormat, Direction, MapDocument, MapMeta, Node, SortMode};
pub use preview::{render, PreviewLine, Rendered};
pub use registry::{MapRegistry, SidebarItem};
pub use state::{KeyOutcome, ViewSettings, Workspace, WorkspaceView};
pub use storage::{Gateway, KvStore, LocalStore, MemoryStore};

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    app::init_logging();
    app::boot();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AddressBar, MemoryAddressBar};

    #[test]
    fn test_public_surface_drives_a_workspace() {
        let mut ws = Workspace::open(
            MemoryStore::default(),
            MemoryAddressBar::new("?lang=ja"),
            WorkspaceConfig::default(),
        )
        .expect("open");
        let id = ws.create_new(None).expect("create");
        ws.add_child(models::ROOT_ID, "first").expect("add");

        assert_eq!(ws.address().search(), format!("?id={id}&lang=ja"));
        assert_eq!(ws.copy_text(), "中心テーマ\n└─ first");
    }
}
