use super::KvStore;
use crate::error::{WorkspaceError, WorkspaceResult};

/// `window.localStorage`.
pub struct LocalStore {
    storage: web_sys::Storage,
}

impl LocalStore {
    pub fn open() -> Option<Self> {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten())?;
        Some(Self { storage })
    }
}

impl KvStore for LocalStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set_item(&mut self, key: &str, value: &str) -> WorkspaceResult<()> {
        self.storage
            .set_item(key, value)
            .map_err(|e| WorkspaceError::Storage {
                key: key.to_string(),
                message: format!("{e:?}"),
            })
    }

    fn remove_item(&mut self, key: &str) {
        let _ = self.storage.remove_item(key);
    }
}
