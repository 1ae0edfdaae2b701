use serde::{Deserialize, Serialize};

pub const DEFAULT_ROOT_TEXT: &str = "中心テーマ";
pub const DEFAULT_MAP_NAME: &str = "マインドマップ";
pub const DEFAULT_NEW_MAP_NAME: &str = "新しいマップ";
pub const DEFAULT_CHILD_MAP_NAME: &str = "子マップ";
pub const COPY_SUFFIX: &str = "のコピー";

pub const DEFAULT_SIDEBAR_WIDTH: u32 = 240;
pub const MIN_SIDEBAR_WIDTH: u32 = 160;
pub const MAX_SIDEBAR_WIDTH: u32 = 600;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Text of the root node of every freshly seeded map.
    pub root_text: String,
    /// Name of the map created for an empty workspace.
    pub default_map_name: String,
    pub new_map_name: String,
    pub child_map_name: String,
    pub copy_suffix: String,
    pub sidebar_width: u32,
    pub min_sidebar_width: u32,
    pub max_sidebar_width: u32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_text: DEFAULT_ROOT_TEXT.to_string(),
            default_map_name: DEFAULT_MAP_NAME.to_string(),
            new_map_name: DEFAULT_NEW_MAP_NAME.to_string(),
            child_map_name: DEFAULT_CHILD_MAP_NAME.to_string(),
            copy_suffix: COPY_SUFFIX.to_string(),
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            min_sidebar_width: MIN_SIDEBAR_WIDTH,
            max_sidebar_width: MAX_SIDEBAR_WIDTH,
        }
    }
}

impl WorkspaceConfig {
    /// Defaults overridden by `window.ENV` (`MINDMAP_ROOT_TEXT`, `MINDMAP_DEFAULT_NAME`,
    /// `MINDMAP_NEW_MAP_NAME`) when the page provides it.
    pub fn from_window() -> Self {
        let mut config = Self::default();

        let Some(window) = web_sys::window() else {
            return config;
        };
        let Some(env) = window.get("ENV") else {
            return config;
        };
        if env.is_undefined() || !env.is_object() {
            return config;
        }

        let read = |name: &str| -> Option<String> {
            js_sys::Reflect::get(&env, &name.into())
                .ok()
                .and_then(|v| v.as_string())
                .filter(|s| !s.trim().is_empty())
        };

        if let Some(v) = read("MINDMAP_ROOT_TEXT") {
            config.root_text = v;
        }
        if let Some(v) = read("MINDMAP_DEFAULT_NAME") {
            config.default_map_name = v;
        }
        if let Some(v) = read("MINDMAP_NEW_MAP_NAME") {
            config.new_map_name = v;
        }

        config
    }

    pub fn clamp_sidebar_width(&self, width: u32) -> u32 {
        width.clamp(self.min_sidebar_width, self.max_sidebar_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let c = WorkspaceConfig::default();
        assert_eq!(c.root_text, "中心テーマ");
        assert_eq!(c.copy_suffix, "のコピー");
        assert_eq!(c.sidebar_width, 240);
    }

    #[test]
    fn test_clamp_sidebar_width() {
        let c = WorkspaceConfig::default();
        assert_eq!(c.clamp_sidebar_width(10), 160);
        assert_eq!(c.clamp_sidebar_width(300), 300);
        assert_eq!(c.clamp_sidebar_width(5000), 600);
    }
}
