use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};

/// Reserved id of every map's root node.
pub const ROOT_ID: &str = "root";

/// Sidebar collapse flags, map id -> collapsed. Missing means expanded.
pub type CollapseState = BTreeMap<u32, bool>;

/// Persisted (nested) form of one node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    pub fn leaf(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            children: vec![],
        }
    }
}

/// Content of `mindmap-data-<id>`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MapDocument {
    pub root: Node,
}

impl MapDocument {
    pub fn seeded(root_text: &str) -> Self {
        Self {
            root: Node::leaf(ROOT_ID, root_text),
        }
    }
}

/// Registry entry for one map.
///
/// Entries written by older builds may carry fields we do not know about;
/// they ride along in `extra` so a rewrite never drops them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapMeta {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MapMeta {
    pub fn new(id: u32, name: impl Into<String>, parent_id: Option<u32>, order: f64) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            order,
            updated_at: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Salvage one stored registry entry written by any build (or by hand).
    ///
    /// Ids may be numbers or numeric strings; an entry without a usable id is
    /// dropped. A missing, null or non-finite `order` becomes `index`, and
    /// other wrong-typed fields fall back to their defaults.
    pub fn from_stored(index: usize, value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id").and_then(as_map_id)?;
        let name = match obj.get("name") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let parent_id = obj.get("parentId").and_then(as_map_id);
        let order = obj
            .get("order")
            .and_then(serde_json::Value::as_f64)
            .filter(|o| o.is_finite())
            .unwrap_or(index as f64);
        let updated_at = obj
            .get("updatedAt")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut meta = Self::new(id, name, parent_id, order);
        meta.updated_at = updated_at;
        meta.extra = obj
            .iter()
            .filter(|(k, _)| {
                !matches!(k.as_str(), "id" | "name" | "parentId" | "order" | "updatedAt")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(meta)
    }
}

fn as_map_id(v: &serde_json::Value) -> Option<u32> {
    match v {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortMode {
    #[default]
    None,
    Alpha,
}

impl SortMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::None => Self::Alpha,
            Self::Alpha => Self::None,
        }
    }
}

/// Icon theme of the text preview / copy output.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CopyFormat {
    #[default]
    Simple,
    Hiyoko,
    Family,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CopyBorder {
    #[default]
    Border,
    None,
}

/// Keyboard navigation direction inside one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Parent,
    FirstChild,
    PrevSibling,
    NextSibling,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_meta_serializes_null_parent_and_camel_case() {
        let meta = MapMeta::new(1, "A", None, 0.0);
        let v = serde_json::to_value(&meta).expect("should serialize");
        assert!(v["parentId"].is_null());
        assert!(v.get("parentId").is_some());
        assert_eq!(v["order"], 0.0);
        assert!(v.get("updatedAt").is_some());
    }

    #[test]
    fn test_map_meta_keeps_unknown_fields() {
        let json = r#"{"id":4,"name":"X","parentId":null,"order":2,"updatedAt":"t","color":"red"}"#;
        let meta: MapMeta = serde_json::from_str(json).expect("meta should parse");
        assert_eq!(meta.order, 2.0);
        let v = serde_json::to_value(&meta).expect("should serialize");
        assert_eq!(v["color"], "red");
    }

    #[test]
    fn test_from_stored_repairs_wrong_typed_fields() {
        let v = serde_json::json!({
            "id": "2", "name": "B", "parentId": "x", "order": null, "color": 1
        });
        let meta = MapMeta::from_stored(4, &v).expect("id is usable");
        assert_eq!(meta.id, 2);
        assert_eq!(meta.name, "B");
        assert_eq!(meta.parent_id, None);
        assert_eq!(meta.order, 4.0);
        assert_eq!(meta.extra.get("color"), Some(&serde_json::json!(1)));

        let kept = serde_json::json!({
            "id": 3, "name": "C", "parentId": 1, "order": 7, "updatedAt": "t"
        });
        let meta = MapMeta::from_stored(0, &kept).expect("valid entry");
        assert_eq!((meta.parent_id, meta.order), (Some(1), 7.0));
        assert_eq!(meta.updated_at, "t");

        assert!(MapMeta::from_stored(0, &serde_json::json!({"id": null})).is_none());
        assert!(MapMeta::from_stored(0, &serde_json::json!({"id": -1})).is_none());
        assert!(MapMeta::from_stored(0, &serde_json::json!("x")).is_none());
    }

    #[test]
    fn test_document_contract_deserialize() {
        let json = r#"{"root":{"id":"root","text":"中心テーマ","children":[{"id":"pa","text":"ParentA"}]}}"#;
        let doc: MapDocument = serde_json::from_str(json).expect("document should parse");
        assert_eq!(doc.root.children.len(), 1);
        assert!(doc.root.children[0].children.is_empty());
    }

    #[test]
    fn test_enum_spelling_matches_storage_values() {
        assert_eq!(SortMode::Alpha.as_ref(), "alpha");
        assert_eq!("none".parse::<SortMode>().ok(), Some(SortMode::None));
        assert_eq!(CopyFormat::Hiyoko.to_string(), "hiyoko");
        assert_eq!("none".parse::<CopyBorder>().ok(), Some(CopyBorder::None));
        assert!("bogus".parse::<CopyFormat>().is_err());
    }
}
