pub(crate) mod keymap;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::models::{Direction, MapDocument, Node, ROOT_ID};
use crate::util::{now_ms, random_u32};
use std::collections::BTreeMap;
use tracing::debug;

pub use keymap::{action_for_key, KeyAction};

#[derive(Clone, Debug, PartialEq, Eq)]
struct NodeRecord {
    text: String,
    parent: Option<String>,
    children: Vec<String>,
}

/// Content of one map: an arena of nodes keyed by id, rooted at [`ROOT_ID`].
///
/// Nodes are only ever created under an existing parent, so the arena cannot
/// hold a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MindTree {
    nodes: BTreeMap<String, NodeRecord>,
    selection: Vec<String>,
    dirty: bool,
}

pub(crate) fn make_node_id(now_ms: i64, rand: u32) -> String {
    format!("n-{now_ms}-{rand:08x}")
}

impl MindTree {
    pub fn new(root_text: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_ID.to_string(),
            NodeRecord {
                text: root_text.to_string(),
                parent: None,
                children: vec![],
            },
        );
        Self {
            nodes,
            selection: vec![ROOT_ID.to_string()],
            dirty: false,
        }
    }

    /// Build the arena from a persisted document.
    ///
    /// A root with a foreign id is re-keyed to `root`; repeated ids further
    /// down get fresh ones so the arena stays a tree.
    pub fn from_document(doc: &MapDocument) -> Self {
        let mut tree = Self::new(&doc.root.text);
        for child in &doc.root.children {
            tree.insert_subtree(ROOT_ID, child);
        }
        tree.dirty = false;
        tree
    }

    fn insert_subtree(&mut self, parent: &str, node: &Node) {
        let id = if node.id.is_empty() || self.nodes.contains_key(&node.id) {
            let fresh = self.fresh_id();
            debug!(old = %node.id, new = %fresh, "re-keyed duplicate node id");
            fresh
        } else {
            node.id.clone()
        };

        self.nodes.insert(
            id.clone(),
            NodeRecord {
                text: node.text.clone(),
                parent: Some(parent.to_string()),
                children: vec![],
            },
        );
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id.clone());
        }

        for child in &node.children {
            self.insert_subtree(&id, child);
        }
    }

    pub fn to_document(&self) -> MapDocument {
        MapDocument {
            root: self.export_node(ROOT_ID),
        }
    }

    fn export_node(&self, id: &str) -> Node {
        let Some(rec) = self.nodes.get(id) else {
            return Node::leaf(id, "");
        };
        Node {
            id: id.to_string(),
            text: rec.text.clone(),
            children: rec.children.iter().map(|c| self.export_node(c)).collect(),
        }
    }

    fn fresh_id(&self) -> String {
        let now = now_ms();
        let mut attempt: u32 = 0;
        loop {
            let id = make_node_id(now, random_u32().wrapping_add(attempt));
            if !self.nodes.contains_key(&id) {
                return id;
            }
            attempt = attempt.wrapping_add(1);
        }
    }

    fn record(&self, id: &str) -> WorkspaceResult<&NodeRecord> {
        self.nodes
            .get(id)
            .ok_or_else(|| WorkspaceError::NodeNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.text.as_str())
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|n| n.parent.as_deref())
    }

    pub fn depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent(p);
        }
        depth
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn add_child(&mut self, parent_id: &str, text: &str) -> WorkspaceResult<String> {
        self.record(parent_id)?;
        let id = self.fresh_id();
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                text: text.to_string(),
                parent: Some(parent_id.to_string()),
                children: vec![],
            },
        );
        if let Some(p) = self.nodes.get_mut(parent_id) {
            p.children.push(id.clone());
        }
        self.dirty = true;
        Ok(id)
    }

    /// Insert a node right after `node_id`. On the root this adds a child instead.
    pub fn add_sibling(&mut self, node_id: &str, text: &str) -> WorkspaceResult<String> {
        let Some(parent_id) = self.record(node_id)?.parent.clone() else {
            return self.add_child(node_id, text);
        };

        let id = self.fresh_id();
        self.nodes.insert(
            id.clone(),
            NodeRecord {
                text: text.to_string(),
                parent: Some(parent_id.clone()),
                children: vec![],
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent_id) {
            let at = p
                .children
                .iter()
                .position(|c| c == node_id)
                .map(|i| i + 1)
                .unwrap_or(p.children.len());
            p.children.insert(at, id.clone());
        }
        self.dirty = true;
        Ok(id)
    }

    pub fn rename(&mut self, node_id: &str, text: &str) -> WorkspaceResult<()> {
        let rec = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| WorkspaceError::NodeNotFound(node_id.to_string()))?;
        if rec.text != text {
            rec.text = text.to_string();
            self.dirty = true;
        }
        Ok(())
    }

    /// Remove `node_id` and its whole subtree.
    pub fn delete(&mut self, node_id: &str) -> WorkspaceResult<()> {
        if node_id == ROOT_ID {
            return Err(WorkspaceError::invalid("the root node cannot be deleted"));
        }
        let parent_id = self
            .record(node_id)?
            .parent
            .clone()
            .unwrap_or_else(|| ROOT_ID.to_string());

        let siblings = self.children(&parent_id).to_vec();
        let idx = siblings.iter().position(|c| c == node_id);
        let fallback = idx
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| siblings.get(i))
            .or_else(|| idx.and_then(|i| siblings.get(i + 1)))
            .cloned()
            .unwrap_or_else(|| parent_id.clone());

        let mut stack = vec![node_id.to_string()];
        let mut removed = vec![];
        while let Some(id) = stack.pop() {
            if let Some(rec) = self.nodes.remove(&id) {
                stack.extend(rec.children);
                removed.push(id);
            }
        }
        if let Some(p) = self.nodes.get_mut(&parent_id) {
            p.children.retain(|c| c != node_id);
        }

        self.selection.retain(|s| !removed.contains(s));
        if self.selection.is_empty() {
            self.selection.push(fallback);
        }
        self.dirty = true;
        Ok(())
    }

    /// Ids at `depth` in document order.
    fn level(&self, depth: usize) -> Vec<&str> {
        let mut out = vec![];
        let mut stack: Vec<(&str, usize)> = vec![(ROOT_ID, 0)];
        while let Some((id, d)) = stack.pop() {
            if d == depth {
                out.push(id);
                continue;
            }
            for child in self.children(id).iter().rev() {
                stack.push((child.as_str(), d + 1));
            }
        }
        out
    }

    /// Resolve a keyboard move from `from_id` and make the result the selection.
    ///
    /// Up/down walk the same-depth row in document order, so they cross into
    /// the neighbouring parent's children at a sibling boundary.
    pub fn navigate(&mut self, from_id: &str, direction: Direction) -> WorkspaceResult<String> {
        self.record(from_id)?;
        let target = match direction {
            Direction::Parent => self.parent(from_id).unwrap_or(from_id).to_string(),
            Direction::FirstChild => self
                .children(from_id)
                .first()
                .map(String::as_str)
                .unwrap_or(from_id)
                .to_string(),
            Direction::PrevSibling | Direction::NextSibling => {
                let row = self.level(self.depth(from_id));
                let pos = row.iter().position(|id| *id == from_id);
                let next = match (direction, pos) {
                    (Direction::PrevSibling, Some(i)) => i.checked_sub(1).map(|j| row[j]),
                    (_, Some(i)) => row.get(i + 1).copied(),
                    _ => None,
                };
                next.unwrap_or(from_id).to_string()
            }
        };
        self.selection = vec![target.clone()];
        Ok(target)
    }

    pub fn select(&mut self, node_id: &str) -> WorkspaceResult<()> {
        self.record(node_id)?;
        self.selection = vec![node_id.to_string()];
        Ok(())
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    /// Primary selected node, falling back to the root.
    pub fn focused(&self) -> &str {
        self.selection
            .iter()
            .find(|id| self.nodes.contains_key(id.as_str()))
            .map(String::as_str)
            .unwrap_or(ROOT_ID)
    }
}
