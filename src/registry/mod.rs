use crate::error::{WorkspaceError, WorkspaceResult};
use crate::models::{CollapseState, MapMeta, SortMode};
use crate::util::{copy_name, locale_cmp, now_timestamp};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::warn;

pub const ACTIVE_ICON: &str = "📌";
pub const EXPANDED_TOGGLE: &str = "▼";
pub const COLLAPSED_TOGGLE: &str = "►";

/// All map metadata plus the id counter, loaded and saved as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct MapRegistry {
    maps: Vec<MapMeta>,
    counter: u32,
}

/// One row of the flattened, hierarchy-aware map list.
#[derive(Clone, Debug, PartialEq)]
pub struct ListedMap<'a> {
    pub meta: &'a MapMeta,
    pub depth: usize,
}

/// A listed map decorated for the sidebar.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidebarItem {
    pub id: u32,
    pub name: String,
    pub depth: usize,
    pub is_child: bool,
    pub active: bool,
    pub icon: &'static str,
    pub toggle: Option<&'static str>,
    pub collapsed: bool,
    pub can_add_child: bool,
}

impl MapRegistry {
    /// Wrap loaded entries. The counter is raised to the highest id and any
    /// parent chain that loops back on itself is cut at the entry that closes it.
    pub fn new(maps: Vec<MapMeta>, counter: u32) -> Self {
        let max_id = maps.iter().map(|m| m.id).max().unwrap_or(0);
        let mut reg = Self {
            maps,
            counter: counter.max(max_id),
        };
        reg.break_cycles();
        reg
    }

    fn break_cycles(&mut self) {
        for i in 0..self.maps.len() {
            let id = self.maps[i].id;
            if self.is_ancestor(id, id) {
                warn!(
                    map = id,
                    parent = ?self.maps[i].parent_id,
                    "parent chain loops; moving map to top level"
                );
                self.maps[i].parent_id = None;
            }
        }
    }

    pub fn maps(&self) -> &[MapMeta] {
        &self.maps
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&MapMeta> {
        self.maps.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: u32) -> WorkspaceResult<&mut MapMeta> {
        self.maps
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(WorkspaceError::MapNotFound(id))
    }

    fn require(&self, id: u32) -> WorkspaceResult<&MapMeta> {
        self.get(id).ok_or(WorkspaceError::MapNotFound(id))
    }

    /// Parent as used for listing: dangling, self or looping references count
    /// as top-level.
    fn effective_parent(&self, meta: &MapMeta) -> Option<u32> {
        meta.parent_id.filter(|p| {
            *p != meta.id && self.get(*p).is_some() && !self.is_ancestor(meta.id, *p)
        })
    }

    fn next_order(&self, parent: Option<u32>) -> f64 {
        self.maps
            .iter()
            .filter(|m| m.parent_id == parent)
            .map(|m| m.order)
            .fold(None, |acc: Option<f64>, o| Some(acc.map_or(o, |a| a.max(o))))
            .map_or(0.0, |max| max + 1.0)
    }

    fn next_id(&mut self) -> u32 {
        let max_id = self.maps.iter().map(|m| m.id).max().unwrap_or(0);
        self.counter = self.counter.max(max_id) + 1;
        self.counter
    }

    /// Bump `updatedAt` of one map.
    pub fn touch(&mut self, id: u32) -> WorkspaceResult<()> {
        self.get_mut(id)?.updated_at = now_timestamp();
        Ok(())
    }

    pub fn create(&mut self, name: &str, parent_id: Option<u32>) -> WorkspaceResult<MapMeta> {
        if let Some(p) = parent_id {
            self.require(p)?;
        }
        let order = self.next_order(parent_id);
        let id = self.next_id();
        let mut meta = MapMeta::new(id, name, parent_id, order);
        meta.updated_at = now_timestamp();
        self.maps.push(meta.clone());
        Ok(meta)
    }

    /// Copy the metadata of `id` into a new sibling entry named `<name><suffix>`.
    pub fn duplicate(&mut self, id: u32, suffix: &str) -> WorkspaceResult<MapMeta> {
        let source = self.require(id)?.clone();
        let parent = self.effective_parent(&source);
        let order = self.next_order(parent);
        let new_id = self.next_id();

        let mut meta = MapMeta::new(new_id, copy_name(&source.name, suffix), parent, order);
        meta.extra = source.extra;
        meta.updated_at = now_timestamp();
        self.maps.push(meta.clone());
        Ok(meta)
    }

    /// Returns whether the name actually changed.
    pub fn rename(&mut self, id: u32, name: &str) -> WorkspaceResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            self.require(id)?;
            return Err(WorkspaceError::empty_name());
        }
        let meta = self.get_mut(id)?;
        if meta.name == name {
            return Ok(false);
        }
        meta.name = name.to_string();
        meta.updated_at = now_timestamp();
        Ok(true)
    }

    /// Remove a map. Its children move up to its parent instead of being orphaned.
    pub fn delete(&mut self, id: u32) -> WorkspaceResult<MapMeta> {
        let idx = self
            .maps
            .iter()
            .position(|m| m.id == id)
            .ok_or(WorkspaceError::MapNotFound(id))?;
        if self.maps.len() <= 1 {
            return Err(WorkspaceError::LastMap);
        }
        let removed = self.maps.remove(idx);
        let new_parent = removed.parent_id.filter(|p| self.get(*p).is_some());

        let mut children: Vec<u32> = self
            .maps
            .iter()
            .filter(|m| m.parent_id == Some(id))
            .map(|m| m.id)
            .collect();
        children.sort_by(|a, b| {
            let oa = self.get(*a).map_or(0.0, |m| m.order);
            let ob = self.get(*b).map_or(0.0, |m| m.order);
            oa.partial_cmp(&ob).unwrap_or(Ordering::Equal)
        });
        for child in children {
            let order = self.next_order(new_parent);
            let meta = self.get_mut(child)?;
            meta.parent_id = new_parent;
            meta.order = order;
            meta.updated_at = now_timestamp();
        }
        Ok(removed)
    }

    /// Is `ancestor` on the parent chain of `id`?
    pub fn is_ancestor(&self, ancestor: u32, id: u32) -> bool {
        let mut cur = self.get(id).and_then(|m| m.parent_id);
        let mut steps = 0;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.maps.len() {
                return false;
            }
            cur = self.get(p).and_then(|m| m.parent_id);
        }
        false
    }

    pub fn reparent(&mut self, id: u32, new_parent: Option<u32>) -> WorkspaceResult<()> {
        self.require(id)?;
        if let Some(p) = new_parent {
            self.require(p)?;
            if p == id || self.is_ancestor(id, p) {
                return Err(WorkspaceError::invalid(format!(
                    "map {id} cannot be moved under its own descendant {p}"
                )));
            }
        }
        if self.get(id).and_then(|m| m.parent_id) == new_parent {
            return Ok(());
        }
        let order = self.next_order(new_parent);
        let meta = self.get_mut(id)?;
        meta.parent_id = new_parent;
        meta.order = order;
        meta.updated_at = now_timestamp();
        Ok(())
    }

    /// Move `id` to position `index` among its siblings (manual order) and
    /// renumber the siblings' `order` from 0.
    pub fn reorder(&mut self, id: u32, index: usize) -> WorkspaceResult<()> {
        let parent = self.effective_parent(self.require(id)?);
        let mut ids: Vec<u32> = self
            .siblings(parent, SortMode::None)
            .into_iter()
            .map(|m| m.id)
            .filter(|sid| *sid != id)
            .collect();
        ids.insert(index.min(ids.len()), id);

        for (i, sid) in ids.into_iter().enumerate() {
            let meta = self.get_mut(sid)?;
            meta.order = i as f64;
            if sid == id {
                meta.updated_at = now_timestamp();
            }
        }
        Ok(())
    }

    pub fn children_of(&self, id: u32) -> Vec<&MapMeta> {
        self.maps
            .iter()
            .filter(|m| self.effective_parent(m) == Some(id))
            .collect()
    }

    fn siblings(&self, parent: Option<u32>, sort: SortMode) -> Vec<&MapMeta> {
        let mut sibs: Vec<&MapMeta> = self
            .maps
            .iter()
            .filter(|m| self.effective_parent(m) == parent)
            .collect();
        sibs.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(Ordering::Equal));
        // Stable, so equal names keep their manual order.
        if sort == SortMode::Alpha {
            sibs.sort_by(|a, b| locale_cmp(&a.name, &b.name));
        }
        sibs
    }

    /// Flatten the hierarchy for display: each map is followed by its children
    /// (one level deeper) unless it is collapsed.
    pub fn list(&self, sort: SortMode, collapse: &CollapseState) -> Vec<ListedMap<'_>> {
        let mut out = vec![];
        let mut seen = BTreeSet::new();
        for top in self.siblings(None, sort) {
            self.push_listed(top, 0, sort, collapse, &mut seen, &mut out);
        }
        out
    }

    fn push_listed<'a>(
        &'a self,
        meta: &'a MapMeta,
        depth: usize,
        sort: SortMode,
        collapse: &CollapseState,
        seen: &mut BTreeSet<u32>,
        out: &mut Vec<ListedMap<'a>>,
    ) {
        if !seen.insert(meta.id) {
            return;
        }
        out.push(ListedMap { meta, depth });
        if collapse.get(&meta.id).copied().unwrap_or(false) {
            return;
        }
        for child in self.siblings(Some(meta.id), sort) {
            self.push_listed(child, depth + 1, sort, collapse, seen, out);
        }
    }

    /// First map in display order, ignoring collapse.
    pub fn first_listed(&self, sort: SortMode) -> Option<u32> {
        self.list(sort, &CollapseState::new())
            .first()
            .map(|l| l.meta.id)
            .or_else(|| self.maps.first().map(|m| m.id))
    }

    pub fn sidebar_items(
        &self,
        sort: SortMode,
        collapse: &CollapseState,
        active: u32,
    ) -> Vec<SidebarItem> {
        self.list(sort, collapse)
            .into_iter()
            .map(|l| {
                let collapsed = collapse.get(&l.meta.id).copied().unwrap_or(false);
                let has_children = !self.children_of(l.meta.id).is_empty();
                let is_active = l.meta.id == active;
                SidebarItem {
                    id: l.meta.id,
                    name: l.meta.name.clone(),
                    depth: l.depth,
                    is_child: l.depth > 0,
                    active: is_active,
                    icon: if is_active { ACTIVE_ICON } else { "" },
                    toggle: match (has_children, collapsed) {
                        (false, _) => None,
                        (true, false) => Some(EXPANDED_TOGGLE),
                        (true, true) => Some(COLLAPSED_TOGGLE),
                    },
                    collapsed,
                    can_add_child: l.depth == 0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry_with(names: &[&str]) -> MapRegistry {
        let mut reg = MapRegistry::new(vec![], 0);
        for n in names {
            reg.create(n, None).expect("create");
        }
        reg
    }

    fn names(list: &[ListedMap<'_>]) -> Vec<String> {
        list.iter().map(|l| l.meta.name.clone()).collect()
    }

    #[test]
    fn test_create_assigns_ids_and_orders() {
        let mut reg = registry_with(&["A"]);
        assert_eq!(reg.counter(), 1);
        let b = reg.create("B", None).expect("create");
        assert_eq!(b.id, 2);
        assert_eq!(b.order, 1.0);
        assert_eq!(b.parent_id, None);
        let c = reg.create("C", Some(1)).expect("create child");
        assert_eq!(c.order, 0.0);
        assert_eq!(c.parent_id, Some(1));
        assert!(!c.updated_at.is_empty());
    }

    #[test]
    fn test_counter_repairs_to_max_id() {
        let mut reg = MapRegistry::new(vec![MapMeta::new(7, "x", None, 0.0)], 2);
        assert_eq!(reg.counter(), 7);
        assert_eq!(reg.create("y", None).expect("create").id, 8);
    }

    #[test]
    fn test_create_under_missing_parent() {
        let mut reg = registry_with(&["A"]);
        let err = reg.create("B", Some(42)).unwrap_err();
        assert!(matches!(err, WorkspaceError::MapNotFound(42)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_appends_suffix_and_keeps_parent() {
        let mut reg = registry_with(&["P"]);
        reg.create("X", Some(1)).expect("child");
        let dup = reg.duplicate(2, "のコピー").expect("duplicate");
        assert_eq!(dup.name, "Xのコピー");
        assert_eq!(dup.parent_id, Some(1));
        assert_eq!(dup.id, 3);
        assert_eq!(dup.order, 1.0);
    }

    #[test]
    fn test_rename_rejects_empty_name() {
        let mut reg = registry_with(&["A"]);
        let err = reg.rename(1, "   ").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(reg.get(1).map(|m| m.name.as_str()), Some("A"));
        assert!(reg.rename(1, " B ").expect("rename"));
        assert_eq!(reg.get(1).map(|m| m.name.as_str()), Some("B"));
        assert!(!reg.rename(1, "B").expect("rename"));
    }

    #[test]
    fn test_delete_last_map_is_refused() {
        let mut reg = registry_with(&["only"]);
        assert!(matches!(reg.delete(1), Err(WorkspaceError::LastMap)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_delete_promotes_children() {
        let mut reg = registry_with(&["A", "B"]);
        reg.create("a1", Some(1)).expect("child");
        reg.create("a2", Some(1)).expect("child");
        reg.delete(1).expect("delete");

        let list = reg.list(SortMode::None, &CollapseState::new());
        assert_eq!(names(&list), ["B", "a1", "a2"]);
        assert!(list.iter().all(|l| l.depth == 0));
        assert!(reg.maps().iter().all(|m| m.parent_id.is_none()));
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut reg = registry_with(&["A"]);
        reg.create("B", Some(1)).expect("child");
        reg.create("C", Some(2)).expect("grandchild");
        let err = reg.reparent(1, Some(3)).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidOperation(_)));
        assert!(reg.reparent(1, Some(1)).is_err());
        reg.reparent(3, None).expect("to top level");
        assert_eq!(reg.get(3).and_then(|m| m.parent_id), None);
    }

    #[test]
    fn test_reorder_renumbers_siblings() {
        let mut reg = registry_with(&["A", "B", "C"]);
        reg.reorder(3, 0).expect("reorder");
        let list = reg.list(SortMode::None, &CollapseState::new());
        assert_eq!(names(&list), ["C", "A", "B"]);
        assert_eq!(reg.get(3).map(|m| m.order), Some(0.0));
        assert_eq!(reg.get(2).map(|m| m.order), Some(2.0));
    }

    #[test]
    fn test_alpha_sort_and_manual_order() {
        let reg = registry_with(&["Zebra Map", "apple", "Mango"]);
        let manual = reg.list(SortMode::None, &CollapseState::new());
        assert_eq!(names(&manual), ["Zebra Map", "apple", "Mango"]);
        let alpha = reg.list(SortMode::Alpha, &CollapseState::new());
        assert_eq!(names(&alpha), ["apple", "Mango", "Zebra Map"]);
    }

    #[test]
    fn test_alpha_ties_keep_manual_order() {
        let mut reg = registry_with(&["same", "Other", "same"]);
        let ids = |reg: &MapRegistry| -> Vec<u32> {
            reg.list(SortMode::Alpha, &CollapseState::new())
                .iter()
                .map(|l| l.meta.id)
                .collect()
        };
        assert_eq!(ids(&reg), [2, 1, 3]);
        reg.reorder(3, 0).expect("reorder");
        assert_eq!(ids(&reg), [2, 3, 1]);
    }

    #[test]
    fn test_loaded_parent_cycle_is_broken() {
        let reg = MapRegistry::new(
            vec![
                MapMeta::new(1, "A", None, 0.0),
                MapMeta::new(2, "B", Some(3), 1.0),
                MapMeta::new(3, "C", Some(2), 2.0),
                MapMeta::new(4, "D", Some(4), 3.0),
            ],
            4,
        );
        let list = reg.list(SortMode::None, &CollapseState::new());
        assert_eq!(list.len(), 4);
        assert_eq!(reg.get(2).and_then(|m| m.parent_id), None);
        assert_eq!(reg.get(3).and_then(|m| m.parent_id), Some(2));
        assert_eq!(reg.get(4).and_then(|m| m.parent_id), None);
        assert_eq!(names(&list), ["A", "B", "C", "D"]);
        assert_eq!(list[2].depth, 1);
    }

    #[test]
    fn test_collapsed_parent_hides_children() {
        let mut reg = registry_with(&["P", "Q"]);
        reg.create("child", Some(1)).expect("child");
        let mut collapse = CollapseState::new();

        let open = reg.list(SortMode::None, &collapse);
        assert_eq!(names(&open), ["P", "child", "Q"]);
        assert_eq!(open[1].depth, 1);

        collapse.insert(1, true);
        let closed = reg.list(SortMode::None, &collapse);
        assert_eq!(names(&closed), ["P", "Q"]);
    }

    #[test]
    fn test_dangling_parent_lists_as_top_level() {
        let reg = MapRegistry::new(
            vec![
                MapMeta::new(1, "A", None, 0.0),
                MapMeta::new(2, "orphan", Some(99), 1.0),
            ],
            2,
        );
        let list = reg.list(SortMode::None, &CollapseState::new());
        assert_eq!(names(&list), ["A", "orphan"]);
    }

    #[test]
    fn test_sidebar_items_decoration() {
        let mut reg = registry_with(&["P"]);
        reg.create("c", Some(1)).expect("child");
        let mut collapse = CollapseState::new();

        let items = reg.sidebar_items(SortMode::None, &collapse, 2);
        assert_eq!(items[0].toggle, Some("▼"));
        assert_eq!(items[0].icon, "");
        assert!(items[0].can_add_child);
        assert!(items[1].is_child);
        assert!(!items[1].can_add_child);
        assert_eq!(items[1].icon, "📌");
        assert_eq!(items[1].toggle, None);

        collapse.insert(1, true);
        let items = reg.sidebar_items(SortMode::None, &collapse, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].toggle, Some("►"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(Option<u8>),
        Duplicate(u8),
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::option::of(any::<u8>()).prop_map(Op::Create),
            any::<u8>().prop_map(Op::Duplicate),
            any::<u8>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn prop_registry_never_empty_and_acyclic(ops in proptest::collection::vec(op(), 1..40)) {
            let mut reg = registry_with(&["first"]);
            for op in ops {
                let ids: Vec<u32> = reg.maps().iter().map(|m| m.id).collect();
                let pick = |n: u8| ids[n as usize % ids.len()];
                let _ = match op {
                    Op::Create(parent) => reg.create("m", parent.map(pick)).map(|_| ()),
                    Op::Duplicate(n) => reg.duplicate(pick(n), "のコピー").map(|_| ()),
                    Op::Delete(n) => reg.delete(pick(n)).map(|_| ()),
                };
                prop_assert!(!reg.is_empty());
                for m in reg.maps() {
                    if let Some(p) = m.parent_id {
                        prop_assert!(reg.get(p).is_some());
                        prop_assert!(!reg.is_ancestor(m.id, m.id));
                    }
                }
                let listed = reg.list(SortMode::None, &CollapseState::new());
                prop_assert_eq!(listed.len(), reg.len());
            }
        }

        #[test]
        fn prop_loaded_registry_lists_every_map(
            parents in proptest::collection::vec(proptest::option::of(0u32..12), 1..12)
        ) {
            // Arbitrary stored parent links: dangling, self and cyclic ones included.
            let maps = parents
                .iter()
                .enumerate()
                .map(|(i, p)| MapMeta::new(i as u32 + 1, "m", p.map(|p| p + 1), i as f64))
                .collect();
            let reg = MapRegistry::new(maps, 0);
            for m in reg.maps() {
                prop_assert!(!reg.is_ancestor(m.id, m.id));
            }
            for sort in [SortMode::None, SortMode::Alpha] {
                let listed = reg.list(sort, &CollapseState::new());
                prop_assert_eq!(listed.len(), reg.len());
            }
        }
    }
}
