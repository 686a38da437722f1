//! Element store: the scene tree, selection, hit-testing and persistence.
//!
//! The store owns every [`Element`] in an id-indexed arena rooted at a
//! synthetic node with id [`ROOT_ID`]. All structural mutation goes through
//! it so the tree invariants hold:
//!
//! - the parent graph is a tree rooted at the root node, which is never
//!   removed or moved;
//! - every parent id resolves to an existing node;
//! - the cache epoch is bumped on every structural or transform change, so
//!   cached world matrices are never read stale;
//! - re-parenting preserves world transforms.

use crate::element::{DrawContext, Element, ElementId, ElementKind, ElementResolver, Fill, ROOT_ID};
use crate::error::SceneError;
use crate::matrix;
use crate::snapshot::{ElementRecord, Snapshot};
use crate::storage::{Persistence, StorageResult};
use kurbo::{Affine, Point, Rect, Vec2};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Change notifications emitted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    /// Parent/child structure changed.
    HierarchyChanged,
    /// Element geometry, transform or attributes changed.
    ElementsChanged,
    SelectionChanged,
}

/// Handle returned by [`ElementStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&StoreEvent)>;

/// Inclusive point-in-rect test (kurbo's `contains` is half-open).
fn rect_contains(rect: Rect, point: Point) -> bool {
    point.x >= rect.x0 && point.x <= rect.x1 && point.y >= rect.y0 && point.y <= rect.y1
}

/// Inclusive overlap test; touching edges count.
fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && a.x1 >= b.x0 && a.y0 <= b.y1 && a.y1 >= b.y0
}

fn normalize_parent(parent: Option<&str>) -> &str {
    match parent {
        None | Some("") => ROOT_ID,
        Some(id) => id,
    }
}

fn insert_child(children: &mut Vec<ElementId>, id: ElementId, index: Option<usize>) {
    match index {
        Some(i) if i <= children.len() => children.insert(i, id),
        _ => children.push(id),
    }
}

/// Owner of the scene tree.
pub struct ElementStore {
    elements: HashMap<ElementId, Element>,
    epoch: u64,
    /// Selected ids in selection order.
    selected: Vec<ElementId>,
    /// Union of the selected elements' world AABBs.
    select_box: Option<Rect>,
    /// Marquee rectangle being dragged out by the select tool, in canvas units.
    marquee_rect: Option<Rect>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    name_counters: HashMap<ElementKind, u32>,
    persistence: Option<Persistence>,
    /// Set while rebuilding from a snapshot; suppresses events and saves.
    hydrating: bool,
}

impl std::fmt::Debug for ElementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementStore")
            .field("elements", &self.elements.len())
            .field("epoch", &self.epoch)
            .field("selected", &self.selected)
            .field("select_box", &self.select_box)
            .field("listeners", &self.listeners.len())
            .field("persistence", &self.persistence)
            .finish()
    }
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementResolver for ElementStore {
    fn resolve(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl ElementStore {
    /// Create an empty, unpersisted store.
    pub fn new() -> Self {
        let mut elements = HashMap::new();
        elements.insert(ROOT_ID.to_string(), Element::root());
        Self {
            elements,
            epoch: 0,
            selected: Vec::new(),
            select_box: None,
            marquee_rect: None,
            listeners: Vec::new(),
            next_listener: 0,
            name_counters: HashMap::new(),
            persistence: None,
            hydrating: false,
        }
    }

    /// Create a store bound to `persistence` and hydrate it from the stored
    /// snapshot. A missing or malformed snapshot yields an empty tree.
    pub fn with_persistence(persistence: Persistence) -> Self {
        let mut store = Self::new();
        store.persistence = Some(persistence);
        store.load_local();
        store
    }

    pub fn persistence(&self) -> Option<&Persistence> {
        self.persistence.as_ref()
    }

    /// Attach or detach persistence without loading or saving.
    pub fn set_persistence(&mut self, persistence: Option<Persistence>) {
        self.persistence = persistence;
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Register a listener. Listeners run synchronously, in registration
    /// order, after the mutation that triggered them has completed.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: StoreEvent) {
        if self.hydrating {
            return;
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    /// Finish a committed mutation: bump the epoch, notify, persist.
    fn commit(&mut self, events: &[StoreEvent]) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.hydrating {
            return;
        }
        for &event in events {
            self.emit(event);
        }
        self.persist();
    }

    fn persist(&self) {
        if self.hydrating {
            return;
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&self.to_snapshot()) {
                log::warn!("Failed to save scene to '{}': {}", persistence.key(), e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// The synthetic root node.
    pub fn root(&self) -> &Element {
        &self.elements[ROOT_ID]
    }

    /// Top-level elements in render order.
    pub fn root_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.root()
            .children
            .iter()
            .filter_map(|id| self.elements.get(id))
    }

    /// Child ids of `id` in render order; empty for unknown ids.
    pub fn children(&self, id: &str) -> &[ElementId] {
        self.elements
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.elements.get(id).and_then(|e| e.parent.as_deref())
    }

    /// All descendants of `id`, breadth-first, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                out.push(child.clone());
                queue.push_back(child);
            }
        }
        out
    }

    /// Ancestor ids of `id`, nearest first, ending at the root.
    pub fn ancestors(&self, id: &str) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            // The tree invariant rules out cycles; the bound keeps a corrupted
            // map from spinning forever.
            if out.len() > self.elements.len() {
                break;
            }
            out.push(parent.to_string());
            current = self.parent_of(parent);
        }
        out
    }

    /// Number of elements, not counting the root.
    pub fn len(&self) -> usize {
        self.elements.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ---------------------------------------------------------------------
    // Creation and structural mutation
    // ---------------------------------------------------------------------

    fn next_name(&mut self, kind: ElementKind) -> String {
        let counter = self.name_counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{} {}", kind.label(), counter)
    }

    /// Keep counters ahead of numbered names that came from a snapshot.
    fn observe_name(&mut self, kind: ElementKind, name: &str) {
        let number = name
            .strip_prefix(kind.label())
            .and_then(|rest| rest.strip_prefix(' '))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = number {
            let counter = self.name_counters.entry(kind).or_insert(0);
            *counter = (*counter).max(n);
        }
    }

    /// Create a detached element with a fresh id and the next auto-name for
    /// its kind (`"Rectangle 1"`, `"Rectangle 2"`, ...). Insert it with
    /// [`add`](Self::add).
    pub fn create_element(&mut self, kind: ElementKind, width: f64, height: f64) -> Element {
        let name = self.next_name(kind);
        Element::new(Uuid::new_v4().to_string(), kind, width, height).with_name(name)
    }

    /// Insert `element` under `parent` (root when `None` or empty) at
    /// `index`, appending when the index is absent or past the end.
    ///
    /// An element with an empty id gets a generated one. Its `children` are
    /// dropped: subtrees are built by adding each node.
    pub fn add(
        &mut self,
        mut element: Element,
        parent: Option<&str>,
        index: Option<usize>,
    ) -> Result<ElementId, SceneError> {
        if element.id.is_empty() {
            element.id = Uuid::new_v4().to_string();
        }
        let id = element.id.clone();
        if id == ROOT_ID || self.elements.contains_key(&id) {
            log::debug!("Rejected add of duplicate id {}", id);
            return Err(SceneError::DuplicateId(id));
        }

        let parent_id = normalize_parent(parent).to_string();
        let Some(parent) = self.elements.get_mut(&parent_id) else {
            log::debug!("Rejected add of {}: parent {} not found", id, parent_id);
            return Err(SceneError::DanglingReference(parent_id));
        };
        insert_child(&mut parent.children, id.clone(), index);

        element.parent = Some(parent_id);
        element.children.clear();
        element.selected = false;
        element.invalidate();
        self.elements.insert(id.clone(), element);

        self.commit(&[StoreEvent::HierarchyChanged, StoreEvent::ElementsChanged]);
        Ok(id)
    }

    /// Remove `id` and its whole subtree. Returns the removed ids (the node
    /// first, then its descendants breadth-first); empty for the root or an
    /// unknown id.
    pub fn remove(&mut self, id: &str) -> Vec<ElementId> {
        if id == ROOT_ID || !self.elements.contains_key(id) {
            return Vec::new();
        }

        let mut removed = vec![id.to_string()];
        removed.extend(self.descendants(id));

        if let Some(parent_id) = self.parent_of(id).map(str::to_string) {
            if let Some(parent) = self.elements.get_mut(&parent_id) {
                parent.children.retain(|child| child != id);
            }
        }
        for removed_id in &removed {
            self.elements.remove(removed_id);
        }

        let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
        let before = self.selected.len();
        self.selected.retain(|s| !removed_set.contains(s.as_str()));
        let selection_changed = self.selected.len() != before;

        self.commit(&[StoreEvent::HierarchyChanged, StoreEvent::ElementsChanged]);
        if selection_changed {
            self.select_box = self.compute_select_box();
            self.emit(StoreEvent::SelectionChanged);
        }
        removed
    }

    /// Remove every element except the root.
    pub fn clear(&mut self) {
        if self.root().children.is_empty() {
            return;
        }
        self.elements.retain(|id, _| id == ROOT_ID);
        if let Some(root) = self.elements.get_mut(ROOT_ID) {
            root.children.clear();
        }
        let had_selection = !self.selected.is_empty();
        self.selected.clear();
        self.select_box = None;
        self.commit(&[StoreEvent::HierarchyChanged, StoreEvent::ElementsChanged]);
        if had_selection {
            self.emit(StoreEvent::SelectionChanged);
        }
    }

    /// Re-parent one element, preserving its world transform.
    pub fn move_node(
        &mut self,
        id: &str,
        new_parent: Option<&str>,
        index: Option<usize>,
    ) -> Result<(), SceneError> {
        self.move_nodes(&[id], new_parent, index)
    }

    /// Re-parent several elements under `new_parent`, starting at `index`
    /// and keeping the given order. World transforms are preserved:
    /// `new_local = inverse(new_parent_world) * old_world`.
    ///
    /// Everything is validated before the first mutation, so an error leaves
    /// the tree untouched.
    pub fn move_nodes<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        new_parent: Option<&str>,
        index: Option<usize>,
    ) -> Result<(), SceneError> {
        let parent_id = normalize_parent(new_parent).to_string();
        if !self.elements.contains_key(&parent_id) {
            return Err(SceneError::DanglingReference(parent_id));
        }

        let mut moving: Vec<ElementId> = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if id == ROOT_ID {
                return Err(SceneError::RootImmovable);
            }
            if !self.elements.contains_key(id) {
                return Err(SceneError::UnknownElement(id.to_string()));
            }
            if !moving.iter().any(|m| m == id) {
                moving.push(id.to_string());
            }
        }
        if moving.is_empty() {
            return Ok(());
        }

        for id in &moving {
            if *id == parent_id || self.descendants(id).contains(&parent_id) {
                log::debug!("Rejected cyclic re-parent of {} under {}", id, parent_id);
                return Err(SceneError::CyclicReparent {
                    id: id.clone(),
                    parent: parent_id,
                });
            }
        }

        let parent_world = self.elements[&parent_id].world_matrix(self);
        let parent_inverse =
            matrix::invert(parent_world).map_err(|e| SceneError::from_matrix(e, &parent_id))?;

        // Compute every new local matrix before touching the tree.
        let plans: Vec<(ElementId, Affine)> = moving
            .into_iter()
            .map(|id| {
                let world = self.elements[&id].world_matrix(self);
                let local = matrix::multiply(parent_inverse, world);
                (id, local)
            })
            .collect();

        let mut insert_at = index;
        for (id, local) in plans {
            let old_parent = self.parent_of(&id).map(str::to_string);
            if let Some(old) = old_parent.and_then(|p| self.elements.get_mut(&p)) {
                if let Some(pos) = old.children.iter().position(|c| *c == id) {
                    old.children.remove(pos);
                    if old.id == parent_id {
                        if let Some(i) = insert_at.as_mut() {
                            if pos < *i {
                                *i -= 1;
                            }
                        }
                    }
                }
            }
            if let Some(parent) = self.elements.get_mut(&parent_id) {
                insert_child(&mut parent.children, id.clone(), insert_at);
            }
            if let Some(i) = insert_at.as_mut() {
                *i += 1;
            }
            if let Some(element) = self.elements.get_mut(&id) {
                element.parent = Some(parent_id.clone());
                element.set_local_matrix(local);
            }
        }

        self.commit(&[StoreEvent::HierarchyChanged, StoreEvent::ElementsChanged]);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Element setters
    // ---------------------------------------------------------------------

    /// Mutate one element in place. Bumps the epoch, notifies
    /// `ElementsChanged` and persists. The root cannot be updated.
    pub fn update<R>(&mut self, id: &str, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        if id == ROOT_ID {
            return None;
        }
        let element = self.elements.get_mut(id)?;
        let result = f(element);
        element.invalidate();
        let selected = element.selected;

        self.commit(&[StoreEvent::ElementsChanged]);
        if selected {
            self.select_box = self.compute_select_box();
        }
        Some(result)
    }

    pub fn set_matrix(&mut self, id: &str, matrix: Affine) -> bool {
        self.update(id, |e| e.set_local_matrix(matrix)).is_some()
    }

    /// Set the translation part of the local matrix.
    pub fn set_position(&mut self, id: &str, x: f64, y: f64) -> bool {
        self.update(id, |e| e.set_translation(x, y)).is_some()
    }

    pub fn set_size(&mut self, id: &str, width: f64, height: f64) -> bool {
        self.update(id, |e| e.set_size(width, height)).is_some()
    }

    pub fn set_visible(&mut self, id: &str, visible: bool) -> bool {
        self.update(id, |e| e.set_visible(visible)).is_some()
    }

    pub fn set_name(&mut self, id: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        self.update(id, |e| e.set_name(name)).is_some()
    }

    pub fn set_fill(&mut self, id: &str, fill: Option<Fill>) -> bool {
        self.update(id, |e| e.set_fill(fill)).is_some()
    }

    /// Translate one element in its parent's coordinate system.
    pub fn move_element(&mut self, id: &str, dx: f64, dy: f64) -> bool {
        self.update(id, |e| e.move_by(dx, dy)).is_some()
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    pub fn selected_ids(&self) -> &[ElementId] {
        &self.selected
    }

    pub fn selected_elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.selected.iter().filter_map(|id| self.elements.get(id))
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    /// Current selection outline (union of selected world AABBs).
    pub fn select_box(&self) -> Option<Rect> {
        self.select_box
    }

    /// Selection without emitting; grows the selection box.
    fn select_quiet(&mut self, id: &str) -> bool {
        if id == ROOT_ID || self.is_selected(id) {
            return false;
        }
        let Some(aabb) = self.elements.get(id).map(|e| e.world_aabb(self)) else {
            return false;
        };
        if let Some(element) = self.elements.get_mut(id) {
            element.selected = true;
        }
        self.selected.push(id.to_string());
        self.select_box = Some(match self.select_box {
            Some(b) => b.union(aabb),
            None => aabb,
        });
        true
    }

    fn clear_selection_quiet(&mut self) -> bool {
        if self.selected.is_empty() && self.select_box.is_none() {
            return false;
        }
        for id in std::mem::take(&mut self.selected) {
            if let Some(element) = self.elements.get_mut(&id) {
                element.selected = false;
            }
        }
        self.select_box = None;
        true
    }

    /// Replace the selection with `id`.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.contains(id) || id == ROOT_ID {
            return false;
        }
        self.clear_selection_quiet();
        self.select_quiet(id);
        self.emit(StoreEvent::SelectionChanged);
        true
    }

    /// Add `id` to the selection. Returns false if it was already selected
    /// or does not exist.
    pub fn add_to_selection(&mut self, id: &str) -> bool {
        let added = self.select_quiet(id);
        if added {
            self.emit(StoreEvent::SelectionChanged);
        }
        added
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        let Some(pos) = self.selected.iter().position(|s| s == id) else {
            return false;
        };
        self.selected.remove(pos);
        if let Some(element) = self.elements.get_mut(id) {
            element.selected = false;
        }
        self.select_box = self.compute_select_box();
        self.emit(StoreEvent::SelectionChanged);
        true
    }

    pub fn clear_selection(&mut self) {
        if self.clear_selection_quiet() {
            self.emit(StoreEvent::SelectionChanged);
        }
    }

    /// Drop the selection together with its outline.
    pub fn clear_selected_box(&mut self) {
        self.clear_selection();
    }

    fn compute_select_box(&self) -> Option<Rect> {
        self.selected_elements()
            .map(|e| e.world_aabb(self))
            .reduce(|acc, aabb| acc.union(aabb))
    }

    /// Recompute the selection box from the selected elements' current
    /// AABBs and return it.
    pub fn calc_select_box(&mut self) -> Option<Rect> {
        self.select_box = self.compute_select_box();
        self.select_box
    }

    /// Marquee rectangle to display while area-selecting.
    pub fn set_marquee_rect(&mut self, rect: Option<Rect>) {
        self.marquee_rect = rect.map(|r| r.abs());
    }

    pub fn marquee_rect(&self) -> Option<Rect> {
        self.marquee_rect
    }

    // ---------------------------------------------------------------------
    // Hit-testing
    // ---------------------------------------------------------------------

    fn hit_subtree(&self, id: &str, point: Point) -> Option<ElementId> {
        let element = self.elements.get(id)?;
        if !element.is_visible() {
            return None;
        }
        element
            .children
            .iter()
            .rev()
            .find_map(|child| self.hit_subtree(child, point))
            .or_else(|| element.hit_test(point, self).then(|| element.id.clone()))
    }

    /// Topmost visible element under `point` (canvas units).
    ///
    /// Elements are tested in reverse render order: later siblings before
    /// earlier ones and children before their parent.
    pub fn hit_test(&self, point: Point) -> Option<ElementId> {
        self.root()
            .children
            .iter()
            .rev()
            .find_map(|child| self.hit_subtree(child, point))
    }

    /// Whether `point` lies inside the current selection box.
    pub fn hit_selection(&self, point: Point) -> bool {
        self.select_box.is_some_and(|b| rect_contains(b, point))
    }

    fn collect_marquee(&self, id: &str, query: Rect, hits: &mut Vec<ElementId>) {
        for child_id in self.children(id) {
            let Some(child) = self.elements.get(child_id) else {
                continue;
            };
            if !child.is_visible() {
                continue;
            }
            if rects_intersect(child.world_aabb(self), query) {
                hits.push(child_id.clone());
            }
            self.collect_marquee(child_id, query, hits);
        }
    }

    /// Add every visible element whose world AABB intersects the box to the
    /// selection, growing the selection box. Returns whether anything
    /// matched.
    pub fn select_by_marquee(&mut self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> bool {
        let query = Rect::new(min_x, min_y, max_x, max_y).abs();
        let mut hits = Vec::new();
        self.collect_marquee(ROOT_ID, query, &mut hits);
        if hits.is_empty() {
            return false;
        }

        let mut changed = false;
        for id in &hits {
            changed |= self.select_quiet(id);
        }
        if changed {
            self.emit(StoreEvent::SelectionChanged);
        }
        true
    }

    fn accepts_drop(&self, id: &str, point: Point, excluded: &HashSet<ElementId>) -> bool {
        if excluded.contains(id) {
            return false;
        }
        self.elements
            .get(id)
            .is_some_and(|e| e.is_visible() && rect_contains(e.world_aabb(self), point))
    }

    fn deepest_container(&self, id: &str, point: Point, excluded: &HashSet<ElementId>) -> Option<ElementId> {
        self.children(id)
            .iter()
            .rev()
            .find(|child| self.accepts_drop(child, point, excluded))
            .map(|child| {
                self.deepest_container(child, point, excluded)
                    .unwrap_or_else(|| child.clone())
            })
    }

    /// Selected ids without a selected ancestor, in selection order.
    fn top_level_selection(&self) -> Vec<ElementId> {
        let selected: HashSet<&str> = self.selected.iter().map(String::as_str).collect();
        self.selected
            .iter()
            .filter(|id| {
                !self
                    .ancestors(id)
                    .iter()
                    .any(|a| selected.contains(a.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Find the drop target under `point` while dragging the selection, and
    /// re-parent the selection into it when it differs from the current
    /// parent.
    ///
    /// The selection and its descendants are never targets. The current
    /// parent wins while it still contains the point; otherwise the deepest
    /// containing element found depth-first from the root is used, falling
    /// back to the root itself. Returns the resulting parent, or `None` when
    /// nothing is selected.
    pub fn hit_top_exclude_selected(&mut self, point: Point) -> Option<ElementId> {
        let tops = self.top_level_selection();
        let first = tops.first()?.clone();

        let mut excluded: HashSet<ElementId> = self.selected.iter().cloned().collect();
        for id in &self.selected {
            excluded.extend(self.descendants(id));
        }

        let current_parent = self.parent_of(&first).unwrap_or(ROOT_ID).to_string();
        let target = if current_parent != ROOT_ID && self.accepts_drop(&current_parent, point, &excluded) {
            current_parent.clone()
        } else {
            self.deepest_container(ROOT_ID, point, &excluded)
                .unwrap_or_else(|| ROOT_ID.to_string())
        };

        if target != current_parent {
            if let Err(e) = self.move_nodes(tops.as_slice(), Some(&target), None) {
                log::debug!("Drop into {} rejected: {}", target, e);
                return Some(current_parent);
            }
            log::debug!("Re-parented {} element(s) into {}", tops.len(), target);
            self.select_box = self.compute_select_box();
        }
        Some(target)
    }

    /// Move the selection by `(dx, dy)` canvas units.
    ///
    /// Elements with a selected ancestor ride along with it and are not
    /// moved twice. Each delta is converted into the element's parent space,
    /// so nested elements under scaled or rotated parents follow the
    /// pointer exactly. The selection box is translated by the same delta
    /// instead of recomputed; call [`calc_select_box`](Self::calc_select_box)
    /// once the drag ends.
    pub fn move_selected_element(&mut self, dx: f64, dy: f64) {
        if self.selected.is_empty() {
            return;
        }
        let delta = Vec2::new(dx, dy);

        let mut moves: Vec<(ElementId, Vec2)> = Vec::new();
        for id in self.top_level_selection() {
            let parent_inverse = match self.parent_of(&id).filter(|p| *p != ROOT_ID) {
                Some(parent_id) => self
                    .elements
                    .get(parent_id)
                    .and_then(|p| p.inverse_world_matrix(self)),
                None => Some(Affine::IDENTITY),
            };
            match parent_inverse {
                Some(inverse) => moves.push((id, matrix::transform_vector(inverse, delta))),
                None => log::debug!("Skipping move of {}: parent not invertible", id),
            }
        }

        if moves.is_empty() {
            return;
        }
        for (id, local_delta) in moves {
            if let Some(element) = self.elements.get_mut(&id) {
                element.move_by(local_delta.x, local_delta.y);
            }
        }
        self.select_box = self.select_box.map(|b| b + delta);
        self.commit(&[StoreEvent::ElementsChanged]);
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    /// Draw every top-level element (and its subtree) in render order.
    pub fn render<C: DrawContext + ?Sized>(&self, ctx: &mut C) {
        for element in self.root_elements() {
            element.render(ctx, self);
        }
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    fn record(&self, id: &str) -> Option<ElementRecord> {
        let element = self.elements.get(id)?;
        Some(ElementRecord {
            id: element.id.clone(),
            name: element.name().to_string(),
            kind: element.kind(),
            width: element.width(),
            height: element.height(),
            matrix: element.local_matrix().as_coeffs(),
            fill: element.fill().cloned(),
            parent_id: element.parent.clone().filter(|p| p != ROOT_ID),
            visible: element.is_visible(),
            children: element
                .children
                .iter()
                .filter_map(|child| self.record(child))
                .collect(),
        })
    }

    /// Serialize the tree below the root.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.root()
                .children
                .iter()
                .filter_map(|id| self.record(id))
                .collect(),
        )
    }

    fn hydrate_record(&mut self, record: &ElementRecord, parent: &str) {
        let mut element = Element::new(record.id.clone(), record.kind, record.width, record.height)
            .with_name(record.name.clone())
            .with_matrix(Affine::new(record.matrix))
            .with_visible(record.visible);
        element.set_fill(record.fill.clone());

        match self.add(element, Some(parent), None) {
            Ok(id) => {
                self.observe_name(record.kind, &record.name);
                for child in &record.children {
                    self.hydrate_record(child, &id);
                }
            }
            Err(e) => log::warn!("Skipping snapshot record {}: {}", record.id, e),
        }
    }

    /// Replace the whole tree with `snapshot` without notifying or saving
    /// during the rebuild. Nesting in `children` is authoritative; record
    /// `parentId` fields are informational.
    fn hydrate(&mut self, snapshot: Option<&Snapshot>) {
        let had_selection = !self.selected.is_empty();
        self.hydrating = true;
        self.elements.clear();
        self.elements.insert(ROOT_ID.to_string(), Element::root());
        self.selected.clear();
        self.select_box = None;
        self.marquee_rect = None;
        if let Some(snapshot) = snapshot {
            for record in &snapshot.data {
                self.hydrate_record(record, ROOT_ID);
            }
        }
        self.hydrating = false;
        self.epoch = self.epoch.wrapping_add(1);

        self.emit(StoreEvent::HierarchyChanged);
        self.emit(StoreEvent::ElementsChanged);
        if had_selection {
            self.emit(StoreEvent::SelectionChanged);
        }
    }

    /// Replace the tree with an imported snapshot and persist the result.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        self.hydrate(Some(snapshot));
        self.persist();
    }

    /// Write the current tree to the attached persistence. Without
    /// persistence this does nothing.
    pub fn save_local(&self) -> StorageResult<()> {
        match &self.persistence {
            Some(persistence) => persistence.save(&self.to_snapshot()),
            None => {
                log::debug!("save_local without persistence; nothing to do");
                Ok(())
            }
        }
    }

    /// Replace the tree with the persisted snapshot. Anything missing or
    /// malformed leaves an empty tree. Returns whether a snapshot was loaded.
    pub fn load_local(&mut self) -> bool {
        let loaded = match &self.persistence {
            None => None,
            Some(persistence) => match persistence.load_raw() {
                Ok(None) => {
                    log::info!("No stored scene under '{}'", persistence.key());
                    None
                }
                Ok(Some(json)) => match Snapshot::from_json(&json) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        log::warn!("Discarding stored scene '{}': {}", persistence.key(), e);
                        None
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read stored scene '{}': {}", persistence.key(), e);
                    None
                }
            },
        };

        self.hydrate(loaded.as_ref());
        if loaded.is_some() {
            log::info!("Loaded {} element(s) from stored scene", self.len());
        }
        loaded.is_some()
    }
}
