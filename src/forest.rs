//! The forest stores a hierarchy of nodes in dense parallel arrays.
//!
//! Each node is identified durably by its [`Key`]
//! and addressed transiently by its [`NodeIndex`].
//! Removal fills the vacated slot with the last node,
//! so indices of other nodes may change after any structural edit.
//!
//! The forest has no internal synchronization.
//! A single thread performs all structural edits between batches,
//! while any number of threads may traverse a `&Forest` concurrently
//! as long as no edit is in flight.

use std::collections::HashMap;
use std::{iter, mem};

use bitvec::prelude::BitVec;

use crate::authority::Authority;
use crate::Key;

mod index;
pub use index::NodeIndex;

mod order;
pub use order::correct_positions;

mod traverse;
pub use traverse::Descendants;

mod validate;
pub use validate::ValidationError;

#[cfg(test)]
mod tests;

/// Per-node data stored alongside the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeData<T> {
    /// Whether the node itself is active, regardless of its ancestors.
    pub active:    bool,
    /// Whether the node itself is static, regardless of its ancestors.
    pub is_static: bool,
    /// An opaque transform handle.
    /// Its lifecycle is owned by the caller; the forest only relocates it.
    pub transform: T,
}

/// A successful reparent reported by [`Forest::change_parents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChange {
    /// The reparented node.
    pub key:        Key,
    /// The parent before the change, `None` if the node was a root.
    pub old_parent: Option<Key>,
    /// The parent after the change, `None` if the node is now a root.
    pub new_parent: Option<Key>,
}

/// Return value of [`Forest::change_parents`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParentChanges {
    /// Edits that were applied.
    pub succeeded: Vec<ParentChange>,
    /// Nodes that could not be reparented.
    ///
    /// A key is listed here either because the node itself is not in the forest,
    /// or because its new parent is not in the forest.
    /// In the latter case the node is left as a root.
    /// The forest cannot tell whether the node was deleted
    /// or whether its parent has simply not been delivered yet;
    /// the caller must check the authority to decide.
    pub failed:    Vec<Key>,
}

/// A dense, swap-remove-able forest keyed by stable ids.
#[derive(Debug)]
pub struct Forest<T = ()> {
    /// The key stored at each index.
    keys:         Vec<Key>,
    /// The parent of each index, `None` for roots.
    parents:      Vec<Option<NodeIndex>>,
    /// The transform handle of each index.
    transforms:   Vec<T>,
    /// The active bit of each index, not considering ancestors.
    active:       BitVec,
    /// The static bit of each index, not considering ancestors.
    statics:      BitVec,
    /// The ordered children of each index.
    ///
    /// `children[p].contains(c)` if and only if `parents[c] == Some(p)`.
    children:     Vec<Vec<NodeIndex>>,
    /// `key_to_index[keys[i]] == i` for every valid `i`.
    key_to_index: HashMap<Key, NodeIndex>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self { Self::with_capacity(0) }
}

impl<T> Forest<T> {
    /// Creates an empty forest.
    pub fn new() -> Self { Self::default() }

    /// Creates an empty forest with space for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys:         Vec::with_capacity(capacity),
            parents:      Vec::with_capacity(capacity),
            transforms:   Vec::with_capacity(capacity),
            active:       BitVec::with_capacity(capacity),
            statics:      BitVec::with_capacity(capacity),
            children:     Vec::with_capacity(capacity),
            key_to_index: HashMap::with_capacity(capacity),
        }
    }

    /// Returns the number of nodes in the forest.
    pub fn len(&self) -> usize { self.keys.len() }

    /// Returns `true` if the forest has no nodes.
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Returns `true` if a node with the key exists.
    pub fn contains(&self, key: Key) -> bool { self.key_to_index.contains_key(&key) }

    /// Returns the current index of a key.
    pub fn index_of(&self, key: Key) -> Option<NodeIndex> { self.key_to_index.get(&key).copied() }

    /// Returns the keys of all nodes in index order.
    pub fn keys(&self) -> &[Key] { &self.keys }

    /// Returns the key stored at an index.
    pub fn key_at(&self, index: NodeIndex) -> Key {
        *self.keys.get(index.0).expect("invalid node index")
    }

    /// Returns the parent of a node, or `None` if it is a root.
    pub fn parent_of(&self, index: NodeIndex) -> Option<NodeIndex> {
        *self.parents.get(index.0).expect("invalid node index")
    }

    /// Returns the direct children of a node in sibling order.
    pub fn children_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.children.get(index.0).expect("invalid node index")
    }

    /// Returns the transform handle of a node.
    pub fn transform(&self, index: NodeIndex) -> &T {
        self.transforms.get(index.0).expect("invalid node index")
    }

    /// Returns all root nodes in index order.
    pub fn roots(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| NodeIndex(index))
    }

    /// Replaces the per-node data of a node without changing the structure.
    ///
    /// Returns the old transform handle, or `None` if the key is not in the forest.
    pub fn set_node_data(&mut self, key: Key, data: NodeData<T>) -> Option<T> {
        let index = self.index_of(key)?;
        self.active.set(index.0, data.active);
        self.statics.set(index.0, data.is_static);
        let transform = self.transforms.get_mut(index.0).expect("key_to_index is out of bounds");
        Some(mem::replace(transform, data.transform))
    }

    /// Returns `true` if the node and all its ancestors are active.
    pub fn is_active(&self, index: NodeIndex) -> bool {
        self.ancestors_inclusive(index).all(|index| self.active[index.0])
    }

    /// Returns `true` if the node or any of its ancestors is static.
    pub fn is_static(&self, index: NodeIndex) -> bool {
        self.ancestors_inclusive(index).any(|index| self.statics[index.0])
    }

    fn ancestors_inclusive(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        iter::successors(Some(index), |&index| self.parent_of(index))
    }

    /// Iterates over all descendants of a node in depth-first pre-order,
    /// not including the node itself.
    pub fn descendants(&self, index: NodeIndex) -> Descendants<'_, T> {
        Descendants::new(self, index)
    }

    /// Iterates over the keys of all descendants of a node,
    /// or returns `None` if the key is not in the forest.
    pub fn descendants_of(&self, key: Key) -> Option<impl Iterator<Item = Key> + '_> {
        let index = self.index_of(key)?;
        Some(self.descendants(index).map(|index| self.key_at(index)))
    }

    /// Inserts a single node.
    ///
    /// If `parent` is not in the forest, the node becomes a root.
    /// Parents must be inserted before their children;
    /// this is not checked.
    ///
    /// Returns `false` without any changes if `key` is already in the forest.
    pub fn insert(&mut self, key: Key, parent: Option<Key>, data: NodeData<T>) -> bool {
        if self.contains(key) {
            return false;
        }

        let index = NodeIndex(self.keys.len());
        let parent_index = parent.and_then(|parent| self.index_of(parent));

        self.keys.push(key);
        self.parents.push(None);
        self.transforms.push(data.transform);
        self.active.push(data.active);
        self.statics.push(data.is_static);
        self.children.push(Vec::new());
        self.key_to_index.insert(key, index);

        if let Some(parent_index) = parent_index {
            self.attach(index, parent_index);
        }

        log::trace!("insert {key:?} at {index:?} under {parent:?}");
        true
    }

    /// Inserts an object from the authority together with all its descendants.
    ///
    /// Nodes are inserted in pre-order, so every parent precedes its children.
    /// If a node is already in the forest, neither it nor its descendants are inserted.
    /// The keys of inserted nodes are appended to `out` in insertion order.
    ///
    /// Returns the number of inserted nodes.
    pub fn insert_subtree<A: Authority<Transform = T>>(
        &mut self,
        authority: &A,
        root: A::Handle,
        mut out: Option<&mut Vec<Key>>,
    ) -> usize {
        let root_parent = authority.parent_of(root).map(|parent| authority.key_of(parent));
        let mut stack = vec![(root, root_parent)];
        let mut children = Vec::new();
        let mut inserted = 0;

        while let Some((handle, parent)) = stack.pop() {
            let key = authority.key_of(handle);
            if !self.insert(key, parent, authority.node_data(handle)) {
                continue;
            }

            inserted += 1;
            if let Some(out) = out.as_deref_mut() {
                out.push(key);
            }

            children.clear();
            authority.children_of(handle, &mut children);
            // reversed so that the first child is popped first
            stack.extend(children.iter().rev().map(|&child| (child, Some(key))));
        }

        inserted
    }

    /// Removes the nodes with the given keys together with all their descendants.
    ///
    /// Missing keys are ignored.
    /// Returns the keys of all removed nodes.
    pub fn remove(&mut self, keys: impl IntoIterator<Item = Key>) -> Vec<Key> {
        let mut removed = Vec::new();
        let mut stack = Vec::new();

        for key in keys {
            stack.push(key);

            while let Some(key) = stack.pop() {
                let index = match self.index_of(key) {
                    Some(index) => index,
                    None => continue,
                };

                self.detach(index);

                let children = mem::take(
                    self.children.get_mut(index.0).expect("key_to_index is out of bounds"),
                );
                for &child in children.iter().rev() {
                    self.parents[child.0] = None;
                    stack.push(self.keys[child.0]);
                }

                self.swap_remove(index);
                removed.push(key);
            }
        }

        log::trace!("removed {removed:?}");
        removed
    }

    /// Moves the last node into the slot of a detached, childless node at `index`.
    ///
    /// The moved node requires three patches, all performed here:
    /// its entry in `key_to_index`, its entry in the child list of its parent,
    /// and the parent pointers of its children.
    fn swap_remove(&mut self, index: NodeIndex) {
        debug_assert!(self.parents[index.0].is_none(), "node must be detached before removal");
        debug_assert!(self.children[index.0].is_empty(), "children must be evicted before removal");

        let last = NodeIndex(self.keys.len() - 1);

        let key = self.keys.swap_remove(index.0);
        self.parents.swap_remove(index.0);
        self.transforms.swap_remove(index.0);
        self.active.swap_remove(index.0);
        self.statics.swap_remove(index.0);
        self.children.swap_remove(index.0);

        let unmapped = self.key_to_index.remove(&key);
        debug_assert_eq!(unmapped, Some(index), "key_to_index is out of sync");

        if index == last {
            return;
        }

        let moved = self.keys[index.0];
        *self.key_to_index.get_mut(&moved).expect("moved key is missing from key_to_index") = index;

        if let Some(parent) = self.parents[index.0] {
            let slot = self.children[parent.0]
                .iter_mut()
                .find(|child| **child == last)
                .expect("moved node is missing from the child list of its parent");
            *slot = index;
        }

        for &child in &self.children[index.0] {
            self.parents[child.0] = Some(index);
        }
    }

    /// Appends `index` to the children of `parent`.
    fn attach(&mut self, index: NodeIndex, parent: NodeIndex) {
        self.parents[index.0] = Some(parent);
        self.children.get_mut(parent.0).expect("invalid parent index").push(index);
    }

    /// Unlinks a node from its parent, preserving the order of the remaining siblings.
    ///
    /// Returns the old parent.
    fn detach(&mut self, index: NodeIndex) -> Option<NodeIndex> {
        let parent = self.parents[index.0].take()?;

        let siblings = self.children.get_mut(parent.0).expect("invalid parent index");
        let position = siblings
            .iter()
            .position(|&child| child == index)
            .expect("node is missing from the child list of its parent");
        siblings.remove(position);

        Some(parent)
    }

    /// Applies a list of `(key, new_parent)` edits in order.
    ///
    /// A `new_parent` of `None` turns the node into a root.
    /// See [`ParentChanges::failed`] for the failure cases.
    /// Moving a node under itself or one of its descendants is also a failure,
    /// in which case the node keeps its old parent.
    pub fn change_parents(
        &mut self,
        edits: impl IntoIterator<Item = (Key, Option<Key>)>,
    ) -> ParentChanges {
        let mut changes = ParentChanges::default();

        for (key, new_parent) in edits {
            let index = match self.index_of(key) {
                Some(index) => index,
                None => {
                    changes.failed.push(key);
                    continue;
                }
            };

            let new_parent_index = new_parent.and_then(|parent| self.index_of(parent));
            if let Some(new_parent_index) = new_parent_index {
                if self.ancestors_inclusive(new_parent_index).any(|ancestor| ancestor == index) {
                    log::error!("Cannot move {key:?} under its own descendant {new_parent:?}");
                    changes.failed.push(key);
                    continue;
                }
            }

            let old_parent = self.detach(index).map(|parent| self.key_at(parent));

            match (new_parent, new_parent_index) {
                (_, Some(new_parent_index)) => {
                    self.attach(index, new_parent_index);
                    changes.succeeded.push(ParentChange { key, old_parent, new_parent });
                }
                (None, None) => {
                    changes.succeeded.push(ParentChange { key, old_parent, new_parent: None });
                }
                (Some(_), None) => {
                    log::trace!("{key:?} detached from {old_parent:?}, {new_parent:?} is unknown");
                    changes.failed.push(key);
                }
            }
        }

        changes
    }

    /// Reorders the children of `parent` according to the sibling positions reported for them.
    ///
    /// The reported positions are corrected with [`correct_positions`] first.
    /// Returns `false` if `parent` is not in the forest.
    pub fn resync_child_order(
        &mut self,
        parent: Key,
        mut sibling_index: impl FnMut(Key) -> i32,
    ) -> bool {
        let parent_index = match self.index_of(parent) {
            Some(index) => index,
            None => return false,
        };

        let keys = &self.keys;
        let children = self.children.get_mut(parent_index.0).expect("key_to_index is out of bounds");
        let reported: Vec<i32> = children.iter().map(|&child| sibling_index(keys[child.0])).collect();
        let positions = correct_positions(&reported);

        let mut reordered: Vec<Option<NodeIndex>> = vec![None; children.len()];
        let mut misplaced = Vec::new();
        for (original, (&child, &position)) in children.iter().zip(&positions).enumerate() {
            match reordered.get_mut(position) {
                Some(slot) if slot.is_none() => *slot = Some(child),
                _ => {
                    log::error!(
                        "Corrected sibling position {position} of {:?} under {parent:?} is out of \
                         range for {} children",
                        keys[child.0],
                        children.len(),
                    );
                    misplaced.push((original, child));
                }
            }
        }

        for (original, child) in misplaced {
            let slot = match reordered.get(original) {
                Some(None) => original,
                _ => reordered
                    .iter()
                    .position(Option::is_none)
                    .expect("each misplaced child leaves one free slot"),
            };
            reordered[slot] = Some(child);
        }

        *children = reordered.into_iter().map(|child| child.expect("all slots are filled")).collect();
        true
    }
}
