use std::collections::BTreeMap;

use xias::Xias;

use super::SCOPE;
use crate::authority::Authority;
use crate::forest::NodeData;
use crate::{Key, ScopeId};

/// A node in a [`Scene`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub parent:    Option<Key>,
    pub scope:     ScopeId,
    pub sibling:   i32,
    pub active:    bool,
    pub is_static: bool,
}

/// An in-memory authority.
///
/// The key of each node doubles as its handle and its transform handle.
#[derive(Debug, Default, Clone)]
pub struct Scene {
    nodes: BTreeMap<Key, SceneNode>,
}

impl Scene {
    pub fn new() -> Self { Self::default() }

    /// Builds a scene from `(key, parent)` rows.
    /// Siblings are numbered in row order.
    pub fn from_rows(rows: &[(i32, Option<i32>)]) -> Self {
        let mut scene = Self::new();
        for &(key, parent) in rows {
            scene.add(key, parent);
        }
        scene
    }

    /// Adds an active, non-static node as the last child of `parent`.
    pub fn add(&mut self, key: i32, parent: Option<i32>) -> &mut Self {
        let parent = parent.map(Key);
        let sibling = self.child_count(parent);
        let node = SceneNode { parent, scope: SCOPE, sibling, active: true, is_static: false };
        let old = self.nodes.insert(Key(key), node);
        assert!(old.is_none(), "{key} is added twice");
        self
    }

    /// Moves a node to the end of the children of `parent`,
    /// renumbering its old siblings.
    pub fn reparent(&mut self, key: i32, parent: Option<i32>) -> &mut Self {
        let key = Key(key);
        let old = self.nodes.get(&key).expect("reparenting unknown node").clone();
        for node in self.nodes.values_mut() {
            if node.parent == old.parent && node.sibling > old.sibling {
                node.sibling -= 1;
            }
        }

        let parent = parent.map(Key);
        let mut sibling = self.child_count(parent);
        if parent == old.parent {
            sibling -= 1;
        }
        let node = self.nodes.get_mut(&key).expect("checked above");
        node.parent = parent;
        node.sibling = sibling;
        self
    }

    /// Deletes a node and all its descendants.
    pub fn delete(&mut self, key: i32) -> &mut Self {
        let mut stack = vec![Key(key)];
        while let Some(key) = stack.pop() {
            self.nodes.remove(&key);
            stack.extend(
                self.nodes.iter().filter(|(_, node)| node.parent == Some(key)).map(|(&key, _)| key),
            );
        }
        self
    }

    /// Overrides the reported sibling position without touching other siblings.
    pub fn set_sibling(&mut self, key: i32, sibling: i32) -> &mut Self {
        self.node_mut(key).sibling = sibling;
        self
    }

    pub fn set_active(&mut self, key: i32, active: bool) -> &mut Self {
        self.node_mut(key).active = active;
        self
    }

    pub fn set_static(&mut self, key: i32, is_static: bool) -> &mut Self {
        self.node_mut(key).is_static = is_static;
        self
    }

    pub fn set_scope(&mut self, key: i32, scope: ScopeId) -> &mut Self {
        self.node_mut(key).scope = scope;
        self
    }

    pub fn node(&self, key: i32) -> Option<&SceneNode> { self.nodes.get(&Key(key)) }

    pub fn len(&self) -> usize { self.nodes.len() }

    fn node_mut(&mut self, key: i32) -> &mut SceneNode {
        self.nodes.get_mut(&Key(key)).expect("unknown scene node")
    }

    fn child_count(&self, parent: Option<Key>) -> i32 {
        let count = self.nodes.values().filter(|node| node.parent == parent).count();
        count.small_int::<u32>().homosign()
    }

    fn sorted_by_sibling(&self, mut keys: Vec<Key>, out: &mut Vec<Key>) {
        keys.sort_by_key(|key| (self.nodes[key].sibling, *key));
        out.extend(keys);
    }
}

impl Authority for Scene {
    type Handle = Key;
    type Transform = i32;

    fn resolve(&self, key: Key) -> Option<Key> { self.nodes.contains_key(&key).then_some(key) }

    fn scope_of(&self, handle: Key) -> ScopeId { self.nodes[&handle].scope }

    fn key_of(&self, handle: Key) -> Key { handle }

    fn parent_of(&self, handle: Key) -> Option<Key> {
        self.nodes[&handle].parent.filter(|parent| self.nodes.contains_key(parent))
    }

    fn children_of(&self, handle: Key, out: &mut Vec<Key>) {
        let children = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent == Some(handle))
            .map(|(&key, _)| key)
            .collect();
        self.sorted_by_sibling(children, out);
    }

    fn sibling_index(&self, handle: Key) -> i32 { self.nodes[&handle].sibling }

    fn node_data(&self, handle: Key) -> NodeData<i32> {
        let node = &self.nodes[&handle];
        NodeData { active: node.active, is_static: node.is_static, transform: handle.0 }
    }

    fn roots(&self, scope: ScopeId, out: &mut Vec<Key>) {
        let roots = self
            .nodes
            .iter()
            .filter(|(_, node)| node.scope == scope)
            .filter(|(_, node)| match node.parent {
                Some(parent) => !self.nodes.contains_key(&parent),
                None => true,
            })
            .map(|(&key, _)| key)
            .collect();
        self.sorted_by_sibling(roots, out);
    }
}
