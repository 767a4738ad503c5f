//! The dependency index records which keys depend on which other keys,
//! so that a change to one key can invalidate everything downstream of it.
//!
//! Keys are arbitrary: they may refer to forest nodes, external assets or sub-objects.
//! Edges have multiset semantics.
//! Registering the same edge twice stores it twice,
//! but clearing a dependent drops every occurrence at once.

use std::collections::{hash_map, HashMap};

use indexmap::IndexSet;
use itertools::Itertools;

use crate::Key;


/// A bidirectional multimap between dependents and the keys they depend on.
#[derive(Debug, Default, Clone)]
pub struct DependencyIndex {
    /// If `dependents[b].contains(a)`, `a` depends on `b`.
    /// This means `a` must be invalidated when `b` changes.
    dependents:   HashMap<Key, Vec<Key>>,
    /// If `dependencies[a].contains(b)`, `a` depends on `b`.
    ///
    /// Every occurrence in `dependencies` has a matching occurrence in `dependents`.
    dependencies: HashMap<Key, Vec<Key>>,
}

impl DependencyIndex {
    /// Creates an empty index.
    pub fn new() -> Self { Self::default() }

    /// Records that `dependent` depends on `depends_on`.
    pub fn add_dependency(&mut self, dependent: Key, depends_on: Key) {
        self.dependents.entry(depends_on).or_default().push(dependent);
        self.dependencies.entry(dependent).or_default().push(depends_on);
    }

    /// Removes all edges registered by each of the given dependents.
    ///
    /// This must be called before registering fresh edges for a reconverted dependent,
    /// otherwise stale edges accumulate.
    /// Edges where the keys are the *target* of a dependency are not affected.
    pub fn clear_dependencies(&mut self, dependents: impl IntoIterator<Item = Key>) {
        for dependent in dependents {
            let targets = match self.dependencies.remove(&dependent) {
                Some(targets) => targets,
                None => continue,
            };

            for target in targets.into_iter().unique() {
                if let hash_map::Entry::Occupied(mut entry) = self.dependents.entry(target) {
                    entry.get_mut().retain(|&key| key != dependent);
                    if entry.get().is_empty() {
                        entry.remove();
                    }
                }
            }
        }
    }

    /// Moves every edge targeting `old` to target `new` instead.
    ///
    /// This is used when the identity of an object changes
    /// but its dependents should not need to register again.
    /// Edges registered *by* `old` are left untouched.
    pub fn remap_key(&mut self, old: Key, new: Key) {
        if old == new {
            return;
        }

        let affected = match self.dependents.get(&old) {
            Some(affected) => affected.clone(),
            None => return,
        };

        for &dependent in affected.iter().unique() {
            let targets = self
                .dependencies
                .get_mut(&dependent)
                .expect("dependents and dependencies are out of sync");
            for target in targets.iter_mut().filter(|target| **target == old) {
                *target = new;
            }
        }

        self.dependents.entry(new).or_default().extend(affected);
        self.dependents.remove(&old);
    }

    /// Returns the keys that directly depend on `key`, with duplicates.
    pub fn dependents_of(&self, key: Key) -> &[Key] {
        self.dependents.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the keys that `key` directly depends on, with duplicates.
    pub fn dependencies_of(&self, key: Key) -> &[Key] {
        self.dependencies.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if `key` appears on either side of any edge.
    pub fn contains(&self, key: Key) -> bool {
        self.dependents.contains_key(&key) || self.dependencies.contains_key(&key)
    }

    /// Returns the number of registered edges, counting duplicates.
    pub fn edge_count(&self) -> usize { self.dependencies.values().map(Vec::len).sum() }

    /// Returns `true` if no edges are registered.
    pub fn is_empty(&self) -> bool { self.dependencies.is_empty() }

    /// Returns every key reachable from `seeds` by following "is a dependent of" edges
    /// zero or more times.
    ///
    /// Seeds are included in the result.
    /// Each key is visited once, so cycles are safe.
    /// The result is ordered breadth-first from the seeds.
    pub fn transitive_dependents(&self, seeds: impl IntoIterator<Item = Key>) -> IndexSet<Key> {
        let mut visited: IndexSet<Key> = seeds.into_iter().collect();

        let mut cursor = 0;
        while cursor < visited.len() {
            let key = visited[cursor];
            cursor += 1;

            if let Some(dependents) = self.dependents.get(&key) {
                visited.extend(dependents.iter().copied());
            }
        }

        visited
    }

    /// Returns the keys that directly depend on any of `seeds`.
    ///
    /// Seeds are only included if they depend on another seed.
    pub fn direct_dependents(&self, seeds: impl IntoIterator<Item = Key>) -> IndexSet<Key> {
        let mut out = Vec::new();
        self.direct_dependents_into(seeds, &mut out);
        out.into_iter().collect()
    }

    /// Appends the keys that directly depend on any of `seeds` to `out`, keeping duplicates.
    pub fn direct_dependents_into(&self, seeds: impl IntoIterator<Item = Key>, out: &mut Vec<Key>) {
        for seed in seeds {
            out.extend_from_slice(self.dependents_of(seed));
        }
    }
}
