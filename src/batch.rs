//! Applies batches of changes reported by the authority to a forest and its dependency index.
//!
//! A [`Session`] owns one [`Forest`] and one [`DependencyIndex`] for a single scope.
//! Each call to [`Session::apply`] is one batch:
//! all structural edits are applied serially on the calling thread,
//! then the read-only dependency closures are computed concurrently.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::authority::Authority;
use crate::deps::DependencyIndex;
use crate::forest::{Forest, ParentChange};
use crate::tracer::Tracer;
use crate::{Key, ScopeId};


/// Configures a [`Session`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The number of worker threads used for dependency closures.
    /// 0 computes everything on the calling thread.
    pub concurrency:    usize,
    /// Validates the forest against the authority after every batch.
    ///
    /// This walks the whole scope and is only intended for debugging.
    pub debug_validate: bool,
}

impl Config {
    /// A config that does not spawn any worker threads.
    pub fn unthreaded() -> Self { Self { concurrency: 0, debug_validate: false } }
}

impl Default for Config {
    fn default() -> Self {
        let concurrency = match std::thread::available_parallelism() {
            Ok(c) => c.get(),
            Err(err) => {
                log::error!("Cannot detect number of CPUs ({err}), parallelism disabled");
                0
            }
        };
        Self { concurrency, debug_validate: false }
    }
}

/// A set of changes reported by the authority since the previous batch.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    /// Objects that were destroyed.
    pub deleted:    Vec<Key>,
    /// Objects that moved under a new parent, `None` for becoming a root.
    pub reparented: Vec<(Key, Option<Key>)>,
    /// Objects whose whole subtree must be rebuilt from the authority.
    pub resync:     Vec<Key>,
    /// Objects whose own data changed without a structural change.
    pub changed:    Vec<Key>,
}

impl Batch {
    /// Returns `true` if the batch contains no changes.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.reparented.is_empty()
            && self.resync.is_empty()
            && self.changed.is_empty()
    }
}

/// How a [`Session`] resolved a node that failed to reparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureResolution {
    /// The object no longer exists in the scope, so the node was removed.
    Deleted,
    /// The object still exists in the scope, so its subtree was rebuilt.
    Resync,
}

/// Return value of [`Session::apply`].
#[derive(Debug, Default, Clone)]
pub struct Outcome {
    /// Keys removed from the forest, including descendants of deleted nodes.
    pub removed:         IndexSet<Key>,
    /// Reparents that were applied directly.
    pub reparented:      Vec<ParentChange>,
    /// Keys that failed to reparent and were resolved against the authority.
    pub failed_reparent: Vec<Key>,
    /// Keys inserted during resync that the forest did not hold before.
    pub discovered:      IndexSet<Key>,
    /// Keys that need reconversion, including all transitive dependents.
    /// Never contains removed keys.
    pub reconvert:       IndexSet<Key>,
}

/// Owns the incremental state for one scope of the authority.
pub struct Session<T> {
    scope:          ScopeId,
    forest:         Forest<T>,
    deps:           DependencyIndex,
    thread_pool:    Option<rayon::ThreadPool>,
    debug_validate: bool,
}

impl<T> Session<T> {
    /// Creates a session with an empty forest for `scope`.
    pub fn new(scope: ScopeId, config: Config) -> Self {
        Self {
            scope,
            forest: Forest::new(),
            deps: DependencyIndex::new(),
            thread_pool: (config.concurrency > 0).then(|| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.concurrency)
                    .thread_name(|i| format!("sylva worker #{}", i))
                    .build()
                    .expect("Failed to create thread pool")
            }),
            debug_validate: config.debug_validate,
        }
    }

    /// The scope mirrored by this session.
    pub fn scope(&self) -> ScopeId { self.scope }

    /// The forest mirroring the scope.
    pub fn forest(&self) -> &Forest<T> { &self.forest }

    /// The dependency index.
    pub fn deps(&self) -> &DependencyIndex { &self.deps }

    /// Mutable access to the dependency index, used for registering edges after conversion.
    pub fn deps_mut(&mut self) -> &mut DependencyIndex { &mut self.deps }

    /// Inserts every object of the scope that is not yet in the forest.
    ///
    /// Returns the inserted keys in pre-order.
    pub fn populate<A: Authority<Transform = T>>(&mut self, authority: &A) -> Vec<Key> {
        let mut roots = Vec::new();
        authority.roots(self.scope, &mut roots);

        let mut inserted = Vec::new();
        for root in roots {
            self.forest.insert_subtree(authority, root, Some(&mut inserted));
        }
        log::debug!("populated {} nodes for {:?}", inserted.len(), self.scope);
        inserted
    }

    /// Applies one batch of changes.
    pub fn apply<A: Authority<Transform = T>>(
        &mut self,
        batch: &Batch,
        authority: &A,
        tracer: &impl Tracer,
    ) -> Outcome {
        tracer.start_batch(
            batch.deleted.len(),
            batch.reparented.len(),
            batch.resync.len(),
            batch.changed.len(),
        );

        let mut outcome = Outcome::default();

        self.remove(batch.deleted.iter().copied(), &mut outcome, tracer);

        let changes = self.forest.change_parents(batch.reparented.iter().copied());
        let mut resync: IndexSet<Key> = batch.resync.iter().copied().collect();

        for &key in &changes.failed {
            let resolution = match authority.resolve_in(key, self.scope) {
                Some(_) => FailureResolution::Resync,
                None => FailureResolution::Deleted,
            };
            tracer.resolve_failed_reparent(key, resolution);

            match resolution {
                FailureResolution::Deleted => self.remove([key], &mut outcome, tracer),
                FailureResolution::Resync => {
                    resync.insert(key);
                }
            }
        }
        outcome.failed_reparent = changes.failed;
        outcome.reparented = changes.succeeded;

        let mut changed = Vec::with_capacity(batch.changed.len());
        for &key in &batch.changed {
            match authority.resolve_in(key, self.scope) {
                Some(handle) if self.forest.contains(key) => {
                    self.forest.set_node_data(key, authority.node_data(handle));
                    changed.push(key);
                }
                Some(_) => {
                    resync.insert(key);
                }
                None => self.remove([key], &mut outcome, tracer),
            }
        }

        let mut reorder: IndexSet<Key> = changed
            .iter()
            .copied()
            .chain(outcome.reparented.iter().filter_map(|change| change.new_parent))
            .collect();
        let resynced = self.resync(authority, resync, &mut reorder, &mut outcome, tracer);

        for parent in reorder {
            self.forest.resync_child_order(parent, |key| match authority.resolve(key) {
                Some(handle) => authority.sibling_index(handle),
                None => i32::MAX,
            });
        }

        let mut seeds: IndexSet<Key> = IndexSet::new();
        let moved = outcome.reparented.iter().map(|change| change.key).chain(changed.iter().copied());
        for key in moved {
            seeds.insert(key);
            // active and static states are inherited
            if let Some(descendants) = self.forest.descendants_of(key) {
                seeds.extend(descendants);
            }
        }
        seeds.extend(resynced);
        seeds.retain(|key| self.forest.contains(*key));

        outcome.reconvert = self.collect_dependents(&seeds, &outcome.removed);

        self.deps.clear_dependencies(outcome.removed.iter().copied());

        if self.debug_validate {
            for error in self.forest.validate(authority, self.scope) {
                tracer.validation_error(&error);
            }
        }

        log::debug!(
            "applied batch: {} removed, {} reparented, {} failed, {} discovered, {} to reconvert",
            outcome.removed.len(),
            outcome.reparented.len(),
            outcome.failed_reparent.len(),
            outcome.discovered.len(),
            outcome.reconvert.len(),
        );
        tracer.end_batch(outcome.removed.len(), outcome.reconvert.len());

        outcome
    }

    fn remove(
        &mut self,
        keys: impl IntoIterator<Item = Key>,
        outcome: &mut Outcome,
        tracer: &impl Tracer,
    ) {
        let removed = self.forest.remove(keys);
        if !removed.is_empty() {
            tracer.remove_nodes(&removed);
            outcome.removed.extend(removed);
        }
    }

    /// Rebuilds the subtrees of `keys` from the authority.
    ///
    /// The parents of rebuilt subtrees are added to `reorder`,
    /// since reinserted roots are appended after their siblings.
    /// Returns the keys of all reinserted nodes.
    fn resync<A: Authority<Transform = T>>(
        &mut self,
        authority: &A,
        keys: IndexSet<Key>,
        reorder: &mut IndexSet<Key>,
        outcome: &mut Outcome,
        tracer: &impl Tracer,
    ) -> IndexSet<Key> {
        let mut queue: Vec<Key> = keys.into_iter().collect();
        let mut resynced: IndexSet<Key> = IndexSet::new();
        let mut lost: IndexSet<Key> = IndexSet::new();

        let mut cursor = 0;
        while let Some(&key) = queue.get(cursor) {
            cursor += 1;

            if resynced.contains(&key) {
                continue;
            }

            let handle = match authority.resolve_in(key, self.scope) {
                Some(handle) => handle,
                None => {
                    self.remove([key], outcome, tracer);
                    continue;
                }
            };

            let root = self.resync_root(authority, handle);
            let root_key = authority.key_of(root);

            // nodes of the subtree may sit elsewhere in the forest after out-of-order reparents
            let stale = authority_subtree(authority, root);
            let previous: HashSet<Key> = self.forest.remove(stale).into_iter().collect();

            let mut inserted = Vec::new();
            self.forest.insert_subtree(authority, root, Some(&mut inserted));
            tracer.resync_subtree(root_key, inserted.len());
            if let Some(parent) = authority.parent_of(root) {
                reorder.insert(authority.key_of(parent));
            }

            for &key in &inserted {
                if !previous.contains(&key) && !outcome.removed.contains(&key) {
                    tracer.discover_node(key);
                    outcome.discovered.insert(key);
                }
            }

            let inserted_set: HashSet<Key> = inserted.iter().copied().collect();
            for &key in &previous {
                if !inserted_set.contains(&key) {
                    // moved elsewhere in the authority, or gone
                    lost.insert(key);
                    queue.push(key);
                }
            }

            resynced.extend(inserted);
        }

        let gone: Vec<Key> = lost
            .into_iter()
            .filter(|&key| !self.forest.contains(key) && outcome.removed.insert(key))
            .collect();
        if !gone.is_empty() {
            tracer.remove_nodes(&gone);
        }

        // removed earlier in the batch, then reinserted under their new parent
        outcome.removed.retain(|&key| !self.forest.contains(key));

        resynced
    }

    /// Returns the topmost ancestor of `handle` that is missing from the forest,
    /// so that the resync attaches to an existing node or becomes a true root.
    fn resync_root<A: Authority<Transform = T>>(&self, authority: &A, handle: A::Handle) -> A::Handle {
        let mut root = handle;
        while let Some(parent) = authority.parent_of(root) {
            if self.forest.contains(authority.key_of(parent)) || authority.scope_of(parent) != self.scope {
                break;
            }
            root = parent;
        }
        root
    }

    fn collect_dependents(&self, seeds: &IndexSet<Key>, removed: &IndexSet<Key>) -> IndexSet<Key> {
        let deps = &self.deps;
        let compute = || {
            rayon::join(
                || deps.transitive_dependents(seeds.iter().copied()),
                || deps.transitive_dependents(removed.iter().copied()),
            )
        };
        let (changed_closure, removed_closure) = match &self.thread_pool {
            Some(pool) => pool.install(compute),
            None => (
                deps.transitive_dependents(seeds.iter().copied()),
                deps.transitive_dependents(removed.iter().copied()),
            ),
        };

        changed_closure
            .into_iter()
            .chain(removed_closure)
            .filter(|key| !removed.contains(key))
            .collect()
    }
}

/// Returns the keys of `root` and all its descendants in the authority.
fn authority_subtree<A: Authority>(authority: &A, root: A::Handle) -> Vec<Key> {
    let mut keys = Vec::new();
    let mut stack = vec![root];
    while let Some(handle) = stack.pop() {
        keys.push(authority.key_of(handle));
        authority.children_of(handle, &mut stack);
    }
    keys
}
