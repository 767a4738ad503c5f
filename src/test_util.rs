#![allow(missing_docs)]

use std::collections::BTreeMap;

use parking_lot::{Mutex, Once};

use crate::authority::Authority;
use crate::batch::FailureResolution;
use crate::forest::{NodeData, ValidationError};
use crate::{Forest, Key, ScopeId, Tracer};

mod scene;
pub use scene::{Scene, SceneNode};

/// The scope used by [`Scene`] unless specified otherwise.
pub const SCOPE: ScopeId = ScopeId(0);

pub fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(env_logger::init);
}

/// Builds a forest mirroring every node of [`SCOPE`] in `scene`.
pub fn forest_of(scene: &Scene) -> Forest<i32> {
    let mut forest = Forest::new();
    let mut roots = Vec::new();
    scene.roots(SCOPE, &mut roots);
    for root in roots {
        forest.insert_subtree(scene, root, None);
    }
    forest
}

/// Asserts that `forest` is internally consistent and mirrors [`SCOPE`] in `scene`.
pub fn assert_mirrors(forest: &Forest<i32>, scene: &Scene) {
    let errors = forest.validate(scene, SCOPE);
    assert!(errors.is_empty(), "forest does not mirror the scene: {errors:#?}");
}

/// Returns the structure of a forest as `(key, parent, children)` rows sorted by key,
/// independent of the index assignment.
pub fn shape_of<T>(forest: &Forest<T>) -> BTreeMap<Key, (Option<Key>, Vec<Key>)> {
    forest
        .keys()
        .iter()
        .map(|&key| {
            let index = forest.index_of(key).expect("key from forest.keys()");
            let parent = forest.parent_of(index).map(|parent| forest.key_at(parent));
            let children =
                forest.children_of(index).iter().map(|&child| forest.key_at(child)).collect();
            (key, (parent, children))
        })
        .collect()
}

/// Shorthand for a key.
pub fn k(id: i32) -> Key { Key(id) }

/// Shorthand for node data without a transform handle.
pub fn data(active: bool, is_static: bool) -> NodeData<()> {
    NodeData { active, is_static, transform: () }
}

/// An event observed by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RemoveNodes(Vec<Key>),
    ResolveFailedReparent(Key, FailureResolution),
    ResyncSubtree(Key, usize),
    DiscoverNode(Key),
    ValidationError(ValidationError),
}

/// A tracer that records structural events in order.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    /// Returns the events observed in this tracer.
    pub fn into_events(self) -> Vec<Event> { self.events.into_inner() }
}

impl Tracer for Recorder {
    fn remove_nodes(&self, keys: &[Key]) { self.events.lock().push(Event::RemoveNodes(keys.to_vec())); }

    fn resolve_failed_reparent(&self, key: Key, resolution: FailureResolution) {
        self.events.lock().push(Event::ResolveFailedReparent(key, resolution));
    }

    fn resync_subtree(&self, root: Key, inserted: usize) {
        self.events.lock().push(Event::ResyncSubtree(root, inserted));
    }

    fn discover_node(&self, key: Key) { self.events.lock().push(Event::DiscoverNode(key)); }

    fn validation_error(&self, error: &ValidationError) {
        self.events.lock().push(Event::ValidationError(error.clone()));
    }
}
