//! The capability interface to the external source of truth.
//!
//! The engine never looks objects up in a global table.
//! Callers supply an [`Authority`] whenever an operation needs to consult the outside world,
//! e.g. when building a subtree, validating the forest or resolving a failed reparent.

use crate::forest::NodeData;
use crate::{Key, ScopeId};

/// Resolves keys to live objects and describes their hierarchy.
///
/// Handles are only required to stay valid for the duration of a single call
/// into the engine.
pub trait Authority {
    /// A cheap reference to an object owned by the authority.
    type Handle: Copy;

    /// The opaque transform handle stored in the forest for each node.
    type Transform;

    /// Resolves a key to an object, returning `None` if the object no longer exists.
    fn resolve(&self, key: Key) -> Option<Self::Handle>;

    /// Returns the collection that the object currently belongs to.
    fn scope_of(&self, handle: Self::Handle) -> ScopeId;

    /// Returns the stable key of the object.
    fn key_of(&self, handle: Self::Handle) -> Key;

    /// Returns the parent of the object, or `None` if it is a root.
    fn parent_of(&self, handle: Self::Handle) -> Option<Self::Handle>;

    /// Appends the children of the object to `out` in sibling order.
    fn children_of(&self, handle: Self::Handle, out: &mut Vec<Self::Handle>);

    /// Returns the position of the object among its siblings as reported by the authority.
    ///
    /// The value may be stale, duplicated or out of range
    /// when multiple reorderings are reported out of order.
    fn sibling_index(&self, handle: Self::Handle) -> i32;

    /// Returns the per-node data to store in the forest.
    fn node_data(&self, handle: Self::Handle) -> NodeData<Self::Transform>;

    /// Appends all root objects of `scope` to `out`.
    fn roots(&self, scope: ScopeId, out: &mut Vec<Self::Handle>);

    /// Resolves a key only if the object still belongs to `scope`.
    fn resolve_in(&self, key: Key, scope: ScopeId) -> Option<Self::Handle> {
        self.resolve(key).filter(|&handle| self.scope_of(handle) == scope)
    }
}
