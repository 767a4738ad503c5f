use std::fmt;

/// The current position of a node in the dense per-node arrays of a [`Forest`](super::Forest).
///
/// Valid indices always form the contiguous range `0..forest.len()`.
/// An index is reassigned whenever another node is swap-removed into its slot,
/// so it must not be held across a structural edit.
/// Use the node [`Key`](crate::Key) for durable identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    /// Returns the index as a `usize`.
    pub fn get(self) -> usize { self.0 }
}

impl fmt::Debug for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "@{}", self.0) }
}
