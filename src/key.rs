//! Stable identifiers assigned by the external authority.

use std::fmt;

/// The stable identity of an object, independent of where it is stored.
///
/// A key is never reused while an object using it is live,
/// but may be reused after that object has been removed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(
    /// The raw id assigned by the authority.
    pub i32,
);

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "#{}", self.0) }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

impl From<i32> for Key {
    fn from(id: i32) -> Self { Self(id) }
}

/// Identifies the collection an object belongs to in the external authority,
/// e.g. the scene that a forest mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(
    /// The raw scope id assigned by the authority.
    pub u32,
);
