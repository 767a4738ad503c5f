//! Debug-only cross-checks between a forest and its authority.

use std::fmt;

use itertools::Itertools;

use super::{Forest, NodeIndex};
use crate::authority::Authority;
use crate::{Key, ScopeId};

/// A structural error detected by [`Forest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The index map does not point back to the node storing the key.
    IndexMismatch {
        /// The key stored at `index`.
        key:    Key,
        /// The index storing the key.
        index:  NodeIndex,
        /// The index that the index map returns for the key.
        mapped: Option<NodeIndex>,
    },
    /// The index map holds a different number of entries than there are nodes.
    IndexMapSize {
        /// The number of nodes.
        nodes:   usize,
        /// The number of index map entries.
        entries: usize,
    },
    /// A node is missing from the child list of its parent.
    MissingBackEdge {
        /// The child.
        key:    Key,
        /// The parent it points to.
        parent: Key,
    },
    /// A child list contains a node whose parent pointer differs.
    StrayChild {
        /// The owner of the child list.
        parent:        Key,
        /// The listed child.
        child:         Key,
        /// The parent the child actually points to.
        actual_parent: Option<Key>,
    },
    /// A node no longer resolves in the authority.
    Unresolved {
        /// The node.
        key: Key,
    },
    /// A node belongs to a different scope in the authority.
    WrongScope {
        /// The node.
        key:      Key,
        /// The scope being validated.
        expected: ScopeId,
        /// The scope reported by the authority.
        actual:   ScopeId,
    },
    /// A node has a different parent in the authority.
    WrongParent {
        /// The node.
        key:      Key,
        /// The parent reported by the authority.
        expected: Option<Key>,
        /// The parent in the forest.
        actual:   Option<Key>,
    },
    /// A node has different children, or children in a different order, in the authority.
    WrongChildren {
        /// The node.
        key:      Key,
        /// The children reported by the authority.
        expected: Vec<Key>,
        /// The children in the forest.
        actual:   Vec<Key>,
    },
    /// The authority reports a node in the scope that the forest does not hold.
    Missing {
        /// The node.
        key: Key,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IndexMismatch { key, index, mapped } => {
                write!(f, "{key} is stored at {index:?} but mapped to {mapped:?}")
            }
            Self::IndexMapSize { nodes, entries } => {
                write!(f, "{nodes} nodes are stored but {entries} keys are mapped")
            }
            Self::MissingBackEdge { key, parent } => {
                write!(f, "{key} is not in the child list of its parent {parent}")
            }
            Self::StrayChild { parent, child, actual_parent } => write!(
                f,
                "{child} is in the child list of {parent} but its parent is {actual_parent:?}"
            ),
            Self::Unresolved { key } => write!(f, "{key} no longer exists in the authority"),
            Self::WrongScope { key, expected, actual } => {
                write!(f, "{key} belongs to {actual:?} instead of {expected:?}")
            }
            Self::WrongParent { key, expected, actual } => {
                write!(f, "{key} has parent {actual:?}, expected {expected:?}")
            }
            Self::WrongChildren { key, expected, actual } => write!(
                f,
                "{key} has children [{}], expected [{}]",
                actual.iter().join(", "),
                expected.iter().join(", ")
            ),
            Self::Missing { key } => write!(f, "{key} exists in the authority but not in the forest"),
        }
    }
}

impl<T> Forest<T> {
    /// Cross-checks the forest against the authority for `scope`.
    ///
    /// This walks the entire forest and the entire scope,
    /// so it should only be used for debugging.
    /// Every error is logged at error level and returned.
    pub fn validate<A: Authority>(&self, authority: &A, scope: ScopeId) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_links(&mut errors);
        self.validate_against(authority, scope, &mut errors);

        for error in &errors {
            log::error!("Forest validation failed: {error}");
        }
        errors
    }

    fn validate_links(&self, errors: &mut Vec<ValidationError>) {
        if self.key_to_index.len() != self.keys.len() {
            errors.push(ValidationError::IndexMapSize {
                nodes:   self.keys.len(),
                entries: self.key_to_index.len(),
            });
        }

        for (index, &key) in self.keys.iter().enumerate() {
            let index = NodeIndex(index);

            let mapped = self.index_of(key);
            if mapped != Some(index) {
                errors.push(ValidationError::IndexMismatch { key, index, mapped });
            }

            if let Some(parent) = self.parent_of(index) {
                if !self.children_of(parent).contains(&index) {
                    errors.push(ValidationError::MissingBackEdge { key, parent: self.key_at(parent) });
                }
            }

            for &child in self.children_of(index) {
                let actual_parent = self.parent_of(child);
                if actual_parent != Some(index) {
                    errors.push(ValidationError::StrayChild {
                        parent: key,
                        child: self.key_at(child),
                        actual_parent: actual_parent.map(|parent| self.key_at(parent)),
                    });
                }
            }
        }
    }

    fn validate_against<A: Authority>(
        &self,
        authority: &A,
        scope: ScopeId,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut handles = Vec::new();

        for (index, &key) in self.keys.iter().enumerate() {
            let index = NodeIndex(index);

            let handle = match authority.resolve(key) {
                Some(handle) => handle,
                None => {
                    errors.push(ValidationError::Unresolved { key });
                    continue;
                }
            };

            let actual_scope = authority.scope_of(handle);
            if actual_scope != scope {
                errors.push(ValidationError::WrongScope { key, expected: scope, actual: actual_scope });
                continue;
            }

            let expected_parent = authority.parent_of(handle).map(|parent| authority.key_of(parent));
            let actual_parent = self.parent_of(index).map(|parent| self.key_at(parent));
            if expected_parent != actual_parent {
                errors.push(ValidationError::WrongParent {
                    key,
                    expected: expected_parent,
                    actual: actual_parent,
                });
            }

            handles.clear();
            authority.children_of(handle, &mut handles);
            let expected_children: Vec<Key> =
                handles.iter().map(|&child| authority.key_of(child)).collect();
            let actual_children: Vec<Key> =
                self.children_of(index).iter().map(|&child| self.key_at(child)).collect();
            if expected_children != actual_children {
                errors.push(ValidationError::WrongChildren {
                    key,
                    expected: expected_children,
                    actual: actual_children,
                });
            }
        }

        handles.clear();
        authority.roots(scope, &mut handles);
        while let Some(handle) = handles.pop() {
            let key = authority.key_of(handle);
            if !self.contains(key) {
                errors.push(ValidationError::Missing { key });
            }
            authority.children_of(handle, &mut handles);
        }
    }
}
