use std::iter::FusedIterator;
use std::slice;

use super::{Forest, NodeIndex};

/// Return value of [`Forest::descendants`].
///
/// Walks the subtree in depth-first pre-order with an explicit stack of child iterators,
/// so deep hierarchies do not grow the call stack.
pub struct Descendants<'t, T> {
    forest: &'t Forest<T>,
    stack:  Vec<slice::Iter<'t, NodeIndex>>,
}

impl<'t, T> Descendants<'t, T> {
    pub(super) fn new(forest: &'t Forest<T>, index: NodeIndex) -> Self {
        Self { forest, stack: vec![forest.children_of(index).iter()] }
    }
}

impl<'t, T> Iterator for Descendants<'t, T> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(&child) => {
                    self.stack.push(self.forest.children_of(child).iter());
                    return Some(child);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl<'t, T> FusedIterator for Descendants<'t, T> {}
