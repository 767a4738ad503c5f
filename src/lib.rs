//! An incremental forest with dependency tracking.
//!
//! # What problem does this solve?
//! A converter mirrors a hierarchy owned by someone else (the "authority"),
//! e.g. the objects of an editor scene,
//! and derives expensive data from each object.
//! Rebuilding everything on every edit is too slow,
//! so the converter receives batches of changes
//! (deleted objects, reparented objects, objects that changed in place)
//! and wants to redo as little work as possible.
//!
//! Two data structures cooperate to make this cheap:
//!
//! - The [`Forest`] mirrors the hierarchy in dense parallel arrays.
//!   Nodes are identified durably by their [`Key`] and addressed by a volatile [`NodeIndex`].
//!   Removal is O(1) per node by moving the last node into the hole,
//!   which keeps the arrays contiguous and cache-friendly for parallel traversal.
//! - The [`DependencyIndex`] records which keys depend on which other keys,
//!   so that a change can be propagated to everything downstream of it.
//!
//! The two do not know about each other.
//! A [`Session`] composes them for a single batch:
//! it edits the forest, asks the [`Authority`] to disambiguate failures,
//! and collects the closure of everything that needs to be converted again.
//!
//! # Concurrency
//! Neither structure synchronizes internally.
//! All structural edits happen on one thread between batches;
//! read-only queries such as [`Forest::descendants`]
//! and [`DependencyIndex::transitive_dependents`]
//! may run on any number of threads while no edit is in flight.
//! The borrow checker enforces this split: edits take `&mut self`, queries take `&self`.
//!
//! # Failures
//! Duplicate inserts, removal of missing keys and reparenting onto unknown parents
//! are reported through return values and never abort a batch.
//! Broken internal invariants are programming errors and panic.

#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

pub mod authority;
pub use authority::Authority;

pub mod batch;
pub use batch::{Batch, Config, Outcome, Session};

pub mod deps;
pub use deps::DependencyIndex;

pub mod forest;
pub use forest::{Forest, NodeData, NodeIndex};

mod key;
pub use key::{Key, ScopeId};

pub mod tracer;
pub use tracer::Tracer;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;
