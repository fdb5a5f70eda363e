//! A canonical, type-safe address of a node in the tree.

use std::fmt;

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Child ids from the root (exclusive) down to a node (inclusive).
///
/// The empty path addresses the root. A path is a cached, derived view of a
/// node's position; the node's id is its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vector<NodeId>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&NodeId> {
        self.0.last()
    }

    /// The parent path; the root's parent is `None`.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0.take(self.0.len() - 1)))
    }

    pub fn child(&self, id: NodeId) -> Path {
        let mut ids = self.0.clone();
        ids.push_back(id);
        Path(ids)
    }

    /// The first `len` segments.
    pub fn prefix(&self, len: usize) -> Path {
        Path(self.0.take(len.min(self.0.len())))
    }

    /// True when `self` equals `other` or is an ancestor of it.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// True when `self` is a strict ancestor of `other`.
    pub fn is_strict_prefix_of(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for id in &self.0 {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

impl<S: AsRef<str>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Path(iter.into_iter().map(|s| NodeId::new(s)).collect())
    }
}
